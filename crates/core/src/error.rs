//! Error types, one enum per scan stage.
//!
//! [`DebscanError`] is the top-level error returned by the scan orchestrator.
//! Every stage error converts into it with `?`, so stages propagate failures
//! upward unmodified.

/// Top-level debscan error.
#[derive(Debug, thiserror::Error)]
pub enum DebscanError {
    /// Configuration loading or validation failed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Scan options have an unexpected shape.
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),

    /// The scan path could not be resolved to a directory.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// Repository metadata could not be determined.
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    /// Dependency resolution failed.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Dependency file discovery failed.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Upload or result polling failed.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Config file is not valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A config value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scan options that do not have the shape the scanner expects.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// The integration name is empty.
    #[error("integration name must not be empty")]
    EmptyIntegration,

    /// An exclusion pattern could not be compiled.
    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidExclusion { pattern: String, reason: String },
}

/// Working directory resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The current directory could not be read.
    #[error("failed to read current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    /// The path does not exist or cannot be accessed.
    #[error("cannot access '{path}': {source}")]
    Inaccessible {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The path exists but is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },
}

/// Repository metadata errors.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// A required metadata field is still empty after every source was consulted.
    #[error("failed to determine {field}; pass it explicitly or run inside a git repository")]
    MissingField { field: String },
}

/// Dependency resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The resolver command could not be spawned.
    #[error("failed to run '{command}' in {directory}: {source}")]
    Spawn {
        command: String,
        directory: String,
        #[source]
        source: std::io::Error,
    },

    /// The resolver command exited unsuccessfully.
    #[error("'{command}' failed in {directory}: {stderr}")]
    CommandFailed {
        command: String,
        directory: String,
        stderr: String,
    },

    /// Discovering manifests to resolve failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Dependency file discovery errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The base directory could not be read.
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An exclusion pattern could not be compiled.
    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Upload and polling errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The service did not answer at all (connect failure or request timeout).
    #[error("failed to get a response from the scanning service, check the network connection")]
    NoResponse,

    /// No dependency files were found to upload.
    #[error("no dependency files found to upload")]
    NoFiles,

    /// The access token was missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The service answered with an unexpected status.
    #[error("unexpected status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The service response could not be decoded.
    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// A dependency file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other transport failure.
    #[error("request failed: {0}")]
    Transport(String),
}
