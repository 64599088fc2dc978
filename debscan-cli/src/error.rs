//! CLI-specific error types and exit code mapping

use debscan_core::error::DebscanError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// A triggered automation rule demands failing the pipeline.
    #[error("pipeline failure")]
    PipelineFailure,

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from debscan-core.
    #[error("{0}")]
    Core(#[from] DebscanError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 3    | Upload or network error                  |
    /// | 4    | Automation rule demands pipeline failure |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(DebscanError::Config(_)) => 2,
            Self::Core(DebscanError::Upload(_)) => 3,
            Self::PipelineFailure => 4,
            Self::Io(_) | Self::Core(DebscanError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }

    /// Whether the error still needs to be shown to the user.
    ///
    /// A pipeline failure has already been reported rule by rule.
    pub fn should_print(&self) -> bool {
        !matches!(self, Self::PipelineFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debscan_core::error::{ConfigError, OptionsError, UploadError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err = CliError::Core(DebscanError::Config(ConfigError::FileNotFound {
            path: "debscan.toml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_upload_error() {
        let err = CliError::Core(DebscanError::Upload(UploadError::NoResponse));
        assert_eq!(err.exit_code(), 3, "upload error should return exit code 3");
    }

    #[test]
    fn test_exit_code_pipeline_failure() {
        let err = CliError::PipelineFailure;
        assert_eq!(err.exit_code(), 4);
        assert!(!err.should_print());
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_other_core_error() {
        let err = CliError::Core(DebscanError::Options(OptionsError::EmptyIntegration));
        assert_eq!(err.exit_code(), 1);
        assert!(err.should_print());
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_error_display_core_is_transparent() {
        let err = CliError::Core(DebscanError::Upload(UploadError::NoFiles));
        assert_eq!(
            err.to_string(),
            "upload error: no dependency files found to upload"
        );
    }
}
