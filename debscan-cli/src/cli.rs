//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// debscan -- scan dependencies for vulnerabilities from CI or a workstation.
///
/// Use `debscan <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "debscan", version, about, long_about = None)]
pub struct Cli {
    /// Path to a debscan.toml configuration file [default: ./debscan.toml if present].
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload dependency files and fail when an automation rule demands it.
    Scan(ScanArgs),

    /// Generate missing lock files without scanning.
    Resolve(ResolveArgs),

    /// Inspect dependency file discovery.
    Files(FilesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scan ----

/// Scan a project directory.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan [default: CI checkout directory or current directory].
    pub path: Option<PathBuf>,

    /// Repository name, e.g. debricked/cli.
    #[arg(short, long)]
    pub repository: Option<String>,

    /// Commit hash.
    #[arg(short, long)]
    pub commit: Option<String>,

    /// Branch name.
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Commit author.
    #[arg(short, long)]
    pub author: Option<String>,

    /// Browsable repository URL.
    #[arg(short = 'u', long)]
    pub repository_url: Option<String>,

    /// Glob pattern to exclude; repeatable. Replaces the configured exclusions.
    #[arg(short, long = "exclusion")]
    pub exclusions: Vec<String>,

    /// Integration name reported to the service; CLI lets CI detection decide.
    #[arg(short, long, default_value = debscan_core::options::DEFAULT_INTEGRATION)]
    pub integration: String,

    /// Skip lock file generation before discovery.
    #[arg(long)]
    pub no_resolve: bool,

    /// Exit successfully when the service does not respond.
    #[arg(long)]
    pub pass_on_timeout: bool,

    /// Access token [env: DEBRICKED_TOKEN].
    #[arg(short = 't', long)]
    pub access_token: Option<String>,
}

// ---- resolve ----

/// Generate lock files for manifests that lack one.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Directory to resolve [default: current directory].
    pub path: Option<PathBuf>,

    /// Glob pattern to exclude; repeatable. Replaces the configured exclusions.
    #[arg(short, long = "exclusion")]
    pub exclusions: Vec<String>,
}

// ---- files ----

#[derive(Args, Debug)]
pub struct FilesArgs {
    #[command(subcommand)]
    pub action: FilesAction,
}

#[derive(Subcommand, Debug)]
pub enum FilesAction {
    /// List dependency file groups below a directory.
    Find {
        /// Directory to search [default: current directory].
        path: Option<PathBuf>,

        /// Glob pattern to exclude; repeatable. Replaces the configured exclusions.
        #[arg(short, long = "exclusion")]
        exclusions: Vec<String>,

        /// Only list groups that have both a manifest and a lock file.
        #[arg(long)]
        strict: bool,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, client, upload, scan, git).
        #[arg(long)]
        section: Option<String>,
    },
}
