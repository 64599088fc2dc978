//! debscan-core: CI-aware dependency vulnerability scan orchestration.
//!
//! The [`Scanner`] detects the CI system it runs under, merges that metadata
//! with explicit options, resolves the scan directory and repository
//! metadata, then drives resolution, discovery and upload through the
//! [`Resolver`], [`Finder`] and [`Uploader`] seams. The verdict comes back as
//! a [`ScanOutcome`].

pub mod ci;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod evaluate;
pub mod git;
pub mod options;
pub mod resolution;
pub mod scan;
pub mod upload;
pub mod workdir;

// errors
pub use error::{
    ConfigError, DebscanError, DiscoveryError, OptionsError, PathError, ResolutionError,
    UploadError, VcsError,
};

// configuration
pub use config::DebscanConfig;

// CI metadata
pub use ci::{CiProvider, Env, EnvLookup, ProcessEnv};

// orchestration
pub use evaluate::ScanReport;
pub use options::ScanOptions;
pub use scan::{ScanOutcome, ScanReporter, Scanner, TracingReporter};

// collaborators
pub use client::DebClient;
pub use discovery::{FileGroup, Finder, FsFinder, ManifestFormat, MatchPolicy};
pub use git::{GitMetaBuilder, MetaField, MetaObject};
pub use resolution::{CommandResolver, Resolver};
pub use upload::{AutomationRule, HttpUploader, UploadResult, Uploader};
pub use workdir::BaseDir;
