//! Command handlers -- one module per subcommand

pub mod config;
pub mod files;
pub mod resolve;
pub mod scan;

use std::path::{Path, PathBuf};

use debscan_core::config::{DEFAULT_CONFIG_PATH, DebscanConfig};
use debscan_core::error::DebscanError;

/// Loads the explicit config file, or `debscan.toml` if it exists.
pub async fn load_config(explicit: Option<&Path>) -> Result<DebscanConfig, DebscanError> {
    match explicit {
        Some(path) => DebscanConfig::load(path).await,
        None => DebscanConfig::load_or_default(DEFAULT_CONFIG_PATH).await,
    }
}

/// Where the effective configuration came from, for display.
pub fn config_source(explicit: Option<&Path>) -> String {
    match explicit {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => DEFAULT_CONFIG_PATH.to_owned(),
        None => "defaults".to_owned(),
    }
}

/// Exclusions given on the command line replace the configured ones.
pub fn effective_exclusions(flags: Vec<String>, config: &DebscanConfig) -> Vec<String> {
    if flags.is_empty() {
        config.scan.exclusions.clone()
    } else {
        flags
    }
}

/// An omitted path means the current directory.
pub fn path_or_current(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_replace_configured_exclusions() {
        let config = DebscanConfig::default();
        assert_eq!(
            effective_exclusions(Vec::new(), &config),
            config.scan.exclusions
        );
        assert_eq!(
            effective_exclusions(vec!["**/dist/**".to_owned()], &config),
            vec!["**/dist/**"]
        );
    }

    #[test]
    fn explicit_config_source_is_the_path() {
        assert_eq!(
            config_source(Some(Path::new("/etc/debscan.toml"))),
            "/etc/debscan.toml"
        );
    }
}
