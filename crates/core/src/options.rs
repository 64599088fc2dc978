//! Scan options and their merge with detected CI metadata.

use std::path::PathBuf;

use serde::Serialize;

use crate::ci::Env;
use crate::discovery::glob_to_regex;
use crate::error::OptionsError;

/// Integration name meaning "not set by the caller".
pub const DEFAULT_INTEGRATION: &str = "CLI";

/// Options for a single scan invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOptions {
    /// Directory to scan; empty means the current directory.
    pub path: PathBuf,
    /// Run dependency resolution before discovery.
    pub resolve: bool,
    /// Glob patterns excluded from resolution and discovery.
    pub exclusions: Vec<String>,
    pub repository_name: Option<String>,
    pub commit_name: Option<String>,
    pub branch_name: Option<String>,
    pub commit_author: Option<String>,
    pub repository_url: Option<String>,
    /// Calling environment; [`DEFAULT_INTEGRATION`] lets CI detection fill it.
    pub integration_name: String,
    /// Treat a missing service response as success.
    pub pass_on_timeout: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            resolve: true,
            exclusions: Vec::new(),
            repository_name: None,
            commit_name: None,
            branch_name: None,
            commit_author: None,
            repository_url: None,
            integration_name: DEFAULT_INTEGRATION.to_owned(),
            pass_on_timeout: false,
        }
    }
}

impl ScanOptions {
    /// Rejects options the scanner cannot run with.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.integration_name.trim().is_empty() {
            return Err(OptionsError::EmptyIntegration);
        }
        for pattern in &self.exclusions {
            glob_to_regex(pattern).map_err(|reason| OptionsError::InvalidExclusion {
                pattern: pattern.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Fills every empty field from `env`. Explicit values always win.
    ///
    /// The integration name is the exception: it is replaced only while it
    /// still holds [`DEFAULT_INTEGRATION`], so an explicit name survives even
    /// when it matches some other provider's name.
    pub fn merge_env(&mut self, env: &Env) {
        fill(&mut self.repository_name, &env.repository);
        fill(&mut self.commit_name, &env.commit);
        fill(&mut self.branch_name, &env.branch);
        fill(&mut self.commit_author, &env.author);
        fill(&mut self.repository_url, &env.repository_url);

        if self.integration_name == DEFAULT_INTEGRATION {
            if let Some(integration) = env.integration.as_deref().filter(|i| !i.is_empty()) {
                self.integration_name = integration.to_owned();
            }
        }

        if self.path.as_os_str().is_empty() {
            if let Some(filepath) = env.filepath.as_deref().filter(|p| !p.is_empty()) {
                self.path = PathBuf::from(filepath);
            }
        }
    }
}

fn fill(target: &mut Option<String>, source: &Option<String>) {
    if is_blank(target) {
        *target = source.clone().filter(|v| !v.is_empty());
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}
