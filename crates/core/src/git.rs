//! Repository metadata for the scan request.
//!
//! Values come from three layers, highest precedence first: explicit options,
//! CI metadata (already merged into the options), and the local git work
//! tree. The local layer is only consulted when something is still missing.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ci::repository::{map_repository, map_repository_url};
use crate::error::VcsError;
use crate::options::{ScanOptions, is_blank};
use crate::workdir::BaseDir;

/// A repository metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaField {
    Repository,
    Commit,
    Branch,
    Author,
    Url,
}

impl MetaField {
    /// Fields required unless configured otherwise.
    pub const DEFAULT_REQUIRED: [MetaField; 2] = [MetaField::Repository, MetaField::Commit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Commit => "commit",
            Self::Branch => "branch",
            Self::Author => "author",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetaField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "repository" => Ok(Self::Repository),
            "commit" => Ok(Self::Commit),
            "branch" => Ok(Self::Branch),
            "author" => Ok(Self::Author),
            "url" => Ok(Self::Url),
            _ => Err(format!(
                "unknown metadata field '{s}' (expected: repository, commit, branch, author, url)"
            )),
        }
    }
}

/// Final repository metadata attached to a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetaObject {
    pub repository_name: Option<String>,
    pub commit_name: Option<String>,
    pub branch_name: Option<String>,
    pub author: Option<String>,
    pub repository_url: Option<String>,
}

impl MetaObject {
    fn get(&self, field: MetaField) -> Option<&str> {
        match field {
            MetaField::Repository => self.repository_name.as_deref(),
            MetaField::Commit => self.commit_name.as_deref(),
            MetaField::Branch => self.branch_name.as_deref(),
            MetaField::Author => self.author.as_deref(),
            MetaField::Url => self.repository_url.as_deref(),
        }
    }
}

/// Builds [`MetaObject`]s, failing when a required field stays empty.
#[derive(Debug, Clone)]
pub struct GitMetaBuilder {
    required: Vec<MetaField>,
}

impl Default for GitMetaBuilder {
    fn default() -> Self {
        Self::new(MetaField::DEFAULT_REQUIRED.to_vec())
    }
}

impl GitMetaBuilder {
    pub fn new(required: Vec<MetaField>) -> Self {
        Self { required }
    }

    pub fn required(&self) -> &[MetaField] {
        &self.required
    }

    pub fn build(&self, base: &BaseDir, options: &ScanOptions) -> Result<MetaObject, VcsError> {
        let mut meta = MetaObject {
            repository_name: options.repository_name.clone(),
            commit_name: options.commit_name.clone(),
            branch_name: options.branch_name.clone(),
            author: options.commit_author.clone(),
            repository_url: options.repository_url.clone(),
        };

        let incomplete = [
            &meta.repository_name,
            &meta.commit_name,
            &meta.branch_name,
            &meta.author,
            &meta.repository_url,
        ]
        .into_iter()
        .any(is_blank);

        if incomplete {
            let local = LocalGit::read(base.path());
            fill(&mut meta.repository_name, local.remote.as_deref().map(map_repository));
            fill(&mut meta.commit_name, local.commit);
            fill(&mut meta.branch_name, local.branch);
            fill(&mut meta.author, local.author);
            fill(&mut meta.repository_url, local.remote.as_deref().map(map_repository_url));
        }

        for field in &self.required {
            if meta.get(*field).is_none_or(str::is_empty) {
                return Err(VcsError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        Ok(meta)
    }
}

fn fill(target: &mut Option<String>, local: Option<String>) {
    if is_blank(target) {
        *target = local.filter(|v| !v.is_empty());
    }
}

/// Values read from a local git work tree.
#[derive(Debug, Default)]
struct LocalGit {
    commit: Option<String>,
    branch: Option<String>,
    author: Option<String>,
    remote: Option<String>,
}

impl LocalGit {
    fn read(dir: &Path) -> Self {
        if !is_git_repo(dir) {
            debug!(dir = %dir.display(), "not inside a git work tree");
            return Self::default();
        }

        Self {
            commit: run_git(dir, &["rev-parse", "HEAD"]),
            branch: run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
                .filter(|branch| branch != "HEAD"),
            author: run_git(dir, &["log", "-1", "--pretty=format:%an <%ae>"]),
            remote: run_git(dir, &["remote", "get-url", "origin"]),
        }
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = match Command::new("git").args(args).current_dir(dir).output() {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, ?args, "failed to run git");
            return None;
        }
    };

    if !output.status.success() {
        debug!(
            ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git command failed"
        );
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}
