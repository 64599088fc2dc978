//! CI detection: which CI system runs us, and what it tells us about the build.
//!
//! [`CiProvider`] is a closed set of supported CI systems. [`find`] walks them
//! in [`CiProvider::ALL`] order and maps the first match into a canonical
//! [`Env`]. Detection only reads environment variables through an
//! [`EnvLookup`], so it is side-effect free and safe to call from any thread.

pub mod repository;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use self::repository::{map_repository, map_repository_url};

/// Read-only view of environment variables.
pub trait EnvLookup {
    /// Value of `key`, if set and valid UTF-8.
    fn var(&self, key: &str) -> Option<String>;

    /// Whether `key` is set at all, regardless of its value.
    fn contains(&self, key: &str) -> bool;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn contains(&self, key: &str) -> bool {
        std::env::var_os(key).is_some()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.contains_key(key)
    }
}

/// Canonical CI metadata.
///
/// `None` means the provider does not supply the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Env {
    pub repository: Option<String>,
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub author: Option<String>,
    pub repository_url: Option<String>,
    pub integration: Option<String>,
    pub filepath: Option<String>,
}

/// Supported CI systems, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CiProvider {
    AzureDevOps,
    Bitbucket,
    Buildkite,
    CircleCi,
    GitHubActions,
    GitLab,
    Jenkins,
    Travis,
}

impl CiProvider {
    /// Every provider, in the order [`find`] tries them.
    pub const ALL: [CiProvider; 8] = [
        CiProvider::AzureDevOps,
        CiProvider::Bitbucket,
        CiProvider::Buildkite,
        CiProvider::CircleCi,
        CiProvider::GitHubActions,
        CiProvider::GitLab,
        CiProvider::Jenkins,
        CiProvider::Travis,
    ];

    /// Variable whose presence identifies the provider.
    pub fn marker(self) -> &'static str {
        match self {
            Self::AzureDevOps => "TF_BUILD",
            Self::Bitbucket => "BITBUCKET_BUILD_NUMBER",
            Self::Buildkite => "BUILDKITE",
            Self::CircleCi => "CIRCLECI",
            Self::GitHubActions => "GITHUB_ACTIONS",
            Self::GitLab => "GITLAB_CI",
            Self::Jenkins => "JENKINS_URL",
            Self::Travis => "TRAVIS",
        }
    }

    /// Integration name reported to the scanning service.
    pub fn integration(self) -> &'static str {
        match self {
            Self::AzureDevOps => "AZURE_DEVOPS",
            Self::Bitbucket => "BITBUCKET",
            Self::Buildkite => "BUILDKITE",
            Self::CircleCi => "CIRCLECI",
            Self::GitHubActions => "GITHUB",
            Self::GitLab => "GITLAB",
            Self::Jenkins => "JENKINS",
            Self::Travis => "TRAVIS",
        }
    }

    /// Whether the process runs under this provider. Only presence of the
    /// marker counts, never its value.
    pub fn identify(self, env: &(impl EnvLookup + ?Sized)) -> bool {
        env.contains(self.marker())
    }

    /// Converts the provider's native variables into an [`Env`].
    pub fn map(self, env: &(impl EnvLookup + ?Sized)) -> Env {
        let get = |key: &str| non_empty(env.var(key));
        let integration = Some(self.integration().to_owned());

        match self {
            Self::AzureDevOps => {
                let remote = get("BUILD_REPOSITORY_URI");
                Env {
                    repository: remote.as_deref().map(map_repository),
                    commit: get("BUILD_SOURCEVERSION"),
                    branch: get("BUILD_SOURCEBRANCHNAME"),
                    author: get("BUILD_REQUESTEDFOR"),
                    repository_url: remote.as_deref().map(map_repository_url),
                    integration,
                    filepath: get("BUILD_SOURCESDIRECTORY"),
                }
            }
            Self::Bitbucket => Env {
                repository: get("BITBUCKET_REPO_FULL_NAME"),
                commit: get("BITBUCKET_COMMIT"),
                branch: get("BITBUCKET_BRANCH"),
                author: None,
                repository_url: get("BITBUCKET_GIT_HTTP_ORIGIN")
                    .as_deref()
                    .map(map_repository_url),
                integration,
                filepath: get("BITBUCKET_CLONE_DIR"),
            },
            Self::Buildkite => {
                let remote = get("BUILDKITE_REPO");
                let author = get("BUILDKITE_BUILD_AUTHOR").map(|name| {
                    match get("BUILDKITE_BUILD_AUTHOR_EMAIL") {
                        Some(email) => format!("{name} <{email}>"),
                        None => name,
                    }
                });
                Env {
                    repository: remote.as_deref().map(map_repository),
                    commit: get("BUILDKITE_COMMIT"),
                    branch: get("BUILDKITE_BRANCH"),
                    author,
                    repository_url: remote.as_deref().map(map_repository_url),
                    integration,
                    filepath: None,
                }
            }
            Self::CircleCi => {
                let remote = get("CIRCLE_REPOSITORY_URL");
                Env {
                    repository: remote.as_deref().map(map_repository),
                    commit: get("CIRCLE_SHA1"),
                    branch: get("CIRCLE_BRANCH"),
                    author: get("CIRCLE_USERNAME"),
                    repository_url: remote.as_deref().map(map_repository_url),
                    integration,
                    filepath: None,
                }
            }
            Self::GitHubActions => {
                let repository = get("GITHUB_REPOSITORY");
                let server = get("GITHUB_SERVER_URL").unwrap_or_else(|| "https://github.com".to_owned());
                Env {
                    repository_url: repository
                        .as_deref()
                        .map(|repo| format!("{}/{}", server.trim_end_matches('/'), repo)),
                    repository,
                    commit: get("GITHUB_SHA"),
                    branch: get("GITHUB_HEAD_REF").or_else(|| get("GITHUB_REF_NAME")),
                    author: get("GITHUB_ACTOR"),
                    integration,
                    filepath: None,
                }
            }
            Self::GitLab => Env {
                repository: get("CI_PROJECT_PATH"),
                commit: get("CI_COMMIT_SHA"),
                branch: get("CI_COMMIT_REF_NAME"),
                author: get("CI_COMMIT_AUTHOR"),
                repository_url: get("CI_PROJECT_URL"),
                integration,
                filepath: None,
            },
            Self::Jenkins => {
                let remote = get("GIT_URL");
                Env {
                    repository: remote.as_deref().map(map_repository),
                    commit: get("GIT_COMMIT"),
                    branch: get("GIT_BRANCH").map(|branch| {
                        branch
                            .strip_prefix("origin/")
                            .map(str::to_owned)
                            .unwrap_or(branch)
                    }),
                    author: get("GIT_AUTHOR_NAME"),
                    repository_url: remote.as_deref().map(map_repository_url),
                    integration,
                    filepath: None,
                }
            }
            Self::Travis => {
                let slug = get("TRAVIS_REPO_SLUG");
                Env {
                    repository_url: slug.as_deref().map(|s| format!("https://github.com/{s}")),
                    repository: slug,
                    commit: get("TRAVIS_COMMIT"),
                    branch: get("TRAVIS_PULL_REQUEST_BRANCH").or_else(|| get("TRAVIS_BRANCH")),
                    author: None,
                    integration,
                    filepath: None,
                }
            }
        }
    }
}

/// First provider that identifies the environment, if any.
pub fn detect(env: &(impl EnvLookup + ?Sized)) -> Option<CiProvider> {
    CiProvider::ALL.into_iter().find(|provider| provider.identify(env))
}

/// Detects the CI provider and maps its variables.
///
/// Returns `None` when no provider matches; that is not an error.
pub fn find(env: &(impl EnvLookup + ?Sized)) -> Option<Env> {
    let provider = detect(env)?;
    debug!(provider = provider.integration(), "ci provider detected");
    Some(provider.map(env))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
