//! Dependency file discovery -- manifests and lock files grouped per directory
//!
//! [`Finder`] is the discovery seam used by the scanner. [`FsFinder`] walks
//! the base directory and groups files by [`ManifestFormat`] and directory.
//!
//! # Match policies
//!
//! - [`MatchPolicy::StrictAll`]: a group is kept only when the manifest and at
//!   least one lock file are present. Incomplete groups are dropped silently.
//! - [`MatchPolicy::Lenient`]: any group with at least one file is kept.
//!
//! # Exclusions
//!
//! Exclusions are globs matched against `/`-separated paths relative to the
//! base directory. `*` and `?` stay within one path segment, `**` crosses
//! segments, `[...]` is a character class (`[!...]` negates, a leading `]`
//! is literal, every other member except `-` ranges is taken literally).

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::workdir::BaseDir;

/// Exclusions applied when the caller gives none.
pub const DEFAULT_EXCLUSIONS: [&str; 5] = [
    "**/node_modules/**",
    "**/vendor/**",
    "**/.git/**",
    "**/bower_components/**",
    "**/target/**",
];

/// Supported dependency manifest kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    Npm,
    Cargo,
    Composer,
    Go,
    Pipenv,
    Bundler,
    Gradle,
}

impl ManifestFormat {
    pub const ALL: [ManifestFormat; 7] = [
        ManifestFormat::Npm,
        ManifestFormat::Cargo,
        ManifestFormat::Composer,
        ManifestFormat::Go,
        ManifestFormat::Pipenv,
        ManifestFormat::Bundler,
        ManifestFormat::Gradle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Cargo => "cargo",
            Self::Composer => "composer",
            Self::Go => "go",
            Self::Pipenv => "pipenv",
            Self::Bundler => "bundler",
            Self::Gradle => "gradle",
        }
    }

    /// Manifest file names, in preference order.
    pub fn manifests(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["package.json"],
            Self::Cargo => &["Cargo.toml"],
            Self::Composer => &["composer.json"],
            Self::Go => &["go.mod"],
            Self::Pipenv => &["Pipfile"],
            Self::Bundler => &["Gemfile"],
            Self::Gradle => &["build.gradle", "build.gradle.kts"],
        }
    }

    /// Lock file names.
    pub fn lock_files(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["package-lock.json", "yarn.lock", "pnpm-lock.yaml"],
            Self::Cargo => &["Cargo.lock"],
            Self::Composer => &["composer.lock"],
            Self::Go => &["go.sum"],
            Self::Pipenv => &["Pipfile.lock"],
            Self::Bundler => &["Gemfile.lock"],
            Self::Gradle => &["gradle.lockfile"],
        }
    }

    fn role_of(file_name: &str) -> Option<(ManifestFormat, Role)> {
        Self::ALL.into_iter().find_map(|format| {
            if format.manifests().contains(&file_name) {
                Some((format, Role::Manifest))
            } else if format.lock_files().contains(&file_name) {
                Some((format, Role::Lock))
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Manifest,
    Lock,
}

/// Which groups discovery reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    StrictAll,
    Lenient,
}

/// Files of one manifest kind in one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub format: ManifestFormat,
    pub directory: PathBuf,
    pub manifest: Option<PathBuf>,
    pub lock_files: Vec<PathBuf>,
}

impl FileGroup {
    fn new(format: ManifestFormat, directory: PathBuf) -> Self {
        Self {
            format,
            directory,
            manifest: None,
            lock_files: Vec::new(),
        }
    }

    /// Whether every required role is present.
    pub fn is_complete(&self) -> bool {
        self.manifest.is_some() && !self.lock_files.is_empty()
    }

    /// Manifest first, then lock files.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.manifest
            .iter()
            .chain(self.lock_files.iter())
            .map(PathBuf::as_path)
    }

    fn matches(&self, policy: MatchPolicy) -> bool {
        match policy {
            MatchPolicy::StrictAll => self.is_complete(),
            MatchPolicy::Lenient => self.manifest.is_some() || !self.lock_files.is_empty(),
        }
    }
}

/// Discovery seam used by the scanner and the resolver.
pub trait Finder {
    fn groups(
        &self,
        base: &BaseDir,
        exclusions: &[String],
        policy: MatchPolicy,
    ) -> Result<Vec<FileGroup>, DiscoveryError>;
}

/// Compiled exclusion globs.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    patterns: Vec<Regex>,
}

impl ExclusionSet {
    pub fn new(patterns: &[String]) -> Result<Self, DiscoveryError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                glob_to_regex(pattern).map_err(|reason| DiscoveryError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether the `/`-separated relative path is excluded.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative))
    }
}

/// Compiles a glob into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    // `**/` also matches zero directories
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => {
                let mut start = i + 1;
                let negated = chars.get(start) == Some(&'!');
                if negated {
                    start += 1;
                }
                // a leading `]` is a member, not the end of the class
                let search_from = if chars.get(start) == Some(&']') {
                    start + 1
                } else {
                    start
                };
                let close = chars[search_from..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| search_from + p)
                    .ok_or_else(|| "unclosed character class".to_owned())?;

                re.push('[');
                if negated {
                    re.push('^');
                }
                for &c in &chars[start..close] {
                    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
                i = close + 1;
                continue;
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    re.push('$');
    Regex::new(&re).map_err(|e| e.to_string())
}

/// Filesystem walker that does not follow symlinks.
#[derive(Debug, Clone)]
pub struct FsFinder {
    max_depth: usize,
}

impl FsFinder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for FsFinder {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Finder for FsFinder {
    fn groups(
        &self,
        base: &BaseDir,
        exclusions: &[String],
        policy: MatchPolicy,
    ) -> Result<Vec<FileGroup>, DiscoveryError> {
        let exclusions = ExclusionSet::new(exclusions)?;
        let mut groups = BTreeMap::new();

        // the base directory itself must be readable
        std::fs::read_dir(base.path()).map_err(|source| DiscoveryError::Unreadable {
            path: base.to_string(),
            source,
        })?;

        walk(base.path(), base.path(), 0, self.max_depth, &exclusions, &mut groups);

        let total = groups.len();
        let kept: Vec<FileGroup> = groups
            .into_values()
            .filter(|group| group.matches(policy))
            .collect();

        debug!(
            base = %base,
            total,
            kept = kept.len(),
            ?policy,
            "dependency file discovery completed"
        );

        Ok(kept)
    }
}

fn walk(
    base: &Path,
    dir: &Path,
    depth: usize,
    max_depth: usize,
    exclusions: &ExclusionSet,
    groups: &mut BTreeMap<(PathBuf, ManifestFormat), FileGroup>,
) {
    if depth > max_depth {
        debug!(dir = %dir.display(), max_depth, "max depth reached, skipping");
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to read directory, skipping");
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let relative = relative_path(base, &path);

        if file_type.is_dir() {
            if exclusions.is_excluded(&format!("{relative}/")) {
                debug!(path = %relative, "excluded directory");
                continue;
            }
            walk(base, &path, depth + 1, max_depth, exclusions, groups);
        } else if file_type.is_file() {
            if exclusions.is_excluded(&relative) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((format, role)) = ManifestFormat::role_of(file_name) else {
                continue;
            };

            let group = groups
                .entry((dir.to_path_buf(), format))
                .or_insert_with(|| FileGroup::new(format, dir.to_path_buf()));
            match role {
                Role::Manifest if group.manifest.is_none() => group.manifest = Some(path),
                Role::Manifest => {}
                Role::Lock => group.lock_files.push(path),
            }
        }
    }
}

/// `/`-separated path of `path` relative to `base`.
pub fn relative_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workdir::resolve_working_directory;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}").unwrap();
    }

    fn fixture() -> (tempfile::TempDir, BaseDir) {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "package.json");
        touch(dir.path(), "package-lock.json");
        touch(dir.path(), "backend/Cargo.toml");
        touch(dir.path(), "legacy/composer.lock");
        touch(dir.path(), "node_modules/left-pad/package.json");
        touch(dir.path(), "node_modules/left-pad/package-lock.json");
        touch(dir.path(), "README.md");
        let base = resolve_working_directory(&mut dir.path().to_path_buf()).unwrap();
        (dir, base)
    }

    fn default_exclusions() -> Vec<String> {
        DEFAULT_EXCLUSIONS.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn strict_all_keeps_only_complete_groups() {
        let (_dir, base) = fixture();
        let groups = FsFinder::default()
            .groups(&base, &default_exclusions(), MatchPolicy::StrictAll)
            .unwrap();

        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.format, ManifestFormat::Npm);
        assert_eq!(group.directory, base.path());
        assert_eq!(group.files().count(), 2);
    }

    #[test]
    fn lenient_keeps_partial_groups() {
        let (_dir, base) = fixture();
        let groups = FsFinder::default()
            .groups(&base, &default_exclusions(), MatchPolicy::Lenient)
            .unwrap();

        let formats: Vec<_> = groups.iter().map(|g| g.format).collect();
        assert_eq!(
            formats,
            vec![ManifestFormat::Npm, ManifestFormat::Cargo, ManifestFormat::Composer]
        );
        assert!(!groups[1].is_complete());
    }

    #[test]
    fn without_exclusions_nested_dependencies_are_found() {
        let (_dir, base) = fixture();
        let groups = FsFinder::default()
            .groups(&base, &[], MatchPolicy::StrictAll)
            .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn unreadable_base_is_an_error() {
        let (dir, base) = fixture();
        drop(dir);
        let err = FsFinder::default()
            .groups(&base, &[], MatchPolicy::StrictAll)
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreadable { .. }));
    }

    #[test]
    fn invalid_exclusion_is_an_error() {
        let (_dir, base) = fixture();
        let err = FsFinder::default()
            .groups(&base, &["[".to_owned()], MatchPolicy::StrictAll)
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern { .. }));
    }

    #[test]
    fn glob_double_star_matches_any_depth() {
        let re = glob_to_regex("**/node_modules/**").unwrap();
        assert!(re.is_match("node_modules/"));
        assert!(re.is_match("node_modules/a/package.json"));
        assert!(re.is_match("web/app/node_modules/a/package.json"));
        assert!(!re.is_match("web/node_modules_backup/package.json"));
    }

    #[test]
    fn glob_single_star_stays_in_segment() {
        let re = glob_to_regex("*.lock").unwrap();
        assert!(re.is_match("yarn.lock"));
        assert!(!re.is_match("web/yarn.lock"));
    }

    #[test]
    fn glob_character_classes() {
        let re = glob_to_regex("v[0-9]/?.json").unwrap();
        assert!(re.is_match("v1/a.json"));
        assert!(!re.is_match("vx/a.json"));

        let re = glob_to_regex("[!a]b").unwrap();
        assert!(re.is_match("cb"));
        assert!(!re.is_match("ab"));

        assert!(glob_to_regex("[unclosed").is_err());
        assert!(glob_to_regex("[]").is_err());
    }

    #[test]
    fn glob_class_members_are_literal() {
        let re = glob_to_regex("[^a]b").unwrap();
        assert!(re.is_match("^b"));
        assert!(re.is_match("ab"));
        assert!(!re.is_match("cb"));

        let re = glob_to_regex("[a&&b]").unwrap();
        assert!(re.is_match("a"));
        assert!(re.is_match("&"));

        let re = glob_to_regex("[]]x").unwrap();
        assert!(re.is_match("]x"));
        assert!(!re.is_match("ax"));

        let re = glob_to_regex("[!]]x").unwrap();
        assert!(re.is_match("ax"));
        assert!(!re.is_match("]x"));

        let re = glob_to_regex("[~-]").unwrap();
        assert!(re.is_match("~"));
        assert!(re.is_match("-"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let re = glob_to_regex("a+b(c).txt").unwrap();
        assert!(re.is_match("a+b(c).txt"));
        assert!(!re.is_match("aab(c)xtxt"));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let base = Path::new("/repo");
        assert_eq!(
            relative_path(base, Path::new("/repo/web/package.json")),
            "web/package.json"
        );
    }
}
