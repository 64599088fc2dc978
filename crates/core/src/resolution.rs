//! Dependency resolution: generate missing lock files before discovery.

use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::discovery::{FileGroup, Finder, ManifestFormat, MatchPolicy};
use crate::error::ResolutionError;
use crate::workdir::BaseDir;

/// Resolution seam used by the scanner.
pub trait Resolver {
    /// Resolves dependencies below `base`, skipping excluded paths.
    fn resolve(&self, base: &BaseDir, exclusions: &[String]) -> Result<(), ResolutionError>;
}

const NPM_LOCK: &[&str] = &["npm", "install", "--package-lock-only", "--ignore-scripts"];
const CARGO_LOCK: &[&str] = &["cargo", "generate-lockfile"];
const COMPOSER_LOCK: &[&str] = &[
    "composer",
    "update",
    "--no-install",
    "--ignore-platform-reqs",
    "--no-interaction",
];
const GO_LOCK: &[&str] = &["go", "mod", "tidy"];
const PIPENV_LOCK: &[&str] = &["pipenv", "lock"];
const BUNDLER_LOCK: &[&str] = &["bundle", "lock"];
const GRADLE_LOCK: &[&str] = &["gradle", "dependencies", "--write-locks"];

/// Command line (program first) that writes a lock file for `format` in the
/// manifest's directory.
pub fn lock_command(format: ManifestFormat) -> &'static [&'static str] {
    match format {
        ManifestFormat::Npm => NPM_LOCK,
        ManifestFormat::Cargo => CARGO_LOCK,
        ManifestFormat::Composer => COMPOSER_LOCK,
        ManifestFormat::Go => GO_LOCK,
        ManifestFormat::Pipenv => PIPENV_LOCK,
        ManifestFormat::Bundler => BUNDLER_LOCK,
        ManifestFormat::Gradle => GRADLE_LOCK,
    }
}

/// Runs each format's lock command for manifests that have no lock file.
///
/// Commands run sequentially, one directory at a time. The first failure
/// aborts the remaining work.
#[derive(Debug, Clone)]
pub struct CommandResolver<F> {
    finder: F,
}

impl<F: Finder> CommandResolver<F> {
    pub fn new(finder: F) -> Self {
        Self { finder }
    }

    /// Groups that need a lock file generated.
    pub fn pending(
        &self,
        base: &BaseDir,
        exclusions: &[String],
    ) -> Result<Vec<FileGroup>, ResolutionError> {
        let groups = self.finder.groups(base, exclusions, MatchPolicy::Lenient)?;
        Ok(groups
            .into_iter()
            .filter(|group| group.manifest.is_some() && group.lock_files.is_empty())
            .collect())
    }
}

impl<F: Finder> Resolver for CommandResolver<F> {
    fn resolve(&self, base: &BaseDir, exclusions: &[String]) -> Result<(), ResolutionError> {
        let pending = self.pending(base, exclusions)?;
        if pending.is_empty() {
            info!(base = %base, "all manifests already have lock files");
            return Ok(());
        }

        for group in &pending {
            let (program, args) = match lock_command(group.format) {
                [program, args @ ..] => (*program, args),
                [] => continue,
            };
            info!(
                format = group.format.name(),
                dir = %group.directory.display(),
                program,
                "generating lock file"
            );
            run_command(program, args, &group.directory)?;
        }

        Ok(())
    }
}

fn run_command(program: &str, args: &[&str], dir: &Path) -> Result<(), ResolutionError> {
    let command = format!("{} {}", program, args.join(" "));
    let directory = dir.display().to_string();

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|source| ResolutionError::Spawn {
            command: command.clone(),
            directory: directory.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(command = %command, dir = %directory, "lock file generation failed");
        return Err(ResolutionError::CommandFailed {
            command,
            directory,
            stderr,
        });
    }

    Ok(())
}
