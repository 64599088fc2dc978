//! `debscan files` command handler

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use debscan_core::config::DebscanConfig;
use debscan_core::discovery::{FileGroup, Finder, FsFinder, MatchPolicy, relative_path};
use debscan_core::error::DebscanError;
use debscan_core::workdir::resolve_working_directory;

use super::{effective_exclusions, path_or_current};
use crate::cli::{FilesAction, FilesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `files` command.
pub fn execute(
    args: FilesArgs,
    config: &DebscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        FilesAction::Find {
            path,
            exclusions,
            strict,
        } => execute_find(path, exclusions, strict, config, writer),
    }
}

fn execute_find(
    path: Option<PathBuf>,
    exclusions: Vec<String>,
    strict: bool,
    config: &DebscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut path = path_or_current(path);
    let base = resolve_working_directory(&mut path).map_err(DebscanError::from)?;
    let exclusions = effective_exclusions(exclusions, config);
    let policy = if strict {
        MatchPolicy::StrictAll
    } else {
        MatchPolicy::Lenient
    };

    info!(base = %base, ?policy, "finding dependency files");
    let groups = FsFinder::default()
        .groups(&base, &exclusions, policy)
        .map_err(DebscanError::from)?;

    let report = FilesReport {
        base: base.to_string(),
        policy,
        groups: groups
            .iter()
            .map(|group| GroupRow::new(base.path(), group))
            .collect(),
    };
    writer.render(&report)?;
    Ok(())
}

/// A file group with paths relative to the base directory.
#[derive(Debug, Serialize)]
pub struct GroupRow {
    pub format: String,
    pub directory: String,
    pub manifest: Option<String>,
    pub lock_files: Vec<String>,
    pub complete: bool,
}

impl GroupRow {
    pub fn new(base: &std::path::Path, group: &FileGroup) -> Self {
        Self {
            format: group.format.name().to_owned(),
            directory: display_dir(relative_path(base, &group.directory)),
            manifest: group
                .manifest
                .as_deref()
                .map(|path| relative_path(base, path)),
            lock_files: group
                .lock_files
                .iter()
                .map(|path| relative_path(base, path))
                .collect(),
            complete: group.is_complete(),
        }
    }
}

fn display_dir(relative: String) -> String {
    if relative.is_empty() {
        ".".to_owned()
    } else {
        relative
    }
}

/// Discovery result.
#[derive(Debug, Serialize)]
pub struct FilesReport {
    pub base: String,
    pub policy: MatchPolicy,
    pub groups: Vec<GroupRow>,
}

impl Render for FilesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Dependency files in {}", self.base.bold())?;
        if self.groups.is_empty() {
            writeln!(w, "  {}", "no dependency files found".yellow())?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<10} {:<30} {:<24} {}",
            "FORMAT", "DIRECTORY", "MANIFEST", "LOCK FILES"
        )?;
        writeln!(w, "{}", "-".repeat(80))?;
        for group in &self.groups {
            let manifest = group.manifest.as_deref().unwrap_or("-");
            let locks = if group.lock_files.is_empty() {
                "-".red().to_string()
            } else {
                group.lock_files.join(", ")
            };
            writeln!(
                w,
                "{:<10} {:<30} {:<24} {}",
                group.format, group.directory, manifest, locks
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} group(s)", self.groups.len())?;
        Ok(())
    }
}
