//! `debscan resolve` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use debscan_core::config::DebscanConfig;
use debscan_core::discovery::FsFinder;
use debscan_core::error::DebscanError;
use debscan_core::resolution::{CommandResolver, Resolver, lock_command};
use debscan_core::workdir::resolve_working_directory;

use super::files::GroupRow;
use super::{effective_exclusions, path_or_current};
use crate::cli::ResolveArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `resolve` command.
///
/// Lists the manifests that lack a lock file, then runs their lock commands.
/// The first failing command aborts the rest.
pub fn execute(
    args: ResolveArgs,
    config: &DebscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut path = path_or_current(args.path);
    let base = resolve_working_directory(&mut path).map_err(DebscanError::from)?;
    let exclusions = effective_exclusions(args.exclusions, config);
    let resolver = CommandResolver::new(FsFinder::default());

    let pending = resolver
        .pending(&base, &exclusions)
        .map_err(DebscanError::from)?;
    info!(base = %base, pending = pending.len(), "resolving dependencies");

    resolver
        .resolve(&base, &exclusions)
        .map_err(DebscanError::from)?;

    let report = ResolveReport {
        base: base.to_string(),
        resolved: pending
            .iter()
            .map(|group| ResolvedRow {
                command: lock_command(group.format).join(" "),
                group: GroupRow::new(base.path(), group),
            })
            .collect(),
    };
    writer.render(&report)?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ResolvedRow {
    #[serde(flatten)]
    pub group: GroupRow,
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub base: String,
    pub resolved: Vec<ResolvedRow>,
}

impl Render for ResolveReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Resolved dependencies in {}", self.base.bold())?;
        if self.resolved.is_empty() {
            writeln!(
                w,
                "  {}",
                "every manifest already has a lock file".green()
            )?;
            return Ok(());
        }
        for row in &self.resolved {
            writeln!(
                w,
                "  {} {:<10} {:<30} {}",
                "✔".green(),
                row.group.format,
                row.group.directory,
                row.command.dimmed()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_report_render_nothing_pending() {
        let report = ResolveReport {
            base: "/work/repo".to_owned(),
            resolved: Vec::new(),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("already has a lock file"));
    }

    #[test]
    fn test_resolve_report_json_flattens_group() {
        let report = ResolveReport {
            base: "/work/repo".to_owned(),
            resolved: vec![ResolvedRow {
                group: GroupRow {
                    format: "go".to_owned(),
                    directory: "svc".to_owned(),
                    manifest: Some("svc/go.mod".to_owned()),
                    lock_files: Vec::new(),
                    complete: false,
                },
                command: "go mod tidy".to_owned(),
            }],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["resolved"][0]["format"], "go");
        assert_eq!(json["resolved"][0]["command"], "go mod tidy");
    }
}
