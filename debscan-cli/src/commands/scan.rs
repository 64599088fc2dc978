//! `debscan scan` command handler

use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, info};

use debscan_core::client::DebClient;
use debscan_core::config::DebscanConfig;
use debscan_core::discovery::FsFinder;
use debscan_core::error::{DebscanError, UploadError};
use debscan_core::git::GitMetaBuilder;
use debscan_core::options::ScanOptions;
use debscan_core::resolution::CommandResolver;
use debscan_core::scan::{ScanOutcome, ScanReporter, Scanner, TracingReporter};
use debscan_core::upload::{AutomationRule, HttpUploader};
use debscan_core::workdir::BaseDir;

use super::{effective_exclusions, path_or_current};
use crate::cli::{OutputFormat, ScanArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `scan` command.
///
/// Text output streams progress as it happens; JSON output prints only the
/// final outcome. A pipeline failure becomes [`CliError::PipelineFailure`].
pub async fn execute(
    args: ScanArgs,
    config: &DebscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut client_config = config.client.clone();
    if let Some(token) = args.access_token.clone() {
        client_config.access_token = token;
    }
    let client = DebClient::new(&client_config).map_err(DebscanError::from)?;
    let uploader = HttpUploader::new(
        client,
        Duration::from_secs(config.upload.poll_interval_secs),
        Duration::from_secs(config.upload.poll_timeout_secs),
    );
    let scanner = Scanner::new(
        CommandResolver::new(FsFinder::default()),
        FsFinder::default(),
        uploader,
    )
    .with_git(GitMetaBuilder::new(config.git.required.clone()));

    let options = scan_options(args, config);
    info!(
        path = %options.path.display(),
        resolve = options.resolve,
        integration = %options.integration_name,
        "starting scan"
    );

    let outcome = match writer.format() {
        OutputFormat::Text => scanner.scan(options, &ConsoleReporter::stdout()).await?,
        OutputFormat::Json => scanner.scan(options, &TracingReporter).await?,
    };

    writer.render(&outcome)?;

    if outcome.fails_pipeline() {
        return Err(CliError::PipelineFailure);
    }
    Ok(())
}

fn scan_options(args: ScanArgs, config: &DebscanConfig) -> ScanOptions {
    ScanOptions {
        path: path_or_current(args.path),
        resolve: !args.no_resolve,
        exclusions: effective_exclusions(args.exclusions, config),
        repository_name: args.repository,
        commit_name: args.commit,
        branch_name: args.branch,
        commit_author: args.author,
        repository_url: args.repository_url,
        integration_name: args.integration,
        pass_on_timeout: args.pass_on_timeout,
    }
}

/// Streams scan progress as colored text.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn emit(&self, write: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write(&mut **out).and_then(|()| out.flush()) {
            debug!(error = %e, "failed to write scan progress");
        }
    }
}

impl ScanReporter for ConsoleReporter {
    fn working_directory(&self, base: &BaseDir) {
        self.emit(|w| writeln!(w, "Working directory: {base}"));
    }

    fn soft_timeout(&self) {
        self.emit(|w| {
            writeln!(
                w,
                "{}",
                "Progress polling terminated due to long scan times. Please try again later"
                    .yellow()
            )
        });
    }

    fn no_response_tolerated(&self, error: &UploadError) {
        self.emit(|w| {
            writeln!(w, "{}", error.to_string().yellow())?;
            writeln!(w, "Passing on timeout as requested")
        });
    }

    fn vulnerabilities(&self, count: u64) {
        self.emit(|w| {
            writeln!(w)?;
            writeln!(w, "{}", format!("{count} vulnerabilities found").bold())?;
            writeln!(w)
        });
    }

    fn rule(&self, rule: &AutomationRule) {
        self.emit(|w| render_rule(rule, w));
    }

    fn details_url(&self, url: &str) {
        self.emit(|w| {
            writeln!(w, "For full details, visit: {}", url.blue())?;
            writeln!(w)
        });
    }
}

/// One automation rule as a short card.
pub fn render_rule(rule: &AutomationRule, w: &mut dyn Write) -> std::io::Result<()> {
    let fails = rule.triggered && rule.fail_pipeline();
    let marker = if fails {
        "✘".red().bold()
    } else if rule.triggered {
        "!".yellow().bold()
    } else {
        "✔".green()
    };
    let description = if rule.rule_description.is_empty() {
        "(unnamed rule)"
    } else {
        rule.rule_description.as_str()
    };

    writeln!(w, "{marker} {}", description.bold())?;
    writeln!(
        w,
        "  Triggered: {}  Fails pipeline: {}",
        yes_no(rule.triggered),
        yes_no(fails)
    )?;
    if !rule.rule_link.is_empty() {
        writeln!(w, "  Manage rule: {}", rule.rule_link.blue())?;
    }

    if rule.triggered && !rule.trigger_events.is_empty() {
        writeln!(w, "  Triggered by:")?;
        for event in &rule.trigger_events {
            if event.cve.is_empty() {
                writeln!(
                    w,
                    "    - {} (licenses: {})",
                    event.dependency,
                    event.licenses.join(", ")
                )?;
                continue;
            }
            let score = event
                .cvss3
                .or(event.cvss2)
                .map(|s| format!(" CVSS {s:.1}"))
                .unwrap_or_default();
            writeln!(w, "    - {}{score} in {}", event.cve.red(), event.dependency)?;
            if !event.cve_link.is_empty() {
                writeln!(w, "      {}", event.cve_link.blue())?;
            }
        }
    }
    writeln!(w)
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

impl Render for ScanOutcome {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match self {
            ScanOutcome::Passed(report) => writeln!(
                w,
                "{} {} vulnerabilities found, no automation rule fails the pipeline",
                "PASSED".green().bold(),
                report.vulnerabilities_found
            ),
            ScanOutcome::PipelineFailure(report) => {
                let failing = report
                    .automation_rules
                    .iter()
                    .filter(|rule| rule.triggered && rule.fail_pipeline())
                    .count();
                writeln!(
                    w,
                    "{} {failing} automation rule(s) fail the pipeline",
                    "FAILED".red().bold()
                )
            }
            ScanOutcome::SoftTimeout | ScanOutcome::PassedOnTimeout => Ok(()),
        }
    }
}
