//! Scan orchestration.
//!
//! One [`Scanner::scan`] call runs the stages in order and stops at the first
//! error:
//!
//! 1. validate the options
//! 2. detect CI metadata and merge it into the options
//! 3. resolve the working directory into a [`BaseDir`]
//! 4. build repository metadata
//! 5. generate missing lock files (only when `resolve` is set)
//! 6. discover complete file groups
//! 7. upload and wait for the verdict
//! 8. evaluate automation rules
//!
//! A soft timeout in step 7 ends the scan successfully without evaluation.
//! [`UploadError::NoResponse`] is tolerated only with `pass_on_timeout`.

use serde::Serialize;
use tracing::{info, warn};

use crate::ci::{self, EnvLookup, ProcessEnv};
use crate::discovery::{Finder, MatchPolicy};
use crate::error::{DebscanError, UploadError};
use crate::evaluate::{ScanReport, evaluate};
use crate::git::GitMetaBuilder;
use crate::options::ScanOptions;
use crate::resolution::Resolver;
use crate::upload::{AutomationRule, UploadRequest, Uploader};
use crate::workdir::{BaseDir, resolve_working_directory};

/// How a scan that did not error ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Verdict received, no rule demands failure.
    Passed(ScanReport),
    /// Verdict received and at least one triggered rule demands failure.
    PipelineFailure(ScanReport),
    /// The service is still scanning; the verdict was not awaited.
    SoftTimeout,
    /// The service never answered and `pass_on_timeout` was set.
    PassedOnTimeout,
}

impl ScanOutcome {
    pub fn fails_pipeline(&self) -> bool {
        matches!(self, Self::PipelineFailure(_))
    }

    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            Self::Passed(report) | Self::PipelineFailure(report) => Some(report),
            Self::SoftTimeout | Self::PassedOnTimeout => None,
        }
    }
}

/// Receives the user-facing progress of a scan.
pub trait ScanReporter: Send + Sync {
    fn working_directory(&self, base: &BaseDir);
    fn soft_timeout(&self);
    fn no_response_tolerated(&self, error: &UploadError);
    fn vulnerabilities(&self, count: u64);
    fn rule(&self, rule: &AutomationRule);
    fn details_url(&self, url: &str);
}

/// Reporter that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ScanReporter for TracingReporter {
    fn working_directory(&self, base: &BaseDir) {
        info!(base = %base, "working directory");
    }

    fn soft_timeout(&self) {
        info!("scan still running on the service, check back later for the result");
    }

    fn no_response_tolerated(&self, error: &UploadError) {
        warn!(error = %error, "no response from the service, passing on timeout");
    }

    fn vulnerabilities(&self, count: u64) {
        info!(count, "vulnerabilities found");
    }

    fn rule(&self, rule: &AutomationRule) {
        info!(
            rule = %rule.rule_description,
            triggered = rule.triggered,
            fail_pipeline = rule.fail_pipeline(),
            "automation rule"
        );
    }

    fn details_url(&self, url: &str) {
        info!(url, "scan details");
    }
}

/// Composes CI detection, metadata and the resolve, discover and upload
/// collaborators into a single scan.
pub struct Scanner<R, F, U> {
    resolver: R,
    finder: F,
    uploader: U,
    env: Box<dyn EnvLookup + Send + Sync>,
    git: GitMetaBuilder,
}

impl<R, F, U> Scanner<R, F, U>
where
    R: Resolver,
    F: Finder,
    U: Uploader,
{
    /// Scanner reading the process environment and requiring the default
    /// metadata fields.
    pub fn new(resolver: R, finder: F, uploader: U) -> Self {
        Self {
            resolver,
            finder,
            uploader,
            env: Box::new(ProcessEnv),
            git: GitMetaBuilder::default(),
        }
    }

    pub fn with_env(mut self, env: impl EnvLookup + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn with_git(mut self, git: GitMetaBuilder) -> Self {
        self.git = git;
        self
    }

    pub async fn scan(
        &self,
        mut options: ScanOptions,
        reporter: &impl ScanReporter,
    ) -> Result<ScanOutcome, DebscanError> {
        options.validate()?;

        let env = ci::find(&*self.env).unwrap_or_default();
        options.merge_env(&env);

        let base = resolve_working_directory(&mut options.path)?;
        reporter.working_directory(&base);

        let meta = self.git.build(&base, &options)?;

        if options.resolve {
            self.resolver.resolve(&base, &options.exclusions)?;
        }

        let groups = self
            .finder
            .groups(&base, &options.exclusions, MatchPolicy::StrictAll)?;
        info!(groups = groups.len(), base = %base, "dependency files discovered");

        let request = UploadRequest {
            base: &base,
            groups: &groups,
            meta: &meta,
            integration_name: &options.integration_name,
        };
        let result = match self.uploader.upload(request).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                reporter.soft_timeout();
                return Ok(ScanOutcome::SoftTimeout);
            }
            Err(error @ UploadError::NoResponse) if options.pass_on_timeout => {
                reporter.no_response_tolerated(&error);
                return Ok(ScanOutcome::PassedOnTimeout);
            }
            Err(error) => return Err(error.into()),
        };

        let report = evaluate(result, reporter);
        if report.pipeline_failure {
            Ok(ScanOutcome::PipelineFailure(report))
        } else {
            Ok(ScanOutcome::Passed(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::discovery::{FileGroup, ManifestFormat};
    use crate::error::{DiscoveryError, ResolutionError};
    use crate::upload::UploadResult;

    struct FakeResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeResolver {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl Resolver for FakeResolver {
        fn resolve(&self, _base: &BaseDir, _exclusions: &[String]) -> Result<(), ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolutionError::CommandFailed {
                    command: "npm install".to_owned(),
                    directory: "/tmp".to_owned(),
                    stderr: "boom".to_owned(),
                });
            }
            Ok(())
        }
    }

    struct FakeFinder {
        policy: Mutex<Option<MatchPolicy>>,
        fail: bool,
    }

    impl FakeFinder {
        fn new() -> Self {
            Self {
                policy: Mutex::new(None),
                fail: false,
            }
        }
    }

    impl Finder for FakeFinder {
        fn groups(
            &self,
            base: &BaseDir,
            _exclusions: &[String],
            policy: MatchPolicy,
        ) -> Result<Vec<FileGroup>, DiscoveryError> {
            *self.policy.lock().unwrap() = Some(policy);
            if self.fail {
                return Err(DiscoveryError::Unreadable {
                    path: base.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            Ok(vec![FileGroup {
                format: ManifestFormat::Npm,
                directory: base.path().to_path_buf(),
                manifest: Some(base.path().join("package.json")),
                lock_files: vec![base.path().join("package-lock.json")],
            }])
        }
    }

    enum Reply {
        Verdict(UploadResult),
        SoftTimeout,
        NoResponse,
        Unauthorized,
    }

    struct FakeUploader {
        reply: Reply,
        calls: AtomicUsize,
        integration: Mutex<Option<String>>,
    }

    impl FakeUploader {
        fn replying(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                integration: Mutex::new(None),
            }
        }
    }

    impl Uploader for FakeUploader {
        async fn upload(
            &self,
            request: UploadRequest<'_>,
        ) -> Result<Option<UploadResult>, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.integration.lock().unwrap() = Some(request.integration_name.to_owned());
            match &self.reply {
                Reply::Verdict(result) => Ok(Some(result.clone())),
                Reply::SoftTimeout => Ok(None),
                Reply::NoResponse => Err(UploadError::NoResponse),
                Reply::Unauthorized => Err(UploadError::Unauthorized("expired".to_owned())),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, line: String) {
            self.lines.lock().unwrap().push(line);
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl ScanReporter for Recorder {
        fn working_directory(&self, base: &BaseDir) {
            self.push(format!("Working directory: {base}"));
        }
        fn soft_timeout(&self) {
            self.push("soft timeout".to_owned());
        }
        fn no_response_tolerated(&self, _error: &UploadError) {
            self.push("no response tolerated".to_owned());
        }
        fn vulnerabilities(&self, count: u64) {
            self.push(format!("{count} vulnerabilities"));
        }
        fn rule(&self, rule: &AutomationRule) {
            self.push(format!("rule {}", rule.rule_description));
        }
        fn details_url(&self, url: &str) {
            self.push(format!("details {url}"));
        }
    }

    fn rule(description: &str, triggered: bool, fail: bool) -> AutomationRule {
        AutomationRule {
            rule_description: description.to_owned(),
            rule_actions: if fail {
                vec![AutomationRule::FAIL_PIPELINE.to_owned()]
            } else {
                vec!["sendEmail".to_owned()]
            },
            triggered,
            ..AutomationRule::default()
        }
    }

    fn verdict(rules: Vec<AutomationRule>) -> Reply {
        Reply::Verdict(UploadResult {
            vulnerabilities_found: 2,
            automation_rules: rules,
            details_url: "https://debricked.com/app/scan/1".to_owned(),
        })
    }

    fn options(dir: &tempfile::TempDir) -> ScanOptions {
        ScanOptions {
            path: dir.path().to_path_buf(),
            repository_name: Some("debricked/cli".to_owned()),
            commit_name: Some("abc123".to_owned()),
            branch_name: Some("main".to_owned()),
            commit_author: Some("dev <dev@example.com>".to_owned()),
            repository_url: Some("https://github.com/debricked/cli".to_owned()),
            ..ScanOptions::default()
        }
    }

    fn scanner(
        resolver: FakeResolver,
        uploader: FakeUploader,
    ) -> Scanner<FakeResolver, FakeFinder, FakeUploader> {
        Scanner::new(resolver, FakeFinder::new(), uploader).with_env(HashMap::new())
    }

    #[tokio::test]
    async fn resolver_failure_aborts_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::failing(), FakeUploader::replying(verdict(vec![])));

        let err = scanner
            .scan(options(&dir), &Recorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DebscanError::Resolution(_)));
        assert_eq!(scanner.resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolver_skipped_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::failing(), FakeUploader::replying(verdict(vec![])));
        let mut opts = options(&dir);
        opts.resolve = false;

        let outcome = scanner.scan(opts, &Recorder::default()).await.unwrap();

        assert!(matches!(outcome, ScanOutcome::Passed(_)));
        assert_eq!(scanner.resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discovery_uses_strict_all_and_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(vec![])));
        scanner.finder.fail = true;

        let err = scanner
            .scan(options(&dir), &Recorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DebscanError::Discovery(_)));
        assert_eq!(
            *scanner.finder.policy.lock().unwrap(),
            Some(MatchPolicy::StrictAll)
        );
        assert_eq!(scanner.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn soft_timeout_succeeds_regardless_of_pass_on_timeout() {
        for pass_on_timeout in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(Reply::SoftTimeout));
            let reporter = Recorder::default();
            let mut opts = options(&dir);
            opts.pass_on_timeout = pass_on_timeout;

            let outcome = scanner.scan(opts, &reporter).await.unwrap();

            assert_eq!(outcome, ScanOutcome::SoftTimeout);
            assert!(!outcome.fails_pipeline());
            assert_eq!(reporter.lines().last().unwrap(), "soft timeout");
        }
    }

    #[tokio::test]
    async fn no_response_propagates_without_pass_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(Reply::NoResponse));

        let err = scanner
            .scan(options(&dir), &Recorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DebscanError::Upload(UploadError::NoResponse)));
    }

    #[tokio::test]
    async fn no_response_passes_with_pass_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(Reply::NoResponse));
        let mut opts = options(&dir);
        opts.pass_on_timeout = true;

        let outcome = scanner.scan(opts, &Recorder::default()).await.unwrap();

        assert_eq!(outcome, ScanOutcome::PassedOnTimeout);
    }

    #[tokio::test]
    async fn other_upload_errors_are_never_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(Reply::Unauthorized));
        let mut opts = options(&dir);
        opts.pass_on_timeout = true;

        let err = scanner.scan(opts, &Recorder::default()).await.unwrap_err();

        assert!(matches!(
            err,
            DebscanError::Upload(UploadError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn triggered_failing_rule_signals_pipeline_failure() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![rule("critical", true, true), rule("dormant", false, true)];
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(rules)));
        let reporter = Recorder::default();

        let outcome = scanner.scan(options(&dir), &reporter).await.unwrap();

        assert!(outcome.fails_pipeline());
        let report = outcome.report().unwrap();
        assert_eq!(report.automation_rules.len(), 2);
        let lines = reporter.lines();
        assert_eq!(
            &lines[1..],
            [
                "2 vulnerabilities",
                "rule critical",
                "rule dormant",
                "details https://debricked.com/app/scan/1",
            ]
        );
    }

    #[tokio::test]
    async fn no_triggered_failing_rule_passes() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![rule("notify", true, false), rule("dormant", false, true)];
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(rules)));

        let outcome = scanner.scan(options(&dir), &Recorder::default()).await.unwrap();

        assert!(matches!(outcome, ScanOutcome::Passed(_)));
        assert!(!outcome.fails_pipeline());
    }

    #[tokio::test]
    async fn invalid_options_fail_before_any_stage() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(vec![])));
        let mut opts = options(&dir);
        opts.integration_name = String::new();

        let err = scanner.scan(opts, &Recorder::default()).await.unwrap_err();

        assert!(matches!(err, DebscanError::Options(_)));
        assert_eq!(scanner.resolver.calls.load(Ordering::SeqCst), 0);
        assert!(scanner.finder.policy.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_path_is_a_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(vec![])));
        let mut opts = options(&dir);
        opts.path = dir.path().join("does-not-exist");

        let err = scanner.scan(opts, &Recorder::default()).await.unwrap_err();

        assert!(matches!(err, DebscanError::Path(_)));
    }

    #[tokio::test]
    async fn working_directory_is_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(vec![])));
        let reporter = Recorder::default();

        scanner.scan(options(&dir), &reporter).await.unwrap();

        let canonical: PathBuf = dir.path().canonicalize().unwrap();
        assert_eq!(
            reporter.lines()[0],
            format!("Working directory: {}", canonical.display())
        );
    }

    #[tokio::test]
    async fn ci_metadata_fills_gaps_and_integration() {
        let dir = tempfile::tempdir().unwrap();
        let env: HashMap<String, String> = [
            ("GITHUB_ACTIONS", "true"),
            ("GITHUB_SHA", "ci-sha"),
            ("GITHUB_REPOSITORY", "ci/repo"),
            ("GITHUB_REF_NAME", "ci-branch"),
            ("GITHUB_SERVER_URL", "https://github.com"),
            ("GITHUB_ACTOR", "ci-bot"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let scanner = Scanner::new(
            FakeResolver::ok(),
            FakeFinder::new(),
            FakeUploader::replying(verdict(vec![])),
        )
        .with_env(env);
        let opts = ScanOptions {
            path: dir.path().to_path_buf(),
            commit_name: Some("explicit-sha".to_owned()),
            ..ScanOptions::default()
        };

        scanner.scan(opts, &Recorder::default()).await.unwrap();

        assert_eq!(
            scanner.uploader.integration.lock().unwrap().as_deref(),
            Some("GITHUB")
        );
    }

    #[tokio::test]
    async fn missing_required_metadata_is_a_vcs_error() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner(FakeResolver::ok(), FakeUploader::replying(verdict(vec![])))
            .with_git(GitMetaBuilder::new(vec![crate::git::MetaField::Commit]));
        let opts = ScanOptions {
            path: dir.path().to_path_buf(),
            ..ScanOptions::default()
        };

        let err = scanner.scan(opts, &Recorder::default()).await.unwrap_err();

        assert!(matches!(err, DebscanError::Vcs(_)));
        assert_eq!(scanner.uploader.calls.load(Ordering::SeqCst), 0);
    }
}
