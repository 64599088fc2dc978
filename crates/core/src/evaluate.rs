//! Turns an upload verdict into a pass/fail decision.

use serde::Serialize;

use crate::scan::ScanReporter;
use crate::upload::{AutomationRule, UploadResult};

/// What a finished scan found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub vulnerabilities_found: u64,
    pub automation_rules: Vec<AutomationRule>,
    pub details_url: String,
    /// Whether any triggered rule demands failing the pipeline.
    pub pipeline_failure: bool,
}

/// Whether any rule is both triggered and demands failure.
pub fn pipeline_failure(rules: &[AutomationRule]) -> bool {
    rules.iter().any(|rule| rule.triggered && rule.fail_pipeline())
}

/// Reports the count, every rule and the details URL, in that order, then
/// folds the rules into a single verdict.
pub fn evaluate(result: UploadResult, reporter: &(impl ScanReporter + ?Sized)) -> ScanReport {
    reporter.vulnerabilities(result.vulnerabilities_found);
    for rule in &result.automation_rules {
        reporter.rule(rule);
    }
    reporter.details_url(&result.details_url);

    ScanReport {
        pipeline_failure: pipeline_failure(&result.automation_rules),
        vulnerabilities_found: result.vulnerabilities_found,
        automation_rules: result.automation_rules,
        details_url: result.details_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::workdir::BaseDir;
    use std::sync::Mutex;

    fn rule(triggered: bool, actions: &[&str]) -> AutomationRule {
        AutomationRule {
            rule_description: format!("rule triggered={triggered}"),
            rule_actions: actions.iter().map(|a| (*a).to_owned()).collect(),
            triggered,
            ..AutomationRule::default()
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ScanReporter for Recorder {
        fn working_directory(&self, _base: &BaseDir) {}
        fn soft_timeout(&self) {}
        fn no_response_tolerated(&self, _error: &UploadError) {}
        fn vulnerabilities(&self, count: u64) {
            self.0.lock().unwrap().push(format!("count {count}"));
        }
        fn rule(&self, rule: &AutomationRule) {
            self.0.lock().unwrap().push(rule.rule_description.clone());
        }
        fn details_url(&self, url: &str) {
            self.0.lock().unwrap().push(format!("url {url}"));
        }
    }

    #[test]
    fn triggered_failing_rule_fails_the_pipeline() {
        let rules = [rule(true, &["failPipeline"]), rule(false, &["failPipeline"])];
        assert!(pipeline_failure(&rules));
    }

    #[test]
    fn untriggered_or_non_failing_rules_pass() {
        let rules = [rule(false, &["failPipeline"]), rule(true, &["sendEmail"])];
        assert!(!pipeline_failure(&rules));
        assert!(!pipeline_failure(&[]));
    }

    #[test]
    fn reports_count_rules_then_url() {
        let reporter = Recorder::default();
        let result = UploadResult {
            vulnerabilities_found: 7,
            automation_rules: vec![rule(true, &[]), rule(false, &[])],
            details_url: "https://debricked.com/r/1".to_owned(),
        };

        let report = evaluate(result, &reporter);

        assert!(!report.pipeline_failure);
        assert_eq!(report.vulnerabilities_found, 7);
        assert_eq!(
            *reporter.0.lock().unwrap(),
            vec![
                "count 7",
                "rule triggered=true",
                "rule triggered=false",
                "url https://debricked.com/r/1",
            ]
        );
    }
}
