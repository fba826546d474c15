//! Aggregated run results and human-readable reporting.

use std::fmt::Write as _;
use std::time::Duration;

use crate::domain::TestResult;

/// Aggregate view over one run; owns the per-case results.
#[derive(Debug, Default)]
pub struct RunSummary {
    results: Vec<TestResult>,
}

impl RunSummary {
    pub fn new(results: Vec<TestResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn total_duration(&self) -> Duration {
        self.results.iter().map(|r| r.duration).sum()
    }
}

/// Plain-text report: one status line per case plus a trailing tally.
/// Failure detail lines name the first concrete reason (timeout, exit
/// code, comparison mismatches).
pub fn render_human_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    for result in summary.results() {
        let status = if result.success { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{status}  {:<12} {:>8.2}s",
            result.case.name,
            result.duration.as_secs_f64()
        );
        if result.success {
            continue;
        }
        if result.timed_out {
            let _ = writeln!(out, "      timed out");
        } else if result.exit_code != 0 {
            let _ = writeln!(out, "      exit code {}", result.exit_code);
        }
        if let Some(comparison) = &result.comparison {
            if !comparison.matched() {
                let _ = writeln!(
                    out,
                    "      {} check-data mismatch(es)",
                    comparison.details().mismatch_count
                );
            }
        }
    }
    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} total in {:.2}s",
        summary.passed(),
        summary.failed(),
        summary.total(),
        summary.total_duration().as_secs_f64()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::{RunSummary, render_human_summary};
    use crate::domain::{ComparisonDetails, ComparisonResult, TestCase, TestResult};
    use std::path::PathBuf;
    use std::time::Duration;

    fn case(name: &str) -> TestCase {
        TestCase {
            name: name.to_string(),
            input_file: PathBuf::from(format!("{name}.inp")),
            log_file: PathBuf::from(format!("{name}.log")),
            reference_file: PathBuf::from(format!("{name}.check")),
            command: vec!["bdf.drv".to_string()],
        }
    }

    fn passing(name: &str) -> TestResult {
        TestResult {
            case: case(name),
            success: true,
            exit_code: 0,
            timed_out: false,
            duration: Duration::from_secs(2),
            comparison: Some(ComparisonResult::pass(ComparisonDetails::default())),
        }
    }

    #[test]
    fn tally_counts_passed_and_failed() {
        let mut failing = passing("test002");
        failing.success = false;
        failing.exit_code = 9;
        failing.comparison = None;

        let summary = RunSummary::new(vec![passing("test001"), failing]);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_passed());
    }

    #[test]
    fn report_names_failure_reasons() {
        let mut timeout = passing("test003");
        timeout.success = false;
        timeout.timed_out = true;
        timeout.comparison = None;

        let mut mismatch = passing("test004");
        mismatch.success = false;
        mismatch.comparison = Some(ComparisonResult::fail(
            "CHECKDATA comparison failed:\nLine 1: text mismatch",
            ComparisonDetails {
                mismatch_count: 3,
                generated_lines: 5,
                reference_lines: 5,
            },
        ));

        let report = render_human_summary(&RunSummary::new(vec![
            passing("test001"),
            timeout,
            mismatch,
        ]));

        assert!(report.contains("PASS  test001"));
        assert!(report.contains("FAIL  test003"));
        assert!(report.contains("timed out"));
        assert!(report.contains("3 check-data mismatch(es)"));
        assert!(report.contains("1 passed, 2 failed, 3 total"));
    }

    #[test]
    fn empty_run_still_renders_a_tally() {
        let report = render_human_summary(&RunSummary::default());
        assert!(report.contains("0 passed, 0 failed, 0 total"));
    }
}
