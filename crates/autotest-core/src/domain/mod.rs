pub mod errors;

pub use errors::{HarnessError, HarnessErrorCategory, HarnessResult};

use std::path::PathBuf;
use std::time::Duration;

/// Exit code recorded when the harness itself fails to run a case
/// (spawn failure, staging error, extraction error). Outside the 0..=255
/// range a child process can produce, so it is unambiguous in reports.
pub const INFRA_FAILURE_EXIT_CODE: i32 = -1;

/// A discovered test: one staged input plus the derived paths and the
/// command that executes it. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub input_file: PathBuf,
    pub log_file: PathBuf,
    pub reference_file: PathBuf,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComparisonDetails {
    pub mismatch_count: usize,
    pub generated_lines: usize,
    pub reference_lines: usize,
}

/// Outcome of comparing generated check data against a reference.
///
/// `differences` is `Some` exactly when `matched` is false; the
/// constructors are the only way to build a value, so the invariant
/// holds everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    matched: bool,
    differences: Option<String>,
    details: ComparisonDetails,
}

impl ComparisonResult {
    pub fn pass(details: ComparisonDetails) -> Self {
        Self {
            matched: true,
            differences: None,
            details,
        }
    }

    pub fn fail(differences: impl Into<String>, details: ComparisonDetails) -> Self {
        Self {
            matched: false,
            differences: Some(differences.into()),
            details,
        }
    }

    pub const fn matched(&self) -> bool {
        self.matched
    }

    pub fn differences(&self) -> Option<&str> {
        self.differences.as_deref()
    }

    pub const fn details(&self) -> ComparisonDetails {
        self.details
    }
}

/// Result of one executed test case. Created by the execution engine and
/// never mutated after the comparison step completes.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub case: TestCase,
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration: Duration,
    pub comparison: Option<ComparisonResult>,
}

impl TestResult {
    /// Synthetic failure used when scheduling or staging breaks before a
    /// subprocess result exists. One broken case must not abort the run.
    pub fn infrastructure_failure(case: &TestCase) -> Self {
        Self {
            case: case.clone(),
            success: false,
            exit_code: INFRA_FAILURE_EXIT_CODE,
            timed_out: false,
            duration: Duration::ZERO,
            comparison: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonDetails, ComparisonResult, INFRA_FAILURE_EXIT_CODE, TestCase, TestResult};
    use std::path::PathBuf;

    fn sample_case() -> TestCase {
        TestCase {
            name: "test001".to_string(),
            input_file: PathBuf::from("check/test001.inp"),
            log_file: PathBuf::from("check/test001.log"),
            reference_file: PathBuf::from("tests/check/test001.check"),
            command: vec!["bdf.drv".to_string(), "-r".to_string()],
        }
    }

    #[test]
    fn differences_present_iff_not_matched() {
        let pass = ComparisonResult::pass(ComparisonDetails::default());
        assert!(pass.matched());
        assert!(pass.differences().is_none());

        let fail = ComparisonResult::fail(
            "Line 1: text mismatch",
            ComparisonDetails {
                mismatch_count: 1,
                ..ComparisonDetails::default()
            },
        );
        assert!(!fail.matched());
        assert_eq!(fail.differences(), Some("Line 1: text mismatch"));
        assert_eq!(fail.details().mismatch_count, 1);
    }

    #[test]
    fn infrastructure_failure_uses_sentinel_exit_code() {
        let result = TestResult::infrastructure_failure(&sample_case());
        assert!(!result.success);
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, INFRA_FAILURE_EXIT_CODE);
        assert!(result.comparison.is_none());
    }
}
