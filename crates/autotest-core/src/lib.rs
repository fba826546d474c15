//! Core library of the regression-test harness for the BDF computation
//! package: test discovery and staging, subprocess execution with
//! per-case scratch isolation, check-data extraction, tolerance-based
//! comparison against reference data, and module failure detection.

pub mod compare;
pub mod config;
pub mod discover;
pub mod domain;
pub mod extract;
pub mod failure;
pub mod runner;
pub mod summary;
pub mod tolerance;

pub use compare::{Comparator, compare_text_files};
pub use config::{HarnessConfig, Parallelism, TestsConfig};
pub use discover::TestDiscoverer;
pub use domain::{
    ComparisonResult, HarnessError, HarnessErrorCategory, HarnessResult, TestCase, TestResult,
};
pub use extract::{extract_check_lines, write_check_file};
pub use failure::ModuleFailureDetector;
pub use runner::TestRunner;
pub use summary::{RunSummary, render_human_summary};
pub use tolerance::{ToleranceMode, ToleranceRule, ToleranceScaleMap, ToleranceTable};
