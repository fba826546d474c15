#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use autotest_core::config::{HarnessConfig, Parallelism};
use autotest_core::discover::TestDiscoverer;
use autotest_core::domain::{INFRA_FAILURE_EXIT_CODE, TestCase};
use autotest_core::runner::TestRunner;
use tempfile::TempDir;

/// Config whose test command runs each staged input as a shell script, so
/// a case's behavior is whatever the input file says.
fn shell_config(root: &Path) -> HarnessConfig {
    let mut config = HarnessConfig {
        source_dir: root.to_string_lossy().into_owned(),
        ..HarnessConfig::default()
    };
    config.tests.test_command = "/bin/sh".to_string();
    config.tests.test_args_template = "{input_file}".to_string();
    config
}

fn write_case(root: &Path, name: &str, script: &str, reference: &str) {
    let input_dir = root.join("tests/input");
    let reference_dir = root.join("tests/check");
    fs::create_dir_all(&input_dir).expect("input dir should be created");
    fs::create_dir_all(&reference_dir).expect("reference dir should be created");
    fs::write(input_dir.join(format!("{name}.inp")), script).expect("input should be written");
    fs::write(reference_dir.join(format!("{name}.check")), reference)
        .expect("reference should be written");
}

fn discover_and_run(config: &HarnessConfig) -> Vec<autotest_core::domain::TestResult> {
    let discoverer = TestDiscoverer::from_config(config).expect("discoverer should build");
    let cases = discoverer.discover().expect("discovery should succeed");
    let runner = TestRunner::from_config(config).expect("runner should build");
    runner.run_all(&cases)
}

#[test]
fn passing_case_extracts_and_compares_check_data() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_case(
        temp.path(),
        "test001",
        "echo \"CHECKDATA:HF:ENERGY -76.026762130\"\necho \"iteration noise\"\n",
        "CHECKDATA:HF:ENERGY -76.026762130\n",
    );

    let config = shell_config(temp.path());
    let results = discover_and_run(&config);

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "case should pass");
    assert_eq!(result.exit_code, 0);
    assert!(!result.timed_out);
    let comparison = result.comparison.as_ref().expect("comparison should exist");
    assert!(comparison.matched());

    assert!(config.stage_dir().join("test001.log").is_file());
    let check = fs::read_to_string(config.stage_dir().join("test001.check"))
        .expect("check file should be written");
    assert_eq!(check, "CHECKDATA:HF:ENERGY -76.026762130\n");
}

#[test]
fn value_within_tolerance_passes_and_beyond_fails() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_case(
        temp.path(),
        "test001",
        "echo \"CHECKDATA:HF:ENERGY -76.026762134\"\n",
        "CHECKDATA:HF:ENERGY -76.026762130\n",
    );
    write_case(
        temp.path(),
        "test002",
        "echo \"CHECKDATA:HF:ENERGY -76.026765000\"\n",
        "CHECKDATA:HF:ENERGY -76.026762130\n",
    );

    let results = discover_and_run(&shell_config(temp.path()));

    assert_eq!(results.len(), 2);
    assert!(results[0].success, "within-tolerance case should pass");
    assert!(!results[1].success, "beyond-tolerance case should fail");
    let report = results[1]
        .comparison
        .as_ref()
        .expect("comparison should exist")
        .differences()
        .expect("differences should be reported");
    assert!(report.contains("CHECKDATA:HF:ENERGY"));
}

#[test]
fn nonzero_exit_code_fails_even_when_check_data_matches() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_case(
        temp.path(),
        "test001",
        "echo \"CHECKDATA:HF:ENERGY -76.0\"\nexit 3\n",
        "CHECKDATA:HF:ENERGY -76.0\n",
    );

    let results = discover_and_run(&shell_config(temp.path()));

    let result = &results[0];
    assert!(!result.success);
    assert_eq!(result.exit_code, 3);
    assert!(
        result
            .comparison
            .as_ref()
            .expect("comparison should still run")
            .matched()
    );
}

#[test]
fn timed_out_case_is_killed_and_scratch_is_cleaned_up() {
    let temp = TempDir::new().expect("tempdir should be created");
    // Record the per-case scratch path before hanging, so the test can
    // check the scratch root is removed even when the run ends badly.
    write_case(
        temp.path(),
        "test001",
        "echo \"$BDF_TMPDIR\" > scratch_path.txt\nsleep 30\n",
        "",
    );

    let mut config = shell_config(temp.path());
    config.tests.timeout_secs = 1;
    let results = discover_and_run(&config);

    let result = &results[0];
    assert!(!result.success);
    assert!(result.timed_out);
    assert!(result.comparison.is_none(), "no comparison after a timeout");
    assert!(
        result.duration < Duration::from_secs(10),
        "child should be killed at the deadline, not awaited to completion"
    );

    let scratch_path = fs::read_to_string(config.stage_dir().join("scratch_path.txt"))
        .expect("case should have recorded its scratch path");
    let case_scratch = Path::new(scratch_path.trim());
    assert!(
        !case_scratch.exists(),
        "scratch directory should be removed after the run"
    );
    let scratch_root = case_scratch.parent().expect("scratch root should exist");
    assert!(
        !scratch_root.exists(),
        "scratch root should be removed after the run"
    );
}

#[test]
fn parallel_run_returns_every_result_ordered_by_name() {
    let temp = TempDir::new().expect("tempdir should be created");
    for i in 1..=4 {
        write_case(
            temp.path(),
            &format!("test00{i}"),
            "echo \"CHECKDATA:HF:ENERGY -1.0\"\n",
            "CHECKDATA:HF:ENERGY -1.0\n",
        );
    }

    let mut config = shell_config(temp.path());
    config.tests.max_parallel = Parallelism::Fixed(4);
    let results = discover_and_run(&config);

    let names: Vec<&str> = results.iter().map(|r| r.case.name.as_str()).collect();
    assert_eq!(names, vec!["test001", "test002", "test003", "test004"]);
    assert!(results.iter().all(|r| r.success));
}

#[test]
fn spawn_failure_becomes_an_infrastructure_result() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_case(temp.path(), "test001", "", "");

    let mut config = shell_config(temp.path());
    config.tests.test_command = "/nonexistent/bdf.drv".to_string();
    let results = discover_and_run(&config);

    let result = &results[0];
    assert!(!result.success);
    assert_eq!(result.exit_code, INFRA_FAILURE_EXIT_CODE);
    assert!(result.comparison.is_none());
}

#[test]
fn case_sees_home_and_scratch_environment() {
    let temp = TempDir::new().expect("tempdir should be created");
    // Fails with a distinctive code unless both variables are present and
    // the scratch directory actually exists.
    write_case(
        temp.path(),
        "test001",
        "[ -n \"$BDFHOME\" ] || exit 7\n[ -d \"$BDF_TMPDIR\" ] || exit 8\n\
         [ -n \"$OMP_NUM_THREADS\" ] || exit 9\n\
         echo \"CHECKDATA:HF:ENERGY -1.0\"\n",
        "CHECKDATA:HF:ENERGY -1.0\n",
    );

    let results = discover_and_run(&shell_config(temp.path()));
    assert!(
        results[0].success,
        "environment checks failed with exit code {}",
        results[0].exit_code
    );
}

#[test]
fn empty_case_list_is_an_empty_run() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = shell_config(temp.path());
    let runner = TestRunner::from_config(&config).expect("runner should build");
    let cases: Vec<TestCase> = Vec::new();
    assert!(runner.run_all(&cases).is_empty());
}
