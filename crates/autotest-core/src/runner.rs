//! Test execution engine.
//!
//! Each case runs as a subprocess in the shared stage directory with its
//! stdout and stderr streamed straight into the per-case log file, so
//! helper tools spawned by the computation can read the log while the run
//! is still in progress. Cases get an isolated scratch directory under a
//! per-run scratch root that is removed when the run finishes.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::compare::Comparator;
use crate::config::{ConfigError, HarnessConfig};
use crate::discover::wildcard_to_name;
use crate::domain::{HarnessError, INFRA_FAILURE_EXIT_CODE, TestCase, TestResult};
use crate::extract::{ExtractError, write_check_file};
use crate::tolerance::ToleranceTable;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("test case '{case}' has an empty command")]
    EmptyCommand { case: String },
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create log file '{path}': {source}")]
    CreateLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("failed while waiting for test subprocess: {source}")]
    Wait { source: std::io::Error },
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl From<RunnerError> for HarnessError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Config(inner) => inner.into(),
            err @ RunnerError::EmptyCommand { .. } => {
                HarnessError::input_validation("RUN.EMPTY_COMMAND", err.to_string())
            }
            err @ (RunnerError::CreateDir { .. } | RunnerError::CreateLog { .. }) => {
                HarnessError::io_system("RUN.CREATE", err.to_string())
            }
            err @ (RunnerError::Spawn { .. } | RunnerError::Wait { .. }) => {
                HarnessError::execution("RUN.SUBPROCESS", err.to_string())
            }
            err @ RunnerError::Extract(_) => {
                HarnessError::io_system("RUN.EXTRACT", err.to_string())
            }
        }
    }
}

struct WaitOutcome {
    exit_code: Option<i32>,
    timed_out: bool,
}

pub struct TestRunner {
    stage_dir: PathBuf,
    reference_marker: String,
    check_pattern: String,
    package_home: PathBuf,
    scratch_root: PathBuf,
    env: BTreeMap<String, String>,
    timeout: Duration,
    workers: usize,
    comparator: Comparator,
}

impl TestRunner {
    pub fn from_config(config: &HarnessConfig) -> Result<Self, RunnerError> {
        let tests = &config.tests;
        let stage_dir = config.stage_dir();
        fs::create_dir_all(&stage_dir).map_err(|source| RunnerError::CreateDir {
            path: stage_dir.clone(),
            source,
        })?;

        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = tests.max_parallel.resolve(cores);

        // Computation processes are OpenMP programs; split the cores across
        // concurrent cases unless the config pins the thread count.
        let mut env = tests.effective_env()?;
        env.entry("OMP_NUM_THREADS".to_string())
            .or_insert_with(|| (cores / workers).max(1).to_string());
        env.entry("OMP_STACKSIZE".to_string())
            .or_insert_with(|| "512M".to_string());

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let scratch_root =
            std::env::temp_dir().join(format!("bdf-autotest-{}-{nanos}", std::process::id()));

        let table = ToleranceTable::scaled(tests.tolerance_mode, tests.tolerance_scale);

        Ok(Self {
            stage_dir,
            reference_marker: tests.result_marker.clone(),
            check_pattern: tests.check_pattern.clone(),
            package_home: config.package_home_dir(),
            scratch_root,
            env,
            timeout: tests.timeout(),
            workers,
            comparator: Comparator::new(table),
        })
    }

    /// Runs every case, sequentially or across a bounded worker pool, and
    /// returns the results ordered by case name. The scratch root is
    /// removed afterwards even if individual cases failed.
    pub fn run_all(&self, cases: &[TestCase]) -> Vec<TestResult> {
        if cases.is_empty() {
            return Vec::new();
        }

        let workers = self.workers.min(cases.len());
        let mut results = if workers <= 1 {
            cases.iter().map(|case| self.run_case(case)).collect()
        } else {
            info!(workers, "running test cases in parallel");
            self.run_parallel(cases, workers)
        };
        self.cleanup_scratch();

        results.sort_by(|a, b| a.case.name.cmp(&b.case.name));
        results
    }

    fn run_parallel(&self, cases: &[TestCase], workers: usize) -> Vec<TestResult> {
        let next = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(cases.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(case) = cases.get(index) else {
                            break;
                        };
                        let result = self.run_case(case);
                        // Poisoning cannot lose data here: recover the
                        // guard and keep collecting.
                        let mut guard = results
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        guard.push(result);
                    }
                });
            }
        });

        results
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One broken case must not abort the run: any harness-side error is
    /// folded into a synthetic failure result.
    fn run_case(&self, case: &TestCase) -> TestResult {
        info!(case = %case.name, "running test case");
        let result = match self.execute_case(case) {
            Ok(result) => result,
            Err(err) => {
                error!(case = %case.name, %err, "test case could not be executed");
                TestResult::infrastructure_failure(case)
            }
        };

        if result.success {
            info!(case = %case.name, "test case passed");
        } else if result.timed_out {
            error!(case = %case.name, "test case timed out");
        } else {
            error!(
                case = %case.name,
                exit_code = result.exit_code,
                mismatches = result
                    .comparison
                    .as_ref()
                    .map(|c| c.details().mismatch_count)
                    .unwrap_or(0),
                "test case failed"
            );
        }
        result
    }

    fn execute_case(&self, case: &TestCase) -> Result<TestResult, RunnerError> {
        let program = case
            .command
            .first()
            .ok_or_else(|| RunnerError::EmptyCommand {
                case: case.name.clone(),
            })?;

        let case_scratch = self.scratch_root.join(&case.name);
        fs::create_dir_all(&case_scratch).map_err(|source| RunnerError::CreateDir {
            path: case_scratch.clone(),
            source,
        })?;

        let log = File::create(&case.log_file).map_err(|source| RunnerError::CreateLog {
            path: case.log_file.clone(),
            source,
        })?;
        let log_for_stderr = log.try_clone().map_err(|source| RunnerError::CreateLog {
            path: case.log_file.clone(),
            source,
        })?;

        let start = Instant::now();
        let child = Command::new(program)
            .args(&case.command[1..])
            .current_dir(&self.stage_dir)
            .envs(&self.env)
            .env("BDFHOME", &self.package_home)
            .env("BDF_TMPDIR", &case_scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_for_stderr))
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let outcome = wait_with_timeout(child, self.timeout)?;
        let duration = start.elapsed();

        if outcome.timed_out {
            return Ok(TestResult {
                case: case.clone(),
                success: false,
                exit_code: outcome.exit_code.unwrap_or(INFRA_FAILURE_EXIT_CODE),
                timed_out: true,
                duration,
                comparison: None,
            });
        }

        let check_file = self
            .stage_dir
            .join(wildcard_to_name(&self.check_pattern, &case.name));
        write_check_file(&case.log_file, &check_file, &self.reference_marker)?;
        let comparison = self
            .comparator
            .compare_check_files(&check_file, &case.reference_file);

        // A signal-terminated child has no exit code; treat it like an
        // infrastructure failure code so reports stay unambiguous.
        let exit_code = outcome.exit_code.unwrap_or(INFRA_FAILURE_EXIT_CODE);
        let success = exit_code == 0 && comparison.matched();

        Ok(TestResult {
            case: case.clone(),
            success,
            exit_code,
            timed_out: false,
            duration,
            comparison: Some(comparison),
        })
    }

    fn cleanup_scratch(&self) {
        if !self.scratch_root.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.scratch_root) {
            warn!(
                dir = %self.scratch_root.display(),
                %err,
                "failed to remove scratch directory"
            );
        }
    }
}

/// Polls the child until it exits or the deadline passes; on expiry the
/// child is killed and reaped so no zombie survives the run.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<WaitOutcome, RunnerError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().map_err(|source| RunnerError::Wait { source })? {
            Some(status) => {
                return Ok(WaitOutcome {
                    exit_code: status.code(),
                    timed_out: false,
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(WaitOutcome {
                        exit_code: None,
                        timed_out: true,
                    });
                }
                thread::sleep(WAIT_POLL_INTERVAL);
            }
        }
    }
}
