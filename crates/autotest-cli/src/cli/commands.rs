use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use autotest_core::compare::Comparator;
use autotest_core::config::{HarnessConfig, Parallelism};
use autotest_core::discover::TestDiscoverer;
use autotest_core::domain::HarnessError;
use autotest_core::failure::ModuleFailureDetector;
use autotest_core::runner::TestRunner;
use autotest_core::summary::{RunSummary, render_human_summary};
use autotest_core::tolerance::{ToleranceMode, ToleranceScaleMap, ToleranceTable};
use tracing::info;

use super::CliError;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Harness configuration file
    #[arg(long, default_value = "autotest.json")]
    config: PathBuf,

    /// Named test profile to apply
    #[arg(long)]
    profile: Option<String>,

    /// Worker count override (overrides max_parallel from the config)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Use loose tolerances
    #[arg(long)]
    loose: bool,
}

#[derive(clap::Args)]
pub(super) struct CompareArgs {
    /// Generated check file
    generated: PathBuf,

    /// Reference check file
    reference: PathBuf,

    /// Use loose tolerances
    #[arg(long)]
    loose: bool,
}

#[derive(clap::Args)]
pub(super) struct DetectFailureArgs {
    /// Computation log file to scan
    log: PathBuf,
}

pub(super) fn run_command(args: RunArgs) -> Result<i32, CliError> {
    let mut config = if args.config.is_file() {
        HarnessConfig::load(&args.config).map_err(CliError::Harness)?
    } else {
        info!(
            config = %args.config.display(),
            "config file not found, using built-in defaults"
        );
        HarnessConfig::default()
    };

    if let Some(profile) = args.profile {
        config.tests.profile = Some(profile);
    }
    if let Some(max_parallel) = args.max_parallel {
        config.tests.max_parallel = Parallelism::Fixed(max_parallel);
    }
    if args.loose {
        config.tests.tolerance_mode = ToleranceMode::Loose;
    }

    // Surface an unknown profile before any staging happens.
    let _ = config
        .tests
        .effective_range()
        .map_err(HarnessError::from)?;

    let discoverer = TestDiscoverer::from_config(&config).map_err(HarnessError::from)?;
    let cases = discoverer.discover().map_err(HarnessError::from)?;
    if cases.is_empty() {
        println!("no test cases discovered");
        return Ok(0);
    }

    let runner = TestRunner::from_config(&config).map_err(HarnessError::from)?;
    let results = runner.run_all(&cases);
    let summary = RunSummary::new(results);
    print!("{}", render_human_summary(&summary));

    Ok(if summary.all_passed() { 0 } else { 1 })
}

pub(super) fn compare_command(args: CompareArgs) -> Result<i32, CliError> {
    let mode = if args.loose {
        ToleranceMode::Loose
    } else {
        ToleranceMode::Strict
    };
    let comparator = Comparator::new(ToleranceTable::scaled(mode, ToleranceScaleMap::default()));

    let result = comparator.compare_check_files(&args.generated, &args.reference);
    if result.matched() {
        println!("MATCH");
        Ok(0)
    } else {
        if let Some(differences) = result.differences() {
            println!("{differences}");
        }
        Ok(1)
    }
}

pub(super) fn detect_failure_command(args: DetectFailureArgs) -> Result<i32, CliError> {
    let log_text = fs::read_to_string(&args.log)
        .with_context(|| format!("failed to read log file '{}'", args.log.display()))?;

    let failed = ModuleFailureDetector::new().failed_modules(&log_text);
    if failed.is_empty() {
        println!("no failed modules detected");
        return Ok(0);
    }
    for module in &failed {
        println!("{module}");
    }
    Ok(1)
}
