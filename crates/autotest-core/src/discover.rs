//! Test case discovery and staging.
//!
//! Inputs matching the configured glob are found under the test input
//! directory, filtered by the enabled numeric range, staged into the
//! build check directory together with their support files, and paired
//! with derived log and reference paths plus the concrete command line.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CaseRange, HarnessConfig};
use crate::domain::{HarnessError, TestCase};

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("failed to create stage directory '{path}': {source}")]
    StageDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to list test directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to stage input file '{path}': {source}")]
    StageInput {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<DiscoverError> for HarnessError {
    fn from(err: DiscoverError) -> Self {
        match &err {
            DiscoverError::Pattern { .. } => {
                HarnessError::input_validation("DISCOVER.PATTERN", err.to_string())
            }
            DiscoverError::StageDir { .. } => {
                HarnessError::io_system("DISCOVER.STAGE_DIR", err.to_string())
            }
            DiscoverError::ReadDir { .. } => {
                HarnessError::io_system("DISCOVER.READ_DIR", err.to_string())
            }
            DiscoverError::StageInput { .. } => {
                HarnessError::io_system("DISCOVER.STAGE_INPUT", err.to_string())
            }
        }
    }
}

/// Substitutes `base_name` for the `*` in a file pattern.
///
/// When the base name already carries the pattern's literal prefix the
/// prefix is not repeated, so `("test*.log", "test001")` yields
/// `test001.log` rather than `testtest001.log`. A pattern without a
/// wildcard contributes only its extension chain.
pub fn wildcard_to_name(pattern: &str, base_name: &str) -> String {
    if let Some((pre, post)) = pattern.split_once('*') {
        if !pre.is_empty() && base_name.starts_with(pre) {
            return format!("{base_name}{post}");
        }
        return format!("{pre}{base_name}{post}");
    }
    let suffix = pattern.find('.').map(|i| &pattern[i..]).unwrap_or("");
    format!("{base_name}{suffix}")
}

/// Splits a command template into words with shell-style quoting: single
/// quotes take everything literally, double quotes allow `\"` and `\\`
/// escapes, a bare backslash escapes the next character. An unterminated
/// quote runs to the end of the input.
pub fn split_command_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => {
                if c == '"' {
                    quote = None;
                } else if c == '\\' {
                    match chars.next() {
                        Some(next @ ('"' | '\\')) => current.push(next),
                        Some(next) => {
                            current.push('\\');
                            current.push(next);
                        }
                        None => current.push('\\'),
                    }
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[derive(Debug)]
pub struct TestDiscoverer {
    input_dir: PathBuf,
    reference_dir: PathBuf,
    stage_dir: PathBuf,
    package_home: PathBuf,
    input_matcher: GlobMatcher,
    // literal text before the wildcard, used to read a case's numeric suffix
    input_prefix: String,
    log_pattern: String,
    check_pattern: String,
    command_template: String,
    args_template: Vec<String>,
    range: Option<CaseRange>,
}

impl TestDiscoverer {
    pub fn from_config(config: &HarnessConfig) -> Result<Self, DiscoverError> {
        let tests = &config.tests;
        let input_matcher = Glob::new(&tests.input_pattern)
            .map_err(|source| DiscoverError::Pattern {
                pattern: tests.input_pattern.clone(),
                source,
            })?
            .compile_matcher();

        let input_prefix = tests
            .input_pattern
            .split('*')
            .next()
            .unwrap_or_default()
            .to_string();

        // An unknown profile is rejected by the CLI before discovery runs;
        // here the base range is an acceptable fallback.
        let range = tests.effective_range().unwrap_or(tests.enabled_range);

        Ok(Self {
            input_dir: config.test_input_dir(),
            reference_dir: config.reference_dir(),
            stage_dir: config.stage_dir(),
            package_home: config.package_home_dir(),
            input_matcher,
            input_prefix,
            log_pattern: tests.log_pattern.clone(),
            check_pattern: tests.check_pattern.clone(),
            command_template: tests.test_command.clone(),
            args_template: split_command_words(&tests.test_args_template),
            range,
        })
    }

    /// Finds, filters, and stages all matching test inputs. A missing test
    /// directory is an empty discovery, not an error.
    pub fn discover(&self) -> Result<Vec<TestCase>, DiscoverError> {
        if !self.input_dir.is_dir() {
            warn!(dir = %self.input_dir.display(), "test input directory not found");
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.stage_dir).map_err(|source| DiscoverError::StageDir {
            path: self.stage_dir.clone(),
            source,
        })?;

        let mut input_files = Vec::new();
        let entries = fs::read_dir(&self.input_dir).map_err(|source| DiscoverError::ReadDir {
            path: self.input_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DiscoverError::ReadDir {
                path: self.input_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && self.input_matcher.is_match(entry.file_name()) {
                input_files.push(path);
            }
        }
        input_files.sort();

        let mut cases = Vec::new();
        for input_file in input_files {
            let Some(name) = input_file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.range_admits(name) {
                debug!(case = name, "skipping case outside enabled range");
                continue;
            }
            cases.push(self.stage_case(name, &input_file)?);
        }

        info!(count = cases.len(), "discovered test cases");
        Ok(cases)
    }

    /// A case passes when no range is configured, when its name carries no
    /// parseable numeric suffix, or when the suffix falls in the range.
    fn range_admits(&self, name: &str) -> bool {
        let Some(range) = self.range else {
            return true;
        };
        match self.numeric_suffix(name) {
            Some(suffix) => range.contains(suffix),
            None => true,
        }
    }

    fn numeric_suffix(&self, name: &str) -> Option<u32> {
        name.strip_prefix(&self.input_prefix)?.parse().ok()
    }

    fn stage_case(&self, name: &str, input_file: &Path) -> Result<TestCase, DiscoverError> {
        let file_name = input_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let staged_input = self.stage_dir.join(&file_name);
        fs::copy(input_file, &staged_input).map_err(|source| DiscoverError::StageInput {
            path: input_file.to_path_buf(),
            source,
        })?;
        self.copy_support_files(name, input_file);

        Ok(TestCase {
            name: name.to_string(),
            input_file: staged_input,
            log_file: self.stage_dir.join(wildcard_to_name(&self.log_pattern, name)),
            reference_file: self
                .reference_dir
                .join(wildcard_to_name(&self.check_pattern, name)),
            command: self.build_command(&file_name),
        })
    }

    /// Copies `<name>.*` siblings of the input (extra charge files, basis
    /// sets) into the stage directory. Failures here surface later as
    /// regular test failures, so they are only logged.
    fn copy_support_files(&self, name: &str, input_file: &Path) {
        let Some(parent) = input_file.parent() else {
            return;
        };
        let Ok(entries) = fs::read_dir(parent) else {
            warn!(case = name, "failed to scan for support files");
            return;
        };
        let prefix = format!("{name}.");
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.starts_with(&prefix) || entry.path() == input_file {
                continue;
            }
            if let Err(err) = fs::copy(entry.path(), self.stage_dir.join(file_name)) {
                warn!(case = name, file = file_name, %err, "failed to copy support file");
            }
        }
    }

    /// Expands `{BDFHOME}` in the command template and `{input_file}` in
    /// each argument token.
    fn build_command(&self, input_name: &str) -> Vec<String> {
        let home = self.package_home.to_string_lossy();
        let command_str = self.command_template.replace("{BDFHOME}", &home);
        let mut command = split_command_words(&command_str);
        command.extend(
            self.args_template
                .iter()
                .map(|arg| arg.replace("{input_file}", input_name)),
        );
        command
    }
}
