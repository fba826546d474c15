//! Harness configuration.
//!
//! Configuration is a JSON document deserialized into [`HarnessConfig`];
//! every field has a production default so an empty object is a valid
//! config. Paths in the tests section are resolved relative to the package
//! source directory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{HarnessError, HarnessResult};
use crate::tolerance::{ToleranceMode, ToleranceScaleMap};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown test profile '{0}'")]
    UnknownProfile(String),
}

impl From<ConfigError> for HarnessError {
    fn from(err: ConfigError) -> Self {
        match &err {
            ConfigError::Read { .. } => HarnessError::io_system("CONFIG.READ", err.to_string()),
            ConfigError::Parse { .. } => {
                HarnessError::input_validation("CONFIG.PARSE", err.to_string())
            }
            ConfigError::UnknownProfile(_) => {
                HarnessError::input_validation("CONFIG.PROFILE", err.to_string())
            }
        }
    }
}

/// Worker count for the execution engine. `Auto` resolves to the number
/// of available cores at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Auto,
    Fixed(usize),
}

impl Parallelism {
    pub fn resolve(self, available_cores: usize) -> usize {
        match self {
            Self::Auto => available_cores.max(1),
            Self::Fixed(n) => n.max(1),
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl<'de> Deserialize<'de> for Parallelism {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ParallelismVisitor;

        impl<'de> Visitor<'de> for ParallelismVisitor {
            type Value = Parallelism;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive integer or the string \"auto\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Parallelism, E> {
                if value == 0 {
                    return Err(E::custom("parallelism must be at least 1"));
                }
                Ok(Parallelism::Fixed(value as usize))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Parallelism, E> {
                if value <= 0 {
                    return Err(E::custom("parallelism must be at least 1"));
                }
                Ok(Parallelism::Fixed(value as usize))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Parallelism, E> {
                if value.eq_ignore_ascii_case("auto") {
                    Ok(Parallelism::Auto)
                } else {
                    Err(E::custom(format!("unknown parallelism value '{value}'")))
                }
            }
        }

        deserializer.deserialize_any(ParallelismVisitor)
    }
}

/// Inclusive numeric-suffix window restricting which discovered cases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CaseRange {
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

impl CaseRange {
    pub fn contains(&self, suffix: u32) -> bool {
        suffix >= self.min && self.max.is_none_or(|max| suffix <= max)
    }
}

/// Named override bundle selectable at run time. `min` and `max` override
/// the base range field-by-field; an unspecified field inherits the base
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TestProfile {
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    pub test_dir: String,
    pub reference_dir: String,
    pub input_pattern: String,
    pub check_pattern: String,
    pub log_pattern: String,
    pub test_command: String,
    pub test_args_template: String,
    pub result_marker: String,
    pub timeout_secs: u64,
    pub tolerance_mode: ToleranceMode,
    pub tolerance_scale: ToleranceScaleMap,
    pub enabled_range: Option<CaseRange>,
    pub profiles: BTreeMap<String, TestProfile>,
    pub profile: Option<String>,
    pub env: BTreeMap<String, String>,
    pub max_parallel: Parallelism,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            test_dir: "tests/input".to_string(),
            reference_dir: "tests/check".to_string(),
            input_pattern: "test*.inp".to_string(),
            check_pattern: "test*.check".to_string(),
            log_pattern: "test*.log".to_string(),
            test_command: "{BDFHOME}/sbin/bdf.drv".to_string(),
            test_args_template: "-r {input_file}".to_string(),
            result_marker: "CHECKDATA".to_string(),
            timeout_secs: 3600,
            tolerance_mode: ToleranceMode::default(),
            tolerance_scale: ToleranceScaleMap::default(),
            enabled_range: None,
            profiles: BTreeMap::new(),
            profile: None,
            env: BTreeMap::new(),
            max_parallel: Parallelism::default(),
        }
    }
}

impl TestsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The range in effect once the selected profile (if any) is applied.
    /// Profile `min`/`max` override the base range per field; profile env
    /// entries are merged over the base env.
    pub fn effective_range(&self) -> Result<Option<CaseRange>, ConfigError> {
        let Some(profile) = self.selected_profile()? else {
            return Ok(self.enabled_range);
        };
        if profile.min.is_none() && profile.max.is_none() {
            return Ok(self.enabled_range);
        }
        let base = self.enabled_range.unwrap_or(CaseRange { min: 0, max: None });
        Ok(Some(CaseRange {
            min: profile.min.unwrap_or(base.min),
            max: profile.max.or(base.max),
        }))
    }

    pub fn effective_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut env = self.env.clone();
        if let Some(profile) = self.selected_profile()? {
            env.extend(profile.env.clone());
        }
        Ok(env)
    }

    fn selected_profile(&self) -> Result<Option<&TestProfile>, ConfigError> {
        match &self.profile {
            None => Ok(None),
            Some(name) => self
                .profiles
                .get(name)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownProfile(name.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub source_dir: String,
    pub build_dir: String,
    pub package_home: String,
    pub tests: TestsConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            source_dir: "./package_source".to_string(),
            build_dir: "build".to_string(),
            package_home: "bdf-pkg-full".to_string(),
            tests: TestsConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    pub fn build_dir(&self) -> PathBuf {
        Path::new(&self.source_dir).join(&self.build_dir)
    }

    /// Installed package root; the test command's `{BDFHOME}` placeholder
    /// expands to this path.
    pub fn package_home_dir(&self) -> PathBuf {
        self.build_dir().join(&self.package_home)
    }

    /// Working directory where inputs are staged and cases execute.
    pub fn stage_dir(&self) -> PathBuf {
        self.build_dir().join("check")
    }

    pub fn test_input_dir(&self) -> PathBuf {
        Path::new(&self.source_dir).join(&self.tests.test_dir)
    }

    pub fn reference_dir(&self) -> PathBuf {
        Path::new(&self.source_dir).join(&self.tests.reference_dir)
    }
}
