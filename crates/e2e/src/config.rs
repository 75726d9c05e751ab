//! Engine configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::poll::PollPolicy;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Testbed description used by the built-in provider
    pub testbed_path: Option<PathBuf>,

    /// Verification polling
    pub verification: VerificationConfig,

    /// Suite execution
    pub suite: SuiteConfig,

    /// Report output
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Give up on a verification after this long
    pub timeout_ms: u64,

    /// Pause between two checks of the same verification
    pub poll_interval_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            poll_interval_ms: 500,
        }
    }
}

impl VerificationConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Workflows allowed to run at the same time
    pub max_parallel_runs: usize,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self { max_parallel_runs: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, falling back to defaults when it does
    /// not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<Self>(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.verification.poll_interval_ms > 0,
            "verification.poll_interval_ms must be greater than zero"
        );
        ensure!(
            self.suite.max_parallel_runs >= 1,
            "suite.max_parallel_runs must be at least 1"
        );
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.verification.poll_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(&dir.path().join("vflow.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poll_policy(), PollPolicy::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vflow.toml");
        std::fs::write(&path, "[verification]\ntimeout_ms = 5000\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.verification.timeout_ms, 5000);
        assert_eq!(config.verification.poll_interval_ms, 500);
        assert_eq!(config.suite.max_parallel_runs, 1);
        assert_eq!(config.report.output_dir, PathBuf::from("test-results"));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("vflow.toml");
        let mut config = EngineConfig::default();
        config.suite.max_parallel_runs = 4;
        config.testbed_path = Some(PathBuf::from("testbed.toml"));

        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vflow.toml");
        std::fs::write(&path, "[suite]\nmax_parallel_runs = 0\n").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("max_parallel_runs"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vflow.toml");
        std::fs::write(&path, "[verification\n").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
