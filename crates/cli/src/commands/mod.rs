//! CLI Commands

pub mod init;
pub mod list;
pub mod run;

use std::path::PathBuf;

use vflow_e2e::vsphere::TestbedConfig;
use vflow_e2e::EngineConfig;

/// Configuration shared by all commands
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub testbed_path: PathBuf,
    pub engine: EngineConfig,
    pub testbed: TestbedConfig,
}

impl Settings {
    /// Load the engine configuration and the testbed description it points to.
    ///
    /// An explicit `testbed` path wins over the one in the configuration.
    pub fn load(config_path: PathBuf, testbed: Option<PathBuf>) -> anyhow::Result<Self> {
        let engine = EngineConfig::load(&config_path)?;
        let testbed_path = testbed
            .or_else(|| engine.testbed_path.clone())
            .unwrap_or_else(|| PathBuf::from("testbed.toml"));
        let testbed = TestbedConfig::load(&testbed_path)?;
        Ok(Self {
            config_path,
            testbed_path,
            engine,
            testbed,
        })
    }
}
