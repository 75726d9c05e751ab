//! The common testbed: one management server, one datacenter and a cluster
//! host with a datastore

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vflow_common::Result;

use super::specs::{DatacenterSpec, DatastoreSpec, HostSpec, VcSpec};
use crate::spec::Spec;
use crate::testbed::{PublishedTestbed, TestbedProvider};

/// Description of a provisioned common testbed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub datacenter: String,
    pub cluster_host: String,
    pub cluster_host_datastore: String,
    pub vc: VcConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcConfig {
    pub name: String,
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl Default for VcConfig {
    fn default() -> Self {
        Self {
            name: "vc-01".to_string(),
            endpoint: "https://vc-01.lab.local/sdk".to_string(),
            username: "administrator@vsphere.local".to_string(),
            password: String::new(),
        }
    }
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            datacenter: "dc-01".to_string(),
            cluster_host: "esx-01.lab.local".to_string(),
            cluster_host_datastore: "datastore-01".to_string(),
            vc: VcConfig::default(),
        }
    }
}

impl TestbedConfig {
    /// Load the testbed description, falling back to defaults when the file
    /// does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Publishes the entities of a [`TestbedConfig`]
#[derive(Debug, Clone, Default)]
pub struct CommonTestbedProvider {
    config: TestbedConfig,
}

impl CommonTestbedProvider {
    pub const ID: &'static str = "common";

    pub const VC_ENTITY: &'static str = "VC";
    pub const DC_ENTITY: &'static str = "Datacenter";
    pub const CLUSTER_HOST_ENTITY: &'static str = "ClusterHost";
    pub const CLUSTER_HOST_DS_ENTITY: &'static str = "ClusterHostDatastore";

    pub fn new(config: TestbedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestbedConfig {
        &self.config
    }
}

fn validated<T: Spec>(spec: T) -> Result<Arc<T>> {
    spec.validate()?;
    Ok(Arc::new(spec))
}

impl TestbedProvider for CommonTestbedProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn publish(&self) -> Result<PublishedTestbed> {
        let config = &self.config;
        let mut testbed = PublishedTestbed::new(Self::ID);
        testbed
            .publish(
                Self::VC_ENTITY,
                validated(VcSpec {
                    name: config.vc.name.clone(),
                    endpoint: config.vc.endpoint.clone(),
                    username: config.vc.username.clone(),
                    password: config.vc.password.clone(),
                })?,
            )
            .publish(
                Self::DC_ENTITY,
                validated(DatacenterSpec {
                    name: config.datacenter.clone(),
                })?,
            )
            .publish(
                Self::CLUSTER_HOST_ENTITY,
                validated(HostSpec {
                    name: config.cluster_host.clone(),
                })?,
            )
            .publish(
                Self::CLUSTER_HOST_DS_ENTITY,
                validated(DatastoreSpec {
                    name: config.cluster_host_datastore.clone(),
                })?,
            );
        Ok(testbed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbed::TestbedBridge;
    use tempfile::TempDir;
    use vflow_common::Error;

    #[test]
    fn publishes_all_common_entities() {
        let bridge = TestbedBridge::new().with_provider(Arc::new(CommonTestbedProvider::default()));
        let testbed = bridge.request_testbed(CommonTestbedProvider::ID, true).unwrap();

        assert_eq!(
            testbed.entity_keys(),
            vec!["ClusterHost", "ClusterHostDatastore", "Datacenter", "VC"]
        );
        let host = testbed
            .published_entity_spec::<HostSpec>(CommonTestbedProvider::CLUSTER_HOST_ENTITY)
            .unwrap();
        assert_eq!(host.name, "esx-01.lab.local");
        let vc = testbed.published_entity_spec::<VcSpec>(CommonTestbedProvider::VC_ENTITY).unwrap();
        assert_eq!(vc.username, "administrator@vsphere.local");
    }

    #[test]
    fn invalid_description_fails_publication() {
        let config = TestbedConfig {
            datacenter: String::new(),
            ..TestbedConfig::default()
        };
        let bridge = TestbedBridge::new().with_provider(Arc::new(CommonTestbedProvider::new(config)));
        let err = bridge.request_testbed(CommonTestbedProvider::ID, true).unwrap_err();
        assert!(matches!(err, Error::TestbedResolution { .. }));
    }

    #[test]
    fn testbed_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testbed.toml");
        std::fs::write(&path, "datacenter = \"dc-lab\"\n\n[vc]\nname = \"vc-lab\"\n").unwrap();

        let config = TestbedConfig::load(&path).unwrap();
        assert_eq!(config.datacenter, "dc-lab");
        assert_eq!(config.vc.name, "vc-lab");
        assert_eq!(config.vc.username, "administrator@vsphere.local");
        assert_eq!(config.cluster_host, "esx-01.lab.local");

        assert_eq!(TestbedConfig::load(&dir.path().join("absent.toml")).unwrap(), TestbedConfig::default());
    }
}
