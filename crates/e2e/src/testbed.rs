//! Testbed provider bridge
//!
//! Testbeds are provisioned out of band. A [`TestbedProvider`] publishes the
//! entities of one kind of testbed as typed specs; the [`TestbedBridge`]
//! hands runs a [`TestbedHandle`] to look them up by key.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;
use vflow_common::{Error, Result};

use crate::spec::Spec;

struct PublishedEntity {
    kind: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Entities published by one testbed instance
pub struct PublishedTestbed {
    id: Uuid,
    provider: String,
    entities: HashMap<String, PublishedEntity>,
}

impl PublishedTestbed {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            entities: HashMap::new(),
        }
    }

    /// Publish `spec` under `key`, replacing any earlier entity with that key
    pub fn publish<T: Spec>(&mut self, key: impl Into<String>, spec: Arc<T>) -> &mut Self {
        self.entities.insert(
            key.into(),
            PublishedEntity {
                kind: T::KIND,
                value: spec,
            },
        );
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn entity_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn entity<T: Spec>(&self, key: &str) -> Result<Arc<T>> {
        let entity = self.entities.get(key).ok_or_else(|| Error::TestbedResolution {
            provider: self.provider.clone(),
            key: key.to_string(),
            reason: "entity is not published by this testbed".to_string(),
        })?;

        Arc::clone(&entity.value)
            .downcast::<T>()
            .map_err(|_| Error::TestbedResolution {
                provider: self.provider.clone(),
                key: key.to_string(),
                reason: format!("entity is a {}, not a {}", entity.kind, T::KIND),
            })
    }
}

/// Source of provisioned testbeds of one kind
pub trait TestbedProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Describe a provisioned testbed
    fn publish(&self) -> Result<PublishedTestbed>;
}

/// A run's view of a published testbed
#[derive(Clone)]
pub struct TestbedHandle {
    testbed: Arc<PublishedTestbed>,
    shared: bool,
}

impl TestbedHandle {
    /// The spec published under `key`.
    ///
    /// Repeated lookups return the same spec instance.
    pub fn published_entity_spec<T: Spec>(&self, key: &str) -> Result<Arc<T>> {
        self.testbed.entity::<T>(key)
    }

    pub fn id(&self) -> Uuid {
        self.testbed.id()
    }

    pub fn provider(&self) -> &str {
        self.testbed.provider()
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn entity_keys(&self) -> Vec<&str> {
        self.testbed.entity_keys()
    }
}

impl std::fmt::Debug for TestbedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestbedHandle")
            .field("id", &self.id())
            .field("provider", &self.provider())
            .field("shared", &self.shared)
            .finish()
    }
}

/// Resolves testbed requests against registered providers.
///
/// Safe to share between concurrently executing runs.
#[derive(Default)]
pub struct TestbedBridge {
    providers: RwLock<HashMap<String, Arc<dyn TestbedProvider>>>,
    /// Shared publications, one per provider
    shared: Mutex<HashMap<String, Arc<PublishedTestbed>>>,
}

impl TestbedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing one with the same id
    pub fn register(&self, provider: Arc<dyn TestbedProvider>) {
        let id = provider.id().to_string();
        debug!(provider = %id, "Registered testbed provider");
        self.providers.write().insert(id.clone(), provider);
        self.shared.lock().remove(&id);
    }

    pub fn with_provider(self, provider: Arc<dyn TestbedProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Get a testbed from `provider_id`.
    ///
    /// Shared requests reuse a single publication per provider. Unshared
    /// requests get a freshly published testbed of their own.
    pub fn request_testbed(&self, provider_id: &str, shared: bool) -> Result<TestbedHandle> {
        let provider = self
            .providers
            .read()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| Error::TestbedResolution {
                provider: provider_id.to_string(),
                key: String::new(),
                reason: "no such testbed provider".to_string(),
            })?;

        if !shared {
            let testbed = Arc::new(publish(provider.as_ref())?);
            return Ok(TestbedHandle { testbed, shared });
        }

        let mut published = self.shared.lock();
        if let Some(testbed) = published.get(provider_id) {
            return Ok(TestbedHandle {
                testbed: Arc::clone(testbed),
                shared,
            });
        }

        let testbed = Arc::new(publish(provider.as_ref())?);
        published.insert(provider_id.to_string(), Arc::clone(&testbed));
        Ok(TestbedHandle { testbed, shared })
    }
}

fn publish(provider: &dyn TestbedProvider) -> Result<PublishedTestbed> {
    let testbed = provider.publish().map_err(|e| match e {
        e @ Error::TestbedResolution { .. } => e,
        other => Error::TestbedResolution {
            provider: provider.id().to_string(),
            key: String::new(),
            reason: format!("publication failed: {}", other),
        },
    })?;
    info!(provider = provider.id(), testbed = %testbed.id(), entities = testbed.entities.len(), "Published testbed");
    Ok(testbed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct SwitchSpec {
        name: String,
    }

    impl Spec for SwitchSpec {
        const KIND: &'static str = "SwitchSpec";
    }

    #[derive(Debug)]
    struct PortSpec;

    impl Spec for PortSpec {
        const KIND: &'static str = "PortSpec";
    }

    #[derive(Default)]
    struct SwitchLab {
        publications: AtomicUsize,
    }

    impl TestbedProvider for SwitchLab {
        fn id(&self) -> &str {
            "switch-lab"
        }

        fn publish(&self) -> Result<PublishedTestbed> {
            self.publications.fetch_add(1, Ordering::SeqCst);
            let mut testbed = PublishedTestbed::new(self.id());
            testbed.publish("Switch", Arc::new(SwitchSpec { name: "sw-01".into() }));
            Ok(testbed)
        }
    }

    struct BrokenLab;

    impl TestbedProvider for BrokenLab {
        fn id(&self) -> &str {
            "broken"
        }

        fn publish(&self) -> Result<PublishedTestbed> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "testbed.toml")))
        }
    }

    #[test]
    fn resolves_published_entity() {
        let bridge = TestbedBridge::new().with_provider(Arc::new(SwitchLab::default()));
        let testbed = bridge.request_testbed("switch-lab", true).unwrap();

        let first = testbed.published_entity_spec::<SwitchSpec>("Switch").unwrap();
        let second = testbed.published_entity_spec::<SwitchSpec>("Switch").unwrap();
        assert_eq!(first.name, "sw-01");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(testbed.entity_keys(), vec!["Switch"]);
    }

    #[test]
    fn unknown_provider_fails() {
        let bridge = TestbedBridge::new();
        let err = bridge.request_testbed("switch-lab", true).unwrap_err();
        assert!(matches!(err, Error::TestbedResolution { ref provider, .. } if provider == "switch-lab"));
    }

    #[test]
    fn unknown_key_and_wrong_type_fail() {
        let bridge = TestbedBridge::new().with_provider(Arc::new(SwitchLab::default()));
        let testbed = bridge.request_testbed("switch-lab", false).unwrap();

        let err = testbed.published_entity_spec::<SwitchSpec>("Router").unwrap_err();
        assert!(matches!(err, Error::TestbedResolution { ref key, .. } if key == "Router"));

        let err = testbed.published_entity_spec::<PortSpec>("Switch").unwrap_err();
        assert!(err.to_string().contains("not a PortSpec"));
    }

    #[test]
    fn shared_requests_reuse_one_publication() {
        let lab = Arc::new(SwitchLab::default());
        let bridge = TestbedBridge::new().with_provider(lab.clone());

        let a = bridge.request_testbed("switch-lab", true).unwrap();
        let b = bridge.request_testbed("switch-lab", true).unwrap();
        assert_eq!(a.id(), b.id());
        assert!(a.is_shared());
        assert_eq!(lab.publications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unshared_requests_are_isolated() {
        let lab = Arc::new(SwitchLab::default());
        let bridge = TestbedBridge::new().with_provider(lab.clone());

        let a = bridge.request_testbed("switch-lab", false).unwrap();
        let b = bridge.request_testbed("switch-lab", false).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(lab.publications.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn publication_failure_maps_to_resolution_error() {
        let bridge = TestbedBridge::new().with_provider(Arc::new(BrokenLab));
        let err = bridge.request_testbed("broken", true).unwrap_err();
        assert!(matches!(err, Error::TestbedResolution { ref reason, .. } if reason.contains("publication failed")));
    }

    #[test]
    fn concurrent_shared_requests_publish_once() {
        let lab = Arc::new(SwitchLab::default());
        let bridge = Arc::new(TestbedBridge::new().with_provider(lab.clone()));

        let ids: Vec<Uuid> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let bridge = Arc::clone(&bridge);
                    scope.spawn(move || bridge.request_testbed("switch-lab", true).unwrap().id())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(lab.publications.load(Ordering::SeqCst), 1);
    }
}
