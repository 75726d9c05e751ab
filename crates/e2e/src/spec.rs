//! Typed fixture specs and the per-run spec registry
//!
//! A spec is an immutable, typed bag of fixture parameters. Specs are
//! registered while a workflow builds its fixtures and are frozen behind an
//! `Arc` before the first step runs. Identity is the spec's Rust type plus an
//! optional logical tag.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use vflow_common::{Error, Result};

/// A declarative, typed fixture description.
pub trait Spec: Any + Send + Sync + fmt::Debug {
    /// Stable name of the spec type, used in errors and reports
    const KIND: &'static str;

    /// Check field constraints. Called once on registration.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Other specs this one refers to and that must be registered too
    fn references(&self) -> Vec<SpecRequirement> {
        Vec::new()
    }
}

/// A reference to a registered spec by type and optional tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecRequirement {
    type_id: TypeId,
    kind: &'static str,
    tag: Option<String>,
}

impl SpecRequirement {
    /// Require the (single) instance of `T`
    pub fn of<T: Spec>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            kind: T::KIND,
            tag: None,
        }
    }

    /// Require the instance of `T` registered under `tag`
    pub fn tagged<T: Spec>(tag: impl Into<String>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            kind: T::KIND,
            tag: Some(tag.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for SpecRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}#{}", self.kind, tag),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SpecKey {
    type_id: TypeId,
    tag: Option<String>,
}

struct SpecEntry {
    kind: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    references: Vec<SpecRequirement>,
}

/// The set of specs registered for one run
#[derive(Default)]
pub struct SpecRegistry {
    entries: HashMap<SpecKey, SpecEntry>,
    /// Registration order, for diagnostics
    order: Vec<SpecKey>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the untagged instance of a spec type.
    ///
    /// A second untagged instance of the same type is rejected with
    /// [`Error::DuplicateSpec`]; register it with [`SpecRegistry::add_tagged`]
    /// instead.
    pub fn add<T: Spec>(&mut self, spec: Arc<T>) -> Result<&mut Self> {
        self.insert(None, spec)?;
        Ok(self)
    }

    /// Register an instance of a spec type under a logical tag
    pub fn add_tagged<T: Spec>(&mut self, tag: impl Into<String>, spec: Arc<T>) -> Result<&mut Self> {
        self.insert(Some(tag.into()), spec)?;
        Ok(self)
    }

    fn insert<T: Spec>(&mut self, tag: Option<String>, spec: Arc<T>) -> Result<()> {
        let key = SpecKey {
            type_id: TypeId::of::<T>(),
            tag,
        };
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateSpec {
                kind: T::KIND.to_string(),
                tag: key.tag,
            });
        }

        spec.validate()?;

        debug!(kind = T::KIND, tag = ?key.tag, "Registered spec");
        let references = spec.references();
        self.entries.insert(
            key.clone(),
            SpecEntry {
                kind: T::KIND,
                value: spec,
                references,
            },
        );
        self.order.push(key);
        Ok(())
    }

    /// Get the unique instance of `T`.
    ///
    /// Falls back to a tagged instance when it is the only one of its type;
    /// several tagged instances without an untagged one are ambiguous.
    pub fn get<T: Spec>(&self) -> Result<Arc<T>> {
        let entry = self.resolve(TypeId::of::<T>(), T::KIND, None)?;
        downcast::<T>(entry)
    }

    /// Get the instance of `T` registered under `tag`
    pub fn get_tagged<T: Spec>(&self, tag: &str) -> Result<Arc<T>> {
        let entry = self.resolve(TypeId::of::<T>(), T::KIND, Some(tag))?;
        downcast::<T>(entry)
    }

    pub fn contains(&self, requirement: &SpecRequirement) -> bool {
        self.resolve(requirement.type_id, requirement.kind, requirement.tag.as_deref())
            .is_ok()
    }

    /// Definition-time validation: every requirement, and every reference
    /// declared by a registered spec, must resolve.
    pub fn check<'a>(&self, requirements: impl IntoIterator<Item = &'a SpecRequirement>) -> Result<()> {
        for requirement in requirements {
            self.require(requirement)?;
        }

        let declared = self.order.iter().filter_map(|key| self.entries.get(key)).flat_map(|e| e.references.iter());
        for requirement in declared {
            self.require(requirement)?;
        }
        Ok(())
    }

    fn require(&self, requirement: &SpecRequirement) -> Result<()> {
        self.resolve(requirement.type_id, requirement.kind, requirement.tag.as_deref())
            .map(|_| ())
    }

    /// Registered spec kinds in registration order
    pub fn kinds(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|key| {
                self.entries.get(key).map(|entry| match &key.tag {
                    Some(tag) => format!("{}#{}", entry.kind, tag),
                    None => entry.kind.to_string(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, type_id: TypeId, kind: &str, tag: Option<&str>) -> Result<&SpecEntry> {
        let key = SpecKey {
            type_id,
            tag: tag.map(str::to_string),
        };
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry);
        }

        if tag.is_none() {
            let mut same_type = self.entries.iter().filter(|(k, _)| k.type_id == type_id);
            if let Some((_, entry)) = same_type.next() {
                if same_type.next().is_some() {
                    return Err(Error::DuplicateSpec {
                        kind: kind.to_string(),
                        tag: None,
                    });
                }
                return Ok(entry);
            }
        }

        Err(Error::SpecNotFound {
            kind: kind.to_string(),
            tag: tag.map(str::to_string),
        })
    }
}

impl fmt::Debug for SpecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecRegistry").field("specs", &self.kinds()).finish()
    }
}

fn downcast<T: Spec>(entry: &SpecEntry) -> Result<Arc<T>> {
    Arc::clone(&entry.value)
        .downcast::<T>()
        .map_err(|_| Error::Internal(format!("spec entry for {} holds a different type", T::KIND)))
}
