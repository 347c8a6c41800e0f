//! Dependency registry.
//!
//! # Responsibilities
//! - Create the process's dependency set exactly once
//! - Look dependencies up by name
//! - Preserve creation order for logging and shutdown
//!
//! # Design Decisions
//! - Re-creating the set is a hard failure (`DuplicateInitialization`)
//! - The registry is only written during setup; later reads take no lock

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::LifecycleError;
use crate::health::dependency::Dependency;
use crate::health::readiness::ReadinessTracker;

#[derive(Debug)]
struct Entries {
    ordered: Vec<Arc<Dependency>>,
    by_name: HashMap<String, Arc<Dependency>>,
}

/// Owns the set of dependencies for a process.
#[derive(Debug)]
pub struct DependencyRegistry {
    entries: OnceLock<Entries>,
    /// Serializes `create` so the readiness counter is armed once.
    create_lock: Mutex<()>,
    readiness: Arc<ReadinessTracker>,
}

impl DependencyRegistry {
    pub fn new(readiness: Arc<ReadinessTracker>) -> Self {
        Self {
            entries: OnceLock::new(),
            create_lock: Mutex::new(()),
            readiness,
        }
    }

    /// Create the dependency set.
    ///
    /// An empty set is valid and makes the process ready immediately.
    pub fn create<I, S>(&self, names: I) -> Result<Vec<Arc<Dependency>>, LifecycleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _guard = self.create_lock.lock().expect("registry create mutex poisoned");
        if self.entries.get().is_some() {
            return Err(LifecycleError::DuplicateInitialization);
        }

        let mut ordered = Vec::new();
        let mut by_name = HashMap::new();
        for name in names {
            let name = name.into();
            if by_name.contains_key(&name) {
                return Err(LifecycleError::DuplicateDependency(name));
            }
            let dependency = Arc::new(Dependency::new(name.clone(), self.readiness.clone()));
            by_name.insert(name, dependency.clone());
            ordered.push(dependency);
        }

        let created = ordered.clone();
        self.readiness.arm(created.len());
        self.entries
            .set(Entries { ordered, by_name })
            .map_err(|_| LifecycleError::DuplicateInitialization)?;

        tracing::info!(
            count = created.len(),
            dependencies = ?self.names(),
            "Dependencies created"
        );

        self.readiness.check();
        Ok(created)
    }

    /// Look up a dependency by name.
    pub fn get(&self, name: &str) -> Result<Arc<Dependency>, LifecycleError> {
        self.entries
            .get()
            .and_then(|entries| entries.by_name.get(name))
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))
    }

    /// All dependencies in creation order. Empty before `create`.
    pub fn dependencies(&self) -> &[Arc<Dependency>] {
        self.entries
            .get()
            .map(|entries| entries.ordered.as_slice())
            .unwrap_or(&[])
    }

    pub fn names(&self) -> Vec<&str> {
        self.dependencies().iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.dependencies().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies().is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.entries.get().is_some()
    }
}
