//! The descendant-lookup index of entity classes.

use super::{ClassBuilder, EntityClass};
use crate::event::EventSink;
use crate::store::{MemoryStore, Repository};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Indexes entity classes by name and owns the shared event sink.
///
/// Classes are registered once during setup and read from then on.
pub struct Registry {
    classes: RwLock<HashMap<String, Arc<EntityClass>>>,
    repository: Arc<dyn Repository>,
    event_sink: RwLock<Option<Arc<dyn EventSink>>>,
}

impl Registry {
    /// Creates an empty registry whose classes default to `repository`.
    pub fn new(repository: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self {
            classes: RwLock::new(HashMap::new()),
            repository,
            event_sink: RwLock::new(None),
        })
    }

    /// Creates an empty registry backed by a fresh `MemoryStore`.
    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Registers a class. Bridge-enabled classes run their setup callback.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a class with the same name exists.
    pub fn register(self: &Arc<Self>, builder: ClassBuilder) -> Result<Arc<EntityClass>> {
        let class = {
            let mut classes = self.classes.write();
            if classes.contains_key(builder.name()) {
                return Err(Error::invalid_argument(format!(
                    "entity class {} is already registered",
                    builder.name()
                )));
            }
            let class =
                Arc::new(builder.build(Arc::downgrade(self), Arc::clone(&self.repository)));
            classes.insert(class.name().to_string(), Arc::clone(&class));
            class
        };

        if class.uses_bridge() {
            class.run_setup();
            log::info!("Entity class {} registered with the bridge", class.name());
        } else {
            log::debug!("Entity class {} registered", class.name());
        }
        Ok(class)
    }

    /// Looks a class up by exact name.
    pub fn find(&self, name: &str) -> Option<Arc<EntityClass>> {
        self.classes.read().get(name).cloned()
    }

    /// All registered classes, sorted by name.
    pub fn classes(&self) -> Vec<Arc<EntityClass>> {
        let mut classes: Vec<_> = self.classes.read().values().cloned().collect();
        classes.sort_by(|a, b| a.name().cmp(b.name()));
        classes
    }

    /// The default repository.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Installs (or removes) the sink lifecycle events are forwarded to.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.event_sink.write() = sink;
    }

    /// The installed event sink.
    pub fn event_sink(&self) -> Option<Arc<dyn EventSink>> {
        self.event_sink.read().clone()
    }
}
