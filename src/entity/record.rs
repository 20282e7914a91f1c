//! Row-backed entity instances.

use super::{timestamp, EntityClass, Relation};
use crate::event::{self, EventTag};
use crate::value::{Attributes, Value};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to an entity instance.
pub type EntityRef = Arc<Entity>;

/// One instance of an entity class.
///
/// The in-memory attributes may diverge from the persisted row until
/// `save` is called; `find` always reads the persisted row into a fresh
/// instance.
pub struct Entity {
    class: Arc<EntityClass>,
    state: RwLock<EntityState>,

    /// Set while a lifecycle event for this instance is being forwarded.
    hook_in_progress: AtomicBool,

    /// Has-many relations handed out so far, keyed by association name.
    relations: Mutex<HashMap<String, Arc<Relation>>>,
}

/// A persisted write whose events have not fired yet.
#[derive(Debug)]
pub(crate) enum Write {
    Created { id: i64 },
    Updated { id: i64, previous: Option<Attributes> },
}

struct EntityState {
    id: Option<i64>,
    attributes: Attributes,
    destroyed: bool,
}

fn label_for(class: &EntityClass, id: Option<i64>) -> String {
    match id {
        Some(id) => format!("{}#{}", class.name(), id),
        None => format!("{}#new", class.name()),
    }
}

impl Entity {
    pub(crate) fn new(class: Arc<EntityClass>, id: Option<i64>, attributes: Attributes) -> EntityRef {
        Arc::new(Self {
            class,
            state: RwLock::new(EntityState { id, attributes, destroyed: false }),
            hook_in_progress: AtomicBool::new(false),
            relations: Mutex::new(HashMap::new()),
        })
    }

    /// The entity's class.
    pub fn class(&self) -> &Arc<EntityClass> {
        &self.class
    }

    /// The persisted id, if any.
    pub fn id(&self) -> Option<i64> {
        self.state.read().id
    }

    /// Returns true once saved and not destroyed.
    pub fn is_persisted(&self) -> bool {
        let state = self.state.read();
        state.id.is_some() && !state.destroyed
    }

    /// Returns true after `destroy`.
    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    /// `Class#id`, or `Class#new` before the first save.
    pub fn label(&self) -> String {
        label_for(&self.class, self.id())
    }

    /// A snapshot of the in-memory attributes.
    pub fn attributes(&self) -> Attributes {
        self.state.read().attributes.clone()
    }

    /// The in-memory value of one attribute.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().attributes.get(key).cloned()
    }

    /// Returns true if the instance carries `key`.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.state.read().attributes.contains_key(key)
    }

    /// Returns true if both handles denote the same record: the same
    /// instance, or persisted instances of one class sharing an id.
    pub fn same_record(&self, other: &Entity) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b && self.class.name() == other.class.name(),
            _ => false,
        }
    }

    /// Returns true while a lifecycle event for this instance is forwarded.
    pub fn hook_in_progress(&self) -> bool {
        self.hook_in_progress.load(Ordering::Acquire)
    }

    /// Marks a hook as started; false if one was already running.
    pub(crate) fn enter_hook(&self) -> bool {
        !self.hook_in_progress.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn leave_hook(&self) {
        self.hook_in_progress.store(false, Ordering::Release);
    }

    pub(crate) fn cached_relation(
        &self,
        name: &str,
        make: impl FnOnce() -> Arc<Relation>,
    ) -> Arc<Relation> {
        let mut relations = self.relations.lock();
        Arc::clone(relations.entry(name.to_string()).or_insert_with(make))
    }

    /// Sets attributes in memory; unknown keys are rejected.
    pub fn assign(&self, attrs: Attributes) -> Result<()> {
        self.class.check_known(&attrs)?;
        self.state.write().attributes.extend(attrs);
        Ok(())
    }

    /// Validates and persists the in-memory state, then fires the
    /// lifecycle events of the write.
    ///
    /// A failing after-create or after-save handler undoes the write: a new
    /// row is deleted again and an existing row gets its previous contents
    /// back. After-create-commit fires only once those handlers succeed.
    pub fn save(self: &Arc<Self>) -> Result<()> {
        let write = self.persist()?;
        self.after_write(write)
    }

    /// Writes the row without firing events.
    pub(crate) fn persist(&self) -> Result<Write> {
        let repository = self.class.repository();
        let mut state = self.state.write();
        if state.destroyed {
            return Err(Error::host(format!(
                "can't save destroyed {}",
                label_for(&self.class, state.id)
            )));
        }
        self.class.validate(&state.attributes)?;

        let now = Value::Int(timestamp());
        state.attributes.insert("updated_at".to_string(), now.clone());
        let write = match state.id {
            Some(id) => {
                let previous = repository.load(self.class.name(), id)?;
                repository.update(self.class.name(), id, &state.attributes)?;
                Write::Updated { id, previous }
            }
            None => {
                state.attributes.insert("created_at".to_string(), now);
                let id = repository.insert(self.class.name(), &state.attributes)?;
                state.id = Some(id);
                Write::Created { id }
            }
        };
        log::debug!("Saved {} ({:?})", label_for(&self.class, state.id), write);
        Ok(write)
    }

    /// Fires the events of a write made by `persist`.
    pub(crate) fn after_write(self: &Arc<Self>, write: Write) -> Result<()> {
        let created = matches!(write, Write::Created { .. });
        let fired = if created {
            event::fire(self, EventTag::AfterCreate)
                .and_then(|()| event::fire(self, EventTag::AfterSave))
        } else {
            event::fire(self, EventTag::AfterSave)
        };
        if let Err(err) = fired {
            self.roll_back(write);
            return Err(err);
        }
        if created {
            event::fire(self, EventTag::AfterCreateCommit)?;
        }
        Ok(())
    }

    fn roll_back(&self, write: Write) {
        let repository = self.class.repository();
        let mut state = self.state.write();
        let label = label_for(&self.class, state.id);
        let undone = match write {
            Write::Created { id } => {
                state.id = None;
                state.attributes.remove("created_at");
                repository.delete(self.class.name(), id).map(|_| ())
            }
            Write::Updated { id, previous: Some(row) } => {
                repository.update(self.class.name(), id, &row)
            }
            Write::Updated { previous: None, .. } => Ok(()),
        };
        match undone {
            Ok(()) => log::debug!("Rolled back write of {}", label),
            Err(e) => log::warn!("Rolling back {} failed: {}", label, e),
        }
    }

    /// Assigns `attrs` and saves.
    pub fn update(self: &Arc<Self>, attrs: Attributes) -> Result<()> {
        self.assign(attrs)?;
        self.save()
    }

    /// Bumps `updated_at` on the persisted row and fires after-touch.
    pub fn touch(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write();
            let id = match state.id {
                Some(id) if !state.destroyed => id,
                _ => {
                    return Err(Error::host(format!(
                        "can't touch unpersisted {}",
                        label_for(&self.class, state.id)
                    )))
                }
            };
            state.attributes.insert("updated_at".to_string(), Value::Int(timestamp()));
            self.class.repository().update(self.class.name(), id, &state.attributes)?;
        }
        event::fire(self, EventTag::AfterTouch)
    }

    /// Removes the persisted row and marks the instance destroyed.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.write();
        if let Some(id) = state.id {
            if !self.class.repository().delete(self.class.name(), id)? {
                log::debug!("{} was already gone", label_for(&self.class, state.id));
            }
        }
        state.destroyed = true;
        Ok(())
    }

    /// Replaces the in-memory attributes with the persisted row.
    pub fn reload(&self) -> Result<()> {
        let mut state = self.state.write();
        let id = state
            .id
            .ok_or_else(|| Error::host(format!("can't reload new {}", self.class.name())))?;
        let row = self
            .class
            .repository()
            .load(self.class.name(), id)?
            .ok_or_else(|| Error::RecordNotFound { class: self.class.name().to_string(), id })?;
        state.attributes = self.class.with_defaults(row);
        self.relations.lock().clear();
        Ok(())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}>", self.label())
    }
}

#[cfg(test)]
mod tests {
    use crate::entity::{ClassBuilder, Registry};
    use crate::event::{EventRecord, EventSink, EventTag};
    use crate::value::{attrs, Value};
    use crate::{Error, Result};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_save_then_find_reads_persisted_row() {
        let registry = Registry::in_memory();
        let class = registry
            .register(ClassBuilder::new("Note").uses_bridge().columns(&["body"]))
            .unwrap();

        let note = class.create(attrs(json!({"body": "first"}))).unwrap();
        let id = note.id().unwrap();
        assert!(note.get("created_at").is_some_and(|v| !v.is_null()));

        note.assign(attrs(json!({"body": "draft"}))).unwrap();
        assert_eq!(class.find(id).unwrap().get("body"), Some(Value::from("first")));

        note.save().unwrap();
        assert_eq!(class.find(id).unwrap().get("body"), Some(Value::from("draft")));
    }

    #[test]
    fn test_destroy_removes_row() {
        let registry = Registry::in_memory();
        let class = registry.register(ClassBuilder::new("Note").columns(&["body"])).unwrap();
        let note = class.create(attrs(json!({"body": "x"}))).unwrap();
        let id = note.id().unwrap();

        note.destroy().unwrap();
        assert!(note.is_destroyed());
        assert!(matches!(class.find(id), Err(Error::RecordNotFound { .. })));
        assert!(note.save().is_err());
    }

    #[test]
    fn test_touch_requires_persisted_instance() {
        let registry = Registry::in_memory();
        let class = registry.register(ClassBuilder::new("Note").columns(&["body"])).unwrap();
        let note = class.build(attrs(json!({"body": "x"}))).unwrap();
        assert!(note.touch().is_err());
        note.save().unwrap();
        assert!(note.touch().is_ok());
    }

    #[test]
    fn test_same_record() {
        let registry = Registry::in_memory();
        let class = registry.register(ClassBuilder::new("Note").columns(&["body"])).unwrap();
        let note = class.create(attrs(json!({"body": "x"}))).unwrap();
        let again = class.find(note.id().unwrap()).unwrap();
        assert!(note.same_record(&again));

        let fresh = class.build(attrs(json!({"body": "x"}))).unwrap();
        assert!(!fresh.same_record(&note));
        assert!(fresh.same_record(&fresh));
    }

    struct Rejecting;

    impl EventSink for Rejecting {
        fn dispatch(&self, record: &EventRecord) -> Result<()> {
            match record.tag {
                EventTag::AfterSave => Err(Error::script("rejected")),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_failed_hook_undoes_create() {
        let registry = Registry::in_memory();
        let class = registry
            .register(ClassBuilder::new("Note").uses_bridge().columns(&["body"]))
            .unwrap();
        registry.set_event_sink(Some(Arc::new(Rejecting)));

        let note = class.build(attrs(json!({"body": "x"}))).unwrap();
        assert_eq!(note.save().unwrap_err(), Error::script("rejected"));
        assert_eq!(note.id(), None);
        assert!(class.all().entities().unwrap().is_empty());
    }

    #[test]
    fn test_failed_hook_restores_previous_row() {
        let registry = Registry::in_memory();
        let class = registry
            .register(ClassBuilder::new("Note").uses_bridge().columns(&["body"]))
            .unwrap();
        let note = class.create(attrs(json!({"body": "kept"}))).unwrap();
        let id = note.id().unwrap();

        registry.set_event_sink(Some(Arc::new(Rejecting)));
        assert!(note.update(attrs(json!({"body": "dropped"}))).is_err());
        assert_eq!(note.id(), Some(id));
        assert_eq!(class.find(id).unwrap().get("body"), Some(Value::from("kept")));
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let registry = Registry::in_memory();
        let class = registry.register(ClassBuilder::new("Note").columns(&["body"])).unwrap();
        let note = class.create(attrs(json!({"body": "kept"}))).unwrap();
        note.assign(attrs(json!({"body": "dropped"}))).unwrap();
        note.reload().unwrap();
        assert_eq!(note.get("body"), Some(Value::from("kept")));
    }
}
