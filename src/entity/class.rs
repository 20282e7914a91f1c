//! Entity classes and their builder.

use super::{singularize, Entity, EntityRef, Registry, Relation};
use crate::store::Repository;
use crate::value::{Attributes, Value};
use crate::{Error, Result};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

/// Custom attribute reader, consulted before any stored column.
pub type Getter = Arc<dyn Fn(&EntityRef) -> Result<Value> + Send + Sync>;

/// Named host method on an entity.
pub type Method = Arc<dyn Fn(&EntityRef, &[Value]) -> Result<Value> + Send + Sync>;

/// Attribute filter applied before create, build, update and friends.
pub type Sanitizer = Arc<dyn Fn(Attributes) -> Attributes + Send + Sync>;

/// Record validation; `Err` carries a human readable message.
pub type Validator = Arc<dyn Fn(&Attributes) -> std::result::Result<(), String> + Send + Sync>;

/// Replacement for the default create or find-or-create behaviour.
pub type CreateHook = Arc<dyn Fn(&Arc<EntityClass>, Attributes) -> Result<EntityRef> + Send + Sync>;

/// Callback run once when a bridge-enabled class is registered.
pub type SetupHook = Arc<dyn Fn(&EntityClass) + Send + Sync>;

/// A declared column and its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Value assigned to new instances.
    pub default: Value,
}

/// How an association finds its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// This entity holds the target's id in `foreign_key`.
    BelongsTo {
        /// Column on this class.
        foreign_key: String,
    },
    /// Targets hold this entity's id in `foreign_key`.
    HasMany {
        /// Column on the target class.
        foreign_key: String,
    },
}

/// A declared relationship to another entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Attribute name the association is read under.
    pub name: String,
    /// Name of the target entity class.
    pub target: String,
    /// Lookup strategy.
    pub kind: AssociationKind,
}

/// Builder for an `EntityClass`, consumed by `Registry::register`.
pub struct ClassBuilder {
    name: String,
    uses_bridge: bool,
    columns: Vec<Column>,
    tag_types: Vec<String>,
    associations: Vec<Association>,
    getters: HashMap<String, Getter>,
    methods: HashMap<String, Method>,
    validators: Vec<Validator>,
    sanitizer: Option<Sanitizer>,
    create_hook: Option<CreateHook>,
    find_or_create_hook: Option<CreateHook>,
    whitelist: BTreeSet<String>,
    procedures: BTreeSet<String>,
    on_use: Option<SetupHook>,
    repository: Option<Arc<dyn Repository>>,
}

impl ClassBuilder {
    /// Starts a class definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uses_bridge: false,
            columns: Vec::new(),
            tag_types: Vec::new(),
            associations: Vec::new(),
            getters: HashMap::new(),
            methods: HashMap::new(),
            validators: Vec::new(),
            sanitizer: None,
            create_hook: None,
            find_or_create_hook: None,
            whitelist: BTreeSet::new(),
            procedures: BTreeSet::new(),
            on_use: None,
            repository: None,
        }
    }

    /// The class name being defined.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opts the class into the bridge.
    pub fn uses_bridge(mut self) -> Self {
        self.uses_bridge = true;
        self
    }

    /// Declares a column with a default value.
    pub fn column(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let name = name.into();
        self.columns.retain(|c| c.name != name);
        self.columns.push(Column { name, default: default.into() });
        self
    }

    /// Declares columns defaulting to nil.
    pub fn columns(mut self, names: &[&str]) -> Self {
        for name in names {
            self = self.column(*name, Value::Null);
        }
        self
    }

    /// Declares a tag type (plural, e.g. `tags`); stored in `<singular>_list`.
    pub fn tag_type(mut self, plural: impl Into<String>) -> Self {
        let plural = plural.into();
        let list_column = format!("{}_list", singularize(&plural));
        self.tag_types.push(plural);
        self.column(list_column, Value::List(Vec::new()))
    }

    /// Declares an attached-file slot and its companion columns.
    pub fn attachment(self, slot: &str) -> Self {
        self.column(format!("{}_file_name", slot), Value::Null)
            .column(format!("{}_content_type", slot), Value::Null)
            .column(format!("{}_file_size", slot), Value::Null)
    }

    /// Declares a belongs-to association read through `foreign_key`.
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let foreign_key = foreign_key.into();
        self.associations.push(Association {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::BelongsTo { foreign_key: foreign_key.clone() },
        });
        if self.columns.iter().any(|c| c.name == foreign_key) {
            self
        } else {
            self.column(foreign_key, Value::Null)
        }
    }

    /// Declares a has-many association; `foreign_key` lives on the target.
    pub fn has_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(Association {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::HasMany { foreign_key: foreign_key.into() },
        });
        self
    }

    /// Registers a custom reader for `name`.
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&EntityRef) -> Result<Value> + Send + Sync + 'static,
    {
        self.getters.insert(name.into(), Arc::new(getter));
        self
    }

    /// Registers a host method. Methods are invisible to scripts unless
    /// whitelisted or exposed as procedures.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&EntityRef, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Adds `name` to the whitelist of readable host methods.
    pub fn expose(mut self, name: impl Into<String>) -> Self {
        self.whitelist.insert(name.into());
        self
    }

    /// Registers a host method and exposes it as a callable procedure.
    pub fn procedure<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&EntityRef, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.procedures.insert(name.clone());
        self.method(name, method)
    }

    /// Adds a validator.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Attributes) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Requires `name` to be present (non-nil, non-empty).
    pub fn require(self, name: &str) -> Self {
        let column = name.to_string();
        self.validate(move |attrs| match attrs.get(&column) {
            None | Some(Value::Null) => Err(format!("{} can't be blank", column)),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err(format!("{} can't be blank", column))
            }
            _ => Ok(()),
        })
    }

    /// Overrides the attribute sanitizer (identity by default).
    pub fn sanitize_with<F>(mut self, sanitizer: F) -> Self
    where
        F: Fn(Attributes) -> Attributes + Send + Sync + 'static,
    {
        self.sanitizer = Some(Arc::new(sanitizer));
        self
    }

    /// Overrides create.
    pub fn on_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<EntityClass>, Attributes) -> Result<EntityRef> + Send + Sync + 'static,
    {
        self.create_hook = Some(Arc::new(hook));
        self
    }

    /// Overrides find-or-create.
    pub fn on_find_or_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<EntityClass>, Attributes) -> Result<EntityRef> + Send + Sync + 'static,
    {
        self.find_or_create_hook = Some(Arc::new(hook));
        self
    }

    /// Callback run at registration when the class uses the bridge.
    pub fn on_use_bridge<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EntityClass) + Send + Sync + 'static,
    {
        self.on_use = Some(Arc::new(hook));
        self
    }

    /// Stores this class in `repository` instead of the registry's default.
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub(crate) fn build(
        self,
        registry: Weak<Registry>,
        default_repository: Arc<dyn Repository>,
    ) -> EntityClass {
        let mut columns = self.columns;
        for stamp in ["created_at", "updated_at"] {
            if !columns.iter().any(|c| c.name == stamp) {
                columns.push(Column { name: stamp.to_string(), default: Value::Null });
            }
        }

        EntityClass {
            name: self.name,
            uses_bridge: self.uses_bridge,
            columns,
            tag_types: self.tag_types,
            associations: self.associations,
            getters: self.getters,
            methods: self.methods,
            validators: self.validators,
            sanitizer: self.sanitizer,
            create_hook: self.create_hook,
            find_or_create_hook: self.find_or_create_hook,
            whitelist: RwLock::new(self.whitelist),
            procedures: RwLock::new(self.procedures),
            on_use: self.on_use,
            repository: self.repository.unwrap_or(default_repository),
            registry,
            write_lock: ReentrantMutex::new(()),
        }
    }
}

/// A registered entity class.
///
/// Fixed at registration time, except for the whitelist and procedure sets
/// which host code may extend afterwards.
pub struct EntityClass {
    name: String,
    uses_bridge: bool,
    columns: Vec<Column>,
    tag_types: Vec<String>,
    associations: Vec<Association>,
    getters: HashMap<String, Getter>,
    methods: HashMap<String, Method>,
    validators: Vec<Validator>,
    sanitizer: Option<Sanitizer>,
    create_hook: Option<CreateHook>,
    find_or_create_hook: Option<CreateHook>,
    whitelist: RwLock<BTreeSet<String>>,
    procedures: RwLock<BTreeSet<String>>,
    on_use: Option<SetupHook>,
    repository: Arc<dyn Repository>,
    registry: Weak<Registry>,

    /// Serializes find-or-create; reentrant so lifecycle handlers may call
    /// back into the same class.
    write_lock: ReentrantMutex<()>,
}

impl EntityClass {
    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The capability flag.
    pub fn uses_bridge(&self) -> bool {
        self.uses_bridge
    }

    /// Declared columns, timestamps included.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns true if `name` is a declared column.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Default of a declared column; `Null` for unknown names.
    pub fn column_default(&self, name: &str) -> Value {
        self.columns.iter().find(|c| c.name == name).map(|c| c.default.clone()).unwrap_or_default()
    }

    /// Declared tag types (plural).
    pub fn tag_types(&self) -> &[String] {
        &self.tag_types
    }

    /// The association declared under `name`.
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// The custom reader registered for `name`.
    pub fn getter(&self, name: &str) -> Option<&Getter> {
        self.getters.get(name)
    }

    /// The host method registered under `name`.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Whitelists a host method for attribute reads.
    pub fn expose(&self, name: impl Into<String>) {
        self.whitelist.write().insert(name.into());
    }

    /// Returns true if `name` is whitelisted.
    pub fn is_exposed(&self, name: &str) -> bool {
        self.whitelist.read().contains(name)
    }

    /// Exposes a registered host method as a callable procedure.
    pub fn expose_procedure(&self, name: impl Into<String>) {
        self.procedures.write().insert(name.into());
    }

    /// Returns true if `name` is an exposed procedure.
    pub fn is_procedure(&self, name: &str) -> bool {
        self.procedures.read().contains(name)
    }

    /// The repository backing this class.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// The registry this class belongs to, while it is alive.
    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }

    /// Resolves the target class of an association.
    pub fn association_target(&self, association: &Association) -> Result<Arc<EntityClass>> {
        self.registry()
            .and_then(|registry| registry.find(&association.target))
            .ok_or_else(|| {
                Error::host(format!(
                    "{}.{} refers to unknown entity type {}",
                    self.name, association.name, association.target
                ))
            })
    }

    /// Runs the class sanitizer over `attrs`.
    pub fn sanitize(&self, attrs: Attributes) -> Attributes {
        match &self.sanitizer {
            Some(sanitizer) => sanitizer(attrs),
            None => attrs,
        }
    }

    /// Runs every validator, failing with all messages joined.
    pub fn validate(&self, attrs: &Attributes) -> Result<()> {
        let messages: Vec<String> =
            self.validators.iter().filter_map(|validator| validator(attrs).err()).collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(Error::host(format!("Validation failed: {}", messages.join(", "))))
        }
    }

    pub(crate) fn check_known(&self, attrs: &Attributes) -> Result<()> {
        match attrs.keys().find(|key| !self.has_column(key)) {
            Some(key) => {
                Err(Error::host(format!("unknown attribute '{}' for {}", key, self.name)))
            }
            None => Ok(()),
        }
    }

    pub(crate) fn with_defaults(&self, mut row: Attributes) -> Attributes {
        for column in &self.columns {
            row.entry(column.name.clone()).or_insert_with(|| column.default.clone());
        }
        row
    }

    pub(crate) fn run_setup(&self) {
        if let Some(hook) = &self.on_use {
            hook(self);
        }
    }

    /// Constructs an unpersisted instance with column defaults applied.
    pub fn build(self: &Arc<Self>, attrs: Attributes) -> Result<EntityRef> {
        self.check_known(&attrs)?;
        let mut attributes = self.with_defaults(Attributes::new());
        attributes.extend(attrs);
        Ok(Entity::new(Arc::clone(self), None, attributes))
    }

    /// Constructs and persists an instance; fails on validation errors.
    pub fn create(self: &Arc<Self>, attrs: Attributes) -> Result<EntityRef> {
        if let Some(hook) = &self.create_hook {
            return hook(self, attrs);
        }
        let entity = self.build(attrs)?;
        entity.save()?;
        Ok(entity)
    }

    /// Loads the persisted instance with `id`.
    pub fn find(self: &Arc<Self>, id: i64) -> Result<EntityRef> {
        let row = self
            .repository
            .load(&self.name, id)?
            .ok_or_else(|| Error::RecordNotFound { class: self.name.clone(), id })?;
        Ok(self.instantiate(id, row))
    }

    /// Returns the first persisted instance matching every pair in `attrs`,
    /// creating one when none matches.
    ///
    /// Matching and inserting happen under the class lock; lifecycle events
    /// of a new row fire after it is released, so a handler may call back
    /// into this class from another thread. A create override runs under
    /// the lock.
    pub fn find_or_create(self: &Arc<Self>, attrs: Attributes) -> Result<EntityRef> {
        if let Some(hook) = &self.find_or_create_hook {
            return hook(self, attrs);
        }
        self.check_known(&attrs)?;

        let (entity, write) = {
            let _guard = self.write_lock.lock();
            for (id, row) in self.repository.scan(&self.name)? {
                if attrs.iter().all(|(key, value)| row.get(key) == Some(value)) {
                    return Ok(self.instantiate(id, row));
                }
            }
            if let Some(hook) = &self.create_hook {
                return hook(self, attrs);
            }
            let entity = self.build(attrs)?;
            let write = entity.persist()?;
            (entity, write)
        };
        entity.after_write(write)?;
        Ok(entity)
    }

    /// Every persisted instance, lazily loaded.
    pub fn all(self: &Arc<Self>) -> Arc<Relation> {
        Relation::new(Arc::clone(self), None)
    }

    /// Persisted instances whose `key` equals `value`, lazily loaded.
    pub fn where_eq(self: &Arc<Self>, key: impl Into<String>, value: Value) -> Arc<Relation> {
        Relation::new(Arc::clone(self), Some((key.into(), value)))
    }

    pub(crate) fn instantiate(self: &Arc<Self>, id: i64, row: Attributes) -> EntityRef {
        Entity::new(Arc::clone(self), Some(id), self.with_defaults(row))
    }
}

impl fmt::Debug for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityClass")
            .field("name", &self.name)
            .field("uses_bridge", &self.uses_bridge)
            .field("columns", &self.columns)
            .field("tag_types", &self.tag_types)
            .field("associations", &self.associations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::attrs;
    use serde_json::json;

    fn gadget_registry() -> (Arc<Registry>, Arc<EntityClass>) {
        let registry = Registry::in_memory();
        let class = registry
            .register(
                ClassBuilder::new("Gadget")
                    .uses_bridge()
                    .column("name", Value::Null)
                    .column("color", "grey")
                    .tag_type("tags")
                    .attachment("manual")
                    .require("name"),
            )
            .unwrap();
        (registry, class)
    }

    #[test]
    fn test_builder_declares_columns() {
        let (_registry, class) = gadget_registry();
        for column in ["name", "color", "tag_list", "manual_file_name", "created_at", "updated_at"]
        {
            assert!(class.has_column(column), "missing {}", column);
        }
        assert_eq!(class.column_default("color"), Value::from("grey"));
        assert_eq!(class.column_default("nope"), Value::Null);
        assert_eq!(class.tag_types(), &["tags".to_string()]);
    }

    #[test]
    fn test_build_applies_defaults() {
        let (_registry, class) = gadget_registry();
        let gadget = class.build(attrs(json!({"name": "lever"}))).unwrap();
        assert!(!gadget.is_persisted());
        assert_eq!(gadget.get("color"), Some(Value::from("grey")));
        assert_eq!(gadget.get("tag_list"), Some(Value::List(vec![])));
    }

    #[test]
    fn test_build_rejects_unknown_attribute() {
        let (_registry, class) = gadget_registry();
        let err = class.build(attrs(json!({"ghost": 1}))).unwrap_err();
        assert!(matches!(err, Error::HostOperationFailed(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_create_validates() {
        let (_registry, class) = gadget_registry();
        let err = class.create(attrs(json!({"color": "red"}))).unwrap_err();
        assert_eq!(
            err,
            Error::HostOperationFailed("Validation failed: name can't be blank".into())
        );
        assert_eq!(class.all().len().unwrap(), 0);
    }

    #[test]
    fn test_find_or_create_reuses_match() {
        let (_registry, class) = gadget_registry();
        let first = class.find_or_create(attrs(json!({"name": "cog"}))).unwrap();
        let second = class.find_or_create(attrs(json!({"name": "cog"}))).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(class.all().len().unwrap(), 1);
    }

    #[test]
    fn test_exposure_sets_are_extendable() {
        let (_registry, class) = gadget_registry();
        assert!(!class.is_exposed("label"));
        class.expose("label");
        assert!(class.is_exposed("label"));

        assert!(!class.is_procedure("spin"));
        class.expose_procedure("spin");
        assert!(class.is_procedure("spin"));
    }
}
