//! Component type registration and instances.
//!
//! A component type is described once as a [`ComponentDef`]: a stable name,
//! a factory producing the default field map, and optional attach/detach
//! hooks. Registration in a [`ComponentRegistry`] yields the
//! [`ComponentTypeId`] used everywhere else (indices, queries, instances).
//!
//! Instances are dynamic records: a `serde_json` field map stamped with the
//! owning entity and the type it was created from.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::EntityId;

/// Field storage for component instances and entity spec fields.
pub type Fields = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentDef
// ---------------------------------------------------------------------------

type Factory = Arc<dyn Fn() -> Value>;
type LifecycleHook = Arc<dyn Fn(EntityId, &mut Fields)>;

/// Descriptor for a component type: stable name, default-value factory, and
/// optional lifecycle hooks.
///
/// The factory is expected to return a JSON object; any other value yields
/// an empty field map.
pub struct ComponentDef {
    name: String,
    factory: Factory,
    on_attach: Option<LifecycleHook>,
    on_detach: Option<LifecycleHook>,
}

impl ComponentDef {
    /// Describe a component type with the given stable name and factory.
    pub fn new(name: impl Into<String>, factory: impl Fn() -> Value + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            on_attach: None,
            on_detach: None,
        }
    }

    /// Run `hook` with the owning entity and the instance fields right
    /// before a fresh instance is stored.
    pub fn on_attach(mut self, hook: impl Fn(EntityId, &mut Fields) + 'static) -> Self {
        self.on_attach = Some(Arc::new(hook));
        self
    }

    /// Run `hook` right before an instance is detached from its entity.
    pub fn on_detach(mut self, hook: impl Fn(EntityId, &mut Fields) + 'static) -> Self {
        self.on_detach = Some(Arc::new(hook));
        self
    }

    /// The stable type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Produce a fresh default field map from the factory.
    pub(crate) fn instantiate(&self) -> Fields {
        match (self.factory)() {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    pub(crate) fn attach_hook(&self) -> Option<LifecycleHook> {
        self.on_attach.clone()
    }

    pub(crate) fn detach_hook(&self) -> Option<LifecycleHook> {
        self.on_detach.clone()
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("on_attach", &self.on_attach.is_some())
            .field("on_detach", &self.on_detach.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping component names to [`ComponentTypeId`]s and their
/// descriptors.
///
/// A name can only be registered once; re-registering it returns the
/// existing id and keeps the original descriptor.
#[derive(Debug)]
pub struct ComponentRegistry {
    by_name: HashMap<String, ComponentTypeId>,
    defs: Vec<ComponentDef>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            defs: Vec::new(),
        }
    }

    /// Register a component descriptor, returning its id.
    pub fn register(&mut self, def: ComponentDef) -> ComponentTypeId {
        if let Some(&existing) = self.by_name.get(def.name()) {
            return existing;
        }
        let id = ComponentTypeId(self.defs.len() as u32);
        self.by_name.insert(def.name().to_owned(), id);
        self.defs.push(def);
        id
    }

    /// Look up a component type by its registered name.
    pub fn lookup(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// The descriptor for a registered id.
    pub fn get(&self, id: ComponentTypeId) -> Option<&ComponentDef> {
        self.defs.get(id.0 as usize)
    }

    /// The registered name for an id.
    pub fn name_of(&self, id: ComponentTypeId) -> Option<&str> {
        self.defs.get(id.0 as usize).map(ComponentDef::name)
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ComponentInstance
// ---------------------------------------------------------------------------

/// One component attached to one entity.
///
/// Carries a back-reference to the owning entity and the name of the type it
/// was instantiated from, so reverse lookups never need the registry.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    pub(crate) parent: EntityId,
    pub(crate) type_id: ComponentTypeId,
    pub(crate) type_name: String,
    pub(crate) fields: Fields,
}

impl ComponentInstance {
    /// The entity this instance is attached to.
    pub fn parent(&self) -> EntityId {
        self.parent
    }

    /// The id of the type this instance was created from.
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// The stable name of the type this instance was created from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read a single field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Overwrite (or insert) a single field.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// All fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Mutable access to all fields.
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register(ComponentDef::new("position", || json!({ "x": 0.0, "y": 0.0 })));
        assert_eq!(reg.lookup("position"), Some(id));
        assert_eq!(reg.name_of(id), Some("position"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn same_name_same_id() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register(ComponentDef::new("health", || json!({ "hp": 10 })));
        let b = reg.register(ComponentDef::new("health", || json!({ "hp": 99 })));
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        // The original descriptor wins.
        assert_eq!(reg.get(a).unwrap().instantiate()["hp"], json!(10));
    }

    #[test]
    fn different_names_different_ids() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register(ComponentDef::new("position", || json!({})));
        let v = reg.register(ComponentDef::new("velocity", || json!({})));
        assert_ne!(p, v);
    }

    #[test]
    fn non_object_factory_yields_empty_fields() {
        let def = ComponentDef::new("marker", || json!(42));
        assert!(def.instantiate().is_empty());
    }

    #[test]
    fn registered_names_sorted() {
        let mut reg = ComponentRegistry::new();
        reg.register(ComponentDef::new("velocity", || json!({})));
        reg.register(ComponentDef::new("position", || json!({})));
        assert_eq!(reg.registered_names(), vec!["position", "velocity"]);
    }
}
