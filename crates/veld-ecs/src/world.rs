//! The [`World`] is the top-level container for the kernel. It owns the id
//! allocator, the component registry, every entity record, the reverse
//! index, the query cache, and the logical clock.
//!
//! Index invariants maintained here:
//!
//! - At most one live entity per id; at most one instance of a component
//!   type per entity.
//! - An entity's slot map always points at the instance's actual position in
//!   its component sequence, including after removal-induced compaction.
//! - The reverse index for a type holds exactly the ids whose slot map has
//!   an entry for that type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::component::{
    ComponentDef, ComponentInstance, ComponentRegistry, ComponentTypeId, Fields,
};
use crate::entity::{EntityId, IdAllocator, IdGenerator};
use crate::query::QueryCache;
use crate::time::TimeState;
use crate::WorldError;

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// One live entity: its ordered component sequence, the per-entity slot map
/// (type -> position in the sequence), an optional tag, and the
/// caller-supplied fields merged in at creation.
#[derive(Debug)]
pub struct EntityRecord {
    id: EntityId,
    components: Vec<ComponentInstance>,
    slots: HashMap<ComponentTypeId, usize>,
    tag: Option<String>,
    fields: Fields,
}

impl EntityRecord {
    /// The entity's id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The ordered component sequence.
    pub fn components(&self) -> &[ComponentInstance] {
        &self.components
    }

    /// Whether the entity holds an instance of `ty`.
    pub fn has(&self, ty: ComponentTypeId) -> bool {
        self.slots.contains_key(&ty)
    }

    /// Position of `ty` within the component sequence, if attached.
    pub fn slot_of(&self, ty: ComponentTypeId) -> Option<usize> {
        self.slots.get(&ty).copied()
    }

    /// Number of slot-map entries (equals the number of attached components).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The entity's tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Caller-supplied fields from creation.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Mutable access to the caller-supplied fields.
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }
}

// ---------------------------------------------------------------------------
// Spawn hooks
// ---------------------------------------------------------------------------

type SpawnHook = Box<dyn FnMut(&EntityRecord)>;

/// Handle returned by [`World::on_spawn`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The world: entity storage, indices, query cache, and clock, all behind
/// one struct with no global state.
pub struct World {
    pub(crate) registry: ComponentRegistry,
    allocator: IdAllocator,
    /// Ordered by id so query scans are deterministic.
    pub(crate) entities: BTreeMap<EntityId, EntityRecord>,
    /// Component type -> ids of entities holding it.
    reverse: HashMap<ComponentTypeId, Vec<EntityId>>,
    pub(crate) queries: QueryCache,
    spawn_hooks: Vec<(u64, SpawnHook)>,
    next_hook: u64,
    /// Logical clock, driven by the scheduler.
    pub time: TimeState,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entities.len())
            .field("component_types", &self.registry.len())
            .field("cached_queries", &self.queries.cached_len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            allocator: IdAllocator::new(),
            entities: BTreeMap::new(),
            reverse: HashMap::new(),
            queries: QueryCache::new(),
            spawn_hooks: Vec::new(),
            next_hook: 0,
            time: TimeState::new(),
        }
    }

    /// Register a component type. Re-registering a name returns the
    /// existing id.
    pub fn register_component(&mut self, def: ComponentDef) -> ComponentTypeId {
        self.registry.register(def)
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Replace the built-in id counter with a caller-supplied generator.
    pub fn set_id_generator(&mut self, generator: Box<dyn IdGenerator>) {
        self.allocator.set_generator(generator);
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn an entity with no fields.
    pub fn spawn(&mut self) -> EntityId {
        self.spawn_with(Fields::new())
    }

    /// Spawn an entity carrying the given caller-supplied fields.
    pub fn spawn_with(&mut self, fields: Fields) -> EntityId {
        let id = self.allocator.allocate();
        self.insert_record(id, fields)
    }

    /// Spawn an entity under a specific id.
    ///
    /// If the id is already occupied, the occupant is first relocated to a
    /// freshly allocated id: its component sequence, slot map, tag, and
    /// fields move intact, its instances' parent stamps and reverse-index
    /// entries are rewritten to the new id, and every query depending on one
    /// of its component types or its tag is invalidated. The new entity then
    /// takes the requested id.
    pub fn spawn_at(&mut self, id: EntityId, fields: Fields) -> EntityId {
        if self.entities.contains_key(&id) {
            self.relocate(id);
        }
        self.allocator.claim(id);
        self.insert_record(id, fields)
    }

    fn insert_record(&mut self, id: EntityId, fields: Fields) -> EntityId {
        let record = EntityRecord {
            id,
            components: Vec::new(),
            slots: HashMap::new(),
            tag: None,
            fields,
        };
        self.entities.insert(id, record);
        self.queries.mark_any_entity_dirty();

        // Hooks are moved out for the duration of the calls so they can
        // observe the stored record without aliasing the hook list.
        let mut hooks = std::mem::take(&mut self.spawn_hooks);
        if !hooks.is_empty() {
            let record = &self.entities[&id];
            for (_, hook) in &mut hooks {
                hook(record);
            }
        }
        self.spawn_hooks = hooks;
        id
    }

    /// Move the entity at `id` to a freshly allocated id, keeping its
    /// contents intact and every index consistent.
    fn relocate(&mut self, id: EntityId) {
        let new_id = self.allocator.allocate();
        let mut record = self
            .entities
            .remove(&id)
            .expect("relocate called for a live entity");
        debug!(old = %id, new = %new_id, "relocating entity to free a forced id");

        record.id = new_id;
        for instance in &mut record.components {
            instance.parent = new_id;
        }
        for ty in record.slots.keys() {
            if let Some(list) = self.reverse.get_mut(ty) {
                for entry in list.iter_mut() {
                    if *entry == id {
                        *entry = new_id;
                    }
                }
            }
            if let Some(name) = self.registry.name_of(*ty) {
                self.queries.mark_component_dirty(name);
            }
        }
        if let Some(tag) = record.tag.as_deref() {
            self.queries.mark_tag_dirty(tag);
        }
        self.entities.insert(new_id, record);
        // The old id stays live in the allocator; the forced spawn claims it
        // immediately after.
    }

    /// Destroy an entity. Returns `false` if the id is not live.
    ///
    /// Removes the entity from every reverse-index list and invalidates all
    /// queries depending on its component types or tag. Detach hooks do not
    /// fire; destruction is not detachment.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(record) = self.entities.remove(&id) else {
            debug!(%id, "despawn of a dead entity ignored");
            return false;
        };
        for ty in record.slots.keys() {
            if let Some(list) = self.reverse.get_mut(ty) {
                list.retain(|entry| *entry != id);
            }
            if let Some(name) = self.registry.name_of(*ty) {
                self.queries.mark_component_dirty(name);
            }
        }
        if let Some(tag) = record.tag.as_deref() {
            self.queries.mark_tag_dirty(tag);
        }
        self.queries.mark_any_entity_dirty();
        self.allocator.release(id);
        true
    }

    /// Direct lookup of a live entity.
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    /// Chainable mutator for a live entity, or `None` if the id is dead.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        if self.entities.contains_key(&id) {
            Some(EntityMut { world: self, id })
        } else {
            None
        }
    }

    /// Whether the id refers to a live entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate every live entity record in id order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> + '_ {
        self.entities.values()
    }

    /// Subscribe to entity creation. The hook runs once per spawn, after the
    /// record is stored. Returns a handle for [`remove_spawn_hook`](Self::remove_spawn_hook).
    pub fn on_spawn(&mut self, hook: impl FnMut(&EntityRecord) + 'static) -> HookId {
        let id = self.next_hook;
        self.next_hook += 1;
        self.spawn_hooks.push((id, Box::new(hook)));
        HookId(id)
    }

    /// Unsubscribe a spawn hook. Returns `false` if the handle is unknown.
    pub fn remove_spawn_hook(&mut self, hook: HookId) -> bool {
        let before = self.spawn_hooks.len();
        self.spawn_hooks.retain(|(id, _)| *id != hook.0);
        self.spawn_hooks.len() != before
    }

    // -- components ---------------------------------------------------------

    /// Attach a component with its factory defaults. Idempotent: attaching a
    /// type the entity already holds is a no-op.
    pub fn add_component(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Result<(), WorldError> {
        self.add_component_with(entity, ty, Value::Null)
    }

    /// Attach a component, shallow-merging `defaults` over the factory's
    /// fields. Non-object `defaults` are ignored.
    pub fn add_component_with(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
        defaults: Value,
    ) -> Result<(), WorldError> {
        let def = self
            .registry
            .get(ty)
            .ok_or(WorldError::UnknownComponentType(ty))?;
        let name = def.name().to_owned();
        let attach = def.attach_hook();
        let record = self
            .entities
            .get(&entity)
            .ok_or(WorldError::NoSuchEntity(entity))?;
        if record.has(ty) {
            return Ok(());
        }

        let mut fields = self
            .registry
            .get(ty)
            .expect("descriptor resolved above")
            .instantiate();
        if let Value::Object(defaults) = defaults {
            for (key, value) in defaults {
                fields.insert(key, value);
            }
        }
        if let Some(hook) = attach {
            hook(entity, &mut fields);
        }

        let record = self
            .entities
            .get_mut(&entity)
            .expect("entity resolved above");
        let slot = record.components.len();
        record.components.push(ComponentInstance {
            parent: entity,
            type_id: ty,
            type_name: name.clone(),
            fields,
        });
        record.slots.insert(ty, slot);
        self.reverse.entry(ty).or_default().push(entity);
        self.queries.mark_component_dirty(&name);
        Ok(())
    }

    /// Detach a component. Detaching a type the entity does not hold is a
    /// no-op. The detach hook, if any, runs before the instance is removed;
    /// every slot past the removed one is shifted down to keep the slot map
    /// aligned with the compacted sequence.
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Result<(), WorldError> {
        let def = self
            .registry
            .get(ty)
            .ok_or(WorldError::UnknownComponentType(ty))?;
        let name = def.name().to_owned();
        let detach = def.detach_hook();
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::NoSuchEntity(entity))?;
        let Some(slot) = record.slots.get(&ty).copied() else {
            return Ok(());
        };

        if let Some(hook) = detach {
            hook(entity, &mut record.components[slot].fields);
        }
        record.components.remove(slot);
        record.slots.remove(&ty);
        for position in record.slots.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        if let Some(list) = self.reverse.get_mut(&ty) {
            list.retain(|entry| *entry != entity);
        }
        self.queries.mark_component_dirty(&name);
        Ok(())
    }

    /// Whether the entity holds an instance of `ty`. O(1).
    pub fn has_component(&self, entity: EntityId, ty: ComponentTypeId) -> bool {
        self.entities
            .get(&entity)
            .map(|record| record.has(ty))
            .unwrap_or(false)
    }

    /// The instance of `ty` on the entity, if attached. O(1).
    pub fn component(&self, entity: EntityId, ty: ComponentTypeId) -> Option<&ComponentInstance> {
        let record = self.entities.get(&entity)?;
        let slot = record.slot_of(ty)?;
        record.components.get(slot)
    }

    /// Mutable access to the instance of `ty` on the entity. Field edits do
    /// not affect query membership, so no invalidation happens here.
    pub fn component_mut(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Option<&mut ComponentInstance> {
        let record = self.entities.get_mut(&entity)?;
        let slot = record.slots.get(&ty).copied()?;
        record.components.get_mut(slot)
    }

    /// Ids of every entity holding `ty`, in attach order.
    pub fn entities_with(&self, ty: ComponentTypeId) -> &[EntityId] {
        self.reverse.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }

    // -- tags ---------------------------------------------------------------

    /// Set the entity's tag, replacing any previous one. Queries depending
    /// on either tag value are invalidated.
    pub fn add_tag(&mut self, entity: EntityId, tag: impl Into<String>) -> Result<(), WorldError> {
        let tag = tag.into();
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::NoSuchEntity(entity))?;
        let previous = record.tag.replace(tag.clone());
        if let Some(previous) = previous {
            self.queries.mark_tag_dirty(&previous);
        }
        self.queries.mark_tag_dirty(&tag);
        Ok(())
    }

    /// Clear the entity's tag, invalidating queries that depended on it.
    pub fn remove_tag(&mut self, entity: EntityId) -> Result<(), WorldError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::NoSuchEntity(entity))?;
        if let Some(previous) = record.tag.take() {
            self.queries.mark_tag_dirty(&previous);
        }
        Ok(())
    }

    /// The entity's tag, if any.
    pub fn tag(&self, entity: EntityId) -> Option<&str> {
        self.entities.get(&entity).and_then(EntityRecord::tag)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EntityMut
// ---------------------------------------------------------------------------

/// Chainable mutator for one entity, mirroring the fluent entity surface:
/// `world.entity_mut(e).unwrap().add_component(pos)?.add_tag("cube")?`.
pub struct EntityMut<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl<'w> EntityMut<'w> {
    /// The entity's id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attach a component with factory defaults.
    pub fn add_component(self, ty: ComponentTypeId) -> Result<Self, WorldError> {
        self.world.add_component(self.id, ty)?;
        Ok(self)
    }

    /// Attach a component with overrides merged over the factory defaults.
    pub fn add_component_with(self, ty: ComponentTypeId, defaults: Value) -> Result<Self, WorldError> {
        self.world.add_component_with(self.id, ty, defaults)?;
        Ok(self)
    }

    /// Detach a component.
    pub fn remove_component(self, ty: ComponentTypeId) -> Result<Self, WorldError> {
        self.world.remove_component(self.id, ty)?;
        Ok(self)
    }

    /// Set the entity's tag.
    pub fn add_tag(self, tag: impl Into<String>) -> Result<Self, WorldError> {
        self.world.add_tag(self.id, tag)?;
        Ok(self)
    }

    /// Clear the entity's tag.
    pub fn remove_tag(self) -> Result<Self, WorldError> {
        self.world.remove_tag(self.id)?;
        Ok(self)
    }

    /// Destroy the entity.
    pub fn despawn(self) -> bool {
        self.world.despawn(self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
