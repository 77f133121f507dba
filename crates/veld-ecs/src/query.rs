//! Incremental queries over the world.
//!
//! A [`QuerySpec`] names four optional clauses -- all of / any of / none of /
//! tag in -- and compiles to a canonical cache key. The world keeps a
//! dependency graph from component-type names and tag values to the query
//! keys that reference them, so a mutation invalidates exactly the cached
//! result sets it can affect. Everything else is served from cache without a
//! scan.
//!
//! Canonical keys are built from the clause contents in submission order;
//! items are not sorted within a clause. Two specs with the same clauses in
//! a different literal order therefore occupy distinct cache entries, each
//! of which stays correct on its own.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::trace;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::world::{EntityRecord, World};
use crate::WorldError;

// ---------------------------------------------------------------------------
// QueryKey / DepKey
// ---------------------------------------------------------------------------

/// Canonical identifier for a compiled query.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct QueryKey(String);

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One edge source in the dependency graph.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum DepKey {
    /// Membership of a component type changed on some entity.
    Component(String),
    /// Membership of a tag value changed on some entity.
    Tag(String),
    /// An entity was created or destroyed. Only queries without a positive
    /// clause subscribe here; nothing else can change their membership on a
    /// bare spawn.
    AnyEntity,
}

// ---------------------------------------------------------------------------
// QuerySpec
// ---------------------------------------------------------------------------

/// An immutable query specification.
#[derive(Clone, Default, Debug)]
pub struct QuerySpec {
    all: Vec<ComponentTypeId>,
    any: Vec<ComponentTypeId>,
    none: Vec<ComponentTypeId>,
    tags: Vec<String>,
}

impl QuerySpec {
    /// An empty spec. With no clauses it imposes no constraint and matches
    /// every live entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match only entities holding all of these types.
    pub fn all(mut self, types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        self.all.extend(types);
        self
    }

    /// Match only entities holding at least one of these types.
    pub fn any(mut self, types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        self.any.extend(types);
        self
    }

    /// Match only entities holding none of these types.
    pub fn none(mut self, types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        self.none.extend(types);
        self
    }

    /// Match only entities whose tag is one of these values.
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether any clause constrains membership positively. Specs without
    /// one can match a bare entity, so they subscribe to spawn/despawn.
    fn has_positive_clause(&self) -> bool {
        !self.all.is_empty() || !self.any.is_empty() || !self.tags.is_empty()
    }

    /// The matching predicate: every clause, when empty, imposes no
    /// constraint.
    pub(crate) fn matches(&self, record: &EntityRecord) -> bool {
        if self.none.iter().any(|ty| record.has(*ty)) {
            return false;
        }
        if !self.all.iter().all(|ty| record.has(*ty)) {
            return false;
        }
        if !self.any.is_empty() && !self.any.iter().any(|ty| record.has(*ty)) {
            return false;
        }
        if !self.tags.is_empty() {
            match record.tag() {
                Some(tag) if self.tags.iter().any(|candidate| candidate == tag) => {}
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Cached result sets, the dirty set, and the dependency graph.
#[derive(Default)]
pub(crate) struct QueryCache {
    results: HashMap<QueryKey, Vec<EntityId>>,
    dirty: HashSet<QueryKey>,
    deps: HashMap<DepKey, HashSet<QueryKey>>,
}

impl QueryCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `key` as a dependent of `dep`. Idempotent.
    fn register(&mut self, key: &QueryKey, dep: DepKey) {
        self.deps.entry(dep).or_default().insert(key.clone());
    }

    /// Mark every dependent of `dep` dirty.
    fn mark(&mut self, dep: &DepKey) {
        if let Some(dependents) = self.deps.get(dep) {
            for key in dependents {
                self.dirty.insert(key.clone());
            }
        }
    }

    pub(crate) fn mark_component_dirty(&mut self, name: &str) {
        self.mark(&DepKey::Component(name.to_owned()));
    }

    pub(crate) fn mark_tag_dirty(&mut self, tag: &str) {
        self.mark(&DepKey::Tag(tag.to_owned()));
    }

    pub(crate) fn mark_any_entity_dirty(&mut self) {
        self.mark(&DepKey::AnyEntity);
    }

    pub(crate) fn cached_len(&self) -> usize {
        self.results.len()
    }

    #[cfg(test)]
    fn is_dirty(&self, key: &QueryKey) -> bool {
        self.dirty.contains(key)
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("cached", &self.results.len())
            .field("dirty", &self.dirty.len())
            .field("dep_keys", &self.deps.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// QueryRunner
// ---------------------------------------------------------------------------

/// A compiled query. Running it serves the cached result set when the key is
/// clean and rescans the world when it is not.
#[derive(Clone, Debug)]
pub struct QueryRunner {
    key: QueryKey,
    spec: QuerySpec,
}

impl QueryRunner {
    /// The canonical cache key.
    pub fn key(&self) -> &str {
        &self.key.0
    }

    /// Invoke `f` with the (possibly freshly recomputed) result list.
    pub fn run<R>(&self, world: &mut World, f: impl FnOnce(&World, &[EntityId]) -> R) -> R {
        world.run_query(self, f)
    }

    /// Owned copy of the current result list.
    pub fn collect(&self, world: &mut World) -> Vec<EntityId> {
        self.run(world, |_, ids| ids.to_vec())
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Compile a query: validate the clauses, derive the canonical key, and
    /// register the key in the dependency graph.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidQuery`] if any component id in the spec does not
    /// resolve to a registered name.
    pub fn query(&mut self, spec: QuerySpec) -> Result<QueryRunner, WorldError> {
        let mut key = String::from("and");
        for ty in &spec.all {
            key.push_str(self.clause_name(*ty)?);
        }
        key.push_str("or");
        for ty in &spec.any {
            key.push_str(self.clause_name(*ty)?);
        }
        key.push_str("not");
        for ty in &spec.none {
            key.push_str(self.clause_name(*ty)?);
        }
        key.push_str("tag");
        for tag in &spec.tags {
            key.push_str(tag);
        }
        let key = QueryKey(key);

        for ty in spec.all.iter().chain(&spec.any).chain(&spec.none) {
            let name = self
                .registry
                .name_of(*ty)
                .expect("clause names validated above")
                .to_owned();
            self.queries.register(&key, DepKey::Component(name));
        }
        for tag in &spec.tags {
            self.queries.register(&key, DepKey::Tag(tag.clone()));
        }
        if !spec.has_positive_clause() {
            self.queries.register(&key, DepKey::AnyEntity);
        }

        Ok(QueryRunner { key, spec })
    }

    fn clause_name(&self, ty: ComponentTypeId) -> Result<&str, WorldError> {
        self.registry.name_of(ty).ok_or_else(|| {
            WorldError::InvalidQuery(format!("component {ty:?} has no registered name"))
        })
    }

    /// Refresh the runner's key if needed, then hand its result list to `f`.
    pub fn run_query<R>(
        &mut self,
        runner: &QueryRunner,
        f: impl FnOnce(&World, &[EntityId]) -> R,
    ) -> R {
        self.refresh_query(runner);
        let ids = self
            .queries
            .results
            .get(&runner.key)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        f(&*self, ids)
    }

    /// Recompute the result set for a dirty or never-computed key. Clean
    /// keys with a prior result are served as-is.
    fn refresh_query(&mut self, runner: &QueryRunner) {
        let stale = self.queries.dirty.contains(&runner.key)
            || !self.queries.results.contains_key(&runner.key);
        if !stale {
            return;
        }
        let matched: Vec<EntityId> = self
            .entities
            .values()
            .filter(|record| runner.spec.matches(record))
            .map(EntityRecord::id)
            .collect();
        trace!(key = %runner.key, count = matched.len(), "recomputed query");
        self.queries.results.insert(runner.key.clone(), matched);
        self.queries.dirty.remove(&runner.key);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDef;
    use serde_json::json;

    fn setup_world() -> (World, ComponentTypeId, ComponentTypeId, ComponentTypeId) {
        let mut world = World::new();
        let position = world.register_component(ComponentDef::new("Position", || json!({})));
        let velocity = world.register_component(ComponentDef::new("Velocity", || json!({})));
        let not_me = world.register_component(ComponentDef::new("NotMe", || json!({})));
        (world, position, velocity, not_me)
    }

    #[test]
    fn canonical_key_layout() {
        let (mut world, position, velocity, not_me) = setup_world();
        let runner = world
            .query(
                QuerySpec::new()
                    .all([position, velocity])
                    .none([not_me])
                    .tagged(["cube"]),
            )
            .unwrap();
        assert_eq!(runner.key(), "andPositionVelocityornotNotMetagcube");
    }

    #[test]
    fn same_spec_same_key_different_order_different_key() {
        let (mut world, position, velocity, _) = setup_world();
        let a = world.query(QuerySpec::new().all([position, velocity])).unwrap();
        let b = world.query(QuerySpec::new().all([position, velocity])).unwrap();
        let c = world.query(QuerySpec::new().all([velocity, position])).unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn unregistered_component_is_invalid() {
        let (mut world, ..) = setup_world();
        let bogus = ComponentTypeId(999);
        assert!(matches!(
            world.query(QuerySpec::new().all([bogus])),
            Err(WorldError::InvalidQuery(_))
        ));
    }

    #[test]
    fn and_query_tracks_membership() {
        let (mut world, position, velocity, not_me) = setup_world();
        let e1 = world.spawn();
        let e2 = world.spawn();
        for ty in [position, velocity, not_me] {
            world.add_component(e1, ty).unwrap();
        }

        let movables = world.query(QuerySpec::new().all([position, velocity])).unwrap();
        assert_eq!(movables.collect(&mut world), vec![e1]);

        for ty in [position, velocity, not_me] {
            world.add_component(e2, ty).unwrap();
        }
        assert_eq!(movables.collect(&mut world), vec![e1, e2]);
    }

    #[test]
    fn or_query_matches_either() {
        let (mut world, position, velocity, not_me) = setup_world();
        let e1 = world.spawn();
        let e2 = world.spawn();
        world.add_component(e1, position).unwrap();
        world.add_component(e1, not_me).unwrap();

        let either = world.query(QuerySpec::new().any([position, velocity])).unwrap();
        assert_eq!(either.collect(&mut world), vec![e1]);

        world.add_component(e2, velocity).unwrap();
        assert_eq!(either.collect(&mut world), vec![e1, e2]);
    }

    #[test]
    fn not_query_excludes_holders() {
        let (mut world, position, velocity, not_me) = setup_world();
        let e0 = world.spawn();
        let e1 = world.spawn();
        let e2 = world.spawn();
        for ty in [position, velocity, not_me] {
            world.add_component(e0, ty).unwrap();
        }
        world.add_component(e1, position).unwrap();
        world.add_component(e1, velocity).unwrap();

        let movables = world
            .query(QuerySpec::new().all([position, velocity]).none([not_me]))
            .unwrap();
        let others = world.query(QuerySpec::new().none([not_me])).unwrap();

        assert_eq!(others.collect(&mut world), vec![e1, e2]);

        world.add_component(e2, not_me).unwrap();
        assert_eq!(others.collect(&mut world), vec![e1]);
        assert_eq!(movables.collect(&mut world), vec![e1]);

        world.remove_component(e0, not_me).unwrap();
        assert_eq!(movables.collect(&mut world), vec![e0, e1]);
    }

    #[test]
    fn tag_query_follows_retagging() {
        let (mut world, position, velocity, not_me) = setup_world();
        let e0 = world.spawn();
        let e1 = world.spawn();
        for ty in [position, velocity, not_me] {
            world.add_component(e0, ty).unwrap();
        }
        world.add_component(e1, position).unwrap();
        world.add_component(e1, velocity).unwrap();
        world.add_tag(e0, "cube").unwrap();
        world.add_tag(e1, "cube").unwrap();

        let cubes = world
            .query(QuerySpec::new().tagged(["cube"]).none([not_me]))
            .unwrap();
        assert_eq!(cubes.collect(&mut world), vec![e1]);

        world.remove_component(e0, not_me).unwrap();
        assert_eq!(cubes.collect(&mut world), vec![e0, e1]);

        world.add_tag(e1, "not-cube").unwrap();
        assert_eq!(cubes.collect(&mut world), vec![e0]);

        world.remove_tag(e0).unwrap();
        assert!(cubes.collect(&mut world).is_empty());

        world.add_tag(e1, "cube").unwrap();
        assert_eq!(cubes.collect(&mut world), vec![e1]);
    }

    #[test]
    fn empty_spec_matches_every_entity() {
        let (mut world, position, ..) = setup_world();
        let e0 = world.spawn();
        let e1 = world.spawn();
        world.add_component(e0, position).unwrap();

        let everything = world.query(QuerySpec::new()).unwrap();
        assert_eq!(everything.collect(&mut world), vec![e0, e1]);

        let e2 = world.spawn();
        assert_eq!(everything.collect(&mut world), vec![e0, e1, e2]);
    }

    #[test]
    fn bare_spawn_invalidates_not_only_queries() {
        let (mut world, _, _, not_me) = setup_world();
        let e0 = world.spawn();
        world.add_component(e0, not_me).unwrap();

        let others = world.query(QuerySpec::new().none([not_me])).unwrap();
        assert!(others.collect(&mut world).is_empty());

        let e1 = world.spawn();
        assert_eq!(others.collect(&mut world), vec![e1]);

        world.despawn(e1);
        assert!(others.collect(&mut world).is_empty());
    }

    #[test]
    fn unrelated_mutation_leaves_cache_clean() {
        let (mut world, position, velocity, not_me) = setup_world();
        let e0 = world.spawn();
        world.add_component(e0, position).unwrap();
        world.add_component(e0, velocity).unwrap();

        let movables = world.query(QuerySpec::new().all([position, velocity])).unwrap();
        movables.collect(&mut world);
        assert!(!world.queries.is_dirty(&movables.key));

        // NotMe has no dependent query, so this must not dirty `movables`.
        let e1 = world.spawn();
        world.add_component(e1, not_me).unwrap();
        world.remove_component(e1, not_me).unwrap();
        assert!(!world.queries.is_dirty(&movables.key));

        // A relevant mutation does.
        world.add_component(e1, position).unwrap();
        assert!(world.queries.is_dirty(&movables.key));
    }

    #[test]
    fn cached_results_are_served_without_rescan() {
        let (mut world, position, ..) = setup_world();
        let e0 = world.spawn();
        world.add_component(e0, position).unwrap();

        let holders = world.query(QuerySpec::new().all([position])).unwrap();
        let first = holders.run(&mut world, |_, ids| ids.as_ptr());
        let second = holders.run(&mut world, |_, ids| ids.as_ptr());
        // Same backing allocation: the second run was a cache hit.
        assert_eq!(first, second);
    }

    #[test]
    fn destroyed_entities_leave_query_results() {
        let (mut world, position, ..) = setup_world();
        let e0 = world.spawn();
        world.add_component(e0, position).unwrap();

        let holders = world.query(QuerySpec::new().all([position])).unwrap();
        assert_eq!(holders.collect(&mut world), vec![e0]);

        world.despawn(e0);
        assert!(holders.collect(&mut world).is_empty());
    }

    #[test]
    fn forced_id_relocation_invalidates_dependents() {
        let (mut world, position, ..) = setup_world();
        let original = world.spawn_at(EntityId::from_raw(5), Default::default());
        world.add_component(original, position).unwrap();

        let holders = world.query(QuerySpec::new().all([position])).unwrap();
        assert_eq!(holders.collect(&mut world), vec![original]);

        let usurper = world.spawn_at(EntityId::from_raw(5), Default::default());
        assert_eq!(usurper.to_raw(), 5);
        // The relocated occupant, not the stale id, shows up in the results.
        assert_eq!(holders.collect(&mut world), vec![EntityId::from_raw(6)]);
    }

    #[test]
    fn run_exposes_world_for_result_shaping() {
        let (mut world, position, ..) = setup_world();
        let e0 = world.spawn();
        world
            .add_component_with(e0, position, json!({ "x": 3.5 }))
            .unwrap();

        let holders = world.query(QuerySpec::new().all([position])).unwrap();
        let x = holders.run(&mut world, |world, ids| {
            world.component(ids[0], position).unwrap().field("x").cloned()
        });
        assert_eq!(x, Some(json!(3.5)));
    }
}
