//! veld-ecs -- an incremental ECS world kernel.
//!
//! Entities are dynamic records (a component sequence, an optional tag, and
//! caller-supplied fields) indexed two ways: a per-entity slot map for O(1)
//! component access and a reverse index from component type to holders.
//! Queries compile to canonical cache keys; a dependency graph from
//! component-type names and tag values to query keys invalidates exactly the
//! cached result sets a mutation can affect.
//!
//! # Quick Start
//!
//! ```
//! use veld_ecs::prelude::*;
//! use serde_json::json;
//!
//! let mut world = World::new();
//! let position = world.register_component(ComponentDef::new("position", || {
//!     json!({ "x": 0.0, "y": 0.0 })
//! }));
//! let velocity = world.register_component(ComponentDef::new("velocity", || {
//!     json!({ "dx": 1.0, "dy": 0.0 })
//! }));
//!
//! let e = world.spawn();
//! world.add_component(e, position).unwrap();
//! world.add_component(e, velocity).unwrap();
//!
//! let movables = world
//!     .query(QuerySpec::new().all([position, velocity]))
//!     .unwrap();
//! assert_eq!(movables.collect(&mut world), vec![e]);
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod query;
pub mod time;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity does not exist (despawned or never allocated).
    #[error("entity {0} does not exist (despawned or never allocated)")]
    NoSuchEntity(entity::EntityId),

    /// A component type id was used that is not registered in this world.
    #[error("component type {0:?} is not registered in this world")]
    UnknownComponentType(component::ComponentTypeId),

    /// A query clause referenced a component without a stable name.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{
        ComponentDef, ComponentInstance, ComponentRegistry, ComponentTypeId, Fields,
    };
    pub use crate::entity::{EntityId, IdGenerator, RandomIdGenerator};
    pub use crate::query::{QueryRunner, QuerySpec};
    pub use crate::time::TimeState;
    pub use crate::world::{EntityMut, EntityRecord, HookId, World};
    pub use crate::WorldError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
