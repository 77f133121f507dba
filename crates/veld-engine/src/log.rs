//! An expiring message log, shaped as an object system.
//!
//! Every message is kept forever in `all`; a live window additionally holds
//! each message until its lifetime runs out. The update pass ages the live
//! window by the world's frame delta, so expiry follows logical time and
//! works identically under a simulated clock.
//!
//! The log is usually shared between the scheduler and the code producing
//! messages:
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use veld_engine::prelude::*;
//!
//! let log = Rc::new(RefCell::new(ExpiringLog::new()));
//! let mut scheduler = Scheduler::new(World::new());
//! scheduler.add_system(System::from_object(log.clone()));
//!
//! log.borrow_mut().log("hello");
//! scheduler.step();
//! assert_eq!(log.borrow().live().len(), 1);
//! ```

use veld_ecs::world::World;

use crate::schedule::Updatable;

/// Default seconds a message stays in the live window.
const DEFAULT_MAX_LIFETIME: f64 = 5.0;

/// A message still inside the live window.
#[derive(Debug, Clone)]
pub struct ExpiringEntry {
    /// The logged message.
    pub message: String,
    /// Seconds the message stays live.
    pub lifetime: f64,
    /// Seconds of frame time accumulated since the message was logged.
    pub age: f64,
}

/// Message log retaining everything plus a time-bounded live window.
#[derive(Debug)]
pub struct ExpiringLog {
    all: Vec<String>,
    live: Vec<ExpiringEntry>,
    max_lifetime: f64,
}

impl ExpiringLog {
    /// A log with the default lifetime.
    pub fn new() -> Self {
        Self::with_max_lifetime(DEFAULT_MAX_LIFETIME)
    }

    /// A log whose messages stay live for `seconds`.
    pub fn with_max_lifetime(seconds: f64) -> Self {
        Self {
            all: Vec::new(),
            live: Vec::new(),
            max_lifetime: seconds,
        }
    }

    /// Record a message.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.all.push(message.clone());
        self.live.push(ExpiringEntry {
            message,
            lifetime: self.max_lifetime,
            age: 0.0,
        });
    }

    /// Messages still inside the live window.
    pub fn live(&self) -> &[ExpiringEntry] {
        &self.live
    }

    /// Every message ever logged.
    pub fn all(&self) -> &[String] {
        &self.all
    }
}

impl Updatable for ExpiringLog {
    fn update(&mut self, world: &mut World) {
        let delta_seconds = world.time.delta * 0.001;
        for entry in &mut self.live {
            entry.age += delta_seconds;
        }
        self.live.retain(|entry| entry.age < entry.lifetime);
    }
}

impl Default for ExpiringLog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
