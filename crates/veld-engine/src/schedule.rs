//! The scheduler: an ordered per-tick system list and the scaled-time frame
//! loop.
//!
//! Systems come in exactly two shapes -- a bare callback, or an object
//! exposing an `update` method -- and always receive the world. The frame
//! loop decouples wall-clock frame delivery from logical time: every frame
//! accumulates scale-weighted time, and the main callback only runs on
//! frames where scaled time has caught up with unscaled time. Scale factors
//! below 1.0 therefore throttle logical progress while the underlying tick
//! rate stays constant.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use veld_ecs::world::World;

use crate::clock::{FrameClock, WallClock};

/// The fps readout refreshes once this much frame time (ms) has accumulated.
const FPS_WINDOW_MS: f64 = 100.0;
/// Scales the raw 1000/delta estimate into the readout range.
const FPS_SCALE: f64 = 100.0 / 60.0;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// An object-shaped system: anything exposing a per-tick `update`.
pub trait Updatable {
    /// Called once per [`Scheduler::step`], receiving the world.
    fn update(&mut self, world: &mut World);
}

/// Shared-ownership systems stay callable from outside the scheduler.
impl<T: Updatable> Updatable for Rc<RefCell<T>> {
    fn update(&mut self, world: &mut World) {
        self.borrow_mut().update(world);
    }
}

/// A registered system: a bare per-tick callback, or an object exposing an
/// `update` method. No other shape exists.
pub enum System {
    /// A bare callback.
    Callback(Box<dyn FnMut(&mut World)>),
    /// An object with an `update` method.
    Object(Box<dyn Updatable>),
}

impl System {
    /// Wrap a bare callback.
    pub fn from_fn(callback: impl FnMut(&mut World) + 'static) -> Self {
        Self::Callback(Box::new(callback))
    }

    /// Wrap an object exposing `update`.
    pub fn from_object(object: impl Updatable + 'static) -> Self {
        Self::Object(Box::new(object))
    }

    fn invoke(&mut self, world: &mut World) {
        match self {
            Self::Callback(callback) => callback(world),
            Self::Object(object) => object.update(world),
        }
    }
}

/// Handle identifying a registered system, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(u64);

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the world, the ordered system list, and the main callback, and
/// drives them from a [`FrameClock`].
pub struct Scheduler {
    world: World,
    systems: Vec<(SystemId, System)>,
    main: Option<Box<dyn FnMut(&mut World)>>,
    next_system: u64,
}

impl Scheduler {
    /// Wrap a world in a scheduler with no systems and no main callback.
    pub fn new(world: World) -> Self {
        Self {
            world,
            systems: Vec::new(),
            main: None,
            next_system: 0,
        }
    }

    /// Read-only access to the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for setup and inspection between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Tear down the scheduler, returning the world.
    pub fn into_world(self) -> World {
        self.world
    }

    // -- systems ------------------------------------------------------------

    /// Append a system. Systems run in registration order on every
    /// [`step`](Self::step). Returns a handle for removal.
    pub fn add_system(&mut self, system: System) -> SystemId {
        let id = SystemId(self.next_system);
        self.next_system += 1;
        self.systems.push((id, system));
        id
    }

    /// Append several systems, in iteration order.
    pub fn add_systems(&mut self, systems: impl IntoIterator<Item = System>) -> Vec<SystemId> {
        systems.into_iter().map(|s| self.add_system(s)).collect()
    }

    /// Remove a system by handle. Returns `false` if the handle is unknown.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        let before = self.systems.len();
        self.systems.retain(|(sid, _)| *sid != id);
        self.systems.len() != before
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Invoke every registered system exactly once, in registration order,
    /// passing the world. Does not touch the clock.
    pub fn step(&mut self) {
        for (_, system) in &mut self.systems {
            system.invoke(&mut self.world);
        }
    }

    // -- frame loop ---------------------------------------------------------

    /// Set the callback invoked once per eligible tick. Distinct from the
    /// system list, which only [`step`](Self::step) runs.
    pub fn define_main(&mut self, callback: impl FnMut(&mut World) + 'static) {
        self.main = Some(Box::new(callback));
    }

    /// Run the frame loop against a real-time 60 Hz clock.
    ///
    /// Blocks until the running flag clears; see [`start_with`](Self::start_with).
    pub fn start(&mut self) {
        let mut clock = WallClock::default();
        self.start_with(&mut clock);
    }

    /// Run the frame loop against the given clock.
    ///
    /// Resets delta/elapsed/elapsed_scaled/fps, sets the running flag, and
    /// ticks until something clears it -- a system, the main callback, or a
    /// prior [`stop`](Self::stop) via `world.time`. Every eligible tick runs
    /// the registered systems in order and then the main callback; throttled
    /// ticks run neither. Cancellation is observed at the next tick
    /// boundary; an in-flight tick always completes.
    pub fn start_with(&mut self, clock: &mut dyn FrameClock) {
        self.world.time.restart();
        let mut then = 0.0;
        let mut accumulator = 0.0;
        debug!("frame loop started");

        while self.world.time.is_running() {
            let now = clock.next_frame();
            let time = &mut self.world.time;
            time.delta = now - then;
            time.elapsed_scaled += time.delta * 0.001 * time.scale;

            // Logical time has outrun scaled time: take another frame
            // without running the main callback. `then` stays put so the
            // next delta spans the skipped frames.
            if time.elapsed_scaled < time.elapsed {
                continue;
            }

            time.elapsed += time.delta * 0.001;
            then = now;
            accumulator += time.delta;

            if accumulator > FPS_WINDOW_MS {
                time.fps = ((1000.0 / time.delta) * FPS_SCALE * 100.0).ceil() / 100.0;
                accumulator = 0.0;
            }

            self.step();
            if let Some(main) = self.main.as_mut() {
                main(&mut self.world);
            }
        }
        debug!("frame loop stopped");
    }

    /// Clear the running flag. The next scheduled tick observes it and the
    /// loop returns instead of rescheduling.
    pub fn stop(&mut self) {
        self.world.time.stop();
    }
}

// ---------------------------------------------------------------------------
// pipe
// ---------------------------------------------------------------------------

/// Compose world-callbacks into one callback that runs them in order.
pub fn pipe(stages: Vec<Box<dyn FnMut(&mut World)>>) -> impl FnMut(&mut World) {
    let mut stages = stages;
    move |world: &mut World| {
        for stage in &mut stages {
            stage(world);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
