//! veld-engine -- the frame scheduler for the veld world kernel.
//!
//! This crate builds on [`veld_ecs`] to provide the simulation driver: an
//! ordered per-tick system list, a main callback, and a frame loop that
//! advances a scaled logical clock against an injectable [`FrameClock`]
//! (real time, or a deterministic simulated step for headless runs and
//! tests).
//!
//! # Quick Start
//!
//! ```
//! use veld_engine::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut scheduler = Scheduler::new(World::new());
//!
//! let ticks = Rc::new(RefCell::new(0u32));
//! let counter = ticks.clone();
//! scheduler.define_main(move |world| {
//!     *counter.borrow_mut() += 1;
//!     if *counter.borrow() == 3 {
//!         world.time.stop();
//!     }
//! });
//!
//! let mut clock = SimulatedClock::new();
//! scheduler.start_with(&mut clock);
//! assert_eq!(*ticks.borrow(), 3);
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod log;
pub mod math;
pub mod schedule;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the world kernel for convenience.
pub use veld_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the kernel prelude.
    pub use veld_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::clock::{FrameClock, SimulatedClock, WallClock, FRAME_STEP_MS};
    pub use crate::log::{ExpiringEntry, ExpiringLog};
    pub use crate::math::{lerp, pulse, slerp};
    pub use crate::schedule::{pipe, Scheduler, System, SystemId, Updatable};
}
