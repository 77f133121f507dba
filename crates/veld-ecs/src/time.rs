//! Logical clock state carried by the world.
//!
//! `elapsed` advances once per processed tick; `elapsed_scaled` is weighted
//! by the wall-clock delta and the caller-controlled [`scale`](TimeState::scale)
//! factor. The scheduler compares the two to decide whether logical time is
//! allowed to progress on a given tick.

use serde::{Deserialize, Serialize};

/// Frame timing state, updated by the scheduler and readable by systems via
/// `world.time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeState {
    /// Milliseconds between the previous two processed ticks.
    pub delta: f64,
    /// Unscaled logical time in seconds.
    pub elapsed: f64,
    /// Scale-weighted logical time in seconds.
    pub elapsed_scaled: f64,
    /// Multiplier applied to `elapsed_scaled` accumulation. Values below 1.0
    /// throttle logical progress; 0.0 freezes it.
    pub scale: f64,
    /// Most recent frames-per-second estimate.
    pub fps: f64,
    running: bool,
}

impl TimeState {
    /// Fresh time state: everything zeroed, scale 1.0, not running.
    pub fn new() -> Self {
        Self {
            delta: 0.0,
            elapsed: 0.0,
            elapsed_scaled: 0.0,
            scale: 1.0,
            fps: 0.0,
            running: false,
        }
    }

    /// Zero the counters and set the running flag. `scale` is preserved so a
    /// slow-motion world stays slow across restarts.
    pub fn restart(&mut self) {
        self.delta = 0.0;
        self.elapsed = 0.0;
        self.elapsed_scaled = 0.0;
        self.fps = 0.0;
        self.running = true;
    }

    /// Clear the running flag. The loop observes this at the next tick
    /// boundary; an in-flight tick always completes.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether the frame loop should keep ticking.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for TimeState {
    fn default() -> Self {
        Self::new()
    }
}
