//! Frame clocks.
//!
//! The scheduler never reads time directly; it asks a [`FrameClock`] to
//! carry it to the next frame boundary and report the new timestamp. Two
//! implementations ship: [`WallClock`] paces against real time the way a
//! host display loop would, and [`SimulatedClock`] advances a synthetic
//! clock by a fixed step so the whole engine runs deterministically with no
//! display and no sleeping.

use std::time::{Duration, Instant};

/// Nominal milliseconds per frame at 60 Hz.
pub const FRAME_STEP_MS: f64 = 16.67;

/// A source of frame boundaries.
///
/// `next_frame` blocks (or advances a synthetic clock) until the next frame
/// and returns the new timestamp in milliseconds. Cancellation is the
/// caller's job: a stopped loop simply stops asking for frames.
pub trait FrameClock {
    /// Advance to the next frame boundary; returns the new now, in ms.
    fn next_frame(&mut self) -> f64;
}

// ---------------------------------------------------------------------------
// SimulatedClock
// ---------------------------------------------------------------------------

/// A deterministic clock advancing a synthetic now by a fixed step per
/// frame. Never sleeps.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: f64,
    step: f64,
}

impl SimulatedClock {
    /// A clock stepping [`FRAME_STEP_MS`] per frame (simulated 60 Hz).
    pub fn new() -> Self {
        Self::with_step(FRAME_STEP_MS)
    }

    /// A clock stepping `step_ms` per frame.
    pub fn with_step(step_ms: f64) -> Self {
        Self {
            now: 0.0,
            step: step_ms,
        }
    }

    /// The current synthetic timestamp in ms.
    pub fn now(&self) -> f64 {
        self.now
    }
}

impl FrameClock for SimulatedClock {
    fn next_frame(&mut self) -> f64 {
        self.now += self.step;
        self.now
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// WallClock
// ---------------------------------------------------------------------------

/// A clock pacing frames against real time. Each `next_frame` sleeps one
/// frame interval and reports wall-clock milliseconds since the clock was
/// created.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
    interval: Duration,
}

impl WallClock {
    /// A clock with the given frame interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
        }
    }
}

impl FrameClock for WallClock {
    fn next_frame(&mut self) -> f64 {
        std::thread::sleep(self.interval);
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for WallClock {
    /// A 60 Hz wall clock.
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(1.0 / 60.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
