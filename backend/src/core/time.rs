//! Time management for the simulation
//!
//! The simulation advances in fixed steps of `dt` minutes. Tick counting is
//! integral so the elapsed time never accumulates floating-point drift:
//! `time = tick * dt`.

use serde::{Deserialize, Serialize};

/// Fixed-step simulation clock
///
/// # Example
/// ```
/// use phenocell_core_rs::SimulationClock;
///
/// let mut clock = SimulationClock::new(0.1, 1.0);
/// assert_eq!(clock.current_tick(), 0);
/// assert!(!clock.is_finished());
///
/// for _ in 0..10 {
///     clock.advance_tick();
/// }
/// assert!(clock.is_finished());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationClock {
    /// Total ticks elapsed since simulation start
    current_tick: u64,
    /// Step size (minutes)
    dt: f64,
    /// Stop time (minutes)
    t_max: f64,
}

impl SimulationClock {
    /// Create a new clock
    ///
    /// # Panics
    /// Panics if `dt` is not strictly positive
    pub fn new(dt: f64, t_max: f64) -> Self {
        assert!(dt > 0.0, "dt must be positive");
        Self {
            current_tick: 0,
            dt,
            t_max,
        }
    }

    /// Rebuild a clock at a given tick (checkpoint restore)
    pub fn at_tick(dt: f64, t_max: f64, tick: u64) -> Self {
        let mut clock = Self::new(dt, t_max);
        clock.current_tick = tick;
        clock
    }

    /// Advance time by one step
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// Ticks elapsed since start
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Current simulated time (minutes)
    pub fn time(&self) -> f64 {
        self.current_tick as f64 * self.dt
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn t_max(&self) -> f64 {
        self.t_max
    }

    /// True once `time >= t_max`
    ///
    /// Uses a tolerance of a tenth of a step so `t_max` values that are
    /// an exact multiple of `dt` terminate on the expected tick.
    pub fn is_finished(&self) -> bool {
        self.time() >= self.t_max - 0.1 * self.dt
    }

    /// True once the clock has reached `target` (to 1% of a step)
    pub fn has_reached(&self, target: f64) -> bool {
        self.time() > target - 0.01 * self.dt
    }
}
