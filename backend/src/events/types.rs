//! Scenario event types for simulation configuration
//!
//! Scenario events modify the running simulation at configured times:
//! introducing a population, changing a death rate, or overriding a custom
//! variable for a whole cell type.
//!
//! # Design Principles
//!
//! 1. **Time-based**: schedules are in simulation minutes, matched against
//!    the tick clock so they fire on the first tick at or past their time
//! 2. **Self-contained**: events carry everything needed for execution
//! 3. **Logged**: every execution is recorded in the event log

use serde::{Deserialize, Serialize};

use crate::core::time::SimulationClock;

/// A scenario event that modifies simulation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Seed immune cells in a shell around the tumor
    ///
    /// `count` falls back to the model's configured number of immune cells.
    IntroduceImmuneCells {
        #[serde(default)]
        count: Option<usize>,
    },

    /// Change one death model's rate for a cell type
    ///
    /// Applies to the type's definition (future cells) and to every living
    /// cell of that type.
    ///
    /// # Example
    /// Chemotherapy pulse: raise tumor apoptosis tenfold for a day
    SetDeathRate {
        cell_type: String,
        model: String,
        rate: f64,
    },

    /// Override a custom variable for a cell type and its living cells
    SetCustomVariable {
        cell_type: String,
        name: String,
        value: f64,
    },
}

impl ScenarioEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScenarioEvent::IntroduceImmuneCells { .. } => "introduce_immune_cells",
            ScenarioEvent::SetDeathRate { .. } => "set_death_rate",
            ScenarioEvent::SetCustomVariable { .. } => "set_custom_variable",
        }
    }
}

/// When to execute a scenario event (minutes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSchedule {
    /// Execute once, on the first tick at or past `time`
    OneTime { time: f64 },

    /// Execute at `start_time`, then every `interval`
    Repeating { start_time: f64, interval: f64 },
}

impl EventSchedule {
    /// First due time
    pub fn first_time(&self) -> f64 {
        match self {
            EventSchedule::OneTime { time } => *time,
            EventSchedule::Repeating { start_time, .. } => *start_time,
        }
    }

    /// Due time after firing at `fired_at`, or `None` when exhausted
    pub fn next_after(&self, fired_at: f64) -> Option<f64> {
        match self {
            EventSchedule::OneTime { .. } => None,
            EventSchedule::Repeating { interval, .. } => Some(fired_at + interval),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            EventSchedule::OneTime { time } => time.is_finite() && *time >= 0.0,
            EventSchedule::Repeating { start_time, interval } => {
                start_time.is_finite() && *start_time >= 0.0 && *interval > 0.0
            }
        }
    }

    /// Whether an event last due at `due` should run on `clock`'s tick
    pub fn is_due(due: Option<f64>, clock: &SimulationClock) -> bool {
        due.is_some_and(|t| clock.has_reached(t))
    }
}

/// A scenario event paired with its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: ScenarioEvent,
    pub schedule: EventSchedule,
}
