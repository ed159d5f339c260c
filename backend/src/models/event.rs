//! Event logging for run auditing and analysis
//!
//! Every population-changing or interaction-changing commit is recorded as
//! an [`Event`], in the order it was applied within the tick.
//!
//! # Event Types
//!
//! - **Cycle**: division, removal
//! - **Death**: a death model committed (stochastic or forced)
//! - **Attachment**: attach, detach, kill
//! - **Scenario**: population introduced, scenario event executed
//!
//! # Example
//!
//! ```rust
//! use phenocell_core_rs::models::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::PopulationIntroduced {
//!     tick: 201600,
//!     cell_type: "immune cell".to_string(),
//!     count: 7500,
//! });
//!
//! assert_eq!(log.events_of_type("PopulationIntroduced").len(), 1);
//! ```

use crate::models::cell::CellId;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Parent divided into itself and a new daughter
    Division {
        tick: u64,
        parent: CellId,
        daughter: CellId,
    },

    /// Cell swept from the population (debris)
    Removal { tick: u64, cell: CellId },

    /// Death model committed
    DeathTriggered {
        tick: u64,
        cell: CellId,
        model: String,
        /// Set by another cell (a kill) rather than drawn
        forced: bool,
    },

    Attached {
        tick: u64,
        initiator: CellId,
        target: CellId,
    },

    Detached {
        tick: u64,
        initiator: CellId,
        target: CellId,
    },

    /// Successful cytotoxic kill attempt
    Kill {
        tick: u64,
        attacker: CellId,
        target: CellId,
    },

    PopulationIntroduced {
        tick: u64,
        cell_type: String,
        count: usize,
    },

    ScenarioEventExecuted {
        tick: u64,
        event_type: String,
        details: serde_json::Value,
    },
}

impl Event {
    pub fn tick(&self) -> u64 {
        match self {
            Event::Division { tick, .. } => *tick,
            Event::Removal { tick, .. } => *tick,
            Event::DeathTriggered { tick, .. } => *tick,
            Event::Attached { tick, .. } => *tick,
            Event::Detached { tick, .. } => *tick,
            Event::Kill { tick, .. } => *tick,
            Event::PopulationIntroduced { tick, .. } => *tick,
            Event::ScenarioEventExecuted { tick, .. } => *tick,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Division { .. } => "Division",
            Event::Removal { .. } => "Removal",
            Event::DeathTriggered { .. } => "DeathTriggered",
            Event::Attached { .. } => "Attached",
            Event::Detached { .. } => "Detached",
            Event::Kill { .. } => "Kill",
            Event::PopulationIntroduced { .. } => "PopulationIntroduced",
            Event::ScenarioEventExecuted { .. } => "ScenarioEventExecuted",
        }
    }

    /// Cells this event concerns
    pub fn cells(&self) -> Vec<CellId> {
        match self {
            Event::Division { parent, daughter, .. } => vec![*parent, *daughter],
            Event::Removal { cell, .. } => vec![*cell],
            Event::DeathTriggered { cell, .. } => vec![*cell],
            Event::Attached { initiator, target, .. } => vec![*initiator, *target],
            Event::Detached { initiator, target, .. } => vec![*initiator, *target],
            Event::Kill { attacker, target, .. } => vec![*attacker, *target],
            _ => Vec::new(),
        }
    }
}

/// Append-only event store with simple queries
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_cell(&self, cell: CellId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.cells().contains(&cell))
            .collect()
    }

    /// Count events of a type logged after `tick` (exclusive)
    pub fn count_since(&self, event_type: &str, tick: Option<u64>) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .filter(|e| tick.map_or(true, |t| e.tick() > t))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
