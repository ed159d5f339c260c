//! Scenario events: scheduled changes to a running simulation

pub mod handler;
pub mod types;

pub use handler::{ExecutionSummary, ScenarioContext, ScenarioEventHandler};
pub use types::{EventSchedule, ScenarioEvent, ScheduledEvent};
