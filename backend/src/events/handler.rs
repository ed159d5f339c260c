//! Scenario event execution and scheduling
//!
//! This module handles:
//! - Tracking when each event is next due
//! - Executing due events against the population and cell definitions
//! - Logging executions for auditing

use serde_json::json;
use tracing::info;

use crate::core::time::SimulationClock;
use crate::error::SimulationError;
use crate::events::types::{EventSchedule, ScenarioEvent, ScheduledEvent};
use crate::models::{CellArena, CellDefinitions, Event, EventLog};
use crate::rng::SharedRng;
use crate::rules::cancer_immune::{self, CancerImmuneOptions, IMMUNE_CELL};

/// Mutable simulation pieces a scenario event may touch
pub struct ScenarioContext<'a> {
    pub tick: u64,
    pub cells: &'a mut CellArena,
    pub definitions: &'a mut CellDefinitions,
    pub options: &'a CancerImmuneOptions,
    pub rng: &'a SharedRng,
    pub events: &'a mut EventLog,
}

/// What a tick's scenario events did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub cells_introduced: usize,
}

/// Handles scenario event scheduling and execution
#[derive(Debug, Clone)]
pub struct ScenarioEventHandler {
    events: Vec<ScheduledEvent>,
    /// Next due time per event; `None` once exhausted
    next_due: Vec<Option<f64>>,
}

impl ScenarioEventHandler {
    pub fn new(events: Vec<ScheduledEvent>) -> Result<Self, SimulationError> {
        if let Some(bad) = events.iter().find(|e| !e.schedule.is_valid()) {
            return Err(SimulationError::InvalidConfig(format!(
                "invalid schedule for {}: {:?}",
                bad.event.event_type(),
                bad.schedule
            )));
        }
        let next_due = events.iter().map(|e| Some(e.schedule.first_time())).collect();
        Ok(Self { events, next_due })
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    /// Per-event next due times (checkpointed)
    pub fn next_due(&self) -> &[Option<f64>] {
        &self.next_due
    }

    pub fn restore_next_due(&mut self, next_due: Vec<Option<f64>>) -> Result<(), SimulationError> {
        if next_due.len() != self.events.len() {
            return Err(SimulationError::Serialization(format!(
                "scenario state has {} entries, config has {} events",
                next_due.len(),
                self.events.len()
            )));
        }
        self.next_due = next_due;
        Ok(())
    }

    /// Get all events due on the clock's current tick
    pub fn get_due_events(&self, clock: &SimulationClock) -> Vec<&ScenarioEvent> {
        self.events
            .iter()
            .zip(&self.next_due)
            .filter(|(_, due)| EventSchedule::is_due(**due, clock))
            .map(|(scheduled, _)| &scheduled.event)
            .collect()
    }

    /// Execute every due event in configuration order
    ///
    /// A one-time event never fires twice, even if its handler is asked
    /// again on the same tick.
    pub fn execute_due_events(
        &mut self,
        clock: &SimulationClock,
        ctx: &mut ScenarioContext<'_>,
    ) -> Result<ExecutionSummary, SimulationError> {
        let mut summary = ExecutionSummary::default();
        for i in 0..self.events.len() {
            if !EventSchedule::is_due(self.next_due[i], clock) {
                continue;
            }
            self.next_due[i] = self.events[i].schedule.next_after(clock.time());
            summary.cells_introduced += self.events[i].event.execute(ctx)?;
            summary.executed += 1;
        }
        Ok(summary)
    }
}

impl ScenarioEvent {
    /// Execute this event, returning the number of cells it added
    pub fn execute(&self, ctx: &mut ScenarioContext<'_>) -> Result<usize, SimulationError> {
        match self {
            ScenarioEvent::IntroduceImmuneCells { count } => {
                execute_introduce_immune_cells(ctx, *count)
            }
            ScenarioEvent::SetDeathRate { cell_type, model, rate } => {
                execute_set_death_rate(ctx, cell_type, model, *rate).map(|_| 0)
            }
            ScenarioEvent::SetCustomVariable { cell_type, name, value } => {
                execute_set_custom_variable(ctx, cell_type, name, *value).map(|_| 0)
            }
        }
    }
}

// ============================================================================
// Event Execution Functions
// ============================================================================

fn execute_introduce_immune_cells(
    ctx: &mut ScenarioContext<'_>,
    count: Option<usize>,
) -> Result<usize, SimulationError> {
    let count = count.unwrap_or(ctx.options.number_of_immune_cells);
    let added = cancer_immune::introduce_immune_cells(
        ctx.cells,
        ctx.definitions,
        ctx.options,
        count,
        ctx.rng,
    )?;

    ctx.events.log(Event::PopulationIntroduced {
        tick: ctx.tick,
        cell_type: IMMUNE_CELL.to_string(),
        count: added,
    });
    log_scenario_event(ctx, "introduce_immune_cells", json!({ "count": added }));
    Ok(added)
}

fn execute_set_death_rate(
    ctx: &mut ScenarioContext<'_>,
    cell_type: &str,
    model: &str,
    rate: f64,
) -> Result<(), SimulationError> {
    if !(rate.is_finite() && rate >= 0.0) {
        return Err(SimulationError::InvalidConfig(format!(
            "death rate must be non-negative, got {}",
            rate
        )));
    }
    let definition = ctx.definitions.find_mut(cell_type)?;
    let index = definition.phenotype.death.find_model_index(model)?;
    let old_rate = definition.phenotype.death.rate(index)?;
    definition.phenotype.death.set_rate(index, rate)?;
    let type_index = definition.type_index;

    let mut affected = 0usize;
    for cell in ctx.cells.cells_mut() {
        if cell.type_index == type_index && !cell.is_dead() {
            cell.phenotype.death.set_rate(index, rate)?;
            affected += 1;
        }
    }
    info!(cell_type, model, rate, affected, "death rate changed");

    log_scenario_event(
        ctx,
        "set_death_rate",
        json!({
            "cell_type": cell_type,
            "model": model,
            "old_rate": old_rate,
            "new_rate": rate,
            "affected": affected,
        }),
    );
    Ok(())
}

fn execute_set_custom_variable(
    ctx: &mut ScenarioContext<'_>,
    cell_type: &str,
    name: &str,
    value: f64,
) -> Result<(), SimulationError> {
    let definition = ctx.definitions.find_mut(cell_type)?;
    definition.custom_variable_mut(name)?.value = value;
    let type_index = definition.type_index;

    let mut affected = 0usize;
    for cell in ctx.cells.cells_mut() {
        if cell.type_index == type_index && !cell.is_dead() {
            cell.custom_data.set(name, value)?;
            affected += 1;
        }
    }

    log_scenario_event(
        ctx,
        "set_custom_variable",
        json!({
            "cell_type": cell_type,
            "name": name,
            "value": value,
            "affected": affected,
        }),
    );
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn log_scenario_event(ctx: &mut ScenarioContext<'_>, event_type: &str, details: serde_json::Value) {
    ctx.events.log(Event::ScenarioEventExecuted {
        tick: ctx.tick,
        event_type: event_type.to_string(),
        details,
    });
}
