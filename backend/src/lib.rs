//! Phenocell Core - Rust Engine
//!
//! Agent-based multicellular simulation: each cell carries a phenotype
//! (cycle, death, volume, secretion, motility) and a set of hook rules,
//! advanced on a fixed time step against external chemical fields. Ships
//! with a tumor-immune competition model.
//!
//! # Architecture
//!
//! - **core**: Time management
//! - **phenotype**: Phase graphs, competing death models, volume, secretion, motility
//! - **models**: Cells, the cell arena, cell type definitions, event log
//! - **environment**: Field, neighbor and motion collaborators
//! - **interaction**: Attachment protocol and kill/attach probabilities
//! - **rules**: Hook rules, including the tumor-immune model
//! - **events**: Scheduled scenario events
//! - **orchestrator**: Main simulation loop and checkpoints
//! - **rng**: Seeded random number generation
//!
//! # Critical Invariants
//!
//! 1. A dead cell never becomes alive again
//! 2. Attachment is always mirrored between the two cells
//! 3. The population only changes size in the sweep after the cell pass
//! 4. Per-tick probabilities above 1 are errors, never clamped

// Module declarations
pub mod core;
pub mod environment;
pub mod error;
pub mod events;
pub mod interaction;
pub mod models;
pub mod orchestrator;
pub mod phenotype;
pub mod rng;
pub mod rules;

// Re-exports for convenience
pub use crate::core::time::SimulationClock;
pub use error::SimulationError;
pub use events::{EventSchedule, ScenarioEvent, ScheduledEvent};
pub use models::{Cell, CellArena, CellDefinition, CellDefinitions, CellId, Event, EventLog};
pub use orchestrator::{ReportRow, Simulation, SimulationConfig, StateSnapshot, TickResult};
pub use phenotype::{Phenotype, PhaseGraph, PhaseGraphBuilder, PhaseGraphLibrary};
pub use rng::{RngManager, SharedRng};
pub use rules::cancer_immune::CancerImmuneOptions;
pub use rules::{CellRule, RuleContext};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn phenocell_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::PySimulation>()?;
    Ok(())
}
