//! Domain models for the cell population

pub mod arena;
pub mod cell;
pub mod definition;
pub mod event;

// Re-exports
pub use arena::{CellArena, CellView, PopulationView};
pub use cell::{Cell, CellFunctions, CellId, CellState, CustomData};
pub use definition::{CellDefinition, CellDefinitions, CustomVariable};
pub use event::{Event, EventLog};
