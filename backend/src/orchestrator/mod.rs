//! Orchestrator - main simulation loop
//!
//! Implements the fixed-step tick loop integrating all simulation components.
//!
//! See `engine.rs` for the loop and `checkpoint.rs` for save/restore.

pub mod checkpoint;
pub mod engine;

// Re-export main types for convenience
pub use engine::{ReportRow, Simulation, SimulationConfig, TickResult};

// Re-export checkpoint types
pub use checkpoint::{compute_config_hash, CellSnapshot, CellTypeSnapshot, StateSnapshot};
