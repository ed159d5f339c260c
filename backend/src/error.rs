//! Simulation error types
//!
//! Three families of failure exist:
//! - configuration errors (unknown phase, link, field, variable, death model):
//!   raised during setup, before the loop starts
//! - numeric precision violations: a per-tick probability above 1 is
//!   surfaced, never clamped
//! - snapshot/serialization errors for checkpoint restore

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Phase not found in graph '{graph}': {phase}")]
    PhaseNotFound { graph: String, phase: String },

    #[error("No link {from} -> {to} in graph '{graph}'")]
    LinkNotFound {
        graph: String,
        from: usize,
        to: usize,
    },

    #[error("Phase graph not found: {0}")]
    PhaseGraphNotFound(String),

    #[error("Death model not found: {0}")]
    DeathModelNotFound(String),

    #[error("Density not found in microenvironment: {0}")]
    DensityNotFound(String),

    #[error("Custom variable not found: {0}")]
    CustomVariableNotFound(String),

    #[error("Cell type not found: {0}")]
    CellTypeNotFound(String),

    #[error("Cell not found")]
    CellNotFound,

    #[error("Probability out of range for {what}: {probability} (reduce dt)")]
    ProbabilityOutOfRange { what: &'static str, probability: f64 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config mismatch: snapshot hash {expected}, config hash {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}
