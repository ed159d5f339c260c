//! External collaborators consumed through narrow interfaces
//!
//! - [`Microenvironment`]: chemical fields (concentration, gradient, flux)
//! - [`NeighborQuery`]: physical neighbors of a cell
//! - [`MotionIntegrator`]: velocities to positions
//!
//! Each trait ships with a small reference implementation so a run can be
//! driven end to end.

mod field;
mod motion;
mod neighbors;

pub use field::{FieldConfig, Microenvironment, WellMixedMicroenvironment};
pub use motion::{EulerIntegrator, MotionIntegrator};
pub use neighbors::{NeighborQuery, RadiusNeighbors};
