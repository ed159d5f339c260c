//! Chemical field collaborator
//!
//! [`Microenvironment`] is the narrow interface the phenotype engine uses to
//! read concentrations and gradients and to apply secretion/uptake flux.
//! [`WellMixedMicroenvironment`] is a single-compartment reference: each
//! field is spatially uniform, decays, and is optionally pinned to a
//! Dirichlet value. Flux from the parallel pass accumulates in a locked
//! buffer and is folded in at the next solver step.

use std::fmt;

use glam::DVec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

pub trait Microenvironment: Send + Sync + fmt::Debug {
    fn density_names(&self) -> &[String];

    fn find_density_index(&self, name: &str) -> Result<usize, SimulationError> {
        self.density_names()
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SimulationError::DensityNotFound(name.to_string()))
    }

    /// Volume of the voxel containing a cell, µm³
    fn voxel_volume(&self) -> f64;

    fn density_at(&self, position: DVec3, index: usize) -> f64;

    fn gradient_at(&self, position: DVec3, index: usize) -> DVec3;

    /// Thread-safe flux application from the agent pass
    fn add_to_density(&self, position: DVec3, index: usize, delta: f64);

    /// Advance transport by `dt`
    fn simulate_diffusion_decay(&mut self, dt: f64);

    fn compute_gradients(&mut self) {}

    /// Flat field state for checkpoints
    fn snapshot(&self) -> Vec<f64>;

    fn restore(&mut self, values: &[f64]) -> Result<(), SimulationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub initial_value: f64,
    #[serde(default)]
    pub diffusion_coefficient: f64,
    #[serde(default)]
    pub decay_rate: f64,
    /// Value the field is held at, if any
    #[serde(default)]
    pub dirichlet_value: Option<f64>,
}

pub struct WellMixedMicroenvironment {
    names: Vec<String>,
    fields: Vec<FieldConfig>,
    densities: Vec<f64>,
    pending: Mutex<Vec<f64>>,
    volume: f64,
}

impl WellMixedMicroenvironment {
    /// Cube of half-width `half_width` holding `fields`
    pub fn new(fields: Vec<FieldConfig>, half_width: f64) -> Result<Self, SimulationError> {
        if half_width <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "domain half-width must be positive".to_string(),
            ));
        }
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(SimulationError::InvalidConfig(format!("duplicate field '{}'", name)));
            }
        }
        let densities = fields
            .iter()
            .map(|f| f.dirichlet_value.unwrap_or(f.initial_value))
            .collect();
        let pending = Mutex::new(vec![0.0; fields.len()]);
        Ok(Self {
            names,
            fields,
            densities,
            pending,
            volume: (2.0 * half_width).powi(3),
        })
    }

    pub fn fields(&self) -> &[FieldConfig] {
        &self.fields
    }

    pub fn densities(&self) -> &[f64] {
        &self.densities
    }
}

impl fmt::Debug for WellMixedMicroenvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WellMixedMicroenvironment")
            .field("names", &self.names)
            .field("densities", &self.densities)
            .field("volume", &self.volume)
            .finish()
    }
}

impl Microenvironment for WellMixedMicroenvironment {
    fn density_names(&self) -> &[String] {
        &self.names
    }

    fn voxel_volume(&self) -> f64 {
        self.volume
    }

    fn density_at(&self, _position: DVec3, index: usize) -> f64 {
        self.densities.get(index).copied().unwrap_or(0.0)
    }

    fn gradient_at(&self, _position: DVec3, _index: usize) -> DVec3 {
        DVec3::ZERO
    }

    fn add_to_density(&self, _position: DVec3, index: usize, delta: f64) {
        if let Some(slot) = self.pending.lock().get_mut(index) {
            *slot += delta;
        }
    }

    fn simulate_diffusion_decay(&mut self, dt: f64) {
        let pending = self.pending.get_mut();
        for (i, field) in self.fields.iter().enumerate() {
            let mut rho = (self.densities[i] + pending[i]).max(0.0);
            rho /= 1.0 + dt * field.decay_rate;
            if let Some(value) = field.dirichlet_value {
                rho = value;
            }
            self.densities[i] = rho;
            pending[i] = 0.0;
        }
    }

    /// Densities followed by flux not yet applied
    fn snapshot(&self) -> Vec<f64> {
        let mut values = self.densities.clone();
        values.extend(self.pending.lock().iter().copied());
        values
    }

    fn restore(&mut self, values: &[f64]) -> Result<(), SimulationError> {
        let n = self.densities.len();
        if values.len() != 2 * n {
            return Err(SimulationError::Serialization(format!(
                "expected {} field values, found {}",
                2 * n,
                values.len()
            )));
        }
        self.densities.copy_from_slice(&values[..n]);
        self.pending.get_mut().copy_from_slice(&values[n..]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<FieldConfig> {
        vec![
            FieldConfig {
                name: "oxygen".to_string(),
                units: "mmHg".to_string(),
                initial_value: 38.0,
                diffusion_coefficient: 1e5,
                decay_rate: 0.1,
                dirichlet_value: Some(38.0),
            },
            FieldConfig {
                name: "signal".to_string(),
                units: "dimensionless".to_string(),
                initial_value: 0.0,
                diffusion_coefficient: 1e3,
                decay_rate: 0.5,
                dirichlet_value: None,
            },
        ]
    }

    #[test]
    fn test_flux_applied_on_next_step() {
        let mut env = WellMixedMicroenvironment::new(fields(), 10.0).unwrap();
        env.add_to_density(DVec3::ZERO, 1, 3.0);
        assert_eq!(env.density_at(DVec3::ZERO, 1), 0.0);

        env.simulate_diffusion_decay(1.0);
        assert!((env.density_at(DVec3::ZERO, 1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_dirichlet_field_is_pinned() {
        let mut env = WellMixedMicroenvironment::new(fields(), 10.0).unwrap();
        env.add_to_density(DVec3::ZERO, 0, -20.0);
        env.simulate_diffusion_decay(1.0);
        assert_eq!(env.density_at(DVec3::ZERO, 0), 38.0);
    }

    #[test]
    fn test_find_density_index() {
        let env = WellMixedMicroenvironment::new(fields(), 10.0).unwrap();
        assert_eq!(env.find_density_index("signal").unwrap(), 1);
        assert!(matches!(
            env.find_density_index("glucose"),
            Err(SimulationError::DensityNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut f = fields();
        f[1].name = "oxygen".to_string();
        assert!(WellMixedMicroenvironment::new(f, 10.0).is_err());
    }

    #[test]
    fn test_snapshot_carries_pending_flux() {
        let env = WellMixedMicroenvironment::new(fields(), 10.0).unwrap();
        env.add_to_density(DVec3::ZERO, 1, 3.0);
        let values = env.snapshot();
        assert_eq!(values, vec![38.0, 0.0, 0.0, 3.0]);

        let mut restored = WellMixedMicroenvironment::new(fields(), 10.0).unwrap();
        restored.restore(&values).unwrap();
        restored.simulate_diffusion_decay(1.0);
        assert!((restored.density_at(DVec3::ZERO, 1) - 2.0).abs() < 1e-12);
        assert!(restored.restore(&values[..2]).is_err());
    }
}
