//! Per-cell secretion and uptake against named fields
//!
//! Rate vectors are indexed like the bound microenvironment's densities.
//! Field storage belongs to the [`Microenvironment`]; this side only keeps
//! rates and the amount the cell has internalized.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::environment::Microenvironment;
use crate::error::SimulationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secretion {
    density_names: Vec<String>,
    pub secretion_rates: Vec<f64>,
    pub uptake_rates: Vec<f64>,
    pub saturation_densities: Vec<f64>,
    /// Total substrate taken up (negative when net secreting)
    pub internalized: Vec<f64>,
}

impl Secretion {
    pub fn new(density_names: &[String]) -> Self {
        let mut secretion = Self::default();
        secretion.sync_to_microenvironment(density_names);
        secretion
    }

    pub fn density_names(&self) -> &[String] {
        &self.density_names
    }

    /// Resize to `density_names`, keeping rates of fields that still exist
    ///
    /// Matching is by name: surviving fields keep their values in the new
    /// order, new fields start at zero.
    pub fn sync_to_microenvironment(&mut self, density_names: &[String]) {
        let carry = |old: &[f64], names: &[String], name: &String| {
            names
                .iter()
                .position(|n| n == name)
                .and_then(|i| old.get(i).copied())
                .unwrap_or(0.0)
        };
        let old_names = std::mem::take(&mut self.density_names);

        self.secretion_rates = density_names
            .iter()
            .map(|n| carry(&self.secretion_rates, &old_names, n))
            .collect();
        self.uptake_rates = density_names
            .iter()
            .map(|n| carry(&self.uptake_rates, &old_names, n))
            .collect();
        self.saturation_densities = density_names
            .iter()
            .map(|n| carry(&self.saturation_densities, &old_names, n))
            .collect();
        self.internalized = density_names
            .iter()
            .map(|n| carry(&self.internalized, &old_names, n))
            .collect();
        self.density_names = density_names.to_vec();
    }

    pub fn find_index(&self, name: &str) -> Result<usize, SimulationError> {
        self.density_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SimulationError::DensityNotFound(name.to_string()))
    }

    pub fn set_secretion_rate(&mut self, index: usize, rate: f64) -> Result<(), SimulationError> {
        let slot = self
            .secretion_rates
            .get_mut(index)
            .ok_or_else(|| SimulationError::DensityNotFound(format!("index {}", index)))?;
        *slot = rate;
        Ok(())
    }

    pub fn set_all_secretion_to_zero(&mut self) {
        self.secretion_rates.iter_mut().for_each(|r| *r = 0.0);
    }

    pub fn set_all_uptake_to_zero(&mut self) {
        self.uptake_rates.iter_mut().for_each(|r| *r = 0.0);
    }

    /// One implicit exchange step at `position`
    ///
    /// For each field, with `c = dt * cell_volume / voxel_volume`:
    /// `ρ' = (ρ + c·S·ρ*) / (1 + c·(S + U))`. Secretion saturates at ρ*,
    /// uptake never drives the field negative.
    pub fn advance(
        &mut self,
        position: DVec3,
        cell_volume: f64,
        dt: f64,
        env: &dyn Microenvironment,
    ) {
        let voxel_volume = env.voxel_volume();
        if voxel_volume <= 0.0 {
            return;
        }
        let c = dt * cell_volume / voxel_volume;
        for i in 0..self.density_names.len() {
            let s = self.secretion_rates[i];
            let u = self.uptake_rates[i];
            if s == 0.0 && u == 0.0 {
                continue;
            }
            let rho = env.density_at(position, i);
            let updated = (rho + c * s * self.saturation_densities[i]) / (1.0 + c * (s + u));
            let delta = updated - rho;
            env.add_to_density(position, i, delta);
            self.internalized[i] -= delta * voxel_volume;
        }
    }
}
