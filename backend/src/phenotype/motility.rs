//! Migration and mechanics parameters

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::rng::SharedRng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motility {
    pub is_motile: bool,
    /// Mean time between direction changes, min
    pub persistence_time: f64,
    /// µm/min
    pub migration_speed: f64,
    pub migration_bias_direction: DVec3,
    /// 0 = pure random walk, 1 = fully biased
    pub migration_bias: f64,
    pub restrict_to_2d: bool,
    pub motility_vector: DVec3,
}

impl Default for Motility {
    fn default() -> Self {
        Self {
            is_motile: false,
            persistence_time: 1.0,
            migration_speed: 1.0,
            migration_bias_direction: DVec3::ZERO,
            migration_bias: 0.0,
            restrict_to_2d: false,
            motility_vector: DVec3::ZERO,
        }
    }
}

impl Motility {
    /// Possibly resample the motility vector
    ///
    /// A new direction is drawn with probability `dt / persistence_time`,
    /// or always when the persistence time is shorter than a step.
    pub fn update_vector(&mut self, dt: f64, rng: &SharedRng) {
        if !self.is_motile {
            self.motility_vector = DVec3::ZERO;
            return;
        }
        let resample = self.persistence_time < dt || rng.uniform() < dt / self.persistence_time;
        if !resample {
            return;
        }

        let random = if self.restrict_to_2d {
            rng.unit_circle()
        } else {
            rng.unit_sphere()
        };
        let direction = (self.migration_bias * self.migration_bias_direction
            + (1.0 - self.migration_bias) * random)
            .normalize_or_zero();
        self.motility_vector = self.migration_speed * direction;
    }
}

/// Adhesion/repulsion coefficients consumed by the mechanics collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mechanics {
    pub cell_cell_adhesion_strength: f64,
    pub cell_bm_adhesion_strength: f64,
    pub cell_cell_repulsion_strength: f64,
    pub cell_bm_repulsion_strength: f64,
    /// Adhesion reach as a multiple of the radius
    pub relative_maximum_adhesion_distance: f64,
}

impl Default for Mechanics {
    fn default() -> Self {
        Self {
            cell_cell_adhesion_strength: 0.4,
            cell_bm_adhesion_strength: 4.0,
            cell_cell_repulsion_strength: 10.0,
            cell_bm_repulsion_strength: 10.0,
            relative_maximum_adhesion_distance: 1.25,
        }
    }
}
