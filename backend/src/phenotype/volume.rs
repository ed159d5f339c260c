//! Compartmental cell volume and derived spherical geometry
//!
//! The four compartments (nuclear/cytoplasmic × solid/fluid) are the state.
//! Totals are recomputed from them after every update and cached for the
//! geometry queries. Units: µm³ and 1/min.

use serde::{Deserialize, Serialize};

use crate::phenotype::death::DeathParameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub total: f64,
    pub solid: f64,
    pub fluid: f64,
    pub fluid_fraction: f64,

    pub nuclear: f64,
    pub nuclear_fluid: f64,
    pub nuclear_solid: f64,

    pub cytoplasmic: f64,
    pub cytoplasmic_fluid: f64,
    pub cytoplasmic_solid: f64,

    pub calcified_fraction: f64,
    pub cytoplasmic_to_nuclear_ratio: f64,

    pub target_solid_cytoplasmic: f64,
    pub target_solid_nuclear: f64,
    pub target_fluid_fraction: f64,
    pub target_cytoplasmic_to_nuclear_ratio: f64,

    pub cytoplasmic_biomass_change_rate: f64,
    pub nuclear_biomass_change_rate: f64,
    pub fluid_change_rate: f64,
    pub calcification_rate: f64,

    pub relative_rupture_volume: f64,
    /// Absolute threshold, fixed at the tick death was triggered
    pub rupture_volume: f64,
}

impl Default for Volume {
    fn default() -> Self {
        let total = 2494.0;
        let fluid_fraction = 0.75;
        let nuclear = 540.0;
        let cytoplasmic = total - nuclear;
        let nuclear_fluid = fluid_fraction * nuclear;
        let nuclear_solid = nuclear - nuclear_fluid;
        let cytoplasmic_fluid = fluid_fraction * cytoplasmic;
        let cytoplasmic_solid = cytoplasmic - cytoplasmic_fluid;
        let relative_rupture_volume = 100.0;

        Self {
            total,
            solid: nuclear_solid + cytoplasmic_solid,
            fluid: nuclear_fluid + cytoplasmic_fluid,
            fluid_fraction,
            nuclear,
            nuclear_fluid,
            nuclear_solid,
            cytoplasmic,
            cytoplasmic_fluid,
            cytoplasmic_solid,
            calcified_fraction: 0.0,
            cytoplasmic_to_nuclear_ratio: cytoplasmic / nuclear,
            target_solid_cytoplasmic: cytoplasmic_solid,
            target_solid_nuclear: nuclear_solid,
            target_fluid_fraction: fluid_fraction,
            target_cytoplasmic_to_nuclear_ratio: cytoplasmic / nuclear,
            cytoplasmic_biomass_change_rate: 0.27 / 60.0,
            nuclear_biomass_change_rate: 0.33 / 60.0,
            fluid_change_rate: 3.0 / 60.0,
            calcification_rate: 0.0,
            relative_rupture_volume,
            rupture_volume: relative_rupture_volume * total,
        }
    }
}

impl Volume {
    /// Relax every compartment toward its target by one step
    pub fn update(&mut self, dt: f64) {
        let target_fluid = self.target_fluid_fraction * self.total;
        self.fluid += dt * self.fluid_change_rate * (target_fluid - self.fluid);
        if self.fluid < 0.0 {
            self.fluid = 0.0;
        }

        self.nuclear_fluid = (self.nuclear / (self.total + 1e-16)) * self.fluid;
        self.cytoplasmic_fluid = self.fluid - self.nuclear_fluid;

        let nuclear_gap = self.target_solid_nuclear - self.nuclear_solid;
        self.nuclear_solid += dt * self.nuclear_biomass_change_rate * nuclear_gap;
        if self.nuclear_solid < 0.0 {
            self.nuclear_solid = 0.0;
        }

        self.target_solid_cytoplasmic =
            self.target_cytoplasmic_to_nuclear_ratio * self.target_solid_nuclear;
        let cytoplasmic_gap = self.target_solid_cytoplasmic - self.cytoplasmic_solid;
        self.cytoplasmic_solid += dt * self.cytoplasmic_biomass_change_rate * cytoplasmic_gap;
        if self.cytoplasmic_solid < 0.0 {
            self.cytoplasmic_solid = 0.0;
        }

        self.solid = self.nuclear_solid + self.cytoplasmic_solid;
        self.nuclear = self.nuclear_solid + self.nuclear_fluid;
        self.cytoplasmic = self.cytoplasmic_solid + self.cytoplasmic_fluid;

        self.calcified_fraction += dt * self.calcification_rate * (1.0 - self.calcified_fraction);

        self.total = self.cytoplasmic + self.nuclear;
        self.fluid_fraction = self.fluid / (1e-16 + self.total);
        self.cytoplasmic_to_nuclear_ratio = self.cytoplasmic / (1e-16 + self.nuclear);
    }

    /// Halve every compartment and target (one daughter's share)
    pub fn divide(&mut self) {
        self.multiply_by_ratio(0.5);
    }

    /// Scale every extensive quantity by `ratio`
    pub fn multiply_by_ratio(&mut self, ratio: f64) {
        self.total *= ratio;
        self.solid *= ratio;
        self.fluid *= ratio;
        self.nuclear *= ratio;
        self.nuclear_fluid *= ratio;
        self.nuclear_solid *= ratio;
        self.cytoplasmic *= ratio;
        self.cytoplasmic_fluid *= ratio;
        self.cytoplasmic_solid *= ratio;
        self.target_solid_cytoplasmic *= ratio;
        self.target_solid_nuclear *= ratio;
        self.rupture_volume *= ratio;
    }

    /// Set the whole volume keeping current fractions
    pub fn set_total(&mut self, total: f64) {
        if self.total > 0.0 {
            self.multiply_by_ratio(total / self.total);
        }
    }

    /// Adopt the change rates of an active death model
    pub fn apply_death_parameters(&mut self, parameters: &DeathParameters) {
        self.cytoplasmic_biomass_change_rate = parameters.cytoplasmic_biomass_change_rate;
        self.nuclear_biomass_change_rate = parameters.nuclear_biomass_change_rate;
        self.fluid_change_rate = parameters.unlysed_fluid_change_rate;
        self.calcification_rate = parameters.calcification_rate;
        self.relative_rupture_volume = parameters.relative_rupture_volume;
        self.rupture_volume = self.relative_rupture_volume * self.total;
    }

    /// Lysis-type rupture check (only meaningful while dead)
    pub fn is_ruptured(&self) -> bool {
        self.total >= self.rupture_volume
    }
}

/// Spherical geometry derived from total volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub radius: f64,
    pub nuclear_radius: f64,
    pub surface_area: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        let mut geometry = Self {
            radius: 0.0,
            nuclear_radius: 0.0,
            surface_area: 0.0,
        };
        geometry.update(&Volume::default());
        geometry
    }
}

impl Geometry {
    pub fn update(&mut self, volume: &Volume) {
        self.radius = sphere_radius(volume.total);
        self.nuclear_radius = sphere_radius(volume.nuclear);
        self.surface_area = 4.0 * std::f64::consts::PI * self.radius * self.radius;
    }
}

/// r = (3V / 4π)^(1/3)
pub fn sphere_radius(volume: f64) -> f64 {
    (0.75 * volume.max(0.0) / std::f64::consts::PI).cbrt()
}
