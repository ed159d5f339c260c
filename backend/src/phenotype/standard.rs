//! Standard live, apoptosis and necrosis models
//!
//! Phase codes are global so the same state (e.g. debris) is recognizable
//! across graphs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::phenotype::cycle::{PhaseGraph, PhaseGraphBuilder};
use crate::phenotype::Phenotype;

pub mod codes {
    pub const LIVE_MODEL: i32 = 5;
    pub const APOPTOSIS_MODEL: i32 = 100;
    pub const NECROSIS_MODEL: i32 = 101;

    pub const LIVE: i32 = 14;
    pub const APOPTOTIC: i32 = 100;
    pub const NECROTIC_SWELLING: i32 = 101;
    pub const NECROTIC_LYSED: i32 = 102;
    pub const DEBRIS: i32 = 103;
}

pub const LIVE: &str = "live";
pub const APOPTOSIS: &str = "apoptosis";
pub const NECROSIS: &str = "necrosis";

/// Base proliferation rate of the live model, 1/min
pub const LIVE_PROLIFERATION_RATE: f64 = 0.0432 / 60.0;
/// Apoptotic dwell time, min
pub const APOPTOSIS_DURATION: f64 = 516.0;
/// Lysed necrotic dwell time, min
pub const NECROSIS_LYSED_DURATION: f64 = 60.0 * 24.0 * 60.0;
const NEAR_INSTANT_RATE: f64 = 9e9;

pub fn live_graph() -> Result<Arc<PhaseGraph>, SimulationError> {
    let mut b = PhaseGraphBuilder::new(LIVE, codes::LIVE_MODEL);
    let live = b.add_phase(codes::LIVE, "Live");
    b.add_link(live, live, LIVE_PROLIFERATION_RATE)?;
    b.set_triggers_division(live, true)?;
    Ok(b.build())
}

pub fn apoptosis_graph() -> Result<Arc<PhaseGraph>, SimulationError> {
    let mut b = PhaseGraphBuilder::new(APOPTOSIS, codes::APOPTOSIS_MODEL);
    let apoptotic = b.add_phase(codes::APOPTOTIC, "Apoptotic");
    let debris = b.add_phase(codes::DEBRIS, "Debris");
    b.add_link(apoptotic, debris, 1.0 / APOPTOSIS_DURATION)?;
    b.set_fixed_duration(apoptotic, debris, true)?
        .set_entry(apoptotic, apoptosis_entry)?
        .set_triggers_removal(debris, true)?;
    Ok(b.build())
}

pub fn necrosis_graph() -> Result<Arc<PhaseGraph>, SimulationError> {
    let mut b = PhaseGraphBuilder::new(NECROSIS, codes::NECROSIS_MODEL);
    let swelling = b.add_phase(codes::NECROTIC_SWELLING, "NecroticSwelling");
    let lysed = b.add_phase(codes::NECROTIC_LYSED, "NecroticLysed");
    let debris = b.add_phase(codes::DEBRIS, "Debris");
    b.add_link(swelling, lysed, NEAR_INSTANT_RATE)?;
    b.add_link(lysed, debris, 1.0 / NECROSIS_LYSED_DURATION)?;
    b.set_fixed_duration(swelling, lysed, true)?
        .set_arrest(swelling, lysed, necrosis_arrest)?
        .set_exit(swelling, lysed, necrosis_lysis)?
        .set_fixed_duration(lysed, debris, true)?
        .set_entry(swelling, necrosis_swelling_entry)?
        .set_triggers_removal(debris, true)?;
    Ok(b.build())
}

/// Shrink everything toward zero with the apoptotic rates
pub fn apoptosis_entry(phenotype: &mut Phenotype, _dt: f64) {
    let parameters = phenotype.death.current_parameters();
    let volume = &mut phenotype.volume;
    volume.target_fluid_fraction = 0.0;
    volume.target_solid_cytoplasmic = 0.0;
    volume.target_solid_nuclear = 0.0;
    volume.target_cytoplasmic_to_nuclear_ratio = 0.0;
    volume.apply_death_parameters(&parameters);
}

/// Swell with water until rupture
pub fn necrosis_swelling_entry(phenotype: &mut Phenotype, _dt: f64) {
    let parameters = phenotype.death.current_parameters();
    let volume = &mut phenotype.volume;
    volume.target_fluid_fraction = 1.0;
    volume.target_solid_cytoplasmic = 0.0;
    volume.target_solid_nuclear = 0.0;
    volume.target_cytoplasmic_to_nuclear_ratio = 0.0;
    volume.apply_death_parameters(&parameters);
}

/// Switch to lysed fluid dynamics; rupture cannot happen twice
pub fn necrosis_lysis(phenotype: &mut Phenotype, _dt: f64) {
    let parameters = phenotype.death.current_parameters();
    let volume = &mut phenotype.volume;
    volume.target_fluid_fraction = 0.0;
    volume.target_solid_cytoplasmic = 0.0;
    volume.target_solid_nuclear = 0.0;
    volume.target_cytoplasmic_to_nuclear_ratio = 0.0;
    volume.apply_death_parameters(&parameters);
    volume.fluid_change_rate = parameters.lysed_fluid_change_rate;
    volume.relative_rupture_volume = NEAR_INSTANT_RATE;
    volume.rupture_volume = NEAR_INSTANT_RATE;
}

/// Swelling holds until the cell reaches its rupture volume
pub fn necrosis_arrest(phenotype: &Phenotype, _dt: f64) -> bool {
    !phenotype.volume.is_ruptured()
}

/// Name → graph registry, used to rebind cells restored from a snapshot
#[derive(Debug, Clone, Default)]
pub struct PhaseGraphLibrary {
    graphs: HashMap<String, Arc<PhaseGraph>>,
}

impl PhaseGraphLibrary {
    pub fn standard() -> Result<Self, SimulationError> {
        let mut library = Self::default();
        library.insert(live_graph()?);
        library.insert(apoptosis_graph()?);
        library.insert(necrosis_graph()?);
        Ok(library)
    }

    pub fn insert(&mut self, graph: Arc<PhaseGraph>) {
        self.graphs.insert(graph.name().to_string(), graph);
    }

    pub fn get(&self, name: &str) -> Result<Arc<PhaseGraph>, SimulationError> {
        self.graphs
            .get(name)
            .cloned()
            .ok_or_else(|| SimulationError::PhaseGraphNotFound(name.to_string()))
    }
}

/// Oxygen thresholds driving proliferation and necrosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellParameters {
    pub o2_proliferation_threshold: f64,
    pub o2_proliferation_saturation: f64,
    pub o2_necrosis_threshold: f64,
    pub o2_necrosis_max: f64,
    /// 1/min
    pub max_necrosis_rate: f64,
}

impl Default for CellParameters {
    fn default() -> Self {
        Self {
            o2_proliferation_threshold: 5.0,
            o2_proliferation_saturation: 38.0,
            o2_necrosis_threshold: 5.0,
            o2_necrosis_max: 2.5,
            max_necrosis_rate: 1.0 / 360.0,
        }
    }
}

impl CellParameters {
    /// Scale proliferation and necrosis to the local oxygen level
    ///
    /// No-op for dead cells. Cells not bound to the live graph keep their
    /// cycle rates.
    pub fn apply_oxygen_response(
        &self,
        phenotype: &mut Phenotype,
        po2: f64,
    ) -> Result<(), SimulationError> {
        if phenotype.is_dead() {
            return Ok(());
        }

        if phenotype.cycle.graph().code() == codes::LIVE_MODEL {
            let multiplier = if po2 < self.o2_proliferation_threshold {
                0.0
            } else if po2 < self.o2_proliferation_saturation {
                (po2 - self.o2_proliferation_threshold)
                    / (self.o2_proliferation_saturation - self.o2_proliferation_threshold)
            } else {
                1.0
            };
            let live = phenotype.cycle.graph().find_phase_index_by_code(codes::LIVE)?;
            let base = phenotype.cycle.graph().base_rate(live, live)?;
            phenotype.cycle.set_transition_rate(live, live, multiplier * base)?;
        }

        let necrosis = phenotype.death.find_model_index_by_code(codes::NECROSIS_MODEL)?;
        let rate = if po2 < self.o2_necrosis_threshold {
            let span = self.o2_necrosis_threshold - self.o2_necrosis_max;
            let m = (self.o2_necrosis_threshold - po2) / span;
            m.min(1.0) * self.max_necrosis_rate
        } else {
            0.0
        };
        phenotype.death.set_rate(necrosis, rate)
    }
}
