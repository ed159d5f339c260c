//! Checkpoint - Save/Load Simulation State
//!
//! Serializes the complete simulation state to JSON for pause/resume.
//!
//! # Critical Invariants
//!
//! - **Config Matching**: a snapshot only restores under a config with the
//!   same canonical hash
//! - **Adjacency Integrity**: attachments are stored as snapshot indices and
//!   must be mirrored
//! - **Shared Structure**: phase graphs and hooks are never serialized; they
//!   are rebuilt from the graph library and the cell definitions

use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::core::time::SimulationClock;
use crate::environment::{
    EulerIntegrator, Microenvironment, MotionIntegrator, NeighborQuery, RadiusNeighbors,
    WellMixedMicroenvironment,
};
use crate::error::SimulationError;
use crate::models::{
    Cell, CellDefinition, CellDefinitions, CellFunctions, CellId, CellState, CustomData,
    CustomVariable,
};
use crate::orchestrator::engine::{ReportRow, ReportState, Simulation, SimulationConfig};
use crate::phenotype::{
    CellParameters, CycleState, Mechanics, Motility, PhaseGraphLibrary, Secretion, Volume,
};
use crate::rng::SharedRng;
use crate::rules::cancer_immune;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete simulation state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub run_id: Uuid,

    pub current_tick: u64,

    /// Generator state at the tick boundary
    pub rng_state: u64,

    /// Per scenario event next due time (`None` once fired for good)
    pub scenario_next_due: Vec<Option<f64>>,

    /// Flattened field values, as produced by the microenvironment
    pub field_values: Vec<f64>,

    /// Type templates as changed by scenario events
    pub cell_types: Vec<CellTypeSnapshot>,

    pub cells: Vec<CellSnapshot>,

    pub report: Vec<ReportRow>,
    pub next_output_time: f64,
    pub output_interval: f64,
    pub divisions_since_output: usize,
    pub deaths_since_output: usize,

    /// SHA256 hash of the config (for validation)
    pub config_hash: String,
}

/// Mutable part of a cell type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTypeSnapshot {
    pub name: String,
    pub death_rates: Vec<f64>,
    pub custom_variables: Vec<CustomVariable>,
}

impl CellTypeSnapshot {
    fn capture(definition: &CellDefinition) -> Result<Self, SimulationError> {
        let death = &definition.phenotype.death;
        Ok(Self {
            name: definition.name.clone(),
            death_rates: (0..death.models().len())
                .map(|i| death.rate(i))
                .collect::<Result<Vec<_>, _>>()?,
            custom_variables: definition.custom_variables().to_vec(),
        })
    }

    fn apply(&self, definitions: &mut CellDefinitions) -> Result<(), SimulationError> {
        let definition = definitions.find_mut(&self.name)?;
        for (i, rate) in self.death_rates.iter().enumerate() {
            definition.phenotype.death.set_rate(i, *rate)?;
        }
        for saved in &self.custom_variables {
            let variable = definition.custom_variable_mut(&saved.name)?;
            variable.value = saved.value;
            variable.std_dev = saved.std_dev;
        }
        Ok(())
    }
}

/// Cell state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub cell_type: String,
    pub position: DVec3,
    pub velocity: DVec3,

    pub cycle_graph: String,
    pub phase: usize,
    pub elapsed_time_in_phase: f64,
    pub transition_rates: Vec<Vec<f64>>,

    pub death_rates: Vec<f64>,
    pub dead: bool,
    pub death_model: Option<usize>,

    pub flagged_for_division: bool,
    pub flagged_for_removal: bool,
    pub volume: Volume,
    pub mechanics: Mechanics,
    pub motility: Motility,
    pub secretion: Secretion,
    pub parameters: CellParameters,

    pub custom_data: Vec<f64>,

    /// Partners as indices into `StateSnapshot::cells`
    pub attached: Vec<usize>,

    /// Which hook slots are bound, in `CellFunctions` slot order
    pub hooks: [bool; 5],
}

impl CellSnapshot {
    fn capture(
        cell: &Cell,
        index_of: impl Fn(CellId) -> Option<usize>,
    ) -> Result<Self, SimulationError> {
        let phenotype = &cell.phenotype;
        let attached = cell
            .state
            .attached()
            .iter()
            .map(|id| index_of(*id).ok_or(SimulationError::CellNotFound))
            .collect::<Result<Vec<_>, _>>()?;
        let death_rates = (0..phenotype.death.models().len())
            .map(|i| phenotype.death.rate(i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cell_type: cell.type_name.to_string(),
            position: cell.position,
            velocity: cell.velocity,
            cycle_graph: phenotype.cycle.graph().name().to_string(),
            phase: phenotype.cycle.current_phase_index(),
            elapsed_time_in_phase: phenotype.cycle.elapsed_time_in_phase(),
            transition_rates: phenotype.cycle.rates().to_vec(),
            death_rates,
            dead: phenotype.death.is_dead(),
            death_model: phenotype.death.active_index(),
            flagged_for_division: phenotype.flagged_for_division,
            flagged_for_removal: phenotype.flagged_for_removal,
            volume: phenotype.volume.clone(),
            mechanics: phenotype.mechanics.clone(),
            motility: phenotype.motility.clone(),
            secretion: phenotype.secretion.clone(),
            parameters: cell.parameters.clone(),
            custom_data: cell.custom_data.values().to_vec(),
            attached,
            hooks: cell.functions.bound_names().map(|name| name.is_some()),
        })
    }

    fn rebuild(
        &self,
        definitions: &CellDefinitions,
        library: &PhaseGraphLibrary,
    ) -> Result<Cell, SimulationError> {
        let definition = definitions.find(&self.cell_type)?;

        let mut phenotype = definition.phenotype.clone();
        phenotype.cycle = CycleState::restore(
            library.get(&self.cycle_graph)?,
            self.phase,
            self.elapsed_time_in_phase,
            self.transition_rates.clone(),
        )?;
        if self.death_rates.len() != phenotype.death.models().len() {
            return Err(SimulationError::Serialization(format!(
                "{} death rates for a type with {} models",
                self.death_rates.len(),
                phenotype.death.models().len()
            )));
        }
        for (i, rate) in self.death_rates.iter().enumerate() {
            phenotype.death.set_rate(i, *rate)?;
        }
        phenotype.death.restore_state(self.dead, self.death_model)?;
        phenotype.flagged_for_division = self.flagged_for_division;
        phenotype.flagged_for_removal = self.flagged_for_removal;
        phenotype.volume = self.volume.clone();
        phenotype.geometry.update(&phenotype.volume);
        phenotype.mechanics = self.mechanics.clone();
        phenotype.motility = self.motility.clone();
        phenotype.secretion = self.secretion.clone();

        let template = &definition.functions;
        let slots = [
            &template.update_phenotype,
            &template.update_migration_bias,
            &template.custom_rule,
            &template.update_velocity,
            &template.set_orientation,
        ];
        let mut bound = Vec::with_capacity(slots.len());
        for (slot, wanted) in slots.into_iter().zip(self.hooks) {
            match (wanted, slot) {
                (false, _) => bound.push(None),
                (true, Some(rule)) => bound.push(Some(Arc::clone(rule))),
                (true, None) => {
                    return Err(SimulationError::Serialization(format!(
                        "hook bound in snapshot but not on type '{}'",
                        definition.name
                    )))
                }
            }
        }
        let mut bound = bound.into_iter();
        let functions = CellFunctions {
            update_phenotype: bound.next().flatten(),
            update_migration_bias: bound.next().flatten(),
            custom_rule: bound.next().flatten(),
            update_velocity: bound.next().flatten(),
            set_orientation: bound.next().flatten(),
        };

        Ok(Cell {
            id: CellId::default(),
            type_index: definition.type_index,
            type_name: Arc::from(definition.name.as_str()),
            position: self.position,
            velocity: self.velocity,
            phenotype,
            custom_data: CustomData::new(
                definition.custom_variable_names(),
                self.custom_data.clone(),
            )?,
            parameters: self.parameters.clone(),
            functions,
            state: CellState::default(),
        })
    }
}

impl StateSnapshot {
    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string(self)
            .map_err(|e| {
                SimulationError::Serialization(format!("Snapshot serialization failed: {}", e))
            })
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Snapshot parse failed: {}", e)))
    }
}

// ============================================================================
// Save / Restore
// ============================================================================

impl Simulation {
    /// Capture the state at the current tick boundary
    pub fn save_state(&self) -> Result<StateSnapshot, SimulationError> {
        let cells = self
            .cells
            .iter()
            .map(|cell| CellSnapshot::capture(cell, |id| self.cells.index_of(id)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StateSnapshot {
            run_id: self.run_id,
            current_tick: self.clock.current_tick(),
            rng_state: self.rng.state(),
            scenario_next_due: self.scenario.next_due().to_vec(),
            field_values: self.environment.snapshot(),
            cell_types: self
                .definitions
                .iter()
                .map(CellTypeSnapshot::capture)
                .collect::<Result<Vec<_>, _>>()?,
            cells,
            report: self.report.clone(),
            next_output_time: self.report_state.next_output_time,
            output_interval: self.report_state.output_interval,
            divisions_since_output: self.report_state.divisions_since_output,
            deaths_since_output: self.report_state.deaths_since_output,
            config_hash: compute_config_hash(&self.config)?,
        })
    }

    /// Resume from `snapshot` with the reference collaborators
    pub fn restore(
        config: SimulationConfig,
        snapshot: &StateSnapshot,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let environment = WellMixedMicroenvironment::new(
            cancer_immune::default_fields(&config.model),
            config.model.domain_half_width,
        )?;
        let neighbors = RadiusNeighbors::new(config.neighbor_bin_size)?;
        Self::restore_with_components(
            config,
            snapshot,
            Box::new(environment),
            Box::new(neighbors),
            Box::new(EulerIntegrator),
        )
    }

    pub fn restore_with_components(
        config: SimulationConfig,
        snapshot: &StateSnapshot,
        mut environment: Box<dyn Microenvironment>,
        neighbors: Box<dyn NeighborQuery>,
        integrator: Box<dyn MotionIntegrator>,
    ) -> Result<Self, SimulationError> {
        let actual = compute_config_hash(&config)?;
        if actual != snapshot.config_hash {
            return Err(SimulationError::ConfigMismatch {
                expected: snapshot.config_hash.clone(),
                actual,
            });
        }
        validate_snapshot(snapshot)?;

        environment.restore(&snapshot.field_values)?;
        let mut sim = Simulation::assemble(config, environment, neighbors, integrator)?;
        sim.run_id = snapshot.run_id;
        sim.clock =
            SimulationClock::at_tick(sim.config.dt, sim.config.t_max, snapshot.current_tick);
        sim.rng = SharedRng::new(snapshot.rng_state);
        sim.scenario.restore_next_due(snapshot.scenario_next_due.clone())?;
        for cell_type in &snapshot.cell_types {
            cell_type.apply(&mut sim.definitions)?;
        }
        sim.report = snapshot.report.clone();
        sim.report_state = ReportState {
            next_output_time: snapshot.next_output_time,
            output_interval: snapshot.output_interval,
            divisions_since_output: snapshot.divisions_since_output,
            deaths_since_output: snapshot.deaths_since_output,
        };

        let mut ids = Vec::with_capacity(snapshot.cells.len());
        for cell in &snapshot.cells {
            let cell = cell.rebuild(&sim.definitions, &sim.library)?;
            ids.push(sim.cells.insert(cell));
        }
        // lists keep their snapshot order; kills target the first partner
        for (i, cell) in snapshot.cells.iter().enumerate() {
            if let Some(restored) = sim.cells.get_mut(ids[i]) {
                for &j in &cell.attached {
                    restored.state.attach(ids[j]);
                }
            }
        }

        info!(
            run_id = %sim.run_id,
            tick = snapshot.current_tick,
            cells = sim.cells.len(),
            "simulation restored"
        );
        Ok(sim)
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::Serialization(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate snapshot integrity
///
/// Checks that every attachment index is in range, not a self-reference,
/// and mirrored by the partner.
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<(), SimulationError> {
    let n = snapshot.cells.len();
    for (i, cell) in snapshot.cells.iter().enumerate() {
        for &j in &cell.attached {
            if j >= n || j == i {
                return Err(SimulationError::Serialization(format!(
                    "cell {} has invalid attachment index {}",
                    i, j
                )));
            }
            if !snapshot.cells[j].attached.contains(&i) {
                return Err(SimulationError::Serialization(format!(
                    "attachment {} -> {} is not mirrored",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let hash1 = compute_config_hash(&SimulationConfig::default()).unwrap();
        let hash2 = compute_config_hash(&SimulationConfig::default()).unwrap();
        assert_eq!(hash1, hash2, "Same config should produce same hash");
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let config2 = SimulationConfig {
            rng_seed: 43,
            ..SimulationConfig::default()
        };
        assert_ne!(
            compute_config_hash(&SimulationConfig::default()).unwrap(),
            compute_config_hash(&config2).unwrap(),
            "Different configs should produce different hashes"
        );
    }

    #[test]
    fn test_validate_rejects_unmirrored_attachment() {
        let config = SimulationConfig {
            seed_tissue: false,
            threads: 1,
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        sim.spawn_cell(cancer_immune::CANCER_CELL, DVec3::ZERO).unwrap();
        sim.spawn_cell(cancer_immune::IMMUNE_CELL, DVec3::X * 10.0).unwrap();

        let mut snapshot = sim.save_state().unwrap();
        assert!(validate_snapshot(&snapshot).is_ok());
        snapshot.cells[0].attached.push(1);
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(SimulationError::Serialization(_))
        ));
    }
}
