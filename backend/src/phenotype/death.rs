//! Competing death processes
//!
//! Each registered model is an independent hazard. The registry draws them
//! in registration order once per tick and commits the first success, so
//! simultaneous triggers resolve deterministically to the earliest
//! registered model. Once `dead` is set it never reverts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::phenotype::cycle::PhaseGraph;
use crate::rng::SharedRng;

/// Volume dynamics applied while a death model is active
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathParameters {
    pub unlysed_fluid_change_rate: f64,
    pub lysed_fluid_change_rate: f64,
    pub cytoplasmic_biomass_change_rate: f64,
    pub nuclear_biomass_change_rate: f64,
    pub calcification_rate: f64,
    pub relative_rupture_volume: f64,
}

impl DeathParameters {
    pub fn apoptosis() -> Self {
        Self {
            unlysed_fluid_change_rate: 3.0 / 60.0,
            lysed_fluid_change_rate: 0.0,
            cytoplasmic_biomass_change_rate: 1.0 / 60.0,
            nuclear_biomass_change_rate: 0.35 / 60.0,
            calcification_rate: 0.0,
            relative_rupture_volume: 2.0,
        }
    }

    pub fn necrosis() -> Self {
        Self {
            unlysed_fluid_change_rate: 0.67 / 60.0,
            lysed_fluid_change_rate: 0.05 / 60.0,
            cytoplasmic_biomass_change_rate: 0.0032 / 60.0,
            nuclear_biomass_change_rate: 0.013 / 60.0,
            calcification_rate: 0.0042 / 60.0,
            relative_rupture_volume: 2.0,
        }
    }
}

impl Default for DeathParameters {
    fn default() -> Self {
        Self::apoptosis()
    }
}

/// One registered death process
#[derive(Debug, Clone)]
pub struct DeathModel {
    pub name: String,
    /// Hazard, 1/min
    pub rate: f64,
    pub graph: Arc<PhaseGraph>,
    pub parameters: DeathParameters,
}

#[derive(Debug, Clone, Default)]
pub struct DeathRegistry {
    models: Vec<DeathModel>,
    dead: bool,
    active_index: Option<usize>,
}

impl DeathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model; its name is the graph's name
    pub fn add_model(
        &mut self,
        rate: f64,
        graph: Arc<PhaseGraph>,
        parameters: DeathParameters,
    ) -> usize {
        self.models.push(DeathModel {
            name: graph.name().to_string(),
            rate,
            graph,
            parameters,
        });
        self.models.len() - 1
    }

    pub fn models(&self) -> &[DeathModel] {
        &self.models
    }

    pub fn model(&self, index: usize) -> Option<&DeathModel> {
        self.models.get(index)
    }

    pub fn find_model_index(&self, name: &str) -> Result<usize, SimulationError> {
        self.models
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| SimulationError::DeathModelNotFound(name.to_string()))
    }

    /// Look up a model by its graph code
    pub fn find_model_index_by_code(&self, code: i32) -> Result<usize, SimulationError> {
        self.models
            .iter()
            .position(|m| m.graph.code() == code)
            .ok_or_else(|| SimulationError::DeathModelNotFound(format!("code {}", code)))
    }

    pub fn rate(&self, index: usize) -> Result<f64, SimulationError> {
        self.models
            .get(index)
            .map(|m| m.rate)
            .ok_or_else(|| SimulationError::DeathModelNotFound(format!("index {}", index)))
    }

    pub fn set_rate(&mut self, index: usize, rate: f64) -> Result<(), SimulationError> {
        let model = self
            .models
            .get_mut(index)
            .ok_or_else(|| SimulationError::DeathModelNotFound(format!("index {}", index)))?;
        model.rate = rate;
        Ok(())
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn current_model(&self) -> Option<&DeathModel> {
        self.active_index.and_then(|i| self.models.get(i))
    }

    /// Parameters of the active model, or the defaults while alive
    pub fn current_parameters(&self) -> DeathParameters {
        self.current_model()
            .map(|m| m.parameters)
            .unwrap_or_default()
    }

    /// Draw every hazard in order; returns the committed model index
    ///
    /// No-op once dead. The caller is responsible for rebinding the cycle
    /// (see [`Phenotype::check_for_death`](crate::phenotype::Phenotype::check_for_death)).
    pub fn check_for_death(
        &mut self,
        dt: f64,
        rng: &SharedRng,
    ) -> Result<Option<usize>, SimulationError> {
        if self.dead {
            return Ok(None);
        }
        for index in 0..self.models.len() {
            if rng.bernoulli(self.models[index].rate * dt, "death")? {
                self.trigger(index)?;
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Force `index` active; returns `false` if already dead
    pub(crate) fn trigger(&mut self, index: usize) -> Result<bool, SimulationError> {
        if index >= self.models.len() {
            return Err(SimulationError::DeathModelNotFound(format!("index {}", index)));
        }
        if self.dead {
            return Ok(false);
        }
        self.dead = true;
        self.active_index = Some(index);
        Ok(true)
    }

    /// Restore checkpointed flags
    pub(crate) fn restore_state(
        &mut self,
        dead: bool,
        active_index: Option<usize>,
    ) -> Result<(), SimulationError> {
        if let Some(i) = active_index {
            if i >= self.models.len() {
                return Err(SimulationError::DeathModelNotFound(format!("index {}", i)));
            }
        }
        self.dead = dead;
        self.active_index = active_index;
        Ok(())
    }
}
