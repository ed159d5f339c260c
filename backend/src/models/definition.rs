//! Cell type templates and the agent factory
//!
//! A new cell is a clone of its definition: phase graphs stay shared, the
//! phenotype is deep-copied and custom variables are sampled per instance.

use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::models::cell::{Cell, CellFunctions, CellId, CellState, CustomData};
use crate::phenotype::{CellParameters, Phenotype};
use crate::rng::SharedRng;

/// Named custom attribute with an optional per-instance spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomVariable {
    pub name: String,
    pub units: String,
    pub value: f64,
    /// Instances draw N(value, std_dev) when positive
    #[serde(default)]
    pub std_dev: f64,
}

#[derive(Debug, Clone)]
pub struct CellDefinition {
    pub name: String,
    pub type_index: usize,
    pub phenotype: Phenotype,
    pub parameters: CellParameters,
    pub functions: CellFunctions,
    custom_variables: Vec<CustomVariable>,
    names: Arc<[String]>,
}

impl CellDefinition {
    pub fn new(name: impl Into<String>, phenotype: Phenotype) -> Self {
        Self {
            name: name.into(),
            type_index: 0,
            phenotype,
            parameters: CellParameters::default(),
            functions: CellFunctions::default(),
            custom_variables: Vec::new(),
            names: Arc::from(Vec::new()),
        }
    }

    /// Add a variable, or overwrite the value of an existing one
    pub fn add_custom_variable(&mut self, name: &str, units: &str, value: f64) -> usize {
        if let Some(i) = self.custom_variables.iter().position(|v| v.name == name) {
            self.custom_variables[i].value = value;
            return i;
        }
        self.custom_variables.push(CustomVariable {
            name: name.to_string(),
            units: units.to_string(),
            value,
            std_dev: 0.0,
        });
        self.names = self.custom_variables.iter().map(|v| v.name.clone()).collect();
        self.custom_variables.len() - 1
    }

    pub fn custom_variables(&self) -> &[CustomVariable] {
        &self.custom_variables
    }

    pub fn custom_variable_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut CustomVariable, SimulationError> {
        self.custom_variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| SimulationError::CustomVariableNotFound(name.to_string()))
    }

    pub fn custom_variable_names(&self) -> Arc<[String]> {
        Arc::clone(&self.names)
    }

    /// Clone this template into a new cell at `position`
    pub fn instantiate(&self, position: DVec3, rng: &SharedRng) -> Result<Cell, SimulationError> {
        let values = self
            .custom_variables
            .iter()
            .map(|v| {
                if v.std_dev > 0.0 {
                    rng.normal(v.value, v.std_dev)
                } else {
                    Ok(v.value)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut phenotype = self.phenotype.clone();
        phenotype.geometry.update(&phenotype.volume);

        Ok(Cell {
            id: CellId::default(),
            type_index: self.type_index,
            type_name: Arc::from(self.name.as_str()),
            position,
            velocity: DVec3::ZERO,
            phenotype,
            custom_data: CustomData::new(Arc::clone(&self.names), values)?,
            parameters: self.parameters.clone(),
            functions: self.functions.clone(),
            state: CellState::default(),
        })
    }
}

/// Registry of cell types by name and type index
#[derive(Debug, Clone, Default)]
pub struct CellDefinitions {
    definitions: Vec<CellDefinition>,
}

impl CellDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition`; its type index becomes its position
    pub fn add(&mut self, mut definition: CellDefinition) -> Result<usize, SimulationError> {
        if self.definitions.iter().any(|d| d.name == definition.name) {
            return Err(SimulationError::InvalidConfig(format!(
                "duplicate cell type '{}'",
                definition.name
            )));
        }
        definition.type_index = self.definitions.len();
        self.definitions.push(definition);
        Ok(self.definitions.len() - 1)
    }

    pub fn find(&self, name: &str) -> Result<&CellDefinition, SimulationError> {
        self.definitions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SimulationError::CellTypeNotFound(name.to_string()))
    }

    pub fn find_mut(&mut self, name: &str) -> Result<&mut CellDefinition, SimulationError> {
        self.definitions
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| SimulationError::CellTypeNotFound(name.to_string()))
    }

    pub fn get(&self, type_index: usize) -> Result<&CellDefinition, SimulationError> {
        self.definitions
            .get(type_index)
            .ok_or_else(|| SimulationError::CellTypeNotFound(format!("type {}", type_index)))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellDefinition> + '_ {
        self.definitions.iter()
    }

    /// Agent factory: new cell of type `name` at `position`
    pub fn create_cell(
        &self,
        name: &str,
        position: DVec3,
        rng: &SharedRng,
    ) -> Result<Cell, SimulationError> {
        self.find(name)?.instantiate(position, rng)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::phenotype::standard;

    pub(crate) fn plain_definition() -> CellDefinition {
        let phenotype = Phenotype::new(standard::live_graph().unwrap());
        let mut definition = CellDefinition::new("plain", phenotype);
        definition.add_custom_variable("oncoprotein", "dimensionless", 1.0);
        definition
    }

    pub(crate) fn plain_cell() -> Cell {
        plain_definition()
            .instantiate(DVec3::ZERO, &SharedRng::new(1))
            .unwrap()
    }

    #[test]
    fn test_instances_share_the_cycle_graph() {
        let definition = plain_definition();
        let rng = SharedRng::new(1);
        let a = definition.instantiate(DVec3::ZERO, &rng).unwrap();
        let b = definition.instantiate(DVec3::X, &rng).unwrap();
        assert!(Arc::ptr_eq(a.phenotype.cycle.graph(), b.phenotype.cycle.graph()));
        assert_eq!(b.position, DVec3::X);
    }

    #[test]
    fn test_custom_variables_sampled_per_instance() {
        let mut definition = plain_definition();
        definition.custom_variable_mut("oncoprotein").unwrap().std_dev = 0.25;
        let rng = SharedRng::new(11);
        let a = definition.instantiate(DVec3::ZERO, &rng).unwrap();
        let b = definition.instantiate(DVec3::ZERO, &rng).unwrap();
        assert_ne!(
            a.custom_data.get("oncoprotein").unwrap(),
            b.custom_data.get("oncoprotein").unwrap()
        );
    }

    #[test]
    fn test_registry_assigns_type_indices() {
        let mut defs = CellDefinitions::new();
        assert_eq!(defs.add(plain_definition()).unwrap(), 0);
        let mut other = plain_definition();
        other.name = "other".to_string();
        assert_eq!(defs.add(other).unwrap(), 1);
        assert_eq!(defs.find("other").unwrap().type_index, 1);
        assert!(defs.add(plain_definition()).is_err());
        assert!(matches!(
            defs.create_cell("missing", DVec3::ZERO, &SharedRng::new(1)),
            Err(SimulationError::CellTypeNotFound(_))
        ));
    }
}
