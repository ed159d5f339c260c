//! Cell agent
//!
//! A cell owns its phenotype and custom data outright. Attachments to
//! other cells are [`CellId`] handles into the arena, never ownership, and
//! are only changed by the single-threaded commit after each agent pass.

use std::fmt;
use std::sync::Arc;

use glam::DVec3;
use slotmap::new_key_type;

use crate::error::SimulationError;
use crate::phenotype::{CellParameters, Phenotype};
use crate::rules::CellRule;

new_key_type! {
    /// Generational handle; a removed cell's id never aliases a new cell
    pub struct CellId;
}

/// Named scalar attributes (oncoprotein, kill rate, ...)
///
/// Names are shared by every cell of a definition; values are per cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomData {
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl CustomData {
    pub fn new(names: Arc<[String]>, values: Vec<f64>) -> Result<Self, SimulationError> {
        if names.len() != values.len() {
            return Err(SimulationError::InvalidConfig(format!(
                "{} custom variable names for {} values",
                names.len(),
                values.len()
            )));
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn find_index(&self, name: &str) -> Result<usize, SimulationError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SimulationError::CustomVariableNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<f64, SimulationError> {
        Ok(self.values[self.find_index(name)?])
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), SimulationError> {
        let index = self.find_index(name)?;
        self.values[index] = value;
        Ok(())
    }

    /// Unchecked-by-name access for hot paths; `index` from [`find_index`](Self::find_index)
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }
}

/// Mutable attachment state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellState {
    attached: Vec<CellId>,
}

impl CellState {
    pub fn attached(&self) -> &[CellId] {
        &self.attached
    }

    pub fn is_attached(&self) -> bool {
        !self.attached.is_empty()
    }

    pub fn is_attached_to(&self, other: CellId) -> bool {
        self.attached.contains(&other)
    }

    /// Add `other` unless already present
    pub(crate) fn attach(&mut self, other: CellId) -> bool {
        if self.is_attached_to(other) {
            return false;
        }
        self.attached.push(other);
        true
    }

    /// Swap-and-shrink removal by identity; `false` if absent
    pub(crate) fn detach(&mut self, other: CellId) -> bool {
        match self.attached.iter().position(|id| *id == other) {
            Some(i) => {
                self.attached.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<CellId> {
        std::mem::take(&mut self.attached)
    }
}

/// Per-cell hook slots; `None` is a valid no-op
#[derive(Clone, Default)]
pub struct CellFunctions {
    pub update_phenotype: Option<Arc<dyn CellRule>>,
    pub update_migration_bias: Option<Arc<dyn CellRule>>,
    pub custom_rule: Option<Arc<dyn CellRule>>,
    pub update_velocity: Option<Arc<dyn CellRule>>,
    pub set_orientation: Option<Arc<dyn CellRule>>,
}

impl CellFunctions {
    /// Names of the bound hooks, in slot order
    pub fn bound_names(&self) -> [Option<&str>; 5] {
        [
            self.update_phenotype.as_deref().map(|r| r.name()),
            self.update_migration_bias.as_deref().map(|r| r.name()),
            self.custom_rule.as_deref().map(|r| r.name()),
            self.update_velocity.as_deref().map(|r| r.name()),
            self.set_orientation.as_deref().map(|r| r.name()),
        ]
    }
}

impl fmt::Debug for CellFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [phenotype, migration, custom, velocity, orientation] = self.bound_names();
        f.debug_struct("CellFunctions")
            .field("update_phenotype", &phenotype)
            .field("update_migration_bias", &migration)
            .field("custom_rule", &custom)
            .field("update_velocity", &velocity)
            .field("set_orientation", &orientation)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub(crate) id: CellId,
    pub type_index: usize,
    pub type_name: Arc<str>,
    pub position: DVec3,
    pub velocity: DVec3,
    pub phenotype: Phenotype,
    pub custom_data: CustomData,
    pub parameters: CellParameters,
    pub functions: CellFunctions,
    pub state: CellState,
}

impl Cell {
    /// Id assigned by the arena; null until inserted
    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn is_dead(&self) -> bool {
        self.phenotype.is_dead()
    }

    pub fn radius(&self) -> f64 {
        self.phenotype.geometry.radius
    }

    /// Split off a daughter; volumes are halved between the two
    ///
    /// The daughter starts unattached and with a null id.
    pub(crate) fn divide(&mut self, direction: DVec3) -> Cell {
        let daughter_phenotype = self.phenotype.divide();
        let offset = 0.5 * self.radius() * direction;
        let mut daughter = Cell {
            id: CellId::default(),
            phenotype: daughter_phenotype,
            state: CellState::default(),
            ..self.clone()
        };
        self.position -= offset;
        daughter.position += offset;
        daughter
    }
}
