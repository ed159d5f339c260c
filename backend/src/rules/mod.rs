//! Per-cell hook rules
//!
//! A [`CellRule`] is bound into one of a cell's [`CellFunctions`] slots at
//! configuration time. The scheduler calls every bound slot once per tick,
//! in a fixed order, from whichever worker thread owns the cell. A rule may
//! freely mutate its own cell, may read other cells only through the
//! [`PopulationView`], and asks for cross-cell changes by emitting
//! [`Interaction`]s.
//!
//! [`CellFunctions`]: crate::models::CellFunctions

pub mod cancer_immune;

use std::fmt;

use crate::environment::{Microenvironment, NeighborQuery};
use crate::error::SimulationError;
use crate::interaction::Interaction;
use crate::models::{Cell, CellView, PopulationView};
use crate::rng::SharedRng;

pub trait CellRule: Send + Sync {
    /// Stable name, recorded in checkpoints to rebind hooks
    fn name(&self) -> &str;

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError>;
}

impl fmt::Debug for dyn CellRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellRule({})", self.name())
    }
}

/// Everything a rule may see while processing one cell
pub struct RuleContext<'a> {
    pub tick: u64,
    pub time: f64,
    pub dt: f64,
    /// Dense index of the cell being processed
    pub index: usize,
    pub rng: &'a SharedRng,
    pub environment: &'a dyn Microenvironment,
    pub population: &'a PopulationView<'a>,
    neighbors: &'a dyn NeighborQuery,
    interactions: Vec<Interaction>,
}

impl<'a> RuleContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tick: u64,
        time: f64,
        dt: f64,
        index: usize,
        rng: &'a SharedRng,
        environment: &'a dyn Microenvironment,
        population: &'a PopulationView<'a>,
        neighbors: &'a dyn NeighborQuery,
    ) -> Self {
        Self {
            tick,
            time,
            dt,
            index,
            rng,
            environment,
            population,
            neighbors,
            interactions: Vec::new(),
        }
    }

    /// Cells within `radius` of this cell, as of the start of the pass
    pub fn neighbors_within(&self, radius: f64) -> Vec<&'a CellView> {
        let population = self.population;
        let mut found = Vec::new();
        self.neighbors.neighbors_within(self.index, radius, &mut |i, _| {
            if let Some(view) = population.at(i) {
                found.push(view);
            }
        });
        found
    }

    pub fn emit(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn into_interactions(self) -> Vec<Interaction> {
        self.interactions
    }
}

/// Default velocity hook: refresh and add the motility vector
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardVelocity;

impl StandardVelocity {
    pub const NAME: &'static str = "standard velocity";
}

impl CellRule for StandardVelocity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        cell.phenotype.motility.update_vector(ctx.dt, ctx.rng);
        cell.velocity += cell.phenotype.motility.motility_vector;
        Ok(())
    }
}
