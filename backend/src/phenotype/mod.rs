//! Per-cell phenotype: cycle, death, volume, secretion, motility
//!
//! A [`Phenotype`] is exclusively owned by its cell and only ever mutated
//! by the thread processing that cell. Graphs are shared through `Arc`,
//! everything else is deep-copied when a cell is created or divides.

pub mod cycle;
pub mod death;
pub mod motility;
pub mod secretion;
pub mod standard;
pub mod volume;

use std::sync::Arc;

use glam::DVec3;

pub use cycle::{
    advance_cycle, ArrestFn, CycleState, CycleTransition, EntryFn, ExitFn, Phase, PhaseGraph,
    PhaseGraphBuilder, PhaseLink,
};
pub use death::{DeathModel, DeathParameters, DeathRegistry};
pub use motility::{Mechanics, Motility};
pub use secretion::Secretion;
pub use standard::{CellParameters, PhaseGraphLibrary};
pub use volume::{Geometry, Volume};

use crate::environment::Microenvironment;
use crate::error::SimulationError;
use crate::rng::SharedRng;

/// What happened to a phenotype during one advance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhenotypeOutcome {
    pub transition: Option<CycleTransition>,
    /// Death model triggered this tick
    pub death: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Phenotype {
    /// Raised on arrival in a dividing phase; consumed by the sweep
    pub flagged_for_division: bool,
    /// Raised on arrival in a removal phase; consumed by the sweep
    pub flagged_for_removal: bool,
    pub cycle: CycleState,
    pub death: DeathRegistry,
    pub volume: Volume,
    pub geometry: Geometry,
    pub mechanics: Mechanics,
    pub motility: Motility,
    pub secretion: Secretion,
}

impl Phenotype {
    pub fn new(cycle_graph: Arc<PhaseGraph>) -> Self {
        let volume = Volume::default();
        let mut geometry = Geometry::default();
        geometry.update(&volume);
        Self {
            flagged_for_division: false,
            flagged_for_removal: false,
            cycle: CycleState::new(cycle_graph),
            death: DeathRegistry::new(),
            volume,
            geometry,
            mechanics: Mechanics::default(),
            motility: Motility::default(),
            secretion: Secretion::default(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.death.is_dead()
    }

    /// Cycle, then death, then volume and geometry
    pub fn advance(
        &mut self,
        dt: f64,
        rng: &SharedRng,
    ) -> Result<PhenotypeOutcome, SimulationError> {
        let transition = advance_cycle(self, dt, rng)?;
        let death = self.check_for_death(dt, rng)?;
        self.volume.update(dt);
        self.geometry.update(&self.volume);
        Ok(PhenotypeOutcome { transition, death })
    }

    /// Exchange with the fields at `position`
    pub fn advance_secretion(&mut self, position: DVec3, dt: f64, env: &dyn Microenvironment) {
        self.secretion.advance(position, self.volume.total, dt, env);
    }

    /// Stochastic death check; commits through [`start_death`](Self::start_death)
    pub fn check_for_death(
        &mut self,
        dt: f64,
        rng: &SharedRng,
    ) -> Result<Option<usize>, SimulationError> {
        if self.death.is_dead() {
            return Ok(None);
        }
        let Some(index) = self.death.check_for_death(dt, rng)? else {
            return Ok(None);
        };
        self.enter_death(index);
        Ok(Some(index))
    }

    /// Force the cell into death model `index`
    ///
    /// Returns `false` (and changes nothing) if the cell is already dead.
    pub fn start_death(&mut self, index: usize) -> Result<bool, SimulationError> {
        if !self.death.trigger(index)? {
            return Ok(false);
        }
        self.enter_death(index);
        Ok(true)
    }

    fn enter_death(&mut self, index: usize) {
        let Some(model) = self.death.model(index) else {
            return;
        };
        let graph = Arc::clone(&model.graph);
        let parameters = model.parameters;

        self.cycle.rebind(Arc::clone(&graph));
        self.flagged_for_division = false;

        self.secretion.set_all_secretion_to_zero();
        self.secretion.set_all_uptake_to_zero();
        self.motility.is_motile = false;
        self.motility.motility_vector = DVec3::ZERO;
        self.mechanics.cell_cell_adhesion_strength = 0.0;
        self.volume.apply_death_parameters(&parameters);

        if let Some(entry) = graph.phase(graph.default_phase()).and_then(|p| p.entry) {
            entry(self, 0.0);
        }
    }

    /// Split in two; `self` keeps one half and the other is returned
    pub fn divide(&mut self) -> Phenotype {
        self.volume.divide();
        self.geometry.update(&self.volume);
        self.flagged_for_division = false;
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phenotype_with_deaths() -> Phenotype {
        let library = PhaseGraphLibrary::standard().unwrap();
        let mut p = Phenotype::new(library.get("live").unwrap());
        p.death
            .add_model(0.0, library.get("apoptosis").unwrap(), DeathParameters::apoptosis());
        p.death
            .add_model(0.0, library.get("necrosis").unwrap(), DeathParameters::necrosis());
        p
    }

    #[test]
    fn test_start_death_rebinds_cycle() {
        let mut p = phenotype_with_deaths();
        p.motility.is_motile = true;
        assert!(p.start_death(0).unwrap());

        assert!(p.is_dead());
        assert_eq!(p.cycle.graph().name(), "apoptosis");
        assert_eq!(p.cycle.current_phase().name, "Apoptotic");
        assert!(!p.motility.is_motile);
        assert_eq!(p.volume.target_fluid_fraction, 0.0);
    }

    #[test]
    fn test_start_death_is_noop_when_dead() {
        let mut p = phenotype_with_deaths();
        p.start_death(1).unwrap();
        assert!(!p.start_death(0).unwrap());
        assert_eq!(p.death.active_index(), Some(1));
        assert_eq!(p.cycle.graph().name(), "necrosis");
    }

    #[test]
    fn test_divide_conserves_total() {
        let mut p = phenotype_with_deaths();
        let parent = p.volume.total;
        let child = p.divide();
        assert!((p.volume.total + child.volume.total - parent).abs() < 1e-9);
        assert!(p.geometry.radius < Geometry::default().radius);
    }

    #[test]
    fn test_unknown_death_index_is_error() {
        let mut p = phenotype_with_deaths();
        assert!(p.start_death(9).is_err());
        assert!(!p.is_dead());
    }
}
