//! Phase graphs and per-cell cycle state
//!
//! A [`PhaseGraph`] is a directed graph of named phases joined by timed or
//! stochastic links. It is built once, frozen behind an `Arc`, and shared by
//! every cell bound to it. Each cell owns a [`CycleState`]: its position in
//! the graph plus an overlay of per-link rates seeded from the graph, so
//! individual cells can scale their own rates without touching the graph.
//!
//! # Advancing
//!
//! Each tick the elapsed time grows by `dt`, then the outgoing links of the
//! current phase are tried in insertion order:
//!
//! 1. an arrest predicate returning `true` skips the link for this tick
//! 2. a fixed-duration link fires once `elapsed >= 1/rate`
//! 3. a stochastic link fires with probability `rate * dt` (never clamped)
//!
//! The first link that fires is committed: exit callback, move, reset the
//! elapsed time, raise the arriving phase's division/removal flags, then
//! run its entry callback.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SimulationError;
use crate::phenotype::Phenotype;
use crate::rng::SharedRng;

/// Callback run when a phase is entered
pub type EntryFn = fn(&mut Phenotype, f64);

/// Callback run exactly once when a link commits
pub type ExitFn = fn(&mut Phenotype, f64);

/// Per-tick veto of a transition; `true` means arrested
pub type ArrestFn = fn(&Phenotype, f64) -> bool;

/// One discrete state of a cycle or death process
#[derive(Debug, Clone)]
pub struct Phase {
    /// Position in the owning graph
    pub index: usize,
    /// Global identifier shared across graphs (e.g. debris)
    pub code: i32,
    pub name: String,
    /// Entering this phase flags the cell for division
    pub triggers_division: bool,
    /// Entering this phase flags the cell for removal
    pub triggers_removal: bool,
    pub entry: Option<EntryFn>,
}

/// Directed transition between two phases
#[derive(Debug, Clone)]
pub struct PhaseLink {
    pub from: usize,
    pub to: usize,
    /// Deterministic dwell time (`1/rate`) instead of a hazard
    pub fixed_duration: bool,
    pub arrest: Option<ArrestFn>,
    pub exit: Option<ExitFn>,
}

/// Immutable, shareable phase graph
#[derive(Debug)]
pub struct PhaseGraph {
    name: String,
    code: i32,
    phases: Vec<Phase>,
    links: Vec<Vec<PhaseLink>>,
    base_rates: Vec<Vec<f64>>,
    /// `inverse[from][to]` = slot of that link in `links[from]`
    inverse: Vec<HashMap<usize, usize>>,
    default_phase: usize,
}

impl PhaseGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Outgoing links of `phase` in evaluation order
    pub fn links(&self, phase: usize) -> &[PhaseLink] {
        self.links.get(phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn default_phase(&self) -> usize {
        self.default_phase
    }

    pub fn find_phase_index(&self, name: &str) -> Result<usize, SimulationError> {
        self.phases
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| SimulationError::PhaseNotFound {
                graph: self.name.clone(),
                phase: name.to_string(),
            })
    }

    pub fn find_phase_index_by_code(&self, code: i32) -> Result<usize, SimulationError> {
        self.phases
            .iter()
            .position(|p| p.code == code)
            .ok_or_else(|| SimulationError::PhaseNotFound {
                graph: self.name.clone(),
                phase: format!("code {}", code),
            })
    }

    /// O(1) slot lookup for the link `from -> to`
    pub fn link_slot(&self, from: usize, to: usize) -> Result<usize, SimulationError> {
        self.inverse
            .get(from)
            .and_then(|m| m.get(&to))
            .copied()
            .ok_or_else(|| SimulationError::LinkNotFound {
                graph: self.name.clone(),
                from,
                to,
            })
    }

    pub fn link(&self, from: usize, to: usize) -> Result<&PhaseLink, SimulationError> {
        let slot = self.link_slot(from, to)?;
        Ok(&self.links[from][slot])
    }

    /// Rate the graph was built with (reference for per-cell overlays)
    pub fn base_rate(&self, from: usize, to: usize) -> Result<f64, SimulationError> {
        let slot = self.link_slot(from, to)?;
        Ok(self.base_rates[from][slot])
    }

    fn seed_rates(&self) -> Vec<Vec<f64>> {
        self.base_rates.clone()
    }
}

/// Builder for [`PhaseGraph`]
///
/// # Example
/// ```
/// use phenocell_core_rs::phenotype::PhaseGraphBuilder;
///
/// let mut builder = PhaseGraphBuilder::new("two-step", 1);
/// let a = builder.add_phase(10, "A");
/// let b = builder.add_phase(11, "B");
/// builder.add_link(a, b, 1.0 / 10.0).unwrap();
/// builder.set_fixed_duration(a, b, true).unwrap();
/// builder.add_link(b, a, 0.01).unwrap();
/// let graph = builder.build();
///
/// assert_eq!(graph.phases().len(), 2);
/// assert_eq!(graph.base_rate(a, b).unwrap(), 0.1);
/// assert!(graph.link_slot(a, a).is_err());
/// ```
#[derive(Debug)]
pub struct PhaseGraphBuilder {
    graph: PhaseGraph,
}

impl PhaseGraphBuilder {
    pub fn new(name: impl Into<String>, code: i32) -> Self {
        Self {
            graph: PhaseGraph {
                name: name.into(),
                code,
                phases: Vec::new(),
                links: Vec::new(),
                base_rates: Vec::new(),
                inverse: Vec::new(),
                default_phase: 0,
            },
        }
    }

    /// Append a phase and return its index
    pub fn add_phase(&mut self, code: i32, name: impl Into<String>) -> usize {
        let index = self.graph.phases.len();
        self.graph.phases.push(Phase {
            index,
            code,
            name: name.into(),
            triggers_division: false,
            triggers_removal: false,
            entry: None,
        });
        self.graph.links.push(Vec::new());
        self.graph.base_rates.push(Vec::new());
        self.graph.inverse.push(HashMap::new());
        index
    }

    /// Add a stochastic link `from -> to` with the given rate
    ///
    /// Re-adding an existing link overwrites its rate.
    pub fn add_link(
        &mut self,
        from: usize,
        to: usize,
        rate: f64,
    ) -> Result<usize, SimulationError> {
        self.check_phase(from)?;
        self.check_phase(to)?;
        if let Some(slot) = self.graph.inverse[from].get(&to).copied() {
            self.graph.base_rates[from][slot] = rate;
            return Ok(slot);
        }
        let slot = self.graph.links[from].len();
        self.graph.links[from].push(PhaseLink {
            from,
            to,
            fixed_duration: false,
            arrest: None,
            exit: None,
        });
        self.graph.base_rates[from].push(rate);
        self.graph.inverse[from].insert(to, slot);
        Ok(slot)
    }

    pub fn set_fixed_duration(
        &mut self,
        from: usize,
        to: usize,
        fixed: bool,
    ) -> Result<&mut Self, SimulationError> {
        self.link_mut(from, to)?.fixed_duration = fixed;
        Ok(self)
    }

    pub fn set_arrest(
        &mut self,
        from: usize,
        to: usize,
        arrest: ArrestFn,
    ) -> Result<&mut Self, SimulationError> {
        self.link_mut(from, to)?.arrest = Some(arrest);
        Ok(self)
    }

    pub fn set_exit(
        &mut self,
        from: usize,
        to: usize,
        exit: ExitFn,
    ) -> Result<&mut Self, SimulationError> {
        self.link_mut(from, to)?.exit = Some(exit);
        Ok(self)
    }

    pub fn set_entry(
        &mut self,
        phase: usize,
        entry: EntryFn,
    ) -> Result<&mut Self, SimulationError> {
        self.phase_mut(phase)?.entry = Some(entry);
        Ok(self)
    }

    pub fn set_triggers_division(
        &mut self,
        phase: usize,
        value: bool,
    ) -> Result<&mut Self, SimulationError> {
        self.phase_mut(phase)?.triggers_division = value;
        Ok(self)
    }

    pub fn set_triggers_removal(
        &mut self,
        phase: usize,
        value: bool,
    ) -> Result<&mut Self, SimulationError> {
        self.phase_mut(phase)?.triggers_removal = value;
        Ok(self)
    }

    pub fn set_default_phase(&mut self, phase: usize) -> Result<&mut Self, SimulationError> {
        self.check_phase(phase)?;
        self.graph.default_phase = phase;
        Ok(self)
    }

    /// Freeze the graph for sharing
    pub fn build(self) -> Arc<PhaseGraph> {
        Arc::new(self.graph)
    }

    fn check_phase(&self, index: usize) -> Result<(), SimulationError> {
        if index < self.graph.phases.len() {
            Ok(())
        } else {
            Err(SimulationError::PhaseNotFound {
                graph: self.graph.name.clone(),
                phase: format!("index {}", index),
            })
        }
    }

    fn phase_mut(&mut self, index: usize) -> Result<&mut Phase, SimulationError> {
        self.check_phase(index)?;
        Ok(&mut self.graph.phases[index])
    }

    fn link_mut(&mut self, from: usize, to: usize) -> Result<&mut PhaseLink, SimulationError> {
        let slot = self.graph.link_slot(from, to)?;
        Ok(&mut self.graph.links[from][slot])
    }
}

/// A committed phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTransition {
    pub from: usize,
    pub to: usize,
}

/// Per-cell position in a shared [`PhaseGraph`]
#[derive(Debug, Clone)]
pub struct CycleState {
    graph: Arc<PhaseGraph>,
    current_phase: usize,
    elapsed_time_in_phase: f64,
    /// Overlay of `graph.base_rates`, same shape
    rates: Vec<Vec<f64>>,
}

impl CycleState {
    /// Bind to `graph` at its default phase with the graph's rates
    pub fn new(graph: Arc<PhaseGraph>) -> Self {
        let rates = graph.seed_rates();
        let current_phase = graph.default_phase();
        Self {
            graph,
            current_phase,
            elapsed_time_in_phase: 0.0,
            rates,
        }
    }

    /// Rebuild from checkpointed values
    pub fn restore(
        graph: Arc<PhaseGraph>,
        current_phase: usize,
        elapsed_time_in_phase: f64,
        rates: Vec<Vec<f64>>,
    ) -> Result<Self, SimulationError> {
        if graph.phase(current_phase).is_none() {
            return Err(SimulationError::PhaseNotFound {
                graph: graph.name().to_string(),
                phase: format!("index {}", current_phase),
            });
        }
        let shape_matches = rates.len() == graph.phases().len()
            && rates
                .iter()
                .enumerate()
                .all(|(i, row)| row.len() == graph.links(i).len());
        if !shape_matches {
            return Err(SimulationError::Serialization(format!(
                "rate matrix does not match graph '{}'",
                graph.name()
            )));
        }
        Ok(Self {
            graph,
            current_phase,
            elapsed_time_in_phase,
            rates,
        })
    }

    /// Switch to a different graph, starting at its default phase
    pub fn rebind(&mut self, graph: Arc<PhaseGraph>) {
        *self = Self::new(graph);
    }

    pub fn graph(&self) -> &Arc<PhaseGraph> {
        &self.graph
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase
    }

    pub fn current_phase(&self) -> &Phase {
        &self.graph.phases[self.current_phase]
    }

    pub fn elapsed_time_in_phase(&self) -> f64 {
        self.elapsed_time_in_phase
    }

    pub fn rates(&self) -> &[Vec<f64>] {
        &self.rates
    }

    pub fn transition_rate(&self, from: usize, to: usize) -> Result<f64, SimulationError> {
        let slot = self.graph.link_slot(from, to)?;
        Ok(self.rates[from][slot])
    }

    pub fn set_transition_rate(
        &mut self,
        from: usize,
        to: usize,
        rate: f64,
    ) -> Result<(), SimulationError> {
        let slot = self.graph.link_slot(from, to)?;
        self.rates[from][slot] = rate;
        Ok(())
    }

    /// Rate of the first outgoing link of `phase`
    ///
    /// Only meaningful for phases with a single outgoing link.
    pub fn exit_rate(&self, phase: usize) -> Result<f64, SimulationError> {
        self.rates
            .get(phase)
            .and_then(|row| row.first())
            .copied()
            .ok_or_else(|| self.no_exit(phase))
    }

    pub fn set_exit_rate(&mut self, phase: usize, rate: f64) -> Result<(), SimulationError> {
        let err = self.no_exit(phase);
        let slot = self
            .rates
            .get_mut(phase)
            .and_then(|row| row.first_mut())
            .ok_or(err)?;
        *slot = rate;
        Ok(())
    }

    fn no_exit(&self, phase: usize) -> SimulationError {
        SimulationError::LinkNotFound {
            graph: self.graph.name().to_string(),
            from: phase,
            to: usize::MAX,
        }
    }
}

/// Whole steps spent in the phase cover `duration`
///
/// Both sides are counted in steps of `dt`, so drift in the summed
/// `elapsed` never fires a link before its duration.
fn fixed_duration_elapsed(elapsed: f64, duration: f64, dt: f64) -> bool {
    let steps_taken = (elapsed / dt).round();
    let steps_needed = (duration / dt - 1e-6).ceil();
    steps_taken >= steps_needed
}

/// Advance the cycle of `phenotype` by `dt`
///
/// Returns the committed transition, if any. At most one transition
/// commits per call.
pub fn advance_cycle(
    phenotype: &mut Phenotype,
    dt: f64,
    rng: &SharedRng,
) -> Result<Option<CycleTransition>, SimulationError> {
    let graph = Arc::clone(&phenotype.cycle.graph);
    let from = phenotype.cycle.current_phase;
    phenotype.cycle.elapsed_time_in_phase += dt;

    for (slot, link) in graph.links(from).iter().enumerate() {
        if let Some(arrest) = link.arrest {
            if arrest(phenotype, dt) {
                continue;
            }
        }

        let rate = phenotype.cycle.rates[from][slot];
        let fires = if link.fixed_duration {
            let elapsed = phenotype.cycle.elapsed_time_in_phase;
            rate > 0.0 && fixed_duration_elapsed(elapsed, 1.0 / rate, dt)
        } else {
            rng.bernoulli(rate * dt, "cycle transition")?
        };

        if fires {
            if let Some(exit) = link.exit {
                exit(phenotype, dt);
            }
            let to = link.to;
            phenotype.cycle.current_phase = to;
            phenotype.cycle.elapsed_time_in_phase = 0.0;

            let arriving = &graph.phases[to];
            if arriving.triggers_division {
                phenotype.flagged_for_division = true;
            }
            if arriving.triggers_removal {
                phenotype.flagged_for_removal = true;
            }
            if let Some(entry) = arriving.entry {
                entry(phenotype, dt);
            }
            return Ok(Some(CycleTransition { from, to }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Arc<PhaseGraph> {
        let mut b = PhaseGraphBuilder::new("chain", 0);
        let a = b.add_phase(1, "A");
        let c = b.add_phase(2, "C");
        b.add_link(a, c, 0.5).unwrap();
        b.set_fixed_duration(a, c, true).unwrap();
        b.build()
    }

    #[test]
    fn test_inverse_index_lookup() {
        let g = chain();
        assert_eq!(g.link_slot(0, 1).unwrap(), 0);
        assert!(matches!(
            g.link_slot(1, 0),
            Err(SimulationError::LinkNotFound { from: 1, to: 0, .. })
        ));
    }

    #[test]
    fn test_find_phase_by_name_and_code() {
        let g = chain();
        assert_eq!(g.find_phase_index("C").unwrap(), 1);
        assert_eq!(g.find_phase_index_by_code(1).unwrap(), 0);
        assert!(g.find_phase_index("missing").is_err());
    }

    #[test]
    fn test_overlay_does_not_touch_graph() {
        let g = chain();
        let mut state = CycleState::new(Arc::clone(&g));
        state.set_transition_rate(0, 1, 2.0).unwrap();
        assert_eq!(state.transition_rate(0, 1).unwrap(), 2.0);
        assert_eq!(g.base_rate(0, 1).unwrap(), 0.5);
    }

    #[test]
    fn test_exit_rate_requires_outgoing_link() {
        let state = CycleState::new(chain());
        assert_eq!(state.exit_rate(0).unwrap(), 0.5);
        assert!(state.exit_rate(1).is_err());
    }

    #[test]
    fn test_fixed_duration_counts_whole_steps() {
        assert!(fixed_duration_elapsed(10.0, 10.0, 0.1));
        assert!(!fixed_duration_elapsed(9.9, 10.0, 0.1));
        // dt does not divide the duration: wait for the step past it
        assert!(!fixed_duration_elapsed(3.0 * 3.3333, 10.0, 3.3333));
        assert!(fixed_duration_elapsed(4.0 * 3.3333, 10.0, 3.3333));
        // drift in the summed elapsed time
        let summed: f64 = (0..100).map(|_| 0.1).sum();
        assert!(fixed_duration_elapsed(summed, 10.0, 0.1));
    }

    #[test]
    fn test_set_exit_rate_overrides_single_link() {
        let mut state = CycleState::new(chain());
        state.set_exit_rate(0, 0.25).unwrap();
        assert_eq!(state.transition_rate(0, 1).unwrap(), 0.25);
        assert!(state.set_exit_rate(1, 0.25).is_err());
    }

    #[test]
    fn test_default_phase_is_the_start() {
        let mut b = PhaseGraphBuilder::new("chain", 0);
        let a = b.add_phase(1, "A");
        let c = b.add_phase(2, "C");
        b.add_link(a, c, 0.5).unwrap();
        b.set_default_phase(c).unwrap();
        assert!(b.set_default_phase(5).is_err());
        let state = CycleState::new(b.build());
        assert_eq!(state.current_phase().name, "C");
    }

    #[test]
    fn test_add_link_to_unknown_phase_fails() {
        let mut b = PhaseGraphBuilder::new("bad", 0);
        let a = b.add_phase(1, "A");
        assert!(b.add_link(a, 7, 1.0).is_err());
    }

    #[test]
    fn test_restore_rejects_wrong_shape() {
        let g = chain();
        assert!(CycleState::restore(Arc::clone(&g), 0, 0.0, vec![vec![0.5]]).is_err());
        assert!(CycleState::restore(g, 0, 0.0, vec![vec![0.5], vec![]]).is_ok());
    }
}
