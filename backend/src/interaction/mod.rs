//! Attachment protocol: docking, killing and release between cell pairs
//!
//! A pair is either `Free` (neither lists the other) or `Attached` (both
//! do). Rules never edit adjacency directly. During the parallel pass they
//! emit [`Interaction`] requests, and [`commit`] applies them on one thread
//! afterwards in a fixed order: forced deaths, detaches, attaches. Every
//! operation here is idempotent, so duplicate or stale requests are
//! harmless and the symmetry invariant holds after every commit.

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::models::{CellArena, CellId, Event, EventLog};

/// Cross-cell mutation requested during the agent pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Attach { initiator: CellId, target: CellId },
    Detach { initiator: CellId, target: CellId },
    /// Push `target` into death model `model` (a kill, not a draw)
    TriggerDeath {
        attacker: CellId,
        target: CellId,
        model: usize,
    },
}

/// Recognition and docking geometry shared by attach and kill trials
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachmentParameters {
    pub oncoprotein_saturation: f64,
    pub oncoprotein_threshold: f64,
    pub max_attachment_distance: f64,
    pub min_attachment_distance: f64,
}

impl Default for AttachmentParameters {
    fn default() -> Self {
        Self {
            oncoprotein_saturation: 2.0,
            oncoprotein_threshold: 0.5,
            max_attachment_distance: 18.0,
            min_attachment_distance: 14.0,
        }
    }
}

pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

impl AttachmentParameters {
    fn oncoprotein_scale(&self, oncoprotein: f64) -> f64 {
        let span = self.oncoprotein_saturation - self.oncoprotein_threshold;
        clamp01((oncoprotein - self.oncoprotein_threshold) / span)
    }

    /// Per-tick docking probability, scaled by oncoprotein and distance
    ///
    /// Zero for targets at or below the detection threshold or beyond
    /// `max_attachment_distance`. Not clamped to 1.
    pub fn attachment_probability(
        &self,
        attach_rate: f64,
        oncoprotein: f64,
        separation: f64,
        dt: f64,
    ) -> f64 {
        if oncoprotein <= self.oncoprotein_threshold || separation > self.max_attachment_distance {
            return 0.0;
        }
        let distance_scale = clamp01(
            (self.max_attachment_distance - separation)
                / (self.max_attachment_distance - self.min_attachment_distance),
        );
        attach_rate * self.oncoprotein_scale(oncoprotein) * dt * distance_scale
    }

    /// Per-tick kill probability, scaled by oncoprotein only
    pub fn kill_probability(&self, kill_rate: f64, oncoprotein: f64, dt: f64) -> f64 {
        if oncoprotein < self.oncoprotein_threshold {
            return 0.0;
        }
        kill_rate * self.oncoprotein_scale(oncoprotein) * dt
    }
}

/// Make `a` and `b` mutually attached; `false` if nothing changed
pub fn attach_cells(arena: &mut CellArena, a: CellId, b: CellId) -> bool {
    let Some((first, second)) = arena.pair_mut(a, b) else {
        return false;
    };
    let added_a = first.state.attach(b);
    let added_b = second.state.attach(a);
    added_a || added_b
}

/// Remove the pair from both lists; `false` if it was already free
pub fn detach_cells(arena: &mut CellArena, a: CellId, b: CellId) -> bool {
    let mut changed = false;
    if let Some(cell) = arena.get_mut(a) {
        changed |= cell.state.detach(b);
    }
    if let Some(cell) = arena.get_mut(b) {
        changed |= cell.state.detach(a);
    }
    changed
}

/// Free `id` from every partner, returning the former partners
pub fn detach_all(arena: &mut CellArena, id: CellId) -> Vec<CellId> {
    let partners = match arena.get_mut(id) {
        Some(cell) => cell.state.take_all(),
        None => return Vec::new(),
    };
    for partner in &partners {
        if let Some(cell) = arena.get_mut(*partner) {
            cell.state.detach(id);
        }
    }
    partners
}

/// What one commit changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub kills: usize,
    pub detached: usize,
    pub attached: usize,
}

/// Apply the pass's requests: deaths, then detaches, then attaches
pub fn commit(
    arena: &mut CellArena,
    interactions: &[Interaction],
    events: &mut EventLog,
    tick: u64,
) -> Result<CommitSummary, SimulationError> {
    let mut summary = CommitSummary::default();

    for interaction in interactions {
        if let Interaction::TriggerDeath { attacker, target, model } = *interaction {
            let Some(cell) = arena.get_mut(target) else {
                continue;
            };
            if cell.phenotype.start_death(model)? {
                let model_name = cell
                    .phenotype
                    .death
                    .current_model()
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                events.log(Event::Kill { tick, attacker, target });
                events.log(Event::DeathTriggered {
                    tick,
                    cell: target,
                    model: model_name,
                    forced: true,
                });
                summary.kills += 1;
            }
        }
    }

    for interaction in interactions {
        if let Interaction::Detach { initiator, target } = *interaction {
            if detach_cells(arena, initiator, target) {
                events.log(Event::Detached { tick, initiator, target });
                summary.detached += 1;
            }
        }
    }

    for interaction in interactions {
        if let Interaction::Attach { initiator, target } = *interaction {
            // deaths committed above, or during the pass, end the docking attempt
            let alive = |id| arena.get(id).is_some_and(|c| !c.is_dead());
            if !alive(initiator) || !alive(target) {
                continue;
            }
            if attach_cells(arena, initiator, target) {
                events.log(Event::Attached { tick, initiator, target });
                summary.attached += 1;
            }
        }
    }

    Ok(summary)
}

/// Every attachment is mirrored and refers to a present cell
pub fn adjacency_is_symmetric(arena: &CellArena) -> bool {
    arena.iter().all(|cell| {
        cell.state.attached().iter().all(|other| {
            arena
                .get(*other)
                .is_some_and(|partner| partner.state.is_attached_to(cell.id()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::definition::tests::plain_cell;

    #[test]
    fn test_attachment_probability_worked_example() {
        let params = AttachmentParameters::default();
        let p = params.attachment_probability(0.2, 0.6, 15.0, 1.0);
        assert!((p - 0.2 * (0.1 / 1.5) * 0.75).abs() < 1e-12);
        assert!((p - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_attachment_rejected_beyond_max_distance() {
        let params = AttachmentParameters::default();
        assert_eq!(params.attachment_probability(0.2, 1.5, 18.5, 1.0), 0.0);
        assert_eq!(params.attachment_probability(0.2, 0.5, 15.0, 1.0), 0.0);
    }

    #[test]
    fn test_distance_scale_saturates_inside_min_distance() {
        let params = AttachmentParameters::default();
        let near = params.attachment_probability(0.2, 2.0, 5.0, 0.1);
        assert!((near - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_kill_probability_ignores_distance() {
        let params = AttachmentParameters::default();
        assert!((params.kill_probability(1.0 / 15.0, 2.0, 0.1) - 0.1 / 15.0).abs() < 1e-15);
        assert_eq!(params.kill_probability(1.0, 0.49, 1.0), 0.0);
    }

    #[test]
    fn test_attach_detach_roundtrip_is_symmetric() {
        let mut arena = CellArena::new();
        let a = arena.insert(plain_cell());
        let b = arena.insert(plain_cell());

        assert!(attach_cells(&mut arena, a, b));
        assert!(!attach_cells(&mut arena, b, a));
        assert!(adjacency_is_symmetric(&arena));
        assert_eq!(arena.get(a).unwrap().state.attached(), &[b]);

        assert!(detach_cells(&mut arena, a, b));
        assert!(!detach_cells(&mut arena, a, b));
        assert!(arena.get(a).unwrap().state.attached().is_empty());
        assert!(arena.get(b).unwrap().state.attached().is_empty());
    }

    #[test]
    fn test_self_attachment_refused() {
        let mut arena = CellArena::new();
        let a = arena.insert(plain_cell());
        assert!(!attach_cells(&mut arena, a, a));
        assert!(arena.get(a).unwrap().state.attached().is_empty());
    }

    #[test]
    fn test_detach_all_clears_partners() {
        let mut arena = CellArena::new();
        let a = arena.insert(plain_cell());
        let b = arena.insert(plain_cell());
        let c = arena.insert(plain_cell());
        attach_cells(&mut arena, a, b);
        attach_cells(&mut arena, c, b);

        let partners = detach_all(&mut arena, b);
        assert_eq!(partners.len(), 2);
        assert!(adjacency_is_symmetric(&arena));
        assert!(!arena.get(a).unwrap().state.is_attached());
    }

    #[test]
    fn test_commit_orders_detach_before_attach() {
        let mut arena = CellArena::new();
        let a = arena.insert(plain_cell());
        let b = arena.insert(plain_cell());
        let mut events = EventLog::new();
        let requests = [
            Interaction::Attach { initiator: a, target: b },
            Interaction::Detach { initiator: a, target: b },
        ];

        let summary = commit(&mut arena, &requests, &mut events, 0).unwrap();
        assert_eq!(summary.detached, 0);
        assert_eq!(summary.attached, 1);
        assert!(arena.get(a).unwrap().state.is_attached_to(b));
    }
}
