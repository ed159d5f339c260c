//! Attachment Protocol Tests
//!
//! Critical invariants tested:
//! - Attachment is mirrored: a lists b iff b lists a
//! - Attach and detach are idempotent
//! - Commits apply deaths, then detaches, then attaches
//! - Docked immune cells kill recognizable tumor cells end to end

use glam::DVec3;
use phenocell_core_rs::interaction::{
    adjacency_is_symmetric, attach_cells, commit, detach_all, detach_cells, AttachmentParameters,
    Interaction,
};
use phenocell_core_rs::models::{CellArena, CellDefinition, CellId, Event, EventLog};
use phenocell_core_rs::phenotype::{standard, DeathParameters, PhaseGraphLibrary, Phenotype};
use phenocell_core_rs::rules::cancer_immune::{CANCER_CELL, IMMUNE_CELL, ONCOPROTEIN};
use phenocell_core_rs::{SharedRng, Simulation, SimulationConfig};

// ============================================================================
// Test Helpers
// ============================================================================

fn definition() -> CellDefinition {
    let library = PhaseGraphLibrary::standard().unwrap();
    let mut phenotype = Phenotype::new(library.get(standard::LIVE).unwrap());
    phenotype
        .death
        .add_model(0.0, library.get(standard::APOPTOSIS).unwrap(), DeathParameters::apoptosis());
    CellDefinition::new("plain", phenotype)
}

fn arena_with(n: usize) -> (CellArena, Vec<CellId>) {
    let definition = definition();
    let rng = SharedRng::new(1);
    let mut arena = CellArena::new();
    let ids = (0..n)
        .map(|i| arena.insert(definition.instantiate(DVec3::X * i as f64, &rng).unwrap()))
        .collect();
    (arena, ids)
}

// ============================================================================
// Probabilities
// ============================================================================

#[test]
fn test_attachment_probability_worked_example() {
    let params = AttachmentParameters::default();
    let p = params.attachment_probability(0.2, 0.6, 15.0, 1.0);
    assert!((p - 0.01).abs() < 1e-12, "p = {}", p);
}

#[test]
fn test_attachment_probability_edges() {
    let params = AttachmentParameters::default();
    // at or below threshold, or beyond reach
    assert_eq!(params.attachment_probability(0.2, 0.5, 15.0, 1.0), 0.0);
    assert_eq!(params.attachment_probability(0.2, 2.0, 18.5, 1.0), 0.0);
    // saturated oncoprotein, inside the min distance
    assert!((params.attachment_probability(0.2, 5.0, 10.0, 0.1) - 0.02).abs() < 1e-12);
}

#[test]
fn test_kill_probability_ignores_distance() {
    let params = AttachmentParameters::default();
    assert_eq!(params.kill_probability(1.0 / 15.0, 0.4, 1.0), 0.0);
    let p = params.kill_probability(1.0 / 15.0, 2.0, 0.1);
    assert!((p - 0.1 / 15.0).abs() < 1e-12);
    let half = params.kill_probability(1.0, 1.25, 1.0);
    assert!((half - 0.5).abs() < 1e-12);
}

// ============================================================================
// Adjacency
// ============================================================================

#[test]
fn test_attach_is_mirrored_and_idempotent() {
    let (mut arena, ids) = arena_with(2);
    assert!(attach_cells(&mut arena, ids[0], ids[1]));
    assert!(!attach_cells(&mut arena, ids[0], ids[1]));
    assert!(!attach_cells(&mut arena, ids[1], ids[0]));

    assert_eq!(arena.get(ids[0]).unwrap().state.attached(), &[ids[1]]);
    assert_eq!(arena.get(ids[1]).unwrap().state.attached(), &[ids[0]]);
    assert!(adjacency_is_symmetric(&arena));
}

#[test]
fn test_self_attachment_is_refused() {
    let (mut arena, ids) = arena_with(1);
    assert!(!attach_cells(&mut arena, ids[0], ids[0]));
    assert!(!arena.get(ids[0]).unwrap().state.is_attached());
}

#[test]
fn test_detach_is_idempotent() {
    let (mut arena, ids) = arena_with(2);
    attach_cells(&mut arena, ids[0], ids[1]);
    assert!(detach_cells(&mut arena, ids[1], ids[0]));
    assert!(!detach_cells(&mut arena, ids[1], ids[0]));
    assert!(!detach_cells(&mut arena, ids[0], ids[1]));
    assert!(arena.iter().all(|c| !c.state.is_attached()));
}

#[test]
fn test_detach_all_frees_every_partner() {
    let (mut arena, ids) = arena_with(4);
    for other in &ids[1..] {
        attach_cells(&mut arena, ids[0], *other);
    }
    let partners = detach_all(&mut arena, ids[0]);
    assert_eq!(partners.len(), 3);
    assert!(arena.iter().all(|c| !c.state.is_attached()));
    assert!(adjacency_is_symmetric(&arena));
}

// ============================================================================
// Commit
// ============================================================================

#[test]
fn test_commit_order_detach_before_attach() {
    let (mut arena, ids) = arena_with(3);
    attach_cells(&mut arena, ids[0], ids[2]);
    let mut events = EventLog::new();

    let requests = [
        Interaction::Attach {
            initiator: ids[0],
            target: ids[1],
        },
        Interaction::Detach {
            initiator: ids[0],
            target: ids[2],
        },
        // release and re-dock in one tick ends attached
        Interaction::Detach {
            initiator: ids[0],
            target: ids[1],
        },
    ];
    let summary = commit(&mut arena, &requests, &mut events, 7).unwrap();

    assert_eq!(summary.detached, 1);
    assert_eq!(summary.attached, 1);
    assert!(arena.get(ids[0]).unwrap().state.is_attached_to(ids[1]));
    assert!(!arena.get(ids[0]).unwrap().state.is_attached_to(ids[2]));
    assert!(adjacency_is_symmetric(&arena));

    let kinds: Vec<_> = events.events().iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds, vec!["Detached", "Attached"]);
    assert!(events.events().iter().all(|e| e.tick() == 7));
}

#[test]
fn test_duplicate_kills_count_once() {
    let (mut arena, ids) = arena_with(3);
    let mut events = EventLog::new();
    let requests = [
        Interaction::TriggerDeath {
            attacker: ids[1],
            target: ids[0],
            model: 0,
        },
        Interaction::TriggerDeath {
            attacker: ids[2],
            target: ids[0],
            model: 0,
        },
    ];
    let summary = commit(&mut arena, &requests, &mut events, 0).unwrap();

    assert_eq!(summary.kills, 1);
    assert!(arena.get(ids[0]).unwrap().is_dead());
    let kills = events.events_of_type("Kill");
    assert_eq!(kills.len(), 1);
    assert!(matches!(kills[0], Event::Kill { attacker, .. } if *attacker == ids[1]));
    assert!(matches!(
        events.events_of_type("DeathTriggered")[0],
        Event::DeathTriggered { forced: true, .. }
    ));
}

#[test]
fn test_no_docking_onto_target_killed_in_same_commit() {
    let (mut arena, ids) = arena_with(3);
    let (target, killer, newcomer) = (ids[0], ids[1], ids[2]);
    attach_cells(&mut arena, killer, target);
    let mut events = EventLog::new();

    let requests = [
        Interaction::TriggerDeath {
            attacker: killer,
            target,
            model: 0,
        },
        Interaction::Detach {
            initiator: killer,
            target,
        },
        Interaction::Attach {
            initiator: newcomer,
            target,
        },
    ];
    let summary = commit(&mut arena, &requests, &mut events, 3).unwrap();

    assert_eq!(summary.kills, 1);
    assert_eq!(summary.attached, 0);
    assert!(arena.get(target).unwrap().is_dead());
    assert!(!arena.get(newcomer).unwrap().state.is_attached());
    assert!(arena.iter().all(|c| !c.state.is_attached()));
    assert!(events.events_of_type("Attached").is_empty());
}

#[test]
fn test_no_docking_onto_target_that_died_during_pass() {
    let (mut arena, ids) = arena_with(2);
    arena.get_mut(ids[0]).unwrap().phenotype.start_death(0).unwrap();
    let mut events = EventLog::new();
    let requests = [Interaction::Attach {
        initiator: ids[1],
        target: ids[0],
    }];
    let summary = commit(&mut arena, &requests, &mut events, 0).unwrap();
    assert_eq!(summary.attached, 0);
    assert!(!arena.get(ids[1]).unwrap().state.is_attached());

    // a dead initiator does not dock either
    let requests = [Interaction::Attach {
        initiator: ids[0],
        target: ids[1],
    }];
    assert_eq!(commit(&mut arena, &requests, &mut events, 1).unwrap().attached, 0);
}

#[test]
fn test_requests_for_missing_cells_are_ignored() {
    let (mut arena, ids) = arena_with(2);
    let gone = ids[1];
    arena.remove(gone);
    let mut events = EventLog::new();
    let requests = [
        Interaction::Attach {
            initiator: ids[0],
            target: gone,
        },
        Interaction::TriggerDeath {
            attacker: ids[0],
            target: gone,
            model: 0,
        },
    ];
    let summary = commit(&mut arena, &requests, &mut events, 0).unwrap();
    assert_eq!(summary.attached + summary.kills, 0);
    assert!(events.is_empty());
}

// ============================================================================
// End to End
// ============================================================================

#[test]
fn test_docked_immune_cell_kills_tumor_cell() {
    let mut config = SimulationConfig {
        dt: 0.1,
        t_max: 1000.0,
        immune_activation_time: 1.0e6,
        threads: 1,
        rng_seed: 2024,
        seed_tissue: false,
        ..SimulationConfig::default()
    };
    config.model.immune_apoptosis_rate = 0.0;
    config.model.tumor_apoptosis_rate = 0.0;
    let mut sim = Simulation::new(config).unwrap();

    let tumor = sim.spawn_cell(CANCER_CELL, DVec3::ZERO).unwrap();
    {
        let cell = sim.cells_mut().get_mut(tumor).unwrap();
        cell.custom_data.set(ONCOPROTEIN, 2.0).unwrap();
        // single target: no proliferation
        cell.functions.update_phenotype = None;
        cell.phenotype.cycle.set_transition_rate(0, 0, 0.0).unwrap();
    }
    let immune = sim.spawn_cell(IMMUNE_CELL, DVec3::new(10.0, 0.0, 0.0)).unwrap();

    let mut killed = false;
    for _ in 0..5000 {
        sim.tick().unwrap();
        assert!(adjacency_is_symmetric(sim.cells()));
        if !sim.event_log().events_of_type("Kill").is_empty() {
            killed = true;
            break;
        }
    }
    assert!(killed, "no kill within 500 minutes");

    let log = sim.event_log();
    let attached = log.events_of_type("Attached");
    assert!(!attached.is_empty());
    assert!(matches!(attached[0], Event::Attached { initiator, .. } if *initiator == immune));
    assert!(matches!(log.events_of_type("Kill")[0], Event::Kill { attacker, target, .. }
        if *attacker == immune && *target == tumor));

    // the kill releases the pair in the same commit
    assert!(sim.cells().get(tumor).unwrap().is_dead());
    assert!(!sim.cells().get(immune).unwrap().state.is_attached());
    assert!(sim.cells().get(immune).unwrap().phenotype.motility.is_motile);
}

#[test]
fn test_immune_cell_ignores_unrecognizable_tumor() {
    let config = SimulationConfig {
        dt: 0.1,
        immune_activation_time: 1.0e6,
        threads: 1,
        seed_tissue: false,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config).unwrap();
    let tumor = sim.spawn_cell(CANCER_CELL, DVec3::ZERO).unwrap();
    sim.cells_mut()
        .get_mut(tumor)
        .unwrap()
        .custom_data
        .set(ONCOPROTEIN, 0.4)
        .unwrap();
    sim.spawn_cell(IMMUNE_CELL, DVec3::new(10.0, 0.0, 0.0)).unwrap();

    for _ in 0..500 {
        sim.tick().unwrap();
    }
    assert!(sim.event_log().events_of_type("Attached").is_empty());
    assert!(sim.event_log().events_of_type("Kill").is_empty());
}
