//! Phase Graph Tests
//!
//! Critical invariants tested:
//! - A fixed-duration link fires exactly once, on the step where the
//!   elapsed time reaches 1/rate, for any dt that divides the duration
//! - Arriving in a flagged phase raises division/removal flags
//! - Links are tried in insertion order; the first to fire wins
//! - rate * dt above 1 is an error, never clamped

use std::sync::Arc;

use phenocell_core_rs::phenotype::{advance_cycle, PhaseGraph, PhaseGraphBuilder, Phenotype};
use phenocell_core_rs::{SharedRng, SimulationError};

// ============================================================================
// Test Helpers
// ============================================================================

/// A --(fixed, 1/rate)--> B
fn fixed_pair(rate: f64) -> Arc<PhaseGraph> {
    let mut b = PhaseGraphBuilder::new("pair", 1);
    let a = b.add_phase(10, "A");
    let target = b.add_phase(11, "B");
    b.add_link(a, target, rate).unwrap();
    b.set_fixed_duration(a, target, true).unwrap();
    b.build()
}

fn steps_until_transition(
    phenotype: &mut Phenotype,
    dt: f64,
    rng: &SharedRng,
    limit: usize,
) -> Option<usize> {
    for step in 1..=limit {
        if advance_cycle(phenotype, dt, rng).unwrap().is_some() {
            return Some(step);
        }
    }
    None
}

fn mark_entry(phenotype: &mut Phenotype, _dt: f64) {
    phenotype.volume.target_fluid_fraction = 0.5;
}

fn mark_exit(phenotype: &mut Phenotype, _dt: f64) {
    phenotype.motility.migration_speed = 42.0;
}

fn always_arrested(_phenotype: &Phenotype, _dt: f64) -> bool {
    true
}

// ============================================================================
// Fixed Duration
// ============================================================================

#[test]
fn test_fixed_duration_fires_on_expected_step() {
    let rng = SharedRng::new(1);
    for dt in [0.1, 0.5, 1.0, 2.0, 2.5, 5.0] {
        let mut phenotype = Phenotype::new(fixed_pair(0.1));
        let expected = (10.0_f64 / dt).round() as usize;
        let step = steps_until_transition(&mut phenotype, dt, &rng, 1000);
        assert_eq!(step, Some(expected), "dt = {}", dt);
        assert_eq!(phenotype.cycle.current_phase().name, "B");
        assert_eq!(phenotype.cycle.elapsed_time_in_phase(), 0.0);
    }
}

#[test]
fn test_fixed_duration_fires_once() {
    let rng = SharedRng::new(1);
    let mut phenotype = Phenotype::new(fixed_pair(0.1));
    let mut transitions = 0;
    for _ in 0..500 {
        if advance_cycle(&mut phenotype, 0.1, &rng).unwrap().is_some() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
    assert!((phenotype.cycle.elapsed_time_in_phase() - 40.0).abs() < 1e-6);
}

#[test]
fn test_fixed_duration_draws_no_randomness() {
    let rng = SharedRng::new(8);
    let before = rng.state();
    let mut phenotype = Phenotype::new(fixed_pair(0.1));
    steps_until_transition(&mut phenotype, 1.0, &rng, 20);
    assert_eq!(rng.state(), before);
}

#[test]
fn test_fixed_duration_never_fires_early_when_dt_does_not_divide() {
    let rng = SharedRng::new(1);
    let mut phenotype = Phenotype::new(fixed_pair(0.1));
    // 3 steps reach 9.9999, one short of the 10 minute duration
    let step = steps_until_transition(&mut phenotype, 3.3333, &rng, 10);
    assert_eq!(step, Some(4));

    let mut phenotype = Phenotype::new(fixed_pair(0.1));
    let step = steps_until_transition(&mut phenotype, 3.0, &rng, 10);
    assert_eq!(step, Some(4));
}

#[test]
fn test_zero_rate_fixed_link_never_fires() {
    let rng = SharedRng::new(1);
    let mut phenotype = Phenotype::new(fixed_pair(0.1));
    phenotype.cycle.set_transition_rate(0, 1, 0.0).unwrap();
    assert_eq!(steps_until_transition(&mut phenotype, 1.0, &rng, 1000), None);
}

// ============================================================================
// Callbacks and Flags
// ============================================================================

#[test]
fn test_arriving_phase_raises_division_flag() {
    let mut b = PhaseGraphBuilder::new("divider", 2);
    let a = b.add_phase(20, "A");
    let m = b.add_phase(21, "M");
    b.add_link(a, m, 1.0).unwrap();
    b.set_fixed_duration(a, m, true).unwrap()
        .set_triggers_division(m, true).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    advance_cycle(&mut phenotype, 1.0, &rng).unwrap();
    assert!(phenotype.flagged_for_division);
    assert!(!phenotype.flagged_for_removal);
}

#[test]
fn test_arriving_phase_raises_removal_flag() {
    let mut b = PhaseGraphBuilder::new("remover", 3);
    let a = b.add_phase(30, "A");
    let debris = b.add_phase(31, "Debris");
    b.add_link(a, debris, 0.5).unwrap();
    b.set_fixed_duration(a, debris, true).unwrap()
        .set_triggers_removal(debris, true).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    advance_cycle(&mut phenotype, 1.0, &rng).unwrap();
    assert!(!phenotype.flagged_for_removal);
    advance_cycle(&mut phenotype, 1.0, &rng).unwrap();
    assert!(phenotype.flagged_for_removal);
}

#[test]
fn test_exit_then_entry_callbacks_run() {
    let mut b = PhaseGraphBuilder::new("callbacks", 4);
    let a = b.add_phase(40, "A");
    let c = b.add_phase(41, "C");
    b.add_link(a, c, 1.0).unwrap();
    b.set_fixed_duration(a, c, true).unwrap()
        .set_exit(a, c, mark_exit).unwrap()
        .set_entry(c, mark_entry).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    let transition = advance_cycle(&mut phenotype, 1.0, &rng).unwrap().unwrap();
    assert_eq!((transition.from, transition.to), (a, c));
    assert_eq!(phenotype.motility.migration_speed, 42.0);
    assert_eq!(phenotype.volume.target_fluid_fraction, 0.5);
}

#[test]
fn test_arrest_blocks_transition() {
    let mut b = PhaseGraphBuilder::new("arrested", 5);
    let a = b.add_phase(50, "A");
    let c = b.add_phase(51, "C");
    b.add_link(a, c, 1.0).unwrap();
    b.set_fixed_duration(a, c, true).unwrap()
        .set_arrest(a, c, always_arrested).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    assert_eq!(steps_until_transition(&mut phenotype, 1.0, &rng, 100), None);
    assert!((phenotype.cycle.elapsed_time_in_phase() - 100.0).abs() < 1e-9);
}

#[test]
fn test_first_link_in_insertion_order_wins() {
    let mut b = PhaseGraphBuilder::new("fork", 6);
    let a = b.add_phase(60, "A");
    let left = b.add_phase(61, "Left");
    let right = b.add_phase(62, "Right");
    b.add_link(a, left, 1.0).unwrap();
    b.add_link(a, right, 1.0).unwrap();
    b.set_fixed_duration(a, left, true).unwrap()
        .set_fixed_duration(a, right, true).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    advance_cycle(&mut phenotype, 1.0, &rng).unwrap();
    assert_eq!(phenotype.cycle.current_phase_index(), left);
}

// ============================================================================
// Stochastic Links
// ============================================================================

#[test]
fn test_stochastic_probability_above_one_is_error() {
    let mut b = PhaseGraphBuilder::new("fast", 7);
    let a = b.add_phase(70, "A");
    let c = b.add_phase(71, "C");
    b.add_link(a, c, 2.0).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    let err = advance_cycle(&mut phenotype, 1.0, &rng).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::ProbabilityOutOfRange { what: "cycle transition", probability }
            if probability == 2.0
    ));
    assert_eq!(phenotype.cycle.current_phase_index(), a);
}

#[test]
fn test_stochastic_mean_dwell_time() {
    let mut b = PhaseGraphBuilder::new("exponential", 8);
    let a = b.add_phase(80, "A");
    let c = b.add_phase(81, "C");
    b.add_link(a, c, 0.01).unwrap();
    let graph = b.build();
    let rng = SharedRng::new(31337);

    let samples = 2000;
    let mut total = 0usize;
    for _ in 0..samples {
        let mut phenotype = Phenotype::new(Arc::clone(&graph));
        total += steps_until_transition(&mut phenotype, 1.0, &rng, 100_000).unwrap();
    }
    let mean = total as f64 / samples as f64;
    assert!((mean - 100.0).abs() < 10.0, "mean dwell was {}", mean);
}

#[test]
fn test_self_loop_keeps_phase_and_resets_elapsed() {
    let mut b = PhaseGraphBuilder::new("loop", 9);
    let live = b.add_phase(90, "Live");
    b.add_link(live, live, 0.25).unwrap();
    b.set_fixed_duration(live, live, true).unwrap()
        .set_triggers_division(live, true).unwrap();
    let mut phenotype = Phenotype::new(b.build());
    let rng = SharedRng::new(1);

    assert_eq!(steps_until_transition(&mut phenotype, 1.0, &rng, 10), Some(4));
    assert_eq!(phenotype.cycle.current_phase_index(), live);
    assert_eq!(phenotype.cycle.elapsed_time_in_phase(), 0.0);
    assert!(phenotype.flagged_for_division);
}
