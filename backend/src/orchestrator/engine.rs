//! Simulation Engine
//!
//! Fixed-step scheduler integrating all components:
//! - Chemical fields (diffusion, decay, gradients)
//! - Per-cell phenotype and hook rules (parallel pass)
//! - Attachment/kill commits (single-threaded)
//! - Motion, division and removal
//! - Scenario events and run reporting
//!
//! # Architecture
//!
//! ```text
//! For each tick t:
//! 1. Record a report row if an output time was reached
//! 2. Execute due scenario events (immune introduction included)
//! 3. Advance the fields by dt, recompute gradients
//! 4. Rebuild the neighbor index from current positions
//! 5. Parallel pass over cells, per cell in order:
//!    update_phenotype → phenotype advance → secretion →
//!    update_migration_bias → custom_rule → update_velocity → set_orientation
//! 6. Commit interactions (deaths, detaches, attaches)
//! 7. Integrate motion
//! 8. Sweep removal and division flags
//! 9. Advance time
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use phenocell_core_rs::orchestrator::{Simulation, SimulationConfig};
//!
//! let mut config = SimulationConfig::default();
//! config.t_max = 60.0;
//! config.model.initial_tumor_radius = 40.0;
//!
//! let mut sim = Simulation::new(config).unwrap();
//! for _ in 0..10 {
//!     let result = sim.tick().unwrap();
//!     println!("t={} cells={}", result.time, result.cells);
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::core::time::SimulationClock;
use crate::environment::{
    EulerIntegrator, Microenvironment, MotionIntegrator, NeighborQuery, RadiusNeighbors,
    WellMixedMicroenvironment,
};
use crate::error::SimulationError;
use crate::events::{
    EventSchedule, ScenarioContext, ScenarioEvent, ScenarioEventHandler, ScheduledEvent,
};
use crate::interaction::{self, Interaction};
use crate::models::{Cell, CellArena, CellDefinitions, CellId, Event, EventLog};
use crate::phenotype::{PhaseGraphLibrary, PhenotypeOutcome};
use crate::rng::SharedRng;
use crate::rules::cancer_immune::{self, CancerImmuneOptions, CANCER_CELL, IMMUNE_CELL};
use crate::rules::RuleContext;

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete simulation configuration (times in minutes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Step size; keeps every `rate * dt` well below 1
    pub dt: f64,

    pub t_max: f64,

    /// When the immune population is introduced
    pub immune_activation_time: f64,

    /// Report cadence before immune introduction
    pub output_interval: f64,

    /// Report cadence after immune introduction
    pub post_activation_output_interval: f64,

    pub rng_seed: u64,

    /// Worker threads for the cell pass; 1 makes runs reproducible
    pub threads: usize,

    pub compute_gradients: bool,

    /// Bin width of the neighbor index (µm)
    pub neighbor_bin_size: f64,

    /// Seed the initial tumor sphere on construction
    pub seed_tissue: bool,

    pub model: CancerImmuneOptions,

    /// Extra scheduled events, run after the built-in immune introduction
    pub scenario_events: Vec<ScheduledEvent>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            t_max: 20160.0 + 10080.0,
            immune_activation_time: 20160.0,
            output_interval: 60.0,
            post_activation_output_interval: 3.0,
            rng_seed: 0,
            threads: 8,
            compute_gradients: true,
            neighbor_bin_size: 30.0,
            seed_tissue: true,
            model: CancerImmuneOptions::default(),
            scenario_events: Vec::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Config parse failed: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.dt > 0.0) {
            return Err(SimulationError::InvalidConfig("dt must be positive".to_string()));
        }
        if !(self.t_max >= 0.0) {
            return Err(SimulationError::InvalidConfig("t_max must be non-negative".to_string()));
        }
        if self.threads == 0 {
            return Err(SimulationError::InvalidConfig("threads must be at least 1".to_string()));
        }
        if !(self.output_interval > 0.0 && self.post_activation_output_interval > 0.0) {
            return Err(SimulationError::InvalidConfig(
                "output intervals must be positive".to_string(),
            ));
        }
        if !(self.neighbor_bin_size > 0.0) {
            return Err(SimulationError::InvalidConfig(
                "neighbor bin size must be positive".to_string(),
            ));
        }
        self.model.validate()
    }

    /// Built-in immune introduction followed by the configured events
    pub fn all_scenario_events(&self) -> Vec<ScheduledEvent> {
        let mut events = vec![ScheduledEvent {
            event: ScenarioEvent::IntroduceImmuneCells { count: None },
            schedule: EventSchedule::OneTime {
                time: self.immune_activation_time,
            },
        }];
        events.extend(self.scenario_events.iter().cloned());
        events
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of a single tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickResult {
    pub tick: u64,
    /// Time at the start of the tick
    pub time: f64,
    pub cells: usize,
    pub divisions: usize,
    pub removals: usize,
    /// Stochastic deaths plus kills
    pub deaths: usize,
    pub kills: usize,
    pub attached: usize,
    pub detached: usize,
    pub scenario_events: usize,
    pub cells_introduced: usize,
}

/// Population summary recorded at each output time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub time: f64,
    pub cells: usize,
    /// Since the previous row
    pub divisions: usize,
    /// Since the previous row
    pub deaths: usize,
    pub live_tumor: usize,
    pub dead_tumor: usize,
    pub immune: usize,
    pub attached_immune: usize,
}

/// Counters carried between report rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ReportState {
    pub next_output_time: f64,
    pub output_interval: f64,
    pub divisions_since_output: usize,
    pub deaths_since_output: usize,
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) run_id: Uuid,
    pub(crate) clock: SimulationClock,
    pub(crate) rng: SharedRng,
    pool: rayon::ThreadPool,
    pub(crate) environment: Box<dyn Microenvironment>,
    neighbors: Box<dyn NeighborQuery>,
    integrator: Box<dyn MotionIntegrator>,
    pub(crate) library: PhaseGraphLibrary,
    pub(crate) definitions: CellDefinitions,
    pub(crate) cells: CellArena,
    pub(crate) scenario: ScenarioEventHandler,
    pub(crate) events: EventLog,
    pub(crate) report: Vec<ReportRow>,
    pub(crate) report_state: ReportState,
    cancer_type: usize,
    immune_type: usize,
}

impl Simulation {
    /// Create a simulation with the reference collaborators
    ///
    /// Uses a well-mixed field for oxygen and the immunostimulatory factor,
    /// a binned neighbor index and explicit Euler motion.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let environment = WellMixedMicroenvironment::new(
            cancer_immune::default_fields(&config.model),
            config.model.domain_half_width,
        )?;
        let neighbors = RadiusNeighbors::new(config.neighbor_bin_size)?;
        Self::with_components(
            config,
            Box::new(environment),
            Box::new(neighbors),
            Box::new(EulerIntegrator),
        )
    }

    /// Create a simulation around caller-supplied collaborators
    pub fn with_components(
        config: SimulationConfig,
        environment: Box<dyn Microenvironment>,
        neighbors: Box<dyn NeighborQuery>,
        integrator: Box<dyn MotionIntegrator>,
    ) -> Result<Self, SimulationError> {
        let mut sim = Self::assemble(config, environment, neighbors, integrator)?;
        if sim.config.seed_tissue {
            let summary = cancer_immune::setup_tissue(
                &mut sim.cells,
                &sim.definitions,
                &sim.config.model,
                &sim.rng,
            )?;
            debug!(count = summary.count, "tissue seeded");
        }
        info!(
            run_id = %sim.run_id,
            cells = sim.cells.len(),
            dt = sim.config.dt,
            t_max = sim.config.t_max,
            threads = sim.config.threads,
            "simulation initialized"
        );
        Ok(sim)
    }

    /// Everything but the initial population
    pub(crate) fn assemble(
        config: SimulationConfig,
        environment: Box<dyn Microenvironment>,
        neighbors: Box<dyn NeighborQuery>,
        integrator: Box<dyn MotionIntegrator>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| SimulationError::ThreadPool(e.to_string()))?;

        let library = PhaseGraphLibrary::standard()?;
        let definitions =
            cancer_immune::build_cell_definitions(&config.model, environment.as_ref(), &library)?;
        let cancer_type = definitions.find(CANCER_CELL)?.type_index;
        let immune_type = definitions.find(IMMUNE_CELL)?.type_index;
        let scenario = ScenarioEventHandler::new(config.all_scenario_events())?;

        Ok(Self {
            clock: SimulationClock::new(config.dt, config.t_max),
            rng: SharedRng::new(config.rng_seed),
            run_id: Uuid::new_v4(),
            pool,
            environment,
            neighbors,
            integrator,
            library,
            definitions,
            cells: CellArena::new(),
            scenario,
            events: EventLog::new(),
            report: Vec::new(),
            report_state: ReportState {
                next_output_time: 0.0,
                output_interval: config.output_interval,
                divisions_since_output: 0,
                deaths_since_output: 0,
            },
            cancer_type,
            immune_type,
            config,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn cells(&self) -> &CellArena {
        &self.cells
    }

    /// Mutable population access for custom setups between ticks
    pub fn cells_mut(&mut self) -> &mut CellArena {
        &mut self.cells
    }

    pub fn definitions(&self) -> &CellDefinitions {
        &self.definitions
    }

    pub fn environment(&self) -> &dyn Microenvironment {
        self.environment.as_ref()
    }

    pub fn rng(&self) -> &SharedRng {
        &self.rng
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn report(&self) -> &[ReportRow] {
        &self.report
    }

    /// Current interval between report rows
    pub fn output_interval(&self) -> f64 {
        self.report_state.output_interval
    }

    /// Whether the built-in immune introduction has fired
    pub fn immune_introduced(&self) -> bool {
        self.scenario.next_due().first().is_some_and(|due| due.is_none())
    }

    /// Create a cell of a configured type and add it to the population
    pub fn spawn_cell(
        &mut self,
        cell_type: &str,
        position: glam::DVec3,
    ) -> Result<CellId, SimulationError> {
        let cell = self.definitions.create_cell(cell_type, position, &self.rng)?;
        Ok(self.cells.insert(cell))
    }

    // ------------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------------

    /// Run until `t_max`, stopping at the first failing tick
    pub fn run(&mut self) -> Result<(), SimulationError> {
        while !self.clock.is_finished() {
            if let Err(e) = self.tick() {
                error!(
                    tick = self.clock.current_tick(),
                    time = self.clock.time(),
                    error = %e,
                    "run aborted"
                );
                return Err(e);
            }
        }
        self.record_output();
        info!(
            run_id = %self.run_id,
            time = self.clock.time(),
            cells = self.cells.len(),
            events = self.events.len(),
            "run complete"
        );
        Ok(())
    }

    /// Execute one step of `dt`
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        let tick = self.clock.current_tick();
        let time = self.clock.time();
        let dt = self.clock.dt();
        let mut result = TickResult {
            tick,
            time,
            ..TickResult::default()
        };

        // STEP 1: REPORTING
        if self.clock.has_reached(self.report_state.next_output_time) {
            self.record_output();
            self.report_state.next_output_time += self.report_state.output_interval;
        }

        // STEP 2: SCENARIO EVENTS
        let immune_was_introduced = self.immune_introduced();
        let mut ctx = ScenarioContext {
            tick,
            cells: &mut self.cells,
            definitions: &mut self.definitions,
            options: &self.config.model,
            rng: &self.rng,
            events: &mut self.events,
        };
        let executed = self.scenario.execute_due_events(&self.clock, &mut ctx)?;
        result.scenario_events = executed.executed;
        result.cells_introduced = executed.cells_introduced;
        if !immune_was_introduced && self.immune_introduced() {
            self.report_state.output_interval = self.config.post_activation_output_interval;
            self.report_state.next_output_time = time + self.report_state.output_interval;
        }

        // STEP 3: FIELDS
        self.environment.simulate_diffusion_decay(dt);
        if self.config.compute_gradients {
            self.environment.compute_gradients();
        }

        // STEP 4: NEIGHBORS
        let positions: Vec<_> = self.cells.iter().map(|c| c.position).collect();
        self.neighbors.rebuild(&positions)?;

        // STEP 5: CELL PASS
        let outcomes = self.run_cell_pass(tick, time, dt)?;

        let mut interactions: Vec<Interaction> = Vec::new();
        for (index, (outcome, requested)) in outcomes.into_iter().enumerate() {
            if let Some(model) = outcome.death {
                let cell = &self.cells.cells()[index];
                let model = cell
                    .phenotype
                    .death
                    .model(model)
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                self.events.log(Event::DeathTriggered {
                    tick,
                    cell: cell.id(),
                    model,
                    forced: false,
                });
                result.deaths += 1;
            }
            interactions.extend(requested);
        }

        // STEP 6: COMMIT
        let committed =
            interaction::commit(&mut self.cells, &interactions, &mut self.events, tick)?;
        result.kills = committed.kills;
        result.deaths += committed.kills;
        result.attached = committed.attached;
        result.detached = committed.detached;

        // STEP 7: MOTION
        self.integrator.integrate(self.cells.cells_mut(), dt);

        // STEP 8: DIVISION AND REMOVAL
        let (divisions, removals) = self.sweep(tick);
        result.divisions = divisions;
        result.removals = removals;

        self.report_state.divisions_since_output += result.divisions;
        self.report_state.deaths_since_output += result.deaths;

        // STEP 9: ADVANCE TIME
        self.clock.advance_tick();

        result.cells = self.cells.len();
        Ok(result)
    }

    /// Every cell's hooks and phenotype, in parallel
    fn run_cell_pass(
        &mut self,
        tick: u64,
        time: f64,
        dt: f64,
    ) -> Result<Vec<(PhenotypeOutcome, Vec<Interaction>)>, SimulationError> {
        let rng = &self.rng;
        let environment = self.environment.as_ref();
        let neighbors = self.neighbors.as_ref();
        let (population, cells) = self.cells.split_for_pass();
        let population = &population;

        self.pool.install(|| {
            cells
                .par_iter_mut()
                .enumerate()
                .map(|(index, cell)| -> Result<_, SimulationError> {
                    let mut ctx = RuleContext::new(
                        tick,
                        time,
                        dt,
                        index,
                        rng,
                        environment,
                        population,
                        neighbors,
                    );
                    let outcome = update_cell(cell, &mut ctx)?;
                    Ok((outcome, ctx.into_interactions()))
                })
                .collect()
        })
    }

    /// Removal wins over division; removed cells are freed from partners first
    fn sweep(&mut self, tick: u64) -> (usize, usize) {
        // arena order keeps partner lists reproducible under swap removal
        let mut to_remove: Vec<CellId> = Vec::new();
        let mut to_divide: Vec<CellId> = Vec::new();
        for cell in self.cells.iter() {
            if cell.phenotype.flagged_for_removal {
                to_remove.push(cell.id());
            } else if cell.phenotype.flagged_for_division {
                to_divide.push(cell.id());
            }
        }

        for parent in &to_divide {
            let direction = self.rng.unit_sphere();
            let Some(cell) = self.cells.get_mut(*parent) else {
                continue;
            };
            let daughter = cell.divide(direction);
            let daughter = self.cells.insert(daughter);
            self.events.log(Event::Division {
                tick,
                parent: *parent,
                daughter,
            });
        }

        for id in &to_remove {
            interaction::detach_all(&mut self.cells, *id);
            self.events.log(Event::Removal { tick, cell: *id });
        }
        let removed: HashSet<CellId> = to_remove.iter().copied().collect();
        self.cells.remove_many(&removed);

        (to_divide.len(), to_remove.len())
    }

    fn record_output(&mut self) {
        let mut row = ReportRow {
            time: self.clock.time(),
            cells: self.cells.len(),
            divisions: self.report_state.divisions_since_output,
            deaths: self.report_state.deaths_since_output,
            live_tumor: 0,
            dead_tumor: 0,
            immune: 0,
            attached_immune: 0,
        };
        for cell in self.cells.iter() {
            if cell.type_index == self.cancer_type {
                if cell.is_dead() {
                    row.dead_tumor += 1;
                } else {
                    row.live_tumor += 1;
                }
            } else if cell.type_index == self.immune_type {
                row.immune += 1;
                if cell.state.is_attached() {
                    row.attached_immune += 1;
                }
            }
        }
        debug!(
            time = row.time,
            cells = row.cells,
            live_tumor = row.live_tumor,
            dead_tumor = row.dead_tumor,
            immune = row.immune,
            attached_immune = row.attached_immune,
            "output"
        );
        self.report.push(row);
        self.report_state.divisions_since_output = 0;
        self.report_state.deaths_since_output = 0;
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("run_id", &self.run_id)
            .field("time", &self.clock.time())
            .field("cells", &self.cells.len())
            .field("environment", &self.environment)
            .finish()
    }
}

/// One cell's hooks, in slot order around the phenotype advance
fn update_cell(
    cell: &mut Cell,
    ctx: &mut RuleContext<'_>,
) -> Result<PhenotypeOutcome, SimulationError> {
    if let Some(rule) = cell.functions.update_phenotype.clone() {
        rule.apply(cell, ctx)?;
    }

    let outcome = cell.phenotype.advance(ctx.dt, ctx.rng)?;
    cell.phenotype.advance_secretion(cell.position, ctx.dt, ctx.environment);

    if let Some(rule) = cell.functions.update_migration_bias.clone() {
        rule.apply(cell, ctx)?;
    }
    if let Some(rule) = cell.functions.custom_rule.clone() {
        rule.apply(cell, ctx)?;
    }
    if let Some(rule) = cell.functions.update_velocity.clone() {
        rule.apply(cell, ctx)?;
    }
    if let Some(rule) = cell.functions.set_orientation.clone() {
        rule.apply(cell, ctx)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        let mut config = SimulationConfig {
            dt: 1.0,
            t_max: 20.0,
            immune_activation_time: 10.0,
            threads: 1,
            ..SimulationConfig::default()
        };
        config.model.initial_tumor_radius = 25.0;
        config.model.number_of_immune_cells = 5;
        config
    }

    #[test]
    fn test_config_validation() {
        let config = SimulationConfig {
            dt: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimulationError::InvalidConfig(_))));
        let config = SimulationConfig {
            threads: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let json = r#"{"rng_seed": 7, "model": {"kill_rate": 0.1}}"#;
        let config = SimulationConfig::from_json_str(json).unwrap();
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.dt, 0.1);
        assert_eq!(config.model.kill_rate, 0.1);
        assert_eq!(config.model.attachment_rate, 0.2);
    }

    #[test]
    fn test_immune_introduction_fires_once_and_switches_cadence() {
        let mut sim = Simulation::new(small_config()).unwrap();
        let tumor = sim.cells().len();
        assert!(tumor > 0);

        let mut introduced = 0;
        for _ in 0..20 {
            introduced += sim.tick().unwrap().cells_introduced;
        }
        assert_eq!(introduced, 5);
        assert!(sim.immune_introduced());
        assert_eq!(sim.output_interval(), 3.0);
        assert_eq!(sim.event_log().events_of_type("PopulationIntroduced").len(), 1);
    }
}
