//! Tumor-immune competition model
//!
//! Tumor cells proliferate according to local oxygen scaled by their
//! oncoprotein level and secrete an immunostimulatory factor. Immune cells
//! chemotax up that factor, dock onto tumor cells they recognize, try to
//! kill them, and release after a kill, a random dwell time, or when pulled
//! too far apart.

use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::environment::{FieldConfig, Microenvironment};
use crate::error::SimulationError;
use crate::interaction::{AttachmentParameters, Interaction};
use crate::models::{Cell, CellArena, CellDefinition, CellDefinitions};
use crate::phenotype::{standard, DeathParameters, Phenotype, PhaseGraphLibrary, Secretion};
use crate::rng::SharedRng;
use crate::rules::{CellRule, RuleContext, StandardVelocity};

pub const CANCER_CELL: &str = "cancer cell";
pub const IMMUNE_CELL: &str = "immune cell";

pub const OXYGEN: &str = "oxygen";
pub const IMMUNOSTIMULATORY_FACTOR: &str = "immunostimulatory factor";

pub const ONCOPROTEIN: &str = "oncoprotein";
pub const ELASTIC_COEFFICIENT: &str = "elastic coefficient";
pub const KILL_RATE: &str = "kill rate";
pub const ATTACHMENT_LIFETIME: &str = "attachment lifetime";
pub const ATTACHMENT_RATE: &str = "attachment rate";

/// Model parameters (units: µm, min, mmHg)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancerImmuneOptions {
    pub elastic_coefficient: f64,
    pub attachment_rate: f64,
    pub kill_rate: f64,
    pub attachment_lifetime: f64,
    pub immune_apoptosis_rate: f64,
    pub tumor_apoptosis_rate: f64,
    pub relative_immune_oxygen_uptake: f64,
    pub relative_immune_adhesion: f64,
    pub relative_immune_repulsion: f64,
    pub oncoprotein_mean: f64,
    pub oncoprotein_standard_deviation: f64,
    pub immunostimulatory_secretion_live: f64,
    pub immunostimulatory_secretion_dead: f64,
    pub initial_tumor_radius: f64,
    pub oxygen_conditions: f64,
    pub number_of_immune_cells: usize,
    pub domain_half_width: f64,
    pub immunostimulatory_diffusion_coefficient: f64,
    pub immunostimulatory_decay_rate: f64,
    pub oncoprotein_saturation: f64,
    pub oncoprotein_detection_threshold: f64,
    pub max_attachment_distance: f64,
    pub min_attachment_distance: f64,
    pub persistence_time: f64,
    pub migration_speed: f64,
    pub migration_bias: f64,
    pub break_adhesion_distance: f64,
}

impl Default for CancerImmuneOptions {
    fn default() -> Self {
        Self {
            elastic_coefficient: 0.01,
            attachment_rate: 0.2,
            kill_rate: 1.0 / 15.0,
            attachment_lifetime: 60.0,
            immune_apoptosis_rate: 6.94e-5,
            tumor_apoptosis_rate: 0.00319 / 60.0,
            relative_immune_oxygen_uptake: 0.1,
            relative_immune_adhesion: 0.0,
            relative_immune_repulsion: 5.0,
            oncoprotein_mean: 1.0,
            oncoprotein_standard_deviation: 0.25,
            immunostimulatory_secretion_live: 10.0,
            immunostimulatory_secretion_dead: 10.0,
            initial_tumor_radius: 250.0,
            oxygen_conditions: 38.0,
            number_of_immune_cells: 7500,
            domain_half_width: 750.0,
            immunostimulatory_diffusion_coefficient: 1e3,
            immunostimulatory_decay_rate: 0.016,
            oncoprotein_saturation: 2.0,
            oncoprotein_detection_threshold: 0.5,
            max_attachment_distance: 18.0,
            min_attachment_distance: 14.0,
            persistence_time: 10.0,
            migration_speed: 1.0,
            migration_bias: 0.5,
            break_adhesion_distance: 20.0,
        }
    }
}

impl CancerImmuneOptions {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.oncoprotein_saturation <= self.oncoprotein_detection_threshold {
            return Err(SimulationError::InvalidConfig(
                "oncoprotein saturation must exceed the detection threshold".to_string(),
            ));
        }
        if self.max_attachment_distance <= self.min_attachment_distance {
            return Err(SimulationError::InvalidConfig(
                "max attachment distance must exceed min attachment distance".to_string(),
            ));
        }
        if self.attachment_lifetime <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "attachment lifetime must be positive".to_string(),
            ));
        }
        if self.persistence_time <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "persistence time must be positive".to_string(),
            ));
        }
        if self.domain_half_width <= 0.0 || self.initial_tumor_radius < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "domain and tumor sizes must be positive".to_string(),
            ));
        }
        if self.oncoprotein_standard_deviation < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "oncoprotein standard deviation must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn attachment(&self) -> AttachmentParameters {
        AttachmentParameters {
            oncoprotein_saturation: self.oncoprotein_saturation,
            oncoprotein_threshold: self.oncoprotein_detection_threshold,
            max_attachment_distance: self.max_attachment_distance,
            min_attachment_distance: self.min_attachment_distance,
        }
    }
}

/// Oxygen held at the physioxic boundary value, factor free to decay
pub fn default_fields(options: &CancerImmuneOptions) -> Vec<FieldConfig> {
    vec![
        FieldConfig {
            name: OXYGEN.to_string(),
            units: "mmHg".to_string(),
            initial_value: options.oxygen_conditions,
            diffusion_coefficient: 1e5,
            decay_rate: 0.1,
            dirichlet_value: Some(options.oxygen_conditions),
        },
        FieldConfig {
            name: IMMUNOSTIMULATORY_FACTOR.to_string(),
            units: "dimensionless".to_string(),
            initial_value: 0.0,
            diffusion_coefficient: options.immunostimulatory_diffusion_coefficient,
            decay_rate: options.immunostimulatory_decay_rate,
            dirichlet_value: None,
        },
    ]
}

// ============================================================================
// Cell Definitions
// ============================================================================

/// Build the tumor and immune cell types against `environment`'s fields
pub fn build_cell_definitions(
    options: &CancerImmuneOptions,
    environment: &dyn Microenvironment,
    library: &PhaseGraphLibrary,
) -> Result<CellDefinitions, SimulationError> {
    options.validate()?;
    let oxygen = environment.find_density_index(OXYGEN)?;
    let factor = environment.find_density_index(IMMUNOSTIMULATORY_FACTOR)?;

    // Tumor
    let mut phenotype = Phenotype::new(library.get(standard::LIVE)?);
    let apoptosis = phenotype.death.add_model(
        options.tumor_apoptosis_rate,
        library.get(standard::APOPTOSIS)?,
        DeathParameters::apoptosis(),
    );
    phenotype
        .death
        .add_model(0.0, library.get(standard::NECROSIS)?, DeathParameters::necrosis());
    phenotype.secretion = Secretion::new(environment.density_names());
    phenotype.secretion.uptake_rates[oxygen] = 10.0;
    phenotype.secretion.saturation_densities[oxygen] = options.oxygen_conditions;
    phenotype.secretion.saturation_densities[factor] = 1.0;
    phenotype.motility.is_motile = false;

    let mut cancer = CellDefinition::new(CANCER_CELL, phenotype);
    cancer.parameters.o2_proliferation_saturation = options.oxygen_conditions;
    cancer.add_custom_variable(ONCOPROTEIN, "dimensionless", options.oncoprotein_mean);
    cancer.custom_variable_mut(ONCOPROTEIN)?.std_dev = options.oncoprotein_standard_deviation;
    cancer.add_custom_variable(ELASTIC_COEFFICIENT, "1/min", options.elastic_coefficient);
    cancer.add_custom_variable(KILL_RATE, "1/min", 0.0);
    cancer.add_custom_variable(ATTACHMENT_LIFETIME, "min", 0.0);
    cancer.add_custom_variable(ATTACHMENT_RATE, "1/min", 0.0);

    let indices = VariableIndices::resolve(&cancer)?;
    cancer.functions.update_phenotype = Some(Arc::new(TumorPhenotypeRule {
        oxygen,
        factor,
        oncoprotein: indices.oncoprotein,
        live_secretion: options.immunostimulatory_secretion_live,
        dead_secretion: options.immunostimulatory_secretion_dead,
    }));
    cancer.functions.custom_rule = Some(Arc::new(ElasticAttachmentRule {
        elastic_coefficient: indices.elastic_coefficient,
    }));
    cancer.functions.update_velocity = Some(Arc::new(StandardVelocity));

    // Immune: same variables and death models, different behaviour
    let mut immune = cancer.clone();
    immune.name = IMMUNE_CELL.to_string();
    let live = immune
        .phenotype
        .cycle
        .graph()
        .find_phase_index_by_code(standard::codes::LIVE)?;
    immune.phenotype.cycle.set_transition_rate(live, live, 0.0)?;
    immune.phenotype.secretion.uptake_rates[oxygen] *= options.relative_immune_oxygen_uptake;
    immune.phenotype.death.set_rate(apoptosis, options.immune_apoptosis_rate)?;
    immune.phenotype.motility.is_motile = true;
    immune.phenotype.motility.persistence_time = options.persistence_time;
    immune.phenotype.motility.migration_speed = options.migration_speed;
    immune.phenotype.motility.migration_bias = options.migration_bias;
    immune.phenotype.mechanics.cell_cell_adhesion_strength *= options.relative_immune_adhesion;
    immune.phenotype.mechanics.cell_cell_repulsion_strength *= options.relative_immune_repulsion;

    immune.custom_variable_mut(ONCOPROTEIN)?.value = 0.0;
    immune.custom_variable_mut(ONCOPROTEIN)?.std_dev = 0.0;
    immune.custom_variable_mut(KILL_RATE)?.value = options.kill_rate;
    immune.custom_variable_mut(ATTACHMENT_LIFETIME)?.value = options.attachment_lifetime;
    immune.custom_variable_mut(ATTACHMENT_RATE)?.value = options.attachment_rate;

    immune.functions.update_phenotype = None;
    immune.functions.update_migration_bias = Some(Arc::new(ImmuneMotilityRule { factor }));
    immune.functions.custom_rule = Some(Arc::new(ImmuneCellRule {
        attachment: options.attachment(),
        break_distance: options.break_adhesion_distance,
        apoptosis,
        indices,
    }));

    let mut definitions = CellDefinitions::new();
    definitions.add(cancer)?;
    definitions.add(immune)?;
    Ok(definitions)
}

/// Custom variable slots, identical for both types
#[derive(Debug, Clone, Copy)]
struct VariableIndices {
    oncoprotein: usize,
    elastic_coefficient: usize,
    kill_rate: usize,
    attachment_lifetime: usize,
    attachment_rate: usize,
}

impl VariableIndices {
    fn resolve(definition: &CellDefinition) -> Result<Self, SimulationError> {
        let find = |name: &str| {
            definition
                .custom_variables()
                .iter()
                .position(|v| v.name == name)
                .ok_or_else(|| SimulationError::CustomVariableNotFound(name.to_string()))
        };
        Ok(Self {
            oncoprotein: find(ONCOPROTEIN)?,
            elastic_coefficient: find(ELASTIC_COEFFICIENT)?,
            kill_rate: find(KILL_RATE)?,
            attachment_lifetime: find(ATTACHMENT_LIFETIME)?,
            attachment_rate: find(ATTACHMENT_RATE)?,
        })
    }
}

fn custom_value(cell: &Cell, index: usize, name: &str) -> Result<f64, SimulationError> {
    cell.custom_data
        .value(index)
        .ok_or_else(|| SimulationError::CustomVariableNotFound(name.to_string()))
}

/// velocity += k * (partner - self) for every attached partner
fn add_elastic_velocity(cell: &mut Cell, ctx: &RuleContext<'_>, k: f64) {
    for partner in cell.state.attached() {
        if let Some(view) = ctx.population.get(*partner) {
            cell.velocity += k * (view.position - cell.position);
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Oxygen-driven proliferation scaled by oncoprotein, plus factor secretion
#[derive(Debug, Clone)]
pub struct TumorPhenotypeRule {
    oxygen: usize,
    factor: usize,
    oncoprotein: usize,
    live_secretion: f64,
    dead_secretion: f64,
}

impl CellRule for TumorPhenotypeRule {
    fn name(&self) -> &str {
        "tumor phenotype"
    }

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        cell.phenotype
            .secretion
            .set_secretion_rate(self.factor, self.live_secretion)?;

        let po2 = ctx.environment.density_at(cell.position, self.oxygen);
        cell.parameters.apply_oxygen_response(&mut cell.phenotype, po2)?;

        if cell.is_dead() {
            cell.phenotype
                .secretion
                .set_secretion_rate(self.factor, self.dead_secretion)?;
            cell.functions.update_phenotype = None;
            return Ok(());
        }

        // hazard must stay non-negative for draws from the lower tail
        let oncoprotein = custom_value(cell, self.oncoprotein, ONCOPROTEIN)?.max(0.0);
        let live = cell
            .phenotype
            .cycle
            .graph()
            .find_phase_index_by_code(standard::codes::LIVE)?;
        let rate = cell.phenotype.cycle.transition_rate(live, live)?;
        cell.phenotype
            .cycle
            .set_transition_rate(live, live, rate * oncoprotein)
    }
}

/// Passive side of a docking: pulled toward attached immune cells
#[derive(Debug, Clone)]
pub struct ElasticAttachmentRule {
    elastic_coefficient: usize,
}

impl CellRule for ElasticAttachmentRule {
    fn name(&self) -> &str {
        "elastic attachment"
    }

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        let k = custom_value(cell, self.elastic_coefficient, ELASTIC_COEFFICIENT)?;
        add_elastic_velocity(cell, ctx, k);
        Ok(())
    }
}

/// Chemotaxis up the factor gradient while free; still while docked
#[derive(Debug, Clone)]
pub struct ImmuneMotilityRule {
    factor: usize,
}

impl CellRule for ImmuneMotilityRule {
    fn name(&self) -> &str {
        "immune motility"
    }

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        if cell.is_dead() {
            return Ok(());
        }
        let motility = &mut cell.phenotype.motility;
        if cell.state.is_attached() {
            motility.is_motile = false;
        } else {
            motility.is_motile = true;
            motility.migration_bias_direction = ctx
                .environment
                .gradient_at(cell.position, self.factor)
                .normalize_or_zero();
        }
        Ok(())
    }
}

/// Docking, killing and release
#[derive(Debug, Clone)]
pub struct ImmuneCellRule {
    attachment: AttachmentParameters,
    break_distance: f64,
    /// Death model pushed onto killed targets
    apoptosis: usize,
    indices: VariableIndices,
}

impl ImmuneCellRule {
    fn docked(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        let k = custom_value(cell, self.indices.elastic_coefficient, ELASTIC_COEFFICIENT)?;
        add_elastic_velocity(cell, ctx, k);

        let target_id = cell.state.attached()[0];
        let Some(target) = ctx.population.get(target_id) else {
            return Ok(());
        };
        let oncoprotein = target
            .custom_data
            .value(self.indices.oncoprotein)
            .ok_or_else(|| SimulationError::CustomVariableNotFound(ONCOPROTEIN.to_string()))?;

        let mut release = false;

        let kill_rate = custom_value(cell, self.indices.kill_rate, KILL_RATE)?;
        let p_kill = self.attachment.kill_probability(kill_rate, oncoprotein, ctx.dt);
        if ctx.rng.bernoulli(p_kill, "kill")? {
            if !target.dead {
                ctx.emit(Interaction::TriggerDeath {
                    attacker: cell.id(),
                    target: target_id,
                    model: self.apoptosis,
                });
            }
            release = true;
        }

        let lifetime = custom_value(cell, self.indices.attachment_lifetime, ATTACHMENT_LIFETIME)?;
        if ctx.rng.bernoulli(ctx.dt / (lifetime + 1e-15), "detachment")? {
            release = true;
        }

        let separation_squared = (cell.position - target.position).length_squared();
        if separation_squared > self.break_distance * self.break_distance {
            release = true;
        }

        if release {
            ctx.emit(Interaction::Detach {
                initiator: cell.id(),
                target: target_id,
            });
            cell.phenotype.motility.is_motile = true;
        }
        Ok(())
    }

    /// One attachment trial against the first recognizable neighbor
    fn search(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        let attach_rate = custom_value(cell, self.indices.attachment_rate, ATTACHMENT_RATE)?;
        for candidate in ctx.neighbors_within(self.attachment.max_attachment_distance) {
            if candidate.id == cell.id() || candidate.dead {
                continue;
            }
            let Some(oncoprotein) = candidate.custom_data.value(self.indices.oncoprotein) else {
                continue;
            };
            if oncoprotein <= self.attachment.oncoprotein_threshold {
                continue;
            }
            let separation = candidate.position.distance(cell.position);
            if separation > self.attachment.max_attachment_distance {
                continue;
            }

            let p = self
                .attachment
                .attachment_probability(attach_rate, oncoprotein, separation, ctx.dt);
            if ctx.rng.bernoulli(p, "attachment")? {
                ctx.emit(Interaction::Attach {
                    initiator: cell.id(),
                    target: candidate.id,
                });
            }
            cell.phenotype.motility.is_motile = false;
            return Ok(());
        }
        cell.phenotype.motility.is_motile = true;
        Ok(())
    }
}

impl CellRule for ImmuneCellRule {
    fn name(&self) -> &str {
        "immune cell"
    }

    fn apply(&self, cell: &mut Cell, ctx: &mut RuleContext<'_>) -> Result<(), SimulationError> {
        if cell.is_dead() {
            cell.functions.custom_rule = None;
            return Ok(());
        }
        if cell.state.is_attached() {
            self.docked(cell, ctx)
        } else {
            self.search(cell, ctx)
        }
    }
}

// ============================================================================
// Seeding
// ============================================================================

/// Oncoprotein statistics of the seeded tumor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TissueSummary {
    pub count: usize,
    pub mean: f64,
    pub standard_deviation: f64,
    pub min: f64,
    pub max: f64,
}

/// Hexagonally close-packed points inside a sphere
pub fn sphere_positions(cell_radius: f64, sphere_radius: f64) -> Vec<DVec3> {
    let x_spacing = cell_radius * 3f64.sqrt();
    let y_spacing = cell_radius * 2.0;
    let z_spacing = cell_radius * 3f64.sqrt();
    let mut positions = Vec::new();
    if cell_radius <= 0.0 || sphere_radius <= 0.0 {
        return positions;
    }

    // row counters run across the whole lattice, not per plane
    let (mut xc, mut zc) = (0usize, 0usize);
    let mut z = -sphere_radius;
    while z < sphere_radius {
        let mut x = -sphere_radius;
        while x < sphere_radius {
            let mut y = -sphere_radius;
            while y < sphere_radius {
                let point = DVec3::new(
                    x + (zc % 2) as f64 * 0.5 * cell_radius,
                    y + (xc % 2) as f64 * cell_radius,
                    z,
                );
                if point.length() < sphere_radius {
                    positions.push(point);
                }
                y += y_spacing;
            }
            x += x_spacing;
            xc += 1;
        }
        z += z_spacing;
        zc += 1;
    }
    positions
}

/// Seed the initial tumor and log its oncoprotein summary
pub fn setup_tissue(
    arena: &mut CellArena,
    definitions: &CellDefinitions,
    options: &CancerImmuneOptions,
    rng: &SharedRng,
) -> Result<TissueSummary, SimulationError> {
    let cancer = definitions.find(CANCER_CELL)?;
    let cell_radius = cancer.phenotype.geometry.radius;
    let positions = sphere_positions(cell_radius, options.initial_tumor_radius);
    info!(count = positions.len(), "creating closely-packed tumor cells");

    let mut values = Vec::with_capacity(positions.len());
    for position in positions {
        let cell = cancer.instantiate(position, rng)?;
        values.push(cell.custom_data.get(ONCOPROTEIN)?);
        arena.insert(cell);
    }

    let summary = summarize(&values);
    info!(
        mean = summary.mean,
        standard_deviation = summary.standard_deviation,
        min = summary.min,
        max = summary.max,
        "oncoprotein summary"
    );
    Ok(summary)
}

fn summarize(values: &[f64]) -> TissueSummary {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / (n + 1e-15);
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0 + 1e-15);
    TissueSummary {
        count: values.len(),
        mean,
        standard_deviation: variance.max(0.0).sqrt(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Seed `count` immune cells in a shell around the current tumor
///
/// The shell starts 30 µm outside the tumor (farthest cell, or the initial
/// radius if larger) and is 75 µm thick; radii are normal around its
/// midpoint.
pub fn introduce_immune_cells(
    arena: &mut CellArena,
    definitions: &CellDefinitions,
    options: &CancerImmuneOptions,
    count: usize,
    rng: &SharedRng,
) -> Result<usize, SimulationError> {
    let farthest = arena
        .iter()
        .map(|c| c.position.length_squared())
        .fold(0.0, f64::max)
        .sqrt();
    let tumor_radius = farthest.max(options.initial_tumor_radius);
    info!(tumor_radius, count, "introducing immune cells");

    let radius_inner = tumor_radius + 30.0;
    let radius_outer = radius_inner + 75.0;
    let mean_radius = 0.5 * (radius_inner + radius_outer);
    let std_radius = 0.33 * (radius_outer - radius_inner) / 2.0;

    let immune = definitions.find(IMMUNE_CELL)?;
    for _ in 0..count {
        let direction = rng.unit_sphere();
        let radius = rng.normal(mean_radius, std_radius)?;
        arena.insert(immune.instantiate(radius * direction, rng)?);
    }
    Ok(count)
}
