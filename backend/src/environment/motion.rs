//! Motion collaborator: turns accumulated velocities into positions

use std::fmt;

use glam::DVec3;
use rayon::prelude::*;

use crate::models::Cell;

pub trait MotionIntegrator: Send + Sync + fmt::Debug {
    fn integrate(&self, cells: &mut [Cell], dt: f64);
}

/// Forward Euler; velocity is consumed each step
#[derive(Debug, Clone, Copy, Default)]
pub struct EulerIntegrator;

impl MotionIntegrator for EulerIntegrator {
    fn integrate(&self, cells: &mut [Cell], dt: f64) {
        cells.par_iter_mut().for_each(|cell| {
            cell.position += dt * cell.velocity;
            cell.velocity = DVec3::ZERO;
        });
    }
}
