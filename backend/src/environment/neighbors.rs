//! Spatial neighbor collaborator
//!
//! Rebuilt from positions once per tick; queries return dense indices into
//! the same position slice, in no particular order.

use std::collections::HashMap;
use std::fmt;

use glam::DVec3;

use crate::error::SimulationError;

pub trait NeighborQuery: Send + Sync + fmt::Debug {
    fn rebuild(&mut self, positions: &[DVec3]) -> Result<(), SimulationError>;

    /// Visit every other point within `radius` of point `index`
    fn neighbors_within(&self, index: usize, radius: f64, visitor: &mut dyn FnMut(usize, f64));
}

type BinKey = (i64, i64, i64);

/// Uniform bucket grid with edge `bin_size`
#[derive(Debug, Clone)]
pub struct RadiusNeighbors {
    bin_size: f64,
    positions: Vec<DVec3>,
    bins: HashMap<BinKey, Vec<usize>>,
}

impl RadiusNeighbors {
    pub fn new(bin_size: f64) -> Result<Self, SimulationError> {
        if !(bin_size > 0.0) {
            return Err(SimulationError::InvalidConfig(
                "neighbor bin size must be positive".to_string(),
            ));
        }
        Ok(Self {
            bin_size,
            positions: Vec::new(),
            bins: HashMap::new(),
        })
    }

    fn key(&self, p: DVec3) -> BinKey {
        let k = (p / self.bin_size).floor();
        (k.x as i64, k.y as i64, k.z as i64)
    }
}

impl NeighborQuery for RadiusNeighbors {
    fn rebuild(&mut self, positions: &[DVec3]) -> Result<(), SimulationError> {
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.bins.clear();
        for (i, p) in positions.iter().enumerate() {
            if !p.is_finite() {
                return Err(SimulationError::InvalidConfig(format!(
                    "non-finite position for cell {}",
                    i
                )));
            }
            let key = self.key(*p);
            self.bins.entry(key).or_default().push(i);
        }
        Ok(())
    }

    fn neighbors_within(&self, index: usize, radius: f64, visitor: &mut dyn FnMut(usize, f64)) {
        let Some(center) = self.positions.get(index).copied() else {
            return;
        };
        let reach = (radius / self.bin_size).ceil() as i64;
        let (cx, cy, cz) = self.key(center);
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let Some(bucket) = self.bins.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &other in bucket {
                        if other == index {
                            continue;
                        }
                        let d = center.distance(self.positions[other]);
                        if d <= radius {
                            visitor(other, d);
                        }
                    }
                }
            }
        }
    }
}
