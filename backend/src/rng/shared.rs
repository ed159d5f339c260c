//! Process-wide generator shared by all worker threads
//!
//! One seeded [`RngManager`] behind a mutex. Draws from the parallel agent
//! pass are serialized, but the order in which threads acquire the lock is
//! unspecified, so runs with more than one worker thread are NOT
//! reproducible even with a fixed seed. Single-threaded runs are.

use glam::DVec3;
use parking_lot::Mutex;
use rand_distr::{Distribution, Normal};

use super::RngManager;
use crate::error::SimulationError;

#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<RngManager>,
}

impl SharedRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(RngManager::new(seed)),
        }
    }

    /// Current generator state (for checkpointing)
    pub fn state(&self) -> u64 {
        self.inner.lock().get_state()
    }

    /// Run `f` with exclusive access to the generator
    pub fn with<R>(&self, f: impl FnOnce(&mut RngManager) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Uniform draw in [0, 1)
    pub fn uniform(&self) -> f64 {
        self.inner.lock().next_f64()
    }

    /// Bernoulli trial with per-tick probability `p`
    ///
    /// `p` is never clamped: a value above 1 (or negative, or NaN) means
    /// `rate * dt` was configured too large and is returned as
    /// [`SimulationError::ProbabilityOutOfRange`].
    pub fn bernoulli(&self, p: f64, what: &'static str) -> Result<bool, SimulationError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimulationError::ProbabilityOutOfRange {
                what,
                probability: p,
            });
        }
        Ok(self.uniform() < p)
    }

    /// Normal draw; `std_dev == 0` returns `mean`
    pub fn normal(&self, mean: f64, std_dev: f64) -> Result<f64, SimulationError> {
        let normal = Normal::new(mean, std_dev).map_err(|e| {
            SimulationError::InvalidConfig(format!(
                "normal distribution N({}, {}): {}",
                mean, std_dev, e
            ))
        })?;
        Ok(self.with(|rng| normal.sample(rng)))
    }

    /// Direction uniformly distributed on the unit sphere
    pub fn unit_sphere(&self) -> DVec3 {
        self.with(|rng| {
            let theta = rng.next_f64() * std::f64::consts::TAU;
            let phi = (2.0 * rng.next_f64() - 1.0).acos();
            DVec3::new(theta.cos() * phi.sin(), theta.sin() * phi.sin(), phi.cos())
        })
    }

    /// Direction uniformly distributed on the unit circle in the xy-plane
    pub fn unit_circle(&self) -> DVec3 {
        let theta = self.uniform() * std::f64::consts::TAU;
        DVec3::new(theta.cos(), theta.sin(), 0.0)
    }
}

impl From<RngManager> for SharedRng {
    fn from(rng: RngManager) -> Self {
        Self {
            inner: Mutex::new(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bernoulli_rejects_probability_above_one() {
        let rng = SharedRng::new(1);
        let err = rng.bernoulli(1.5, "transition").unwrap_err();
        assert_eq!(
            err,
            SimulationError::ProbabilityOutOfRange {
                what: "transition",
                probability: 1.5
            }
        );
    }

    #[test]
    fn test_bernoulli_extremes() {
        let rng = SharedRng::new(1);
        for _ in 0..100 {
            assert!(rng.bernoulli(1.0, "x").unwrap());
            assert!(!rng.bernoulli(0.0, "x").unwrap());
        }
    }

    #[test]
    fn test_bernoulli_rejects_nan() {
        let rng = SharedRng::new(1);
        assert!(rng.bernoulli(f64::NAN, "x").is_err());
    }

    #[test]
    fn test_unit_sphere_is_normalized() {
        let rng = SharedRng::new(3);
        for _ in 0..100 {
            let v = rng.unit_sphere();
            assert!((v.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normal_zero_sd_is_mean() {
        let rng = SharedRng::new(3);
        assert_eq!(rng.normal(1.0, 0.0).unwrap(), 1.0);
    }
}
