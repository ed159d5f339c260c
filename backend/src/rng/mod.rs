//! Random number generation
//!
//! Uses xorshift64* for fast, seedable generation.
//! CRITICAL: All randomness in the engine MUST go through this module.

mod shared;
mod xorshift;

pub use shared::SharedRng;
pub use xorshift::RngManager;
