//! # Alloc
//!
//! Allocates trampoline memory near a given address

pub mod proximity;
pub mod search;

pub use self::proximity::{window_slots, MemoryPool, PoolConfig, NEAR_RANGE};
