//! # Patcher
//!
//! Writes jumps into live code. All raw writes of the crate go through the [`Patcher`] implementations in here.

pub mod byte;
pub mod jump;
pub mod mem;

pub use self::byte::BytePatcher;
pub use self::jump::JumpWriter;
pub use self::mem::PermissionWrapper;

use crate::error::Result;
use crate::Address;

/// Copies bytes over an arbitrary memory location
///
/// # Safety
///
/// Patchers are inherently unsafe. The implementor must ensure that the implementation of `patch` works correctly and is properly documented for avoiding undefined behavior
pub unsafe trait Patcher {
    /// Overwrites `location` with `bytes`.
    ///
    /// # Safety
    ///
    /// `location` must be valid for `bytes.len()` bytes and no thread may be executing or reading the bytes being replaced
    unsafe fn patch(&self, location: *mut u8, bytes: &[u8]) -> Result<()>;
}

/// The two jump writes a hook needs
pub trait InstructionPatcher {
    /// Writes a 5 byte `jmp rel32` at `target` that lands on `destination`.
    ///
    /// # Safety
    ///
    /// `target` must point to at least 5 bytes of code that may be clobbered
    unsafe fn write_short_jump(&self, target: Address, destination: Address) -> Result<()>;

    /// Writes an absolute jump at `target` that can reach any `destination`.
    ///
    /// # Safety
    ///
    /// `target` must point to at least [`crate::code::LONG_JUMP_MAX`] bytes that may be clobbered
    unsafe fn write_long_jump(&self, target: Address, destination: Address) -> Result<()>;
}
