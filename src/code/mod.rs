//! # Code
//!
//! Machine code for the jumps written at patch sites and inside trampolines

use crate::error::{Error, Result};
use crate::Address;

pub mod x64;
pub mod x86;

/// Opcode of `jmp rel32`
pub const JMP_REL32: u8 = 0xe9;
/// Length of `jmp rel32`
pub const JMP_REL32_LEN: usize = 5;

/// Worst-case size of a long jump on the build target
#[cfg(target_arch = "x86_64")]
pub const LONG_JUMP_MAX: usize = x64::JMP_ABS_LEN;
/// Worst-case size of a long jump on the build target
#[cfg(target_arch = "x86")]
pub const LONG_JUMP_MAX: usize = x86::JMP_ABS_LEN;

/// Generates `jmp rel32` placed at `source` and landing on `destination`.
///
/// Fails when the displacement doesn't fit a signed 32-bit value. On 32-bit targets the displacement wraps around the
/// address space, so every destination is reachable.
pub fn jmp_rel32(source: Address, destination: Address) -> Result<[u8; JMP_REL32_LEN]> {
    let displacement = destination.wrapping_sub(source.wrapping_add(JMP_REL32_LEN)) as isize;
    let displacement = i32::try_from(displacement).map_err(|_| Error::DisplacementOutOfRange {
        origin: source,
        destination,
    })?;

    let mut code = [0u8; JMP_REL32_LEN];
    code[0] = JMP_REL32;
    code[1..].copy_from_slice(&displacement.to_le_bytes());
    Ok(code)
}

/// Generates the native long jump placed at `source` and landing on `destination`
#[cfg(target_arch = "x86_64")]
pub fn jmp_abs(_source: Address, destination: Address) -> Vec<u8> {
    x64::jmp_abs(destination as u64).into()
}

/// Generates the native long jump placed at `source` and landing on `destination`
#[cfg(target_arch = "x86")]
pub fn jmp_abs(source: Address, destination: Address) -> Vec<u8> {
    x86::jmp_abs(source as u32, destination as u32).into()
}
