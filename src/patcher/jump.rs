//! Jump writer on top of a raw [`Patcher`]

use super::{InstructionPatcher, Patcher};
use crate::code;
use crate::error::Result;
use crate::Address;

/// Encodes jumps for the build target and hands them to the wrapped patcher
#[derive(Debug, Default)]
pub struct JumpWriter<P> {
    /// Patcher that performs the write
    patcher: P,
}
impl<P: Patcher> JumpWriter<P> {
    /// Creates a jump writer on top of `patcher`
    pub fn new(patcher: P) -> Self {
        Self { patcher }
    }
}

impl<P: Patcher> InstructionPatcher for JumpWriter<P> {
    unsafe fn write_short_jump(&self, target: Address, destination: Address) -> Result<()> {
        let jmp = code::jmp_rel32(target, destination)?;
        self.patcher.patch(target as *mut u8, &jmp)
    }

    unsafe fn write_long_jump(&self, target: Address, destination: Address) -> Result<()> {
        let jmp = code::jmp_abs(target, destination);
        self.patcher.patch(target as *mut u8, &jmp)
    }
}
