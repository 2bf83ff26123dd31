//! This module contains a byte patcher

use std::ptr;

use super::Patcher;
use crate::error::Result;

/// Patcher for patching memory locations with byte arrays.
/// This patcher never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytePatcher;
impl BytePatcher {
    /// Creates a new [`BytePatcher`]
    pub fn new() -> Self {
        Self
    }
}
unsafe impl Patcher for BytePatcher {
    unsafe fn patch(&self, location: *mut u8, bytes: &[u8]) -> Result<()> {
        // Safety: caller must ensure that `location` is writable for the full length of the patch
        ptr::copy_nonoverlapping(bytes.as_ptr(), location, bytes.len());
        Ok(())
    }
}
