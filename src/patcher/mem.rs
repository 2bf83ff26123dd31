//! This module contains a patcher which adjusts memory permissions to patch read-only code

use super::Patcher;
use crate::error::Result;
use crate::os::MemoryProtection;
use crate::Address;

/// Page-aligned span covering `[address, address + len)`
pub(crate) fn page_span(address: Address, len: usize) -> (Address, usize) {
    let page = region::page::size();
    let start = address & !(page - 1);
    let end = (address + len + page - 1) & !(page - 1);
    (start, end - start)
}

/// This struct wraps patchers to allow them to write to memory that's normally unwritable.
/// It achieves this result by changing the memory permissions of the target pages, triggering the patch, and then reverting the permissions.
///
/// # Safety
///
/// `PermissionWrapper` relies on the size of the patch value to determine how many pages to change write permissions,
/// pairing `PermissionWrapper` with a patcher that writes more memory than the size of the patch is undefined behavior.
pub struct PermissionWrapper<P, M> {
    /// Underlying patcher.
    patcher: P,
    /// Backend used to flip page protections
    protection: M,
}
impl<P: Patcher, M: MemoryProtection> PermissionWrapper<P, M> {
    /// Creates a new PermissionWrapper
    pub fn new(patcher: P, protection: M) -> Self {
        Self {
            patcher,
            protection,
        }
    }
}

unsafe impl<P, M> Patcher for PermissionWrapper<P, M>
where
    P: Patcher,
    M: MemoryProtection,
{
    unsafe fn patch(&self, location: *mut u8, bytes: &[u8]) -> Result<()> {
        let (start, size) = page_span(location as Address, bytes.len());
        let previous = self.protection.unprotect(start, size)?;

        let patched = self.patcher.patch(location, bytes);

        // Restore even when the write failed so the pages don't stay writable
        let restored = self.protection.reprotect(start, size, previous);
        patched.and(restored)
    }
}
