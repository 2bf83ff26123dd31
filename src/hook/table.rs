//! Function pointer tables provided by the host runtime

use std::ptr::{self, NonNull};

use crate::error::{Error, Result};
use crate::Address;

/// A table of callback pointers the host runtime consults at its hook points.
///
/// When the host exposes one, hooks are installed by swapping entries instead of patching code.
#[derive(Debug)]
pub struct HookTable {
    /// First entry
    entries: NonNull<Address>,
    /// Number of entries
    len: usize,
}

impl HookTable {
    /// Wraps a raw table. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `entries` must be valid for reads and writes of `len` pointer-sized entries for as long as the returned value and
    /// any hook installed through it are in use
    pub unsafe fn from_raw(entries: *mut Address, len: usize) -> Option<Self> {
        NonNull::new(entries).map(|entries| Self { entries, len })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the entry at `slot`
    pub fn get(&self, slot: usize) -> Result<Address> {
        let entry = self.entry(slot)?;
        // Safety: `from_raw` guarantees the entry is readable
        Ok(unsafe { ptr::read_volatile(entry) })
    }

    /// Overwrites the entry at `slot`, returning the previous value
    pub fn replace(&self, slot: usize, value: Address) -> Result<Address> {
        let entry = self.entry(slot)?;
        // Safety: `from_raw` guarantees the entry is readable and writable
        unsafe {
            let previous = ptr::read_volatile(entry);
            ptr::write_volatile(entry, value);
            Ok(previous)
        }
    }

    /// Pointer to the entry at `slot`
    fn entry(&self, slot: usize) -> Result<*mut Address> {
        if slot >= self.len {
            return Err(Error::TableSlotOutOfRange {
                slot,
                len: self.len,
            });
        }
        // Safety: `slot` is in bounds of the table
        Ok(unsafe { self.entries.as_ptr().add(slot) })
    }
}
