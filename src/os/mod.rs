//! # OS
//!
//! Platform primitives the engine is built on: memory protection, executable memory reservation and symbol lookup.
//!
//! Exactly one backend is compiled per target and exported as [`Native`].

use region::Protection;

use crate::error::{Error, Result};
use crate::Address;

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use self::unix::Unix as Native;
#[cfg(windows)]
pub use self::windows::Windows as Native;

/// Changes and restores page protections
pub trait MemoryProtection {
    /// Makes `[address, address + size)` readable, writable and executable.
    ///
    /// Returns the protection that was in place before the change, to be handed back to [`MemoryProtection::reprotect`].
    ///
    /// # Safety
    ///
    /// `address` and `size` must be page aligned. Changing the protection of memory that is concurrently
    /// relied upon by other code (e.g. a guard page) is undefined behavior.
    unsafe fn unprotect(&self, address: Address, size: usize) -> Result<Protection>;

    /// Restores a protection previously returned by [`MemoryProtection::unprotect`].
    ///
    /// # Safety
    ///
    /// Same requirements as [`MemoryProtection::unprotect`].
    unsafe fn reprotect(&self, address: Address, size: usize, previous: Protection) -> Result<()>;

    /// Lowest and highest address a process mapping can live at
    fn address_space_bounds(&self) -> (Address, Address);
}

/// Reserves executable memory for trampolines
pub trait ExecutableAllocator {
    /// Granularity reservations are rounded to
    fn granularity(&self) -> usize;

    /// Best-effort check that nothing is mapped in `[address, address + size)`
    fn is_free(&self, address: Address, size: usize) -> bool;

    /// Reserves `size` bytes of executable memory, preferably at `hint` (`0` lets the OS choose).
    ///
    /// The reservation is never released.
    ///
    /// # Safety
    ///
    /// A non-zero `hint` must have been reported free by [`ExecutableAllocator::is_free`]. Outside Linux the Unix
    /// backend maps at the exact address with `MAP_FIXED` and replaces anything another thread mapped there after
    /// the check. On Linux the reservation fails instead.
    unsafe fn reserve(&self, hint: Address, size: usize) -> Result<Address>;

    /// Makes a reservation usable. A no-op where the OS has no reserve/commit distinction.
    ///
    /// # Safety
    ///
    /// `[address, address + size)` must lie within a reservation returned by [`ExecutableAllocator::reserve`].
    unsafe fn commit(&self, address: Address, size: usize) -> Result<()>;
}

/// Looks up exported functions in the running process
pub trait SymbolResolver {
    /// Address of the first definition of `name` in library search order
    fn resolve(&self, name: &str) -> Option<Address>;
    /// Address of the definition of `name` that comes after the one calling code is linked against
    fn resolve_next(&self, name: &str) -> Option<Address>;
}

/// Shared `region` based protection change used by every backend
///
/// # Safety
///
/// See [`MemoryProtection::unprotect`]
pub(crate) unsafe fn unprotect_region(address: Address, size: usize) -> Result<Protection> {
    debug_assert_eq!(address % region::page::size(), 0, "unaligned protection change");
    debug_assert_eq!(size % region::page::size(), 0, "unaligned protection size");

    let protection_error = |source| Error::ProtectionChangeFailed { address, source };

    // The patch ranges we deal with span one or two pages of the same mapping, so the first region is representative
    let previous = region::query(address as *const u8)
        .map_err(protection_error)?
        .protection();
    region::protect(address as *const u8, size, Protection::READ_WRITE_EXECUTE)
        .map_err(protection_error)?;
    Ok(previous)
}

/// Counterpart of [`unprotect_region`]
///
/// # Safety
///
/// See [`MemoryProtection::reprotect`]
pub(crate) unsafe fn reprotect_region(
    address: Address,
    size: usize,
    previous: Protection,
) -> Result<()> {
    debug_assert_eq!(address % region::page::size(), 0, "unaligned protection change");
    debug_assert_eq!(size % region::page::size(), 0, "unaligned protection size");

    region::protect(address as *const u8, size, previous)
        .map_err(|source| Error::ProtectionChangeFailed { address, source })
}
