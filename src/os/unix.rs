//! Unix backend: `region` for protections, `mmap` for reservations and `dlsym` for symbols

use std::ffi::{c_void, CString};
use std::{io, mem};

use region::Protection;

use super::{ExecutableAllocator, MemoryProtection, SymbolResolver};
use crate::error::{Error, Result};
use crate::Address;

/// Lowest address handed out to mappings on common kernels (`vm.mmap_min_addr`)
const MIN_MAPPING_ADDRESS: Address = 0x10000;

/// Upper end of user space for the pointer width
#[cfg(target_pointer_width = "64")]
const USER_SPACE_END: Address = 0x0000_7fff_ffff_f000;
#[cfg(target_pointer_width = "32")]
const USER_SPACE_END: Address = 0xbfff_f000;

/// Native backend for Linux, macOS and the BSDs
#[derive(Debug, Default, Clone, Copy)]
pub struct Unix;

impl MemoryProtection for Unix {
    unsafe fn unprotect(&self, address: Address, size: usize) -> Result<Protection> {
        super::unprotect_region(address, size)
    }

    unsafe fn reprotect(&self, address: Address, size: usize, previous: Protection) -> Result<()> {
        super::reprotect_region(address, size, previous)
    }

    fn address_space_bounds(&self) -> (Address, Address) {
        (MIN_MAPPING_ADDRESS.max(region::page::size()), USER_SPACE_END)
    }
}

impl ExecutableAllocator for Unix {
    fn granularity(&self) -> usize {
        region::page::size()
    }

    fn is_free(&self, address: Address, size: usize) -> bool {
        // Reservations map at a fixed address, so anything we can't prove unmapped counts as taken
        match region::query_range(address as *const u8, size) {
            Ok(mut regions) => regions.next().is_none(),
            Err(_) => false,
        }
    }

    unsafe fn reserve(&self, hint: Address, size: usize) -> Result<Address> {
        #[cfg(target_os = "linux")]
        if hint != 0 {
            return map_at(hint, size);
        }

        let mut options = vec![
            mmap::MapOption::MapReadable,
            mmap::MapOption::MapWritable,
            mmap::MapOption::MapExecutable,
        ];
        if hint != 0 {
            options.push(mmap::MapOption::MapAddr(hint as *const u8));
        }

        let map = mmap::MemoryMap::new(size, &options)
            .map_err(|e| Error::Reserve(io::Error::other(e)))?;
        let base = map.data() as Address;

        // Trampolines live until the process exits
        mem::forget(map);
        Ok(base)
    }

    unsafe fn commit(&self, _address: Address, _size: usize) -> Result<()> {
        Ok(())
    }
}

/// Maps `size` bytes at exactly `hint`, failing if anything got mapped there in the meantime
#[cfg(target_os = "linux")]
unsafe fn map_at(hint: Address, size: usize) -> Result<Address> {
    let base = libc::mmap(
        hint as *mut c_void,
        size,
        libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
        -1,
        0,
    );
    if base == libc::MAP_FAILED {
        return Err(Error::Reserve(io::Error::last_os_error()));
    }
    if base as Address != hint {
        // Kernels before 4.17 treat the flag as a plain hint
        libc::munmap(base, size);
        return Err(Error::Reserve(io::ErrorKind::AddrInUse.into()));
    }
    Ok(hint)
}

impl SymbolResolver for Unix {
    fn resolve(&self, name: &str) -> Option<Address> {
        lookup(libc::RTLD_DEFAULT, name)
    }

    fn resolve_next(&self, name: &str) -> Option<Address> {
        lookup(libc::RTLD_NEXT, name)
    }
}

/// `dlsym` wrapper
fn lookup(handle: *mut c_void, name: &str) -> Option<Address> {
    let name = CString::new(name).ok()?;
    // Safety: `name` is a valid C string and both handles are pseudo-handles understood by `dlsym`
    let symbol = unsafe { libc::dlsym(handle, name.as_ptr()) };
    (!symbol.is_null()).then_some(symbol as Address)
}
