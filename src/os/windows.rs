//! Windows backend: `VirtualAlloc`/`VirtualQuery` for reservations and `GetProcAddress` over loaded modules for symbols

use std::ffi::{c_void, CString};
use std::{io, mem, ptr};

use region::Protection;
use windows_sys::Win32::Foundation::HMODULE;
use windows_sys::Win32::System::LibraryLoader::GetProcAddress;
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT, MEM_FREE, MEM_RESERVE,
    PAGE_EXECUTE_READWRITE,
};
use windows_sys::Win32::System::ProcessStatus::EnumProcessModules;
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use super::{ExecutableAllocator, MemoryProtection, SymbolResolver};
use crate::error::{Error, Result};
use crate::Address;

/// Native backend for Windows
#[derive(Debug, Default, Clone, Copy)]
pub struct Windows;

/// Queries the static system information block
fn system_info() -> SYSTEM_INFO {
    // Safety: GetSystemInfo only writes into the provided struct
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        info
    }
}

impl MemoryProtection for Windows {
    unsafe fn unprotect(&self, address: Address, size: usize) -> Result<Protection> {
        super::unprotect_region(address, size)
    }

    unsafe fn reprotect(&self, address: Address, size: usize, previous: Protection) -> Result<()> {
        super::reprotect_region(address, size, previous)
    }

    fn address_space_bounds(&self) -> (Address, Address) {
        let info = system_info();
        (
            info.lpMinimumApplicationAddress as Address,
            info.lpMaximumApplicationAddress as Address,
        )
    }
}

impl ExecutableAllocator for Windows {
    fn granularity(&self) -> usize {
        system_info().dwAllocationGranularity as usize
    }

    fn is_free(&self, address: Address, size: usize) -> bool {
        // Safety: VirtualQuery accepts any address and only writes into `info`
        let info = unsafe {
            let mut info: MEMORY_BASIC_INFORMATION = mem::zeroed();
            let written = VirtualQuery(
                address as *const c_void,
                &mut info,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            );
            if written == 0 {
                return false;
            }
            info
        };

        info.State == MEM_FREE && info.BaseAddress as Address + info.RegionSize >= address + size
    }

    unsafe fn reserve(&self, hint: Address, size: usize) -> Result<Address> {
        let base = VirtualAlloc(
            hint as *const c_void,
            size,
            MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        );
        if base.is_null() {
            return Err(Error::Reserve(io::Error::last_os_error()));
        }
        Ok(base as Address)
    }

    unsafe fn commit(&self, address: Address, size: usize) -> Result<()> {
        let base = VirtualAlloc(
            address as *const c_void,
            size,
            MEM_COMMIT,
            PAGE_EXECUTE_READWRITE,
        );
        if base.is_null() {
            return Err(Error::Commit {
                address,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl SymbolResolver for Windows {
    fn resolve(&self, name: &str) -> Option<Address> {
        exports(name).next()
    }

    fn resolve_next(&self, name: &str) -> Option<Address> {
        exports(name).nth(1)
    }
}

/// Every definition of `name` across the loaded modules, in load order
fn exports(name: &str) -> impl Iterator<Item = Address> {
    let name = CString::new(name).ok();
    modules().into_iter().filter_map(move |module| {
        let name = name.as_ref()?;
        // Safety: `module` came from EnumProcessModules and `name` is a valid C string
        unsafe { GetProcAddress(module, name.as_ptr() as _) }.map(|f| f as Address)
    })
}

/// Handles of all modules loaded into the current process
fn modules() -> Vec<HMODULE> {
    let mut modules: Vec<HMODULE> = Vec::new();
    loop {
        let capacity = (modules.len() * mem::size_of::<HMODULE>()) as u32;
        let mut needed = 0u32;
        // Safety: the buffer holds `capacity` bytes and the pseudo-handle of the current process never needs closing
        let ok = unsafe {
            EnumProcessModules(
                GetCurrentProcess(),
                if modules.is_empty() {
                    ptr::null_mut()
                } else {
                    modules.as_mut_ptr()
                },
                capacity,
                &mut needed,
            )
        };
        if ok == 0 {
            return Vec::new();
        }

        let count = needed as usize / mem::size_of::<HMODULE>();
        if needed <= capacity {
            modules.truncate(count);
            return modules;
        }
        // Modules may be loaded between calls, so retry until the buffer is large enough
        modules.resize(count, ptr::null_mut());
    }
}
