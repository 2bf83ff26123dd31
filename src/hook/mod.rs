//! # Hook
//!
//! This module covers hooks, which redirect calls to exported functions to dispatch functions.
//!
//! The process-wide entry points are [`install_hooks`], [`hooks_installed`] and [`next_handler`]. Installation is
//! expected to happen once, as early as possible and before other threads call the hooked functions: a thread
//! executing the first bytes of a function while it is patched can't be detected.

pub mod registry;
pub mod table;
pub mod trampoline;

use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;

pub use self::registry::{HookPoint, HookRegistry, InstallReport};
pub use self::table::HookTable;
pub use self::trampoline::{NativeWriter, Trampolines};

use crate::error::Result;
use crate::os::Native;
use crate::Address;

/// Redirects a function to a replacement
pub trait InlineInstaller {
    /// Makes every call to `original` land in `replacement`
    ///
    /// # Safety
    ///
    /// See [`Trampolines::install`]
    unsafe fn install(&mut self, original: Address, replacement: Address) -> Result<()>;
}

lazy_static! {
    /// Hook state of the process
    static ref REGISTRY: HookRegistry = HookRegistry::new();
    /// Trampoline memory of the process
    static ref TRAMPOLINES: Mutex<Trampolines<Native, NativeWriter>> = Mutex::new(Trampolines::native());
}

/// Installs the hooks of `points`, once per process.
///
/// With a host `table` the entries are swapped and no code is touched; otherwise each function is resolved by name and
/// patched to jump to its dispatcher. A failure only affects its own hook point and is listed in the report. Calls
/// after the first, including re-entrant ones from hooked code, return immediately.
pub fn install_hooks(points: &[HookPoint], table: Option<&HookTable>) -> InstallReport {
    if REGISTRY.is_installed() {
        return InstallReport::already_installed();
    }

    let mut trampolines = TRAMPOLINES.lock().unwrap_or_else(PoisonError::into_inner);
    REGISTRY.install(points, table, &Native, &mut *trampolines)
}

/// Returns true once [`install_hooks`] has run
pub fn hooks_installed() -> bool {
    REGISTRY.is_installed()
}

/// Handler a dispatcher for `name` should call after doing its own work, if any.
///
/// This is the entry the hook table held before installation, or, when the dispatcher is reached because it shadows
/// the function by name, the next definition in library search order.
pub fn next_handler(name: &'static str) -> Option<*const ()> {
    REGISTRY
        .next_handler(name, &Native)
        .map(|address| address as *const ())
}
