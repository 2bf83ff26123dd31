#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("inlinehook only patches x86 and x86_64 code");

pub mod alloc;
pub mod code;
pub mod error;
pub mod hook;
pub mod os;
pub mod patcher;

#[cfg(all(test, target_pointer_width = "64"))]
mod testing;

pub use error::{Error, Result};
pub use hook::{hooks_installed, install_hooks, next_handler, HookPoint, HookTable, InstallReport};

/// A location in the address space of the current process
pub type Address = usize;
