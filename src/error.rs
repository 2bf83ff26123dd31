//! # Error
//!
//! Errors produced while reserving trampoline memory, patching code or installing hooks

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a single hook point can fail to install
#[derive(Debug, Error)]
pub enum Error {
    /// The named function is not exported by any loaded module
    #[error("symbol `{0}` could not be resolved")]
    SymbolNotFound(String),
    /// The OS refused to change the protection of the patch range
    #[error("failed to change memory protection at {address:#x}")]
    ProtectionChangeFailed {
        /// Page-aligned start of the range
        address: usize,
        /// Underlying OS error
        #[source]
        source: region::Error,
    },
    /// No memory could be reserved close enough to the anchor
    #[error("no executable memory available within range of {anchor:#x}")]
    OutOfRange {
        /// Address the allocation had to stay close to
        anchor: usize,
    },
    /// A relative jump cannot encode the distance between two addresses
    #[error("jump from {origin:#x} to {destination:#x} does not fit a 32-bit displacement")]
    DisplacementOutOfRange {
        /// Address of the jump instruction
        origin: usize,
        /// Jump destination
        destination: usize,
    },
    /// Requested sub-allocation is empty or larger than a pool block
    #[error("invalid allocation size {size} (block size is {block_size})")]
    InvalidSize {
        /// Requested size
        size: usize,
        /// Size of a single pool block
        block_size: usize,
    },
    /// The OS refused to reserve executable memory
    #[error("failed to reserve executable memory")]
    Reserve(#[source] io::Error),
    /// The OS refused to commit reserved memory
    #[error("failed to commit executable memory at {address:#x}")]
    Commit {
        /// Base of the reservation
        address: usize,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
    /// A hook table was supplied but the hook point has no entry in it
    #[error("hook point `{0}` has no slot in the hook table")]
    NoTableSlot(&'static str),
    /// The hook point's slot lies past the end of the hook table
    #[error("slot {slot} is outside the hook table (length {len})")]
    TableSlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Number of entries in the table
        len: usize,
    },
    /// Hooks were already installed; not a failure
    #[error("hooks are already installed")]
    AlreadyInstalled,
}
