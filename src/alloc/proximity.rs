//! Proximity allocator
//!
//! Hands out trampoline memory from a growing set of executable blocks, keeping every allocation close enough to its
//! anchor for a `jmp rel32` at the anchor to reach it.

use tracing::{debug, trace, warn};

use super::search;
use crate::code::LONG_JUMP_MAX;
use crate::error::{Error, Result};
use crate::os::{ExecutableAllocator, MemoryProtection};
use crate::Address;

/// Maximum distance between an anchor and its trampoline on 64-bit targets.
///
/// A quarter of the ±2 GiB a `jmp rel32` can cover, leaving room for the anchor's own module.
pub const NEAR_RANGE: usize = 0x2000_0000;

/// Number of `block_size` slots in a window reaching `distance` below and above its anchor
pub const fn window_slots(distance: usize, block_size: usize) -> usize {
    2 * (distance / block_size) + 1
}

/// Number of worst-case long jumps a block should fit before rounding to the OS granularity
const JUMPS_PER_BLOCK: usize = 4;

/// Tunables of a [`MemoryPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum distance between an anchor and the memory handed out for it. `None` when any address is reachable.
    pub max_distance: Option<usize>,
    /// Size of every OS reservation. Must be a power of two multiple of the allocator granularity.
    pub block_size: usize,
    /// Upper bound on candidate slots tried when reserving a new block near an anchor. The native configuration
    /// covers the whole window.
    pub max_probes: usize,
}

impl PoolConfig {
    /// Configuration for the build target on top of `allocator`
    pub fn for_allocator<A: ExecutableAllocator>(allocator: &A) -> Self {
        let granularity = allocator.granularity();
        let block_size = (JUMPS_PER_BLOCK * LONG_JUMP_MAX).div_ceil(granularity) * granularity;
        let max_distance = cfg!(target_pointer_width = "64").then_some(NEAR_RANGE);
        Self {
            max_distance,
            block_size,
            max_probes: window_slots(max_distance.unwrap_or(0), block_size),
        }
    }
}

/// One OS reservation of executable memory
#[derive(Debug)]
struct MemorySegment {
    /// Start of the reservation
    base: Address,
    /// Bytes reserved
    total_size: usize,
    /// Bytes not handed out yet, always taken from the end of the used part
    free_size: usize,
}

impl MemorySegment {
    /// Next address this segment would hand out
    fn cursor(&self) -> Address {
        self.base + (self.total_size - self.free_size)
    }
}

/// Pool of executable memory. Allocations are never freed.
pub struct MemoryPool<A> {
    /// Platform backend used to reserve blocks
    backend: A,
    /// Tunables
    config: PoolConfig,
    /// Every block reserved so far, in reservation order
    segments: Vec<MemorySegment>,
}

impl<A> MemoryPool<A>
where
    A: ExecutableAllocator + MemoryProtection,
{
    /// Creates an empty pool configured for the build target
    pub fn new(backend: A) -> Self {
        let config = PoolConfig::for_allocator(&backend);
        Self::with_config(backend, config)
    }

    /// Creates an empty pool with explicit tunables
    pub fn with_config(backend: A, config: PoolConfig) -> Self {
        debug_assert!(config.block_size.is_power_of_two());
        Self {
            backend,
            config,
            segments: Vec::new(),
        }
    }

    /// Tunables of this pool
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Allocates `size` bytes of executable memory within [`PoolConfig::max_distance`] of `anchor`
    pub fn allocate_near(&mut self, anchor: Address, size: usize) -> Result<Address> {
        let block_size = self.config.block_size;
        if size == 0 || size > block_size {
            return Err(Error::InvalidSize { size, block_size });
        }

        if let Some(address) = self.allocate_existing(anchor, size) {
            return Ok(address);
        }

        let base = match self.config.max_distance {
            // Safety: a zero hint lets the OS pick a free spot
            None => unsafe { self.backend.reserve(0, block_size)? },
            Some(distance) => self.reserve_near(anchor, distance)?,
        };
        // Safety: `base` was just reserved with `block_size` bytes
        unsafe { self.backend.commit(base, block_size)? };

        debug!(
            base = format_args!("{base:#x}"),
            anchor = format_args!("{anchor:#x}"),
            "reserved trampoline block"
        );
        self.segments.push(MemorySegment {
            base,
            total_size: block_size,
            free_size: block_size - size,
        });
        Ok(base)
    }

    /// Returns true if `address` may be handed out for `anchor`
    fn in_range(&self, anchor: Address, address: Address) -> bool {
        self.config
            .max_distance
            .map_or(true, |distance| address.abs_diff(anchor) <= distance)
    }

    /// Tries to carve `size` bytes out of a block that's already reserved
    fn allocate_existing(&mut self, anchor: Address, size: usize) -> Option<Address> {
        let max_distance = self.config.max_distance;
        let segment = self.segments.iter_mut().find(|segment| {
            segment.free_size >= size
                && max_distance.map_or(true, |d| segment.cursor().abs_diff(anchor) <= d)
        })?;

        let address = segment.cursor();
        segment.free_size -= size;
        Some(address)
    }

    /// Reserves a new block within `distance` of `anchor`, probing outward from the middle of the window
    fn reserve_near(&self, anchor: Address, distance: usize) -> Result<Address> {
        let block_size = self.config.block_size;
        let (min, max) = self.backend.address_space_bounds();

        let low = anchor
            .saturating_sub(distance)
            .max(min)
            .checked_next_multiple_of(block_size)
            .ok_or(Error::OutOfRange { anchor })?;
        let high = anchor.saturating_add(distance).min(max) & !(block_size - 1);

        for candidate in search::outward(low, high, block_size).take(self.config.max_probes) {
            if !self.backend.is_free(candidate, block_size) {
                continue;
            }

            // Safety: the candidate was just reported free
            match unsafe { self.backend.reserve(candidate, block_size) } {
                Ok(base) if self.in_range(anchor, base) => return Ok(base),
                Ok(base) => {
                    trace!(base = format_args!("{base:#x}"), "reservation landed out of range");
                }
                Err(e) => {
                    trace!(candidate = format_args!("{candidate:#x}"), error = %e, "reservation refused");
                }
            }
        }

        warn!(
            anchor = format_args!("{anchor:#x}"),
            distance = format_args!("{distance:#x}"),
            "no free block near anchor"
        );
        Err(Error::OutOfRange { anchor })
    }
}
