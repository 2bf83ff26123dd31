//! # Trampolines
//!
//! A patched function starts with a `jmp rel32` to a trampoline allocated close to it; the trampoline holds an
//! absolute jump to the replacement, which may live anywhere in the address space.

use tracing::debug;

use super::InlineInstaller;
use crate::alloc::MemoryPool;
use crate::code::LONG_JUMP_MAX;
use crate::error::Result;
use crate::os::{ExecutableAllocator, MemoryProtection, Native};
use crate::patcher::{BytePatcher, InstructionPatcher, JumpWriter, PermissionWrapper};
use crate::Address;

/// Jump writer used by [`Trampolines::native`]
pub type NativeWriter = JumpWriter<PermissionWrapper<BytePatcher, Native>>;

/// Builds trampolines and redirects functions through them
pub struct Trampolines<A, W> {
    /// Memory the trampolines are carved from
    pool: MemoryPool<A>,
    /// Writes both jumps of a hook
    writer: W,
}

impl Trampolines<Native, NativeWriter> {
    /// Trampoline builder for the running process
    pub fn native() -> Self {
        Self::new(
            MemoryPool::new(Native),
            JumpWriter::new(PermissionWrapper::new(BytePatcher::new(), Native)),
        )
    }
}

impl<A, W> Trampolines<A, W>
where
    A: ExecutableAllocator + MemoryProtection,
    W: InstructionPatcher,
{
    /// Creates a builder from its parts
    pub fn new(pool: MemoryPool<A>, writer: W) -> Self {
        Self { pool, writer }
    }

    /// Allocates a trampoline near `original` that jumps to `replacement`
    ///
    /// # Safety
    ///
    /// `replacement` must be executable code
    pub unsafe fn build(&mut self, original: Address, replacement: Address) -> Result<Address> {
        let trampoline = self.pool.allocate_near(original, LONG_JUMP_MAX)?;
        self.writer.write_long_jump(trampoline, replacement)?;
        Ok(trampoline)
    }

    /// Redirects `original` to `replacement` through a new trampoline.
    ///
    /// The first 5 bytes of `original` are lost. If the final write fails the trampoline stays allocated but unused.
    ///
    /// # Safety
    ///
    /// - `original` must be the entry of a function with at least 5 bytes that no code branches into
    /// - no other thread may be executing the first 5 bytes of `original`
    /// - `replacement` must be executable code with a signature compatible with `original`
    pub unsafe fn install(&mut self, original: Address, replacement: Address) -> Result<()> {
        let trampoline = self.build(original, replacement)?;
        self.writer.write_short_jump(original, trampoline)?;
        debug!(
            original = format_args!("{original:#x}"),
            trampoline = format_args!("{trampoline:#x}"),
            replacement = format_args!("{replacement:#x}"),
            "function redirected"
        );
        Ok(())
    }
}

impl<A, W> InlineInstaller for Trampolines<A, W>
where
    A: ExecutableAllocator + MemoryProtection,
    W: InstructionPatcher,
{
    unsafe fn install(&mut self, original: Address, replacement: Address) -> Result<()> {
        Trampolines::install(self, original, replacement)
    }
}

#[cfg(all(test, target_pointer_width = "64"))]
mod tests {
    use super::Trampolines;
    use crate::alloc::{MemoryPool, PoolConfig, NEAR_RANGE};
    use crate::code::LONG_JUMP_MAX;
    use crate::error::Error;
    use crate::testing::{CountingPatcher, FakeOs, Jump};

    const ORIGINAL: usize = 0x7ff6_1000_2340;
    const REPLACEMENT: usize = 0x1_4000_0000;

    fn pool(os: &FakeOs) -> MemoryPool<&FakeOs> {
        MemoryPool::with_config(
            os,
            PoolConfig {
                max_distance: Some(NEAR_RANGE),
                block_size: 0x1000,
                max_probes: 64,
            },
        )
    }

    #[test]
    /// A trampoline is a single long jump to the replacement, close to the original
    fn test_build() {
        let os = FakeOs::new();
        let patcher = CountingPatcher::default();
        let mut trampolines = Trampolines::new(pool(&os), &patcher);

        let trampoline = unsafe { trampolines.build(ORIGINAL, REPLACEMENT).unwrap() };
        assert!(trampoline.abs_diff(ORIGINAL) <= NEAR_RANGE);
        assert_eq!(patcher.writes(), [(Jump::Long, trampoline, REPLACEMENT)]);
    }

    #[test]
    /// Installing writes the trampoline first, then the short jump at the original
    fn test_install() {
        let os = FakeOs::new();
        let patcher = CountingPatcher::default();
        let mut trampolines = Trampolines::new(pool(&os), &patcher);

        unsafe { trampolines.install(ORIGINAL, REPLACEMENT).unwrap() };

        let writes = patcher.writes();
        assert_eq!(writes.len(), 2);
        let (kind, trampoline, destination) = writes[0];
        assert_eq!((kind, destination), (Jump::Long, REPLACEMENT));
        assert_eq!(writes[1], (Jump::Short, ORIGINAL, trampoline));
    }

    #[test]
    /// Hooks on nearby functions share one block
    fn test_shared_block() {
        let os = FakeOs::new();
        let patcher = CountingPatcher::default();
        let mut trampolines = Trampolines::new(pool(&os), &patcher);

        let first = unsafe { trampolines.build(ORIGINAL, REPLACEMENT).unwrap() };
        let second = unsafe { trampolines.build(ORIGINAL + 0x40, REPLACEMENT + 0x10).unwrap() };
        assert_eq!(second, first + LONG_JUMP_MAX);
        assert_eq!(os.reservations().len(), 1);
    }

    #[test]
    /// A failed short jump leaves the original untouched and the trampoline allocated
    fn test_failed_patch() {
        let os = FakeOs::new();
        let patcher = CountingPatcher::default();
        patcher.fail_at(ORIGINAL);
        let mut trampolines = Trampolines::new(pool(&os), &patcher);

        let err = unsafe { trampolines.install(ORIGINAL, REPLACEMENT).unwrap_err() };
        assert!(matches!(err, Error::ProtectionChangeFailed { address: ORIGINAL, .. }));
        assert_eq!(patcher.writes().len(), 1);
        assert_eq!(patcher.writes()[0].0, Jump::Long);

        // the next trampoline doesn't reuse the leaked one
        let next = unsafe { trampolines.build(ORIGINAL, REPLACEMENT).unwrap() };
        assert_eq!(next, patcher.writes()[0].1 + LONG_JUMP_MAX);
    }
}
