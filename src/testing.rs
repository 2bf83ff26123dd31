//! Test doubles for the platform backend and the instruction patcher

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;

use region::Protection;

use crate::error::{Error, Result};
use crate::os::{ExecutableAllocator, MemoryProtection, SymbolResolver};
use crate::patcher::InstructionPatcher;
use crate::Address;

/// Where the fake OS places blocks when no hint is given
const ANYWHERE: Address = 0x6000_0000_0000;

/// Address space simulation: tracks reservations without backing them with memory
pub(crate) struct FakeOs {
    /// Mapped ranges
    taken: RefCell<Vec<(Address, usize)>>,
    /// `(hint, base)` of every successful reservation
    reserved: RefCell<Vec<(Address, Address)>>,
    /// Number of commit calls
    commits: Cell<usize>,
    /// Next base handed out for a zero hint
    anywhere: Cell<Address>,
}

impl FakeOs {
    pub(crate) fn new() -> Self {
        Self {
            taken: RefCell::default(),
            reserved: RefCell::default(),
            commits: Cell::new(0),
            anywhere: Cell::new(ANYWHERE),
        }
    }

    /// Marks a range as mapped by someone else
    pub(crate) fn occupy(&self, address: Address, size: usize) {
        self.taken.borrow_mut().push((address, size));
    }

    pub(crate) fn reservations(&self) -> Vec<Address> {
        self.reserved.borrow().iter().map(|&(_, base)| base).collect()
    }

    pub(crate) fn hints(&self) -> Vec<Address> {
        self.reserved.borrow().iter().map(|&(hint, _)| hint).collect()
    }

    pub(crate) fn commits(&self) -> usize {
        self.commits.get()
    }

    pub(crate) fn bounds(&self) -> (Address, Address) {
        (0x10000, 0x7fff_ffff_f000)
    }
}

impl MemoryProtection for &FakeOs {
    unsafe fn unprotect(&self, _address: Address, _size: usize) -> Result<Protection> {
        Ok(Protection::READ_EXECUTE)
    }

    unsafe fn reprotect(&self, _address: Address, _size: usize, _previous: Protection) -> Result<()> {
        Ok(())
    }

    fn address_space_bounds(&self) -> (Address, Address) {
        self.bounds()
    }
}

impl ExecutableAllocator for &FakeOs {
    fn granularity(&self) -> usize {
        0x1000
    }

    fn is_free(&self, address: Address, size: usize) -> bool {
        !self
            .taken
            .borrow()
            .iter()
            .any(|&(start, len)| address < start + len && start < address + size)
    }

    unsafe fn reserve(&self, hint: Address, size: usize) -> Result<Address> {
        let base = if hint == 0 {
            let base = self.anywhere.get();
            self.anywhere.set(base + size);
            base
        } else if self.is_free(hint, size) {
            hint
        } else {
            return Err(Error::Reserve(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "range is mapped",
            )));
        };
        self.occupy(base, size);
        self.reserved.borrow_mut().push((hint, base));
        Ok(base)
    }

    unsafe fn commit(&self, _address: Address, _size: usize) -> Result<()> {
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }
}

/// Symbol table backed by a map
#[derive(Default)]
pub(crate) struct FakeSymbols {
    /// First definition of each name
    symbols: HashMap<&'static str, Address>,
    /// Next definition of each name
    next: HashMap<&'static str, Address>,
    /// Number of `resolve_next` lookups
    pub(crate) next_lookups: Cell<usize>,
}

impl FakeSymbols {
    pub(crate) fn with(mut self, name: &'static str, address: Address) -> Self {
        self.symbols.insert(name, address);
        self
    }

    pub(crate) fn with_next(mut self, name: &'static str, address: Address) -> Self {
        self.next.insert(name, address);
        self
    }
}

impl SymbolResolver for FakeSymbols {
    fn resolve(&self, name: &str) -> Option<Address> {
        self.symbols.get(name).copied()
    }

    fn resolve_next(&self, name: &str) -> Option<Address> {
        self.next_lookups.set(self.next_lookups.get() + 1);
        self.next.get(name).copied()
    }
}

/// Kind of jump a [`CountingPatcher`] was asked to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Jump {
    Short,
    Long,
}

/// Instruction patcher that records writes instead of performing them
#[derive(Default)]
pub(crate) struct CountingPatcher {
    /// `(kind, target, destination)` in call order
    writes: RefCell<Vec<(Jump, Address, Address)>>,
    /// Targets whose short jump should fail
    failing: RefCell<Vec<Address>>,
}

impl CountingPatcher {
    pub(crate) fn writes(&self) -> Vec<(Jump, Address, Address)> {
        self.writes.borrow().clone()
    }

    /// Makes every short jump at `target` fail with a protection error
    pub(crate) fn fail_at(&self, target: Address) {
        self.failing.borrow_mut().push(target);
    }
}

impl InstructionPatcher for &CountingPatcher {
    unsafe fn write_short_jump(&self, target: Address, destination: Address) -> Result<()> {
        if self.failing.borrow().contains(&target) {
            return Err(Error::ProtectionChangeFailed {
                address: target,
                source: region::Error::UnmappedRegion,
            });
        }
        self.writes.borrow_mut().push((Jump::Short, target, destination));
        Ok(())
    }

    unsafe fn write_long_jump(&self, target: Address, destination: Address) -> Result<()> {
        self.writes.borrow_mut().push((Jump::Long, target, destination));
        Ok(())
    }
}
