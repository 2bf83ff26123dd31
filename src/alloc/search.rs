//! Candidate slots for a new pool block, probed outward from the middle of a window

use crate::Address;

/// Returns the block-aligned slots of `[low, high)`, starting at the middle of the window and alternating below/above.
///
/// Every yielded slot `s` satisfies `low <= s` and `s + block <= high`. Both bounds must already be aligned to `block`.
pub fn outward(low: Address, high: Address, block: usize) -> impl Iterator<Item = Address> {
    debug_assert!(block.is_power_of_two());
    debug_assert_eq!(low % block, 0);
    debug_assert_eq!(high % block, 0);

    let middle = (low / 2 + high / 2) & !(block - 1);
    OutwardSlots {
        low,
        high,
        block,
        below: (high > low).then_some(middle),
        above: middle.checked_add(block),
        above_next: false,
    }
}

/// Iterator behind [`outward`]
struct OutwardSlots {
    /// Lowest slot address
    low: Address,
    /// End of the window, exclusive
    high: Address,
    /// Slot size and alignment
    block: usize,
    /// Next slot at or below the middle
    below: Option<Address>,
    /// Next slot above the middle
    above: Option<Address>,
    /// Which side to take from next
    above_next: bool,
}

impl OutwardSlots {
    /// Takes the next slot below the middle
    fn next_below(&mut self) -> Option<Address> {
        let slot = self.below.filter(|&slot| slot >= self.low && slot < self.high)?;
        self.below = slot.checked_sub(self.block);
        Some(slot)
    }

    /// Takes the next slot above the middle
    fn next_above(&mut self) -> Option<Address> {
        let slot = self
            .above
            .filter(|&slot| slot >= self.low && slot.checked_add(self.block).is_some_and(|end| end <= self.high))?;
        self.above = slot.checked_add(self.block);
        Some(slot)
    }
}

impl Iterator for OutwardSlots {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        let above_next = self.above_next;
        self.above_next = !above_next;
        if above_next {
            self.next_above().or_else(|| self.next_below())
        } else {
            self.next_below().or_else(|| self.next_above())
        }
    }
}
