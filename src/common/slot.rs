// MIT License
//
// Copyright (c) 2026 the htab developers
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Slot state machine.
//!
//! A slot is a single `u64` word holding both its state and, when present,
//! the stored hash. The two highest bits are the state tag; the low 62 bits
//! are the hash payload. An all-zero word is an empty slot, so zero-filled
//! allocations are valid empty tables.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of high bits reserved for the state tag.
pub(crate) const TAG_BITS: u32 = 2;

const TAG_SHIFT: u32 = 64 - TAG_BITS;

/// Mask selecting the hash payload of a slot word.
pub(crate) const HASH_MASK: u64 = (1 << TAG_SHIFT) - 1;

/// An empty slot. Must be all-zero.
pub(crate) const EMPTY: u64 = 0;

/// A slot whose entry was removed; probe chains pass through it.
pub(crate) const TOMBSTONE: u64 = 0b01 << TAG_SHIFT;

const RESERVED_TAG: u64 = 0b10 << TAG_SHIFT;
const OCCUPIED_TAG: u64 = 0b11 << TAG_SHIFT;

/// Decoded view of one slot word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Empty,
    Tombstone,
    /// Claimed for this hash; its value cell is being touched.
    Reserved(u64),
    Occupied(u64),
}

/// Discards the bits of `hash` that cannot be stored in a slot word.
#[inline]
pub(crate) fn truncate(hash: u64) -> u64 {
    hash & HASH_MASK
}

#[inline]
pub(crate) fn occupied(hash: u64) -> u64 {
    debug_assert_eq!(hash & !HASH_MASK, 0);

    hash | OCCUPIED_TAG
}

#[inline]
pub(crate) fn reserved(hash: u64) -> u64 {
    debug_assert_eq!(hash & !HASH_MASK, 0);

    hash | RESERVED_TAG
}

#[inline]
pub(crate) fn decode(word: u64) -> SlotState {
    match word >> TAG_SHIFT {
        0b00 => SlotState::Empty,
        0b01 => SlotState::Tombstone,
        0b10 => SlotState::Reserved(word & HASH_MASK),
        _ => SlotState::Occupied(word & HASH_MASK),
    }
}

/// Stores `EMPTY` into every slot.
pub(crate) fn reset(slots: &[AtomicU64]) {
    for this_slot in slots.iter() {
        this_slot.store(EMPTY, Ordering::Relaxed);
    }
}

/// Walks the probe sequence of `hash`, returning the index of the slot
/// holding it.
///
/// Stops the instant it meets an empty slot: every hash ever inserted along
/// this chain is still reachable before the first empty slot, as tombstones
/// are skipped rather than treated as chain ends. A reserved slot counts as
/// present; its value cell is mid-update, but the hash itself is committed.
pub(crate) fn probe_find(hash: u64, slots: &[AtomicU64], mask: usize) -> Option<usize> {
    debug_assert_eq!(slots.len(), mask + 1);

    for index in (0..slots.len()).map(|x| (x + hash as usize) & mask) {
        match decode(slots[index].load(Ordering::Acquire)) {
            SlotState::Empty => return None,
            SlotState::Occupied(h) | SlotState::Reserved(h) if h == hash => return Some(index),
            _ => (),
        }
    }

    None
}

/// Bounds-checked occupancy test for by-index accessors.
pub(crate) fn check_index(index: usize, slots: &[AtomicU64], bound: usize) -> bool {
    debug_assert!(bound <= slots.len());

    index < bound
        && matches!(
            decode(slots[index].load(Ordering::Acquire)),
            SlotState::Occupied(_)
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(words: &[u64]) -> Vec<AtomicU64> {
        words.iter().map(|&w| AtomicU64::new(w)).collect()
    }

    #[test]
    fn decode_round_trips() {
        assert_eq!(decode(EMPTY), SlotState::Empty);
        assert_eq!(decode(TOMBSTONE), SlotState::Tombstone);
        assert_eq!(decode(occupied(42)), SlotState::Occupied(42));
        assert_eq!(decode(reserved(42)), SlotState::Reserved(42));
        assert_eq!(decode(occupied(HASH_MASK)), SlotState::Occupied(HASH_MASK));
        assert_eq!(decode(occupied(0)), SlotState::Occupied(0));
    }

    #[test]
    fn truncate_discards_tag_bits() {
        assert_eq!(truncate(u64::MAX), HASH_MASK);
        assert_eq!(truncate(7), 7);
    }

    #[test]
    fn probe_find_stops_at_empty() {
        // hash 1 would live at index 1; index 1 is empty, so hash 9 (same
        // chain) must not be reachable even though it sits at index 2.
        let slots = slots(&[EMPTY, EMPTY, occupied(9), EMPTY]);

        assert_eq!(probe_find(1, &slots, 3), None);
        assert_eq!(probe_find(9, &slots, 3), None);
    }

    #[test]
    fn probe_find_skips_tombstones() {
        let slots = slots(&[EMPTY, TOMBSTONE, occupied(9), EMPTY]);

        assert_eq!(probe_find(9, &slots, 3), Some(2));
        assert_eq!(probe_find(1, &slots, 3), None);
    }

    #[test]
    fn probe_find_wraps_around() {
        let slots = slots(&[occupied(7), EMPTY, EMPTY, occupied(3)]);

        assert_eq!(probe_find(3, &slots, 3), Some(3));
        assert_eq!(probe_find(7, &slots, 3), Some(0));
    }

    #[test]
    fn probe_find_sees_reserved() {
        let slots = slots(&[EMPTY, reserved(5), EMPTY, EMPTY]);

        assert_eq!(probe_find(5, &slots, 3), Some(1));
    }

    #[test]
    fn probe_find_full_table_of_strangers() {
        let slots = slots(&[occupied(4), occupied(5), occupied(6), occupied(7)]);

        assert_eq!(probe_find(3, &slots, 3), None);
    }

    #[test]
    fn check_index_rejects_out_of_bounds_and_vacant() {
        let slots = slots(&[occupied(0), TOMBSTONE, EMPTY, reserved(3)]);

        assert!(check_index(0, &slots, 4));
        assert!(!check_index(1, &slots, 4));
        assert!(!check_index(2, &slots, 4));
        assert!(!check_index(3, &slots, 4));
        assert!(!check_index(4, &slots, 4));
    }

    #[test]
    fn reset_empties_everything() {
        let slots = slots(&[occupied(1), TOMBSTONE, reserved(2), EMPTY]);

        reset(&slots);

        for this_slot in slots.iter() {
            assert_eq!(this_slot.load(Ordering::Relaxed), EMPTY);
        }
    }
}
