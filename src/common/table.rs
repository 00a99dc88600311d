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

//! Backing tables: a compile-time-sized array that never grows and a
//! heap-allocated array with a growth policy and full-rehash resize.
//!
//! Both co-locate a slot array with an index-aligned value array. A value
//! cell is meaningful only while its slot is occupied or reserved; the
//! slot word is the sole source of truth for cell liveness.

use std::{
    array,
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use super::slot::{self, SlotState};

/// Storage cell for one value, index-aligned with its slot.
pub(crate) type ValueCell<V> = UnsafeCell<MaybeUninit<V>>;

/// Smallest capacity a growable table allocates.
pub(crate) const MIN_CAPACITY: usize = 8;

/// The slot and value arrays of a growable table. Swapped wholesale by
/// `resize`, hence kept behind one `UnsafeCell`.
pub(crate) struct Parts<V> {
    pub(crate) slots: Box<[AtomicU64]>,
    pub(crate) values: Box<[ValueCell<V>]>,
}

impl<V> Parts<V> {
    fn alloc(capacity: usize) -> Parts<V> {
        debug_assert!(capacity.is_power_of_two());

        Parts {
            slots: (0..capacity).map(|_| AtomicU64::new(slot::EMPTY)).collect(),
            values: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    pub(crate) fn mask(&self) -> usize {
        self.slots.len() - 1
    }
}

// -----------------------------------------------------------------------
// GrowableTable
// -----------------------------------------------------------------------

/// Heap-allocated table that grows by allocating a larger array and
/// re-inserting every occupied slot by its stored hash.
pub(crate) struct GrowableTable<V> {
    parts: UnsafeCell<Parts<V>>,
    capacity: AtomicUsize,
    num_free: AtomicUsize,
}

impl<V> GrowableTable<V> {
    pub(crate) fn with_capacity(capacity: usize) -> GrowableTable<V> {
        let capacity = capacity.next_power_of_two().max(MIN_CAPACITY);

        GrowableTable {
            parts: UnsafeCell::new(Parts::alloc(capacity)),
            capacity: AtomicUsize::new(capacity),
            num_free: AtomicUsize::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Count of tombstones not yet reclaimed by compaction or resize.
    pub(crate) fn num_free(&self) -> usize {
        self.num_free.load(Ordering::Relaxed)
    }

    pub(crate) fn add_free(&self, n: usize) {
        self.num_free.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn sub_free(&self, n: usize) {
        if n > 0 {
            self.num_free.fetch_sub(n, Ordering::Relaxed);
        }
    }

    /// True when the table wants a resize: more than half full counting
    /// in-flight inserts, or at least half tombstones.
    pub(crate) fn should_grow(&self, potential: usize) -> bool {
        let capacity = self.capacity();

        potential * 2 > capacity || self.num_free() >= capacity / 2
    }

    /// True when the table is loaded enough that deferring growth any
    /// longer is worth fighting for exclusive access.
    pub(crate) fn is_overloaded(&self, potential: usize) -> bool {
        potential * 4 >= self.capacity() * 3
    }

    /// # Safety
    ///
    /// The caller must hold shared or exclusive access for the returned
    /// borrow's entire use; `resize` replaces the arrays otherwise.
    pub(crate) unsafe fn parts(&self) -> &Parts<V> {
        &*self.parts.get()
    }

    /// Rebuilds the table at `new_capacity`, re-inserting every occupied
    /// slot by its already-stored hash and moving its value cell. Resets
    /// the tombstone count.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access, and `len` must be the exact
    /// occupied count.
    pub(crate) unsafe fn resize(&self, new_capacity: usize, len: usize) {
        let parts = &mut *self.parts.get();
        let new_capacity = new_capacity.next_power_of_two().max(MIN_CAPACITY);

        assert!(len < new_capacity);

        let new_parts = Parts::alloc(new_capacity);
        let new_mask = new_capacity - 1;
        let mut moved = 0;

        for (index, this_slot) in parts.slots.iter().enumerate() {
            // exclusive access ordered every prior write; plain loads are
            // enough here
            match slot::decode(this_slot.load(Ordering::Relaxed)) {
                SlotState::Occupied(hash) => {
                    // the fresh array has no tombstones; the first empty
                    // slot on the chain wins
                    let mut target = hash as usize & new_mask;

                    while new_parts.slots[target].load(Ordering::Relaxed) != slot::EMPTY {
                        target = (target + 1) & new_mask;
                    }

                    new_parts.slots[target].store(slot::occupied(hash), Ordering::Relaxed);

                    let value = (*parts.values[index].get()).assume_init_read();
                    (*new_parts.values[target].get()).write(value);

                    moved += 1;
                }
                SlotState::Reserved(_) => unreachable!("reserved slot during exclusive resize"),
                SlotState::Empty | SlotState::Tombstone => (),
            }
        }

        assert_eq!(moved, len);

        // the old value cells were moved out above; dropping the old boxes
        // frees only the arrays themselves
        *parts = new_parts;
        self.capacity.store(new_capacity, Ordering::Relaxed);
        self.num_free.store(0, Ordering::Relaxed);
    }
}

// -----------------------------------------------------------------------
// FixedTable
// -----------------------------------------------------------------------

/// Inline table of `N` slots. Never grows; overfilling it is a programmer
/// error caught by the storage layer's capacity assertion.
pub(crate) struct FixedTable<V, const N: usize> {
    slots: [AtomicU64; N],
    values: [ValueCell<V>; N],
}

impl<V, const N: usize> FixedTable<V, N> {
    const CAPACITY_IS_POWER_OF_TWO: () = assert!(N.is_power_of_two());

    pub(crate) fn new() -> FixedTable<V, N> {
        // evaluating the constant enforces the shape at compile time
        let () = Self::CAPACITY_IS_POWER_OF_TWO;

        FixedTable {
            slots: array::from_fn(|_| AtomicU64::new(slot::EMPTY)),
            values: array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
        }
    }

    pub(crate) fn slots(&self) -> &[AtomicU64] {
        &self.slots
    }

    pub(crate) fn values(&self) -> &[ValueCell<V>] {
        &self.values
    }

    pub(crate) fn mask(&self) -> usize {
        N - 1
    }
}
