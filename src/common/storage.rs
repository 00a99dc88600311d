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

//! Value storage: slot and value arrays exposing upsert, lookup, removal,
//! iteration, and positional access, atop either backing table.
//!
//! Every value operation runs under a slot claim: the slot word is flipped
//! from occupied to reserved before the cell is touched and committed back
//! afterward, so concurrent readers can never observe a half-built or
//! half-torn value. Membership tests never claim.

use std::{
    mem,
    sync::atomic::{AtomicU64, Ordering},
};

use crossbeam_utils::Backoff;

use super::{
    access::{
        sealed::{Internal, PutOutcome},
        Access,
    },
    slot::{self, SlotState},
    table::{FixedTable, GrowableTable, ValueCell},
};

// -----------------------------------------------------------------------
// Raw operations shared by both storage flavors
// -----------------------------------------------------------------------

/// Commits a claimed slot back to occupied on drop, including on unwind
/// out of a caller-supplied closure.
struct Claim<'a, A: Access> {
    access: &'a A,
    slot: &'a AtomicU64,
    hash: u64,
}

impl<A: Access> Drop for Claim<'_, A> {
    fn drop(&mut self) {
        self.access.publish(self.slot, self.hash);
    }
}

fn raw_upsert<V, A: Access>(
    access: &A,
    slots: &[AtomicU64],
    values: &[ValueCell<V>],
    mask: usize,
    hash: u64,
    value: &mut Option<V>,
) -> PutOutcome<Option<V>> {
    access.put(hash, slots, mask, |index, inserted| {
        let new = match value.take() {
            Some(new) => new,
            None => unreachable!(),
        };
        let cell = values[index].get();

        if inserted {
            unsafe { (*cell).write(new) };

            None
        } else {
            Some(unsafe { mem::replace((*cell).assume_init_mut(), new) })
        }
    })
}

fn raw_get_and<V, A: Access, F: FnOnce(&V) -> T, T>(
    access: &A,
    slots: &[AtomicU64],
    values: &[ValueCell<V>],
    mask: usize,
    hash: u64,
    f: F,
) -> Option<T> {
    let backoff = Backoff::new();

    loop {
        let index = slot::probe_find(hash, slots, mask)?;
        let this_slot = &slots[index];

        if access.claim(this_slot, hash) {
            let _claim = Claim {
                access,
                slot: this_slot,
                hash,
            };
            let value = unsafe { (*values[index].get()).assume_init_ref() };

            return Some(f(value));
        }

        // mid-claim or just removed; settle and rescan
        backoff.snooze();
    }
}

fn raw_remove<V, A: Access>(
    access: &A,
    slots: &[AtomicU64],
    values: &[ValueCell<V>],
    mask: usize,
    hash: u64,
) -> Option<(V, usize)> {
    let backoff = Backoff::new();

    loop {
        let index = slot::probe_find(hash, slots, mask)?;
        let this_slot = &slots[index];

        if access.claim(this_slot, hash) {
            let value = unsafe { (*values[index].get()).assume_init_read() };

            access.quick_remove(this_slot);

            // compaction races with inserts landing on the run's empty
            // successor; without a lone writer, resize reclaims instead
            let reclaimed = if access.lone_writer() {
                access.compact_tombstones(index, slots, mask)
            } else {
                0
            };

            return Some((value, reclaimed));
        }

        backoff.snooze();
    }
}

fn raw_entry_at<V: Clone, A: Access>(
    access: &A,
    slots: &[AtomicU64],
    values: &[ValueCell<V>],
    index: usize,
) -> Option<(u64, V)> {
    if !slot::check_index(index, slots, slots.len()) {
        return None;
    }

    let backoff = Backoff::new();

    loop {
        match slot::decode(access.load_slot(&slots[index])) {
            SlotState::Occupied(hash) => {
                if access.claim(&slots[index], hash) {
                    let _claim = Claim {
                        access,
                        slot: &slots[index],
                        hash,
                    };
                    let value = unsafe { (*values[index].get()).assume_init_ref() }.clone();

                    return Some((hash, value));
                }

                backoff.snooze();
            }
            SlotState::Reserved(_) => backoff.snooze(),
            SlotState::Empty | SlotState::Tombstone => return None,
        }
    }
}

/// Drops every live value and empties every slot.
///
/// # Safety
///
/// The caller must hold exclusive access (or `&mut` the whole table), and
/// `len` must be the exact occupied count.
unsafe fn raw_clear<V>(slots: &[AtomicU64], values: &[ValueCell<V>], len: usize) {
    if mem::needs_drop::<V>() {
        let mut remaining = len;

        for (index, this_slot) in slots.iter().enumerate() {
            if remaining == 0 {
                break;
            }

            if let SlotState::Occupied(_) = slot::decode(this_slot.load(Ordering::Relaxed)) {
                (*values[index].get()).assume_init_drop();
                remaining -= 1;
            }
        }
    }

    slot::reset(slots);
}

// -----------------------------------------------------------------------
// Storage
// -----------------------------------------------------------------------

/// Growable hash-to-value storage under access discipline `A`.
///
/// Entries are keyed by 62-bit hash values alone; the engine never sees
/// the original keys. See the crate documentation for the collision
/// caveat this implies.
pub struct Storage<V, A: Access> {
    access: A,
    table: GrowableTable<V>,
}

// SAFETY: all slot traffic goes through atomics, value cells are only
// touched under a slot claim, and the arrays are only replaced under
// exclusive access. `Serial` is `!Sync`, so `Storage<V, Serial>` stays
// single-threaded.
unsafe impl<V: Send + Sync, A: Access + Sync> Sync for Storage<V, A> {}

impl<V, A: Access> Storage<V, A> {
    pub fn with_capacity(capacity: usize) -> Storage<V, A> {
        Storage {
            access: A::new(),
            table: GrowableTable::with_capacity(capacity),
        }
    }

    /// Number of entries confirmed inserted and not yet removed.
    pub fn len(&self) -> usize {
        self.access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Upsert: inserts `hash` with `value`, or replaces the value already
    /// stored for it, returning the previous value.
    ///
    /// Grows the table first when the growth policy asks for it; if
    /// exclusive access cannot be won, growth is deferred and the table
    /// keeps operating overloaded.
    pub fn put(&self, hash: u64, value: V) -> Option<V> {
        let hash = slot::truncate(hash);

        self.access.begin_insert();

        if self.table.should_grow(self.access.potential_len()) {
            self.try_grow();
        }

        let mut value = Some(value);

        let previous = loop {
            let guard = self.access.shared();
            let parts = unsafe { self.table.parts() };

            match raw_upsert(
                &self.access,
                &parts.slots,
                &parts.values,
                parts.mask(),
                hash,
                &mut value,
            ) {
                PutOutcome::Done(previous) => break previous,
                PutOutcome::Full => {
                    // every slot occupied or unreusable; growth can no
                    // longer be deferred
                    drop(guard);
                    self.force_grow();
                }
            }
        };

        self.access.end_insert();

        previous
    }

    /// Returns a copy of the value stored for `hash`.
    pub fn get(&self, hash: u64) -> Option<V>
    where
        V: Clone,
    {
        self.get_and(hash, V::clone)
    }

    /// Invokes `f` with the value stored for `hash`.
    ///
    /// `f` runs with the entry's slot claimed: it must not touch the same
    /// entry again through this table, or it will spin against its own
    /// claim.
    pub fn get_and<F: FnOnce(&V) -> T, T>(&self, hash: u64, f: F) -> Option<T> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        raw_get_and(&self.access, &parts.slots, &parts.values, parts.mask(), hash, f)
    }

    /// Removes `hash`, returning the value it stored. The vacated slot
    /// becomes a tombstone; a trailing tombstone run is compacted away.
    pub fn remove(&self, hash: u64) -> Option<V> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        let (value, reclaimed) =
            raw_remove(&self.access, &parts.slots, &parts.values, parts.mask(), hash)?;

        self.table.add_free(1);
        self.table.sub_free(reclaimed);

        Some(value)
    }

    /// Membership test; never claims the slot.
    pub fn contains(&self, hash: u64) -> bool {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        slot::probe_find(hash, &parts.slots, parts.mask()).is_some()
    }

    /// Index of the slot holding `hash`, if present. Valid only until the
    /// next structural change.
    pub fn index_of(&self, hash: u64) -> Option<usize> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        slot::probe_find(hash, &parts.slots, parts.mask())
    }

    /// Returns the stored hash and a copy of the value at `index`, if that
    /// slot is occupied.
    pub fn by_index(&self, index: usize) -> Option<(u64, V)>
    where
        V: Clone,
    {
        let _guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        raw_entry_at(&self.access, &parts.slots, &parts.values, index)
    }

    /// Iterates every occupied slot in index order, yielding the stored
    /// hash and a copy of the value. Double-ended. The iterator holds
    /// shared access, deferring any resize until it is dropped.
    pub fn iter(&self) -> Iter<'_, V, A>
    where
        V: Clone,
    {
        let guard = self.access.shared();
        let back = unsafe { self.table.parts() }.slots.len();

        Iter {
            storage: self,
            _guard: guard,
            front: 0,
            back,
        }
    }

    /// Returns an iterator positioned at the slot holding `hash`, or an
    /// exhausted iterator if it is absent.
    pub fn find(&self, hash: u64) -> Iter<'_, V, A>
    where
        V: Clone,
    {
        let guard = self.access.shared();
        let parts = unsafe { self.table.parts() };

        let (front, back) = match slot::probe_find(slot::truncate(hash), &parts.slots, parts.mask())
        {
            Some(index) => (index, parts.slots.len()),
            None => (0, 0),
        };

        Iter {
            storage: self,
            _guard: guard,
            front,
            back,
        }
    }

    /// Drops every entry. Spins until exclusive access is won, so it must
    /// not be called while this thread holds an iterator on the same
    /// table.
    pub fn clear(&self) {
        let backoff = Backoff::new();

        while !self.access.try_exclusive() {
            backoff.snooze();
        }

        let parts = unsafe { self.table.parts() };

        unsafe { raw_clear(&parts.slots, &parts.values, self.access.len()) };

        self.access.reset_len();
        self.table.sub_free(self.table.num_free());

        self.access.release_exclusive();
    }

    fn try_grow(&self) {
        let backoff = Backoff::new();

        while self.table.should_grow(self.access.potential_len()) {
            if self.access.try_exclusive() {
                let potential = self.access.potential_len();

                if self.table.should_grow(potential) {
                    let target = (potential * 2)
                        .next_power_of_two()
                        .max(self.table.capacity() * 2);

                    unsafe { self.table.resize(target, self.access.len()) };
                }

                self.access.release_exclusive();

                return;
            }

            // somebody holds the table; fight for it only while critically
            // overloaded, otherwise defer growth this round
            if !self.table.is_overloaded(self.access.potential_len()) || backoff.is_completed() {
                return;
            }

            backoff.snooze();
        }
    }

    fn force_grow(&self) {
        let backoff = Backoff::new();

        loop {
            if self.access.try_exclusive() {
                let potential = self.access.potential_len();

                // a racing grower may have already made room
                if self.table.should_grow(potential) {
                    let target = (potential * 2)
                        .next_power_of_two()
                        .max(self.table.capacity() * 2);

                    unsafe { self.table.resize(target, self.access.len()) };
                }

                self.access.release_exclusive();

                return;
            }

            backoff.snooze();
        }
    }
}

impl<V, A: Access> Drop for Storage<V, A> {
    fn drop(&mut self) {
        if !mem::needs_drop::<V>() {
            return;
        }

        // `&mut self` forbids any other holder
        let parts = unsafe { self.table.parts() };

        unsafe { raw_clear(&parts.slots, &parts.values, self.access.len()) };
    }
}

/// Iterator over a [`Storage`], yielding `(stored hash, value)` pairs.
pub struct Iter<'a, V, A: Access> {
    storage: &'a Storage<V, A>,
    _guard: A::Guard<'a>,
    front: usize,
    back: usize,
}

impl<V: Clone, A: Access> Iterator for Iter<'_, V, A> {
    type Item = (u64, V);

    fn next(&mut self) -> Option<(u64, V)> {
        while self.front < self.back {
            let index = self.front;
            self.front += 1;

            if let Some(entry) = self.storage.by_index(index) {
                return Some(entry);
            }
        }

        None
    }
}

impl<V: Clone, A: Access> DoubleEndedIterator for Iter<'_, V, A> {
    fn next_back(&mut self) -> Option<(u64, V)> {
        while self.front < self.back {
            self.back -= 1;

            if let Some(entry) = self.storage.by_index(self.back) {
                return Some(entry);
            }
        }

        None
    }
}

// -----------------------------------------------------------------------
// FixedStorage
// -----------------------------------------------------------------------

/// Fixed-capacity hash-to-value storage over an inline table of `N`
/// slots. Never allocates and never grows; the caller must size it
/// adequately in advance.
pub struct FixedStorage<V, A: Access, const N: usize> {
    access: A,
    table: FixedTable<V, N>,
}

// SAFETY: same argument as for `Storage`, minus the resize concern.
unsafe impl<V: Send + Sync, A: Access + Sync, const N: usize> Sync for FixedStorage<V, A, N> {}

impl<V, A: Access, const N: usize> FixedStorage<V, A, N> {
    pub fn new() -> FixedStorage<V, A, N> {
        FixedStorage {
            access: A::new(),
            table: FixedTable::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Upsert. Panics if the table is full: overfilling a fixed-capacity
    /// table is a programmer error, not a recoverable condition.
    pub fn put(&self, hash: u64, value: V) -> Option<V> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();
        let mut value = Some(value);

        match raw_upsert(
            &self.access,
            self.table.slots(),
            self.table.values(),
            self.table.mask(),
            hash,
            &mut value,
        ) {
            PutOutcome::Done(previous) => previous,
            PutOutcome::Full => panic!("fixed-capacity table of {} slots is full", N),
        }
    }

    pub fn get(&self, hash: u64) -> Option<V>
    where
        V: Clone,
    {
        self.get_and(hash, V::clone)
    }

    /// See [`Storage::get_and`] for the reentrancy caveat.
    pub fn get_and<F: FnOnce(&V) -> T, T>(&self, hash: u64, f: F) -> Option<T> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();

        raw_get_and(
            &self.access,
            self.table.slots(),
            self.table.values(),
            self.table.mask(),
            hash,
            f,
        )
    }

    pub fn remove(&self, hash: u64) -> Option<V> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();

        raw_remove(
            &self.access,
            self.table.slots(),
            self.table.values(),
            self.table.mask(),
            hash,
        )
        .map(|(value, _)| value)
    }

    pub fn contains(&self, hash: u64) -> bool {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();

        slot::probe_find(hash, self.table.slots(), self.table.mask()).is_some()
    }

    pub fn index_of(&self, hash: u64) -> Option<usize> {
        let hash = slot::truncate(hash);
        let _guard = self.access.shared();

        slot::probe_find(hash, self.table.slots(), self.table.mask())
    }

    pub fn by_index(&self, index: usize) -> Option<(u64, V)>
    where
        V: Clone,
    {
        let _guard = self.access.shared();

        raw_entry_at(&self.access, self.table.slots(), self.table.values(), index)
    }

    pub fn iter(&self) -> FixedIter<'_, V, A, N>
    where
        V: Clone,
    {
        FixedIter {
            storage: self,
            _guard: self.access.shared(),
            front: 0,
            back: N,
        }
    }

    /// See [`Storage::clear`] for the iterator caveat.
    pub fn clear(&self) {
        let backoff = Backoff::new();

        while !self.access.try_exclusive() {
            backoff.snooze();
        }

        unsafe { raw_clear(self.table.slots(), self.table.values(), self.access.len()) };

        self.access.reset_len();
        self.access.release_exclusive();
    }
}

impl<V, A: Access, const N: usize> Default for FixedStorage<V, A, N> {
    fn default() -> FixedStorage<V, A, N> {
        FixedStorage::new()
    }
}

impl<V, A: Access, const N: usize> Drop for FixedStorage<V, A, N> {
    fn drop(&mut self) {
        if !mem::needs_drop::<V>() {
            return;
        }

        unsafe { raw_clear(self.table.slots(), self.table.values(), self.access.len()) };
    }
}

/// Iterator over a [`FixedStorage`], yielding `(stored hash, value)`
/// pairs.
pub struct FixedIter<'a, V, A: Access, const N: usize> {
    storage: &'a FixedStorage<V, A, N>,
    _guard: A::Guard<'a>,
    front: usize,
    back: usize,
}

impl<V: Clone, A: Access, const N: usize> Iterator for FixedIter<'_, V, A, N> {
    type Item = (u64, V);

    fn next(&mut self) -> Option<(u64, V)> {
        while self.front < self.back {
            let index = self.front;
            self.front += 1;

            if let Some(entry) = self.storage.by_index(index) {
                return Some(entry);
            }
        }

        None
    }
}

impl<V: Clone, A: Access, const N: usize> DoubleEndedIterator for FixedIter<'_, V, A, N> {
    fn next_back(&mut self) -> Option<(u64, V)> {
        while self.front < self.back {
            self.back -= 1;

            if let Some(entry) = self.storage.by_index(self.back) {
                return Some(entry);
            }
        }

        None
    }
}
