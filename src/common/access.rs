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

//! Access disciplines.
//!
//! A discipline decides how slot words are read and written and how the
//! shared/exclusive gate behaves. [`Serial`] is for single-threaded use:
//! every "CAS" is an unconditional store that cannot fail, the gate is a
//! no-op, and the type is deliberately `!Sync`. [`Concurrent`] uses real
//! compare-exchange loops and a reference-counted gate: any number of
//! shared holders may probe and insert at once, while structural changes
//! (resize, clear) require the single exclusive holder.
//!
//! `put`, `quick_remove`, and `compact_tombstones` are written once against
//! the discipline primitives; under `Serial` the shared bodies degenerate
//! to the plain-store versions because no write can ever lose a race.

use std::{
    cell::Cell,
    sync::{
        atomic::{AtomicIsize, AtomicU64, AtomicUsize, Ordering},
        Condvar, Mutex,
    },
};

use crossbeam_utils::{Backoff, CachePadded};

pub(crate) mod sealed {
    use std::sync::atomic::AtomicU64;

    use crossbeam_utils::Backoff;

    use crate::common::slot::{self, SlotState};

    /// Result of a `put`: either the callback's value, or a report that the
    /// probe sequence wrapped without finding room.
    pub enum PutOutcome<R> {
        Done(R),
        Full,
    }

    pub trait Internal: Sized {
        type Guard<'a>
        where
            Self: 'a;

        fn new() -> Self;

        /// Acquires shared access, blocking while an exclusive holder is
        /// active. Shared access is reentrant.
        fn shared(&self) -> Self::Guard<'_>;

        /// Attempts to become the single exclusive holder. Succeeds only
        /// from a fully quiescent gate and never blocks.
        fn try_exclusive(&self) -> bool;

        fn release_exclusive(&self);

        fn len(&self) -> usize;
        fn inc_len(&self);
        fn dec_len(&self);
        fn reset_len(&self);

        fn pending(&self) -> usize;
        fn begin_insert(&self);
        fn end_insert(&self);

        fn load_slot(&self, slot: &AtomicU64) -> u64;

        /// Writes `new` if the slot still holds `current`. The serial
        /// discipline stores unconditionally and always succeeds.
        fn cas_slot(&self, slot: &AtomicU64, current: u64, new: u64) -> bool;

        fn store_slot(&self, slot: &AtomicU64, word: u64);

        /// Whether this discipline excludes racing writers.
        ///
        /// Gates the two operations that are only sound without them:
        /// claiming a passed tombstone as `put`'s insertion point (two
        /// same-hash racers could otherwise each succeed on a different
        /// slot) and remove-time compaction (a racer inserting onto the
        /// run's empty successor could otherwise be hidden from probes).
        /// Without a lone writer, tombstones are reclaimed by resize
        /// instead.
        fn lone_writer(&self) -> bool;

        /// Occupied count plus in-flight inserts; used to size growth
        /// proactively.
        fn potential_len(&self) -> usize {
            self.len() + self.pending()
        }

        /// Claims an occupied slot for `hash` so its value cell may be
        /// touched. Fails if the slot no longer holds `hash` occupied.
        fn claim(&self, slot: &AtomicU64, hash: u64) -> bool {
            self.cas_slot(slot, slot::occupied(hash), slot::reserved(hash))
        }

        /// Releases a claim, committing the slot as occupied.
        fn publish(&self, slot: &AtomicU64, hash: u64) {
            self.store_slot(slot, slot::occupied(hash));
        }

        /// Tombstones a slot this discipline has already claimed.
        fn quick_remove(&self, slot: &AtomicU64) {
            self.store_slot(slot, slot::TOMBSTONE);
            self.dec_len();
        }

        /// Inserts `hash` or finds its existing slot.
        ///
        /// The callback runs exactly once, with the slot claimed, and
        /// receives the slot index and whether a fresh insertion happened;
        /// the claim is released when it returns. A lost race restarts the
        /// probe from `hash`, since the winner may have been inserting the
        /// very hash this probe is looking for.
        fn put<F, R>(
            &self,
            hash: u64,
            slots: &[AtomicU64],
            mask: usize,
            on_result: F,
        ) -> PutOutcome<R>
        where
            F: FnOnce(usize, bool) -> R,
        {
            debug_assert_eq!(slots.len(), mask + 1);
            debug_assert_eq!(hash & !slot::HASH_MASK, 0);

            let backoff = Backoff::new();

            'restart: loop {
                let mut reuse_candidate = None;

                for index in (0..slots.len()).map(|x| (x + hash as usize) & mask) {
                    let this_slot = &slots[index];

                    match slot::decode(self.load_slot(this_slot)) {
                        SlotState::Occupied(h) if h == hash => {
                            if self.claim(this_slot, hash) {
                                let result = on_result(index, false);
                                self.publish(this_slot, hash);

                                return PutOutcome::Done(result);
                            }

                            // concurrently claimed or removed
                            backoff.snooze();
                            continue 'restart;
                        }
                        SlotState::Reserved(h) if h == hash => {
                            // another thread is mid-update on this hash;
                            // wait it out and rescan
                            backoff.snooze();
                            continue 'restart;
                        }
                        SlotState::Empty => {
                            let (target, expected) = match reuse_candidate {
                                Some(target) => (target, slot::TOMBSTONE),
                                None => (index, slot::EMPTY),
                            };

                            if self.cas_slot(&slots[target], expected, slot::reserved(hash)) {
                                self.inc_len();
                                let result = on_result(target, true);
                                self.publish(&slots[target], hash);

                                return PutOutcome::Done(result);
                            }

                            backoff.snooze();
                            continue 'restart;
                        }
                        SlotState::Tombstone => {
                            if self.lone_writer() && reuse_candidate.is_none() {
                                reuse_candidate = Some(index);
                            }
                        }
                        SlotState::Occupied(_) | SlotState::Reserved(_) => (),
                    }
                }

                // the probe wrapped without meeting an empty slot
                if let Some(target) = reuse_candidate {
                    if self.cas_slot(&slots[target], slot::TOMBSTONE, slot::reserved(hash)) {
                        self.inc_len();
                        let result = on_result(target, true);
                        self.publish(&slots[target], hash);

                        return PutOutcome::Done(result);
                    }

                    backoff.snooze();
                    continue 'restart;
                }

                return PutOutcome::Full;
            }
        }

        /// Reclaims the trailing tombstone run ending at `index`.
        ///
        /// A run of tombstones immediately followed by an empty slot can
        /// never matter to any probe chain: the empty slot already ends
        /// every chain passing through the run. Walking backward from
        /// `index` converts such tombstones back to empty slots, keeping
        /// lookup cost bounded under insert/remove churn. A lost CAS ends
        /// the walk. Returns the count reclaimed.
        fn compact_tombstones(&self, index: usize, slots: &[AtomicU64], mask: usize) -> usize {
            debug_assert_eq!(slots.len(), mask + 1);

            if self.load_slot(&slots[(index + 1) & mask]) != slot::EMPTY {
                return 0;
            }

            let mut reclaimed = 0;
            let mut this_index = index;

            loop {
                let this_slot = &slots[this_index];

                if self.load_slot(this_slot) != slot::TOMBSTONE {
                    break;
                }

                if !self.cas_slot(this_slot, slot::TOMBSTONE, slot::EMPTY) {
                    break;
                }

                reclaimed += 1;
                this_index = this_index.wrapping_sub(1) & mask;
            }

            reclaimed
        }
    }
}

/// A slot-access discipline. Sealed; implemented by [`Serial`] and
/// [`Concurrent`] only.
pub trait Access: sealed::Internal {}

// -----------------------------------------------------------------------
// Serial
// -----------------------------------------------------------------------

/// Single-threaded discipline: trivial gate, plain stores, `!Sync`.
#[derive(Default)]
pub struct Serial {
    len: Cell<usize>,
    pending: Cell<usize>,
}

impl Access for Serial {}

impl sealed::Internal for Serial {
    type Guard<'a> = ()
    where
        Self: 'a;

    fn new() -> Self {
        Serial::default()
    }

    fn shared(&self) -> Self::Guard<'_> {}

    fn try_exclusive(&self) -> bool {
        true
    }

    fn release_exclusive(&self) {}

    fn len(&self) -> usize {
        self.len.get()
    }

    fn inc_len(&self) {
        self.len.set(self.len.get() + 1);
    }

    fn dec_len(&self) {
        self.len.set(self.len.get() - 1);
    }

    fn reset_len(&self) {
        self.len.set(0);
    }

    fn pending(&self) -> usize {
        self.pending.get()
    }

    fn begin_insert(&self) {
        self.pending.set(self.pending.get() + 1);
    }

    fn end_insert(&self) {
        self.pending.set(self.pending.get() - 1);
    }

    fn load_slot(&self, slot: &AtomicU64) -> u64 {
        slot.load(Ordering::Relaxed)
    }

    fn cas_slot(&self, slot: &AtomicU64, current: u64, new: u64) -> bool {
        debug_assert_eq!(slot.load(Ordering::Relaxed), current);

        slot.store(new, Ordering::Relaxed);

        true
    }

    fn store_slot(&self, slot: &AtomicU64, word: u64) {
        slot.store(word, Ordering::Relaxed);
    }

    fn lone_writer(&self) -> bool {
        true
    }
}

// -----------------------------------------------------------------------
// Concurrent
// -----------------------------------------------------------------------

/// Multi-threaded discipline: lock-free insertion under a shared guard,
/// one exclusive holder for structural changes.
pub struct Concurrent {
    refs: CachePadded<AtomicIsize>,
    len: CachePadded<AtomicUsize>,
    pending: AtomicUsize,
    event: Event,
}

/// Decrements the shared count on drop.
pub struct SharedGuard<'a> {
    refs: &'a AtomicIsize,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::Release);
    }
}

impl Access for Concurrent {}

impl sealed::Internal for Concurrent {
    type Guard<'a> = SharedGuard<'a>
    where
        Self: 'a;

    fn new() -> Self {
        Concurrent {
            refs: CachePadded::new(AtomicIsize::new(0)),
            len: CachePadded::new(AtomicUsize::new(0)),
            pending: AtomicUsize::new(0),
            event: Event::new(),
        }
    }

    fn shared(&self) -> SharedGuard<'_> {
        let backoff = Backoff::new();

        loop {
            let refs = self.refs.load(Ordering::Acquire);

            if refs < 0 {
                // a resize is in flight; spin briefly, then park on the
                // event until the exclusive holder signals it
                if backoff.is_completed() {
                    self.event.wait();
                } else {
                    backoff.snooze();
                }

                continue;
            }

            if self
                .refs
                .compare_exchange_weak(refs, refs + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return SharedGuard { refs: &self.refs };
            }

            backoff.spin();
        }
    }

    fn try_exclusive(&self) -> bool {
        if self
            .refs
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.event.clear();

            true
        } else {
            false
        }
    }

    fn release_exclusive(&self) {
        self.refs.store(0, Ordering::Release);
        self.event.signal();
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    fn inc_len(&self) {
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn dec_len(&self) {
        self.len.fetch_sub(1, Ordering::Relaxed);
    }

    fn reset_len(&self) {
        self.len.store(0, Ordering::Relaxed);
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    fn begin_insert(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    fn end_insert(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    fn load_slot(&self, slot: &AtomicU64) -> u64 {
        slot.load(Ordering::Acquire)
    }

    fn cas_slot(&self, slot: &AtomicU64, current: u64, new: u64) -> bool {
        slot.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn store_slot(&self, slot: &AtomicU64, word: u64) {
        slot.store(word, Ordering::Release);
    }

    fn lone_writer(&self) -> bool {
        false
    }
}

/// Binary wait/signal event for parking `shared()` callers out of a resize.
///
/// Level-triggered: a signal arriving between the `refs` check and the wait
/// is never lost, because `wait` returns immediately while the flag is set.
struct Event {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    fn new() -> Event {
        Event {
            set: Mutex::new(true),
            cond: Condvar::new(),
        }
    }

    fn clear(&self) {
        if let Ok(mut set) = self.set.lock() {
            *set = false;
        }
    }

    fn signal(&self) {
        if let Ok(mut set) = self.set.lock() {
            *set = true;
        }

        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        while !*set {
            set = match self.cond.wait(set) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sealed::{Internal, PutOutcome};
    use super::*;

    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    use crate::common::slot::{self, SlotState};

    fn empty_slots(capacity: usize) -> Box<[AtomicU64]> {
        (0..capacity).map(|_| AtomicU64::new(slot::EMPTY)).collect()
    }

    fn put_flag<A: Internal>(access: &A, hash: u64, slots: &[AtomicU64], mask: usize) -> bool {
        match access.put(hash, slots, mask, |_, inserted| inserted) {
            PutOutcome::Done(inserted) => inserted,
            PutOutcome::Full => panic!("table full"),
        }
    }

    #[test]
    fn serial_put_inserts_then_finds() {
        let access = Serial::new();
        let slots = empty_slots(8);

        assert!(put_flag(&access, 3, &slots, 7));
        assert_eq!(access.len(), 1);

        assert!(!put_flag(&access, 3, &slots, 7));
        assert_eq!(access.len(), 1);

        assert_eq!(slot::decode(slots[3].load(Ordering::Relaxed)), SlotState::Occupied(3));
    }

    #[test]
    fn serial_put_reuses_tombstone() {
        let access = Serial::new();
        let slots = empty_slots(8);

        assert!(put_flag(&access, 1, &slots, 7));
        assert!(put_flag(&access, 9, &slots, 7)); // same chain, lands at 2

        access.quick_remove(&slots[1]);
        assert_eq!(access.len(), 1);

        // 17 probes 1 (tombstone), 2 (occupied by 9), 3 (empty); the
        // tombstone wins as the insertion point
        assert!(put_flag(&access, 17, &slots, 7));
        assert_eq!(slot::decode(slots[1].load(Ordering::Relaxed)), SlotState::Occupied(17));
        assert_eq!(slot::decode(slots[2].load(Ordering::Relaxed)), SlotState::Occupied(9));
        assert_eq!(access.len(), 2);
    }

    #[test]
    fn serial_put_reports_full() {
        let access = Serial::new();
        let slots = empty_slots(4);

        for hash in 4..8 {
            assert!(put_flag(&access, hash, &slots, 3));
        }

        match access.put(16, &slots, 3, |_, _| ()) {
            PutOutcome::Full => (),
            PutOutcome::Done(_) => panic!("expected a full table"),
        }
    }

    #[test]
    fn compact_reclaims_trailing_run() {
        let access = Serial::new();
        let slots = empty_slots(8);

        for hash in [0, 1, 2] {
            put_flag(&access, hash, &slots, 7);
        }

        access.quick_remove(&slots[1]);
        access.quick_remove(&slots[2]);

        // slot 3 is empty, so both tombstones are provably unreachable
        assert_eq!(access.compact_tombstones(2, &slots, 7), 2);
        assert_eq!(slot::decode(slots[1].load(Ordering::Relaxed)), SlotState::Empty);
        assert_eq!(slot::decode(slots[2].load(Ordering::Relaxed)), SlotState::Empty);
        assert_eq!(slot::decode(slots[0].load(Ordering::Relaxed)), SlotState::Occupied(0));
    }

    #[test]
    fn compact_requires_empty_successor() {
        let access = Serial::new();
        let slots = empty_slots(8);

        for hash in [0, 1, 2] {
            put_flag(&access, hash, &slots, 7);
        }

        access.quick_remove(&slots[1]);

        // slot 2 is still occupied; the tombstone at 1 must stay to keep
        // the chain to 2 intact
        assert_eq!(access.compact_tombstones(1, &slots, 7), 0);
        assert_eq!(slot::decode(slots[1].load(Ordering::Relaxed)), SlotState::Tombstone);
    }

    #[test]
    fn compact_wraps_backward() {
        let access = Serial::new();
        let slots = empty_slots(4);

        put_flag(&access, 3, &slots, 3);
        put_flag(&access, 7, &slots, 3); // chain 3, lands at 0

        access.quick_remove(&slots[3]);
        access.quick_remove(&slots[0]);

        // slot 1 is empty; the walk goes 0, then wraps to 3
        assert_eq!(access.compact_tombstones(0, &slots, 3), 2);
        assert_eq!(slot::decode(slots[3].load(Ordering::Relaxed)), SlotState::Empty);
    }

    #[test]
    fn concurrent_compact_reclaims_quiescently() {
        let access = Concurrent::new();
        let slots = empty_slots(8);

        for hash in [0, 1, 2] {
            put_flag(&access, hash, &slots, 7);
        }

        assert!(access.claim(&slots[1], 1));
        access.quick_remove(&slots[1]);
        assert!(access.claim(&slots[2], 2));
        access.quick_remove(&slots[2]);

        assert_eq!(access.compact_tombstones(2, &slots, 7), 2);
        assert_eq!(slot::decode(slots[1].load(Ordering::Relaxed)), SlotState::Empty);
        assert_eq!(slot::decode(slots[2].load(Ordering::Relaxed)), SlotState::Empty);
        assert_eq!(access.len(), 1);
    }

    #[test]
    fn gate_excludes_shared_and_exclusive() {
        let access = Concurrent::new();

        let guard = access.shared();
        assert!(!access.try_exclusive());
        drop(guard);

        assert!(access.try_exclusive());
        assert!(!access.try_exclusive());
        access.release_exclusive();

        assert!(access.try_exclusive());
        access.release_exclusive();
    }

    #[test]
    fn gate_shared_is_reentrant() {
        let access = Concurrent::new();

        let outer = access.shared();
        let inner = access.shared();
        drop(inner);
        drop(outer);

        assert!(access.try_exclusive());
        access.release_exclusive();
    }

    #[test]
    fn gate_blocks_shared_during_exclusive() {
        let access = Arc::new(Concurrent::new());
        let entered = Arc::new(AtomicUsize::new(0));

        assert!(access.try_exclusive());

        let handle = {
            let access = access.clone();
            let entered = entered.clone();

            thread::spawn(move || {
                let _guard = access.shared();
                entered.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        access.release_exclusive();
        assert!(handle.join().is_ok());
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_put_same_hash_single_winner() {
        const NUM_THREADS: usize = 8;

        let shared = Arc::new((Concurrent::new(), empty_slots(16)));
        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let shared = shared.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    let (access, slots) = &*shared;
                    barrier.wait();

                    let _guard = access.shared();
                    put_flag(access, 5, slots, 15)
                })
            })
            .collect();

        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|&inserted| inserted)
            .count();

        let (access, slots) = &*shared;
        assert_eq!(winners, 1);
        assert_eq!(access.len(), 1);
        assert_eq!(slot::probe_find(5, slots, 15), Some(5));
    }

    #[test]
    fn concurrent_put_distinct_hashes() {
        const NUM_THREADS: usize = 8;

        let shared = Arc::new((Concurrent::new(), empty_slots(64)));
        let barrier = Arc::new(Barrier::new(NUM_THREADS));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|i| {
                let shared = shared.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    let (access, slots) = &*shared;
                    barrier.wait();

                    let _guard = access.shared();
                    for hash in (0..4).map(|j| (i * 4 + j) as u64) {
                        assert!(put_flag(access, hash, slots, 63));
                    }
                })
            })
            .collect();

        for result in threads.into_iter().map(|t| t.join()) {
            assert!(result.is_ok());
        }

        let (access, slots) = &*shared;
        assert_eq!(access.len(), NUM_THREADS * 4);

        for hash in 0..(NUM_THREADS * 4) as u64 {
            assert!(slot::probe_find(hash, slots, 63).is_some());
        }
    }
}
