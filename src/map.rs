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

//! A hash-keyed map implemented with open addressing and linear probing.
//!
//! Keys are hashed on every operation and **not stored**: the table is
//! keyed by the 62-bit hash alone and never compares original keys. Two
//! keys that hash identically are the same entry as far as this map is
//! concerned. With a 62-bit hash this is vanishingly unlikely for
//! realistic workloads, but it is a real property of the design, not an
//! implementation detail — do not use this map where a silent key
//! collision would be unacceptable.

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
    marker::PhantomData,
};

use crate::common::{
    access::{Access, Concurrent, Serial},
    storage::{Iter, Storage},
};

/// Default hasher for [`HashMap`].
///
/// This is currently [aHash], a hashing algorithm designed around
/// acceleration by the [AES-NI] instruction set on x86 processors. aHash
/// is not cryptographically secure, but is fast and resistant to DoS
/// attacks.
///
/// [aHash]: https://docs.rs/ahash
/// [AES-NI]: https://en.wikipedia.org/wiki/AES_instruction_set
pub type DefaultHashBuilder = ahash::RandomState;

/// A hash-keyed map over the open-addressing engine.
///
/// With the default [`Concurrent`] discipline, lookups, insertions, and
/// removals may run fully concurrently from any number of threads; the
/// table only stops the world to grow. [`SerialHashMap`] selects the
/// single-threaded discipline instead, which skips every atomic
/// read-modify-write and is `!Sync` by construction.
///
/// Any operation that returns a stored value by reference cannot exist
/// here: an entry may be removed by another thread at any moment, so
/// values are handed out as copies ([`get`]) or borrowed to a closure
/// under a per-slot claim ([`get_and`]).
///
/// Keys are reduced to 62-bit hashes and never stored; see the module
/// documentation for what that implies.
///
/// [`get`]: #method.get
/// [`get_and`]: #method.get_and
pub struct HashMap<K, V, S = DefaultHashBuilder, A: Access = Concurrent> {
    storage: Storage<V, A>,
    hash_builder: S,
    _keys: PhantomData<fn(K)>,
}

/// [`HashMap`] under the single-threaded access discipline.
pub type SerialHashMap<K, V, S = DefaultHashBuilder> = HashMap<K, V, S, Serial>;

impl<K, V> HashMap<K, V> {
    /// Creates an empty concurrent map with the default capacity and
    /// hasher.
    pub fn new() -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(0, DefaultHashBuilder::default())
    }

    /// Creates an empty concurrent map with space for at least `capacity`
    /// elements without growing.
    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S: BuildHasher, A: Access> HashMap<K, V, S, A> {
    /// Creates an empty map that will use `hash_builder` to hash keys.
    pub fn with_hasher(hash_builder: S) -> HashMap<K, V, S, A> {
        HashMap::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with space for at least `capacity` elements
    /// that will use `hash_builder` to hash keys.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashMap<K, V, S, A> {
        HashMap {
            storage: Storage::with_capacity(capacity * 2),
            hash_builder,
            _keys: PhantomData,
        }
    }

    /// Returns the number of elements that are confirmed to have been
    /// inserted into this map. In-progress insertions are not counted.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if this map contains no confirmed inserted elements.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Returns the number of slots allocated for elements.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Inserts a key-value pair, returning the value previously associated
    /// with the key's hash.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        K: Hash,
    {
        self.storage.put(self.hash(&key), value)
    }

    /// Returns a copy of the value associated with `key`.
    ///
    /// `Q` can be any borrowed form of `K`, but [`Hash`] on `Q` *must*
    /// match that of `K`. `V` must implement [`Clone`], as the value may
    /// be concurrently removed at any moment, so the best we can do is
    /// return a copy of it. If your `V` does not implement [`Clone`], use
    /// [`get_and`] instead.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
    /// [`get_and`]: #method.get_and
    pub fn get<Q: ?Sized + Hash>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        V: Clone,
    {
        self.storage.get(self.hash(key))
    }

    /// Invokes `func` with a reference to the value associated with `key`.
    ///
    /// `func` runs with the entry's slot claimed: other threads touching
    /// the same entry wait for it to finish, and it must not re-enter this
    /// map for the same key, or it will spin against its own claim.
    pub fn get_and<Q: ?Sized + Hash, F: FnOnce(&V) -> T, T>(&self, key: &Q, func: F) -> Option<T>
    where
        K: Borrow<Q>,
    {
        self.storage.get_and(self.hash(key), func)
    }

    /// Removes the value associated with `key`, returning it if there was
    /// one.
    pub fn remove<Q: ?Sized + Hash>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        self.storage.remove(self.hash(key))
    }

    /// Returns true if a value is associated with `key`.
    pub fn contains_key<Q: ?Sized + Hash>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.storage.contains(self.hash(key))
    }

    /// Removes every entry. Stops the world the way a resize does; must
    /// not be called while this thread holds an iterator on the same map.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Iterates every entry, yielding the stored 62-bit hash and a copy of
    /// the value. Original keys are not recoverable.
    pub fn iter(&self) -> Iter<'_, V, A>
    where
        V: Clone,
    {
        self.storage.iter()
    }

    fn hash<Q: ?Sized + Hash>(&self, key: &Q) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);

        hasher.finish()
    }
}

impl<K, V, S: BuildHasher + Default, A: Access> Default for HashMap<K, V, S, A> {
    fn default() -> HashMap<K, V, S, A> {
        HashMap::with_capacity_and_hasher(0, S::default())
    }
}
