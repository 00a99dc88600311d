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

//! A hash-keyed membership set backed by [`HashMap`](crate::map::HashMap).
//!
//! Values are hashed on every operation and not stored; membership is
//! membership of the 62-bit hash. The collision caveat from the map
//! module applies unchanged.

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash},
};

use crate::common::access::{Access, Concurrent, Serial};
use crate::map::{DefaultHashBuilder, HashMap};

/// A membership set over the open-addressing engine.
pub struct HashSet<T, S = DefaultHashBuilder, A: Access = Concurrent> {
    map: HashMap<T, (), S, A>,
}

/// [`HashSet`] under the single-threaded access discipline.
pub type SerialHashSet<T, S = DefaultHashBuilder> = HashSet<T, S, Serial>;

impl<T> HashSet<T> {
    /// Creates an empty concurrent set with the default capacity and
    /// hasher.
    pub fn new() -> HashSet<T> {
        HashSet::with_capacity_and_hasher(0, DefaultHashBuilder::default())
    }

    /// Creates an empty concurrent set with space for at least `capacity`
    /// elements without growing.
    pub fn with_capacity(capacity: usize) -> HashSet<T> {
        HashSet::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S: BuildHasher, A: Access> HashSet<T, S, A> {
    /// Creates an empty set that will use `hash_builder` to hash values.
    pub fn with_hasher(hash_builder: S) -> HashSet<T, S, A> {
        HashSet::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty set with space for at least `capacity` elements
    /// that will use `hash_builder` to hash values.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashSet<T, S, A> {
        HashSet {
            map: HashMap::with_capacity_and_hasher(capacity, hash_builder),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Returns true if `value` is a member.
    pub fn contains<Q: ?Sized + Hash>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
    {
        self.map.contains_key(value)
    }

    /// Adds `value` to the set, returning true if it was not already a
    /// member.
    pub fn insert(&self, value: T) -> bool
    where
        T: Hash,
    {
        self.map.insert(value, ()).is_none()
    }

    /// Removes `value` from the set, returning true if it was a member.
    pub fn remove<Q: ?Sized + Hash>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
    {
        self.map.remove(value).is_some()
    }

    /// Removes every member. The caveats of
    /// [`HashMap::clear`](crate::map::HashMap::clear) apply.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<T, S: BuildHasher + Default, A: Access> Default for HashSet<T, S, A> {
    fn default() -> HashSet<T, S, A> {
        HashSet::with_capacity_and_hasher(0, S::default())
    }
}
