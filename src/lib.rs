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

//! An open-addressing hash table engine with two interchangeable access
//! disciplines, plus map and set façades over it.
//!
//! The engine stores 62-bit hash values in a linearly probed slot array,
//! with deletion by tombstone and growth by full rehash. Under the
//! [`Concurrent`](raw::Concurrent) discipline, insertion is lock-free
//! (CAS with restart on a lost race), any number of threads may probe and
//! insert at once behind a reference-counted shared gate, and only a
//! resize takes the single exclusive slot. Under the
//! [`Serial`](raw::Serial) discipline every atomic read-modify-write
//! degenerates to a plain store and the types are `!Sync`.
//!
//! The engine compares stored hashes only — never original keys. The
//! façades in [`map`] and [`set`] inherit this: a 62-bit hash collision
//! between two keys makes them the same entry. See the [`map`] module
//! documentation before using them somewhere a silent collision would be
//! unacceptable.
//!
//! The raw engine is available under [`raw`] for callers that compute
//! their own hashes.

pub mod map;
pub mod set;

mod common;

pub mod raw {
    //! The engine beneath the façades, keyed directly by caller-supplied
    //! hashes. The high two bits of every hash are discarded.

    pub use crate::common::access::{Access, Concurrent, Serial};
    pub use crate::common::storage::{FixedIter, FixedStorage, Iter, Storage};
}

pub use map::{DefaultHashBuilder, HashMap, SerialHashMap};
pub use set::{HashSet, SerialHashSet};
