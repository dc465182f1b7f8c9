use alloc::boxed::Box;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::hash_table::Config;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::Telemetry;
use crate::hash_table::TryReserveError;

/// A hash set implemented over the graveyard [`HashTable`].
///
/// `HashSet<T, S>` stores values implementing `Hash + Eq` and uses a
/// configurable hasher builder `S`. Two sets holding the same elements
/// compare equal regardless of capacity, insertion order, or load-factor
/// [`Config`].
///
/// # Examples
///
/// ```rust
/// use std::hash::RandomState;
///
/// use graveyard_hash::HashSet;
///
/// let mut ducks: HashSet<&str, RandomState> = HashSet::new();
/// ducks.insert("huey");
/// ducks.insert("dewey");
/// ducks.insert("louie");
/// assert_eq!(ducks.len(), 3);
/// assert!(ducks.contains(&"dewey"));
/// assert!(!ducks.contains(&"scrooge"));
/// ```
#[derive(Clone)]
pub struct HashSet<T, S> {
    table: HashTable<T>,
    hash_builder: S,
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.table.iter()).finish()
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a set that can hold at least `capacity` elements without
    /// resizing.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Creates an empty set with an explicit load-factor policy.
    ///
    /// # Panics
    ///
    /// Panics if the config is invalid; see [`Config`].
    pub fn with_config_and_hasher(config: Config, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_config(config),
            hash_builder,
        }
    }

    /// Creates a set with the given capacity and load-factor policy.
    pub fn with_capacity_config_and_hasher(
        capacity: usize,
        config: Config,
        hash_builder: S,
    ) -> Self {
        Self {
            table: HashTable::with_capacity_and_config(capacity, config),
            hash_builder,
        }
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the total number of allocated slots.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of buckets, which for this table equals its slot
    /// capacity.
    pub fn bucket_count(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the ratio of live elements to allocated slots.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Insertions remaining before an insert forces a rehash.
    pub fn growth_left(&self) -> usize {
        self.table.growth_left()
    }

    /// Removes all elements, keeping small allocations for reuse.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, |v| self.hash_builder.hash_one(v));
    }

    /// Fallible [`reserve`](Self::reserve); the set is untouched on error.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, |v| self.hash_builder.hash_one(v))
    }

    /// Rehashes the set: unconditionally for `n == 0`, otherwise only if
    /// `n` exceeds the current capacity.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n, |v| self.hash_builder.hash_one(v));
    }

    /// Shrinks the backing storage to fit the current size.
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(|v| self.hash_builder.hash_one(v));
    }

    /// Adds a value to the set. Returns `true` if it was not already
    /// present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use graveyard_hash::HashSet;
    ///
    /// let mut set: HashSet<i32, RandomState> = HashSet::new();
    /// assert!(set.insert(2));
    /// assert!(!set.insert(2));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self
            .table
            .entry(hash, |v| v == &value, |v| self.hash_builder.hash_one(v))
        {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains(&self, value: &T) -> bool {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`, if any.
    pub fn get(&self, value: &T) -> Option<&T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value)
    }

    /// Returns a reference to the stored value equal to `value`, inserting
    /// `make(value)` first if absent.
    ///
    /// `make` must produce a value equal to `value`.
    pub fn get_or_insert_with(&mut self, value: &T, make: impl FnOnce(&T) -> T) -> &T {
        let hash = self.hash_builder.hash_one(value);
        match self
            .table
            .entry(hash, |v| v == value, |v| self.hash_builder.hash_one(v))
        {
            TableEntry::Occupied(entry) => entry.into_mut(),
            TableEntry::Vacant(entry) => {
                let made = make(value);
                debug_assert!(
                    &made == value,
                    "get_or_insert_with produced an unequal value"
                );
                entry.insert(made)
            }
        }
    }

    /// Removes `value` from the set. Returns `true` if it was present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`, if any.
    ///
    /// This is the extraction primitive: the value is moved out intact, so
    /// it can be reinserted into another set without cloning.
    pub fn take(&mut self, value: &T) -> Option<T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v == value)
    }

    /// Retains only the values for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table.retain(|v| f(v));
    }

    /// Moves every element of `other` that is absent from `self` into
    /// `self`. Elements already present here are left in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use graveyard_hash::HashSet;
    ///
    /// let mut a: HashSet<i32, RandomState> = HashSet::new();
    /// a.insert(1);
    /// a.insert(2);
    /// let mut b: HashSet<i32, RandomState> = HashSet::new();
    /// b.insert(2);
    /// b.insert(3);
    /// a.merge(&mut b);
    /// assert_eq!(a.len(), 3);
    /// assert_eq!(b.len(), 1);
    /// assert!(b.contains(&2));
    /// ```
    pub fn merge(&mut self, other: &mut Self) {
        let other_config = other.table.config();
        let drained = core::mem::replace(&mut other.table, HashTable::with_config(other_config));
        for value in drained {
            if self.contains(&value) {
                let hash = other.hash_builder.hash_one(&value);
                match other.table.entry(
                    hash,
                    |v| v == &value,
                    |v| other.hash_builder.hash_one(v),
                ) {
                    TableEntry::Vacant(entry) => {
                        entry.insert(value);
                    }
                    TableEntry::Occupied(_) => unreachable!("duplicate within a set"),
                }
            } else {
                self.insert(value);
            }
        }
    }

    /// Returns an iterator over the set's values.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator that removes and yields every value.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Installs a sampling hook on the underlying table.
    pub fn set_telemetry(&mut self, telemetry: Box<dyn Telemetry>) {
        self.table.set_telemetry(telemetry);
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty set with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a set with the given capacity and a default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S> Default for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower);
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// An iterator over the values of a [`HashSet`].
pub struct Iter<'a, T> {
    inner: crate::hash_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// A draining iterator over the values of a [`HashSet`].
pub struct Drain<'a, T> {
    inner: crate::hash_table::Drain<'a, T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }
}

/// An owning iterator over the values of a [`HashSet`].
pub struct IntoIter<T> {
    inner: crate::hash_table::IntoIter<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, S> IntoIterator for HashSet<T, S> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
