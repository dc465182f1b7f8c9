use alloc::boxed::Box;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem;

use crate::hash_table::Config;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::OccupiedEntry as TableOccupiedEntry;
use crate::hash_table::Telemetry;
use crate::hash_table::TryReserveError;
use crate::hash_table::VacantEntry as TableVacantEntry;

/// A hash map implemented over the graveyard [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq`, using a configurable hasher builder `S`. Pairs are stored
/// inline in the table's slots; the table hashes and compares on the key
/// half only.
///
/// # Examples
///
/// ```rust
/// use std::hash::RandomState;
///
/// use graveyard_hash::HashMap;
///
/// let mut map: HashMap<&str, i32, RandomState> = HashMap::new();
/// map.insert("a", 1);
/// map.insert("b", 2);
/// assert_eq!(map.get(&"a"), Some(&1));
/// assert_eq!(map.len(), 2);
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.table.iter().map(|(k, v)| (k, v)) {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty map with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Creates an empty map with an explicit load-factor policy.
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

    #[inline(always)]
    fn hash_key(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
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

    /// Returns the ratio of live entries to allocated slots.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Insertions remaining before an insert forces a rehash.
    pub fn growth_left(&self) -> usize {
        self.table.growth_left()
    }

    /// Removes all entries, keeping small allocations for reuse.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, |(k, _)| self.hash_builder.hash_one(k));
    }

    /// Fallible [`reserve`](Self::reserve); the map is untouched on error.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, |(k, _)| self.hash_builder.hash_one(k))
    }

    /// Rehashes the map: unconditionally for `n == 0`, otherwise only if
    /// `n` exceeds the current capacity.
    pub fn rehash(&mut self, n: usize) {
        self.table
            .rehash(n, |(k, _)| self.hash_builder.hash_one(k));
    }

    /// Shrinks the backing storage to fit the current size.
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(|(k, _)| self.hash_builder.hash_one(k));
    }

    /// Inserts a key-value pair, returning the previous value for the key
    /// if one was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use graveyard_hash::HashMap;
    ///
    /// let mut map: HashMap<i32, &str, RandomState> = HashMap::new();
    /// assert_eq!(map.insert(1, "one"), None);
    /// assert_eq!(map.insert(1, "uno"), Some("one"));
    /// assert_eq!(map.get(&1), Some(&"uno"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_key(&key);
        match self.table.entry(
            hash,
            |(k, _)| k == &key,
            |(k, _)| self.hash_builder.hash_one(k),
        ) {
            TableEntry::Occupied(mut entry) => {
                Some(mem::replace(&mut entry.get_mut().1, value))
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                None
            }
        }
    }

    /// Returns a reference to the value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_key(key);
        self.table.find(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value for `key`, if present.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_key(key);
        self.table
            .find_mut(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`, if present.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_key(key);
        self.table
            .find(hash, |(k, _)| k == key)
            .map(|(k, v)| (k, v))
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key` from the map, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored pair if present.
    ///
    /// This is the extraction primitive: the pair is moved out intact.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_key(key);
        self.table.remove(hash, |(k, _)| k == key)
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::hash::RandomState;
    ///
    /// use graveyard_hash::HashMap;
    ///
    /// let mut counts: HashMap<&str, i32, RandomState> = HashMap::new();
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get(&"a"), Some(&2));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        let hash = self.hash_key(&key);
        match self.table.entry(
            hash,
            |(k, _)| k == &key,
            |(k, _)| self.hash_builder.hash_one(k),
        ) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry, key }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Retains only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(|(k, v)| f(k, v));
    }

    /// Moves every entry of `other` whose key is absent from `self` into
    /// `self`. Entries whose keys are already present are left in `other`.
    pub fn merge(&mut self, other: &mut Self) {
        let other_config = other.table.config();
        let drained = core::mem::replace(&mut other.table, HashTable::with_config(other_config));
        for (key, value) in drained {
            if self.contains_key(&key) {
                let hash = other.hash_builder.hash_one(&key);
                match other.table.entry(
                    hash,
                    |(k, _)| k == &key,
                    |(k, _)| other.hash_builder.hash_one(k),
                ) {
                    TableEntry::Vacant(entry) => {
                        entry.insert((key, value));
                    }
                    TableEntry::Occupied(_) => unreachable!("duplicate key within a map"),
                }
            } else {
                self.insert(key, value);
            }
        }
    }

    /// Returns an iterator over the map's key-value pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the map's pairs with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the map's keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the map's values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the map's values, mutably.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator that removes and yields every pair.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Installs a sampling hook on the underlying table.
    pub fn set_telemetry(&mut self, telemetry: Box<dyn Telemetry>) {
        self.table.set_telemetry(telemetry);
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty map with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map with the given capacity and a default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |ov| ov == v))
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower);
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// A view into a single entry of a [`HashMap`], which is either vacant or
/// occupied.
///
/// Constructed by [`HashMap::entry`].
pub enum Entry<'a, K, V> {
    /// The key is not present.
    Vacant(VacantEntry<'a, K, V>),
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts `default` if the entry is vacant; returns a mutable
    /// reference to the value either way.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant; returns a
    /// mutable reference to the value either way.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied, then returns the
    /// entry.
    pub fn and_modify<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }

    /// Returns a reference to the entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }

    /// Inserts `V::default()` if the entry is vacant; returns a mutable
    /// reference to the value either way.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant map entry.
pub struct VacantEntry<'a, K, V> {
    entry: TableVacantEntry<'a, (K, V)>,
    key: K,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Returns a reference to the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key without inserting.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts `value` and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied map entry.
pub struct OccupiedEntry<'a, K, V> {
    entry: TableOccupiedEntry<'a, (K, V)>,
    key: K,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Returns a reference to the entry's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Gets a reference to the value.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference with the map's lifetime.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry, returning the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the entries of a [`HashMap`].
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// An iterator over the entries of a [`HashMap`] with mutable values.
pub struct IterMut<'a, K, V> {
    inner: crate::hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<(&'a K, &'a mut V)> {
        self.inner.next().map(|entry| {
            let (key, value) = entry;
            (&*key, value)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`HashMap`], mutably.
pub struct ValuesMut<'a, K, V> {
    inner: crate::hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<&'a mut V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A draining iterator over the entries of a [`HashMap`].
pub struct Drain<'a, K, V> {
    inner: crate::hash_table::Drain<'a, (K, V)>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next()
    }
}

/// An owning iterator over the entries of a [`HashMap`].
pub struct IntoIter<K, V> {
    inner: crate::hash_table::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    #[test]
    fn test_new_and_with_hasher() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);

        let map2 = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
    }

    #[test]
    fn test_with_capacity() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::with_capacity(100);
        assert!(map.capacity() >= 100);
        assert!(map.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        assert_eq!(map.insert(1, "hello".to_string()), None);
        assert_eq!(map.len(), 1);

        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        assert_eq!(
            map.insert(1, "world".to_string()),
            Some("hello".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"world".to_string()));
    }

    #[test]
    fn test_get_mut() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_get_key_value() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("key".to_string(), 7);
        let (k, v) = map.get_key_value(&"key".to_string()).unwrap();
        assert_eq!(k, "key");
        assert_eq!(*v, 7);
    }

    #[test]
    fn test_contains_key() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        assert!(!map.contains_key(&1));
        map.insert(1, "value");
        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_remove_and_remove_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello");
        map.insert(2, "world");

        assert_eq!(map.remove(&1), Some("hello"));
        assert_eq!(map.remove(&1), None);
        assert_eq!(map.remove_entry(&2), Some((2, "world")));
        assert!(map.is_empty());
    }

    #[test]
    fn test_entry_api() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        *map.entry("a").or_insert(0) += 1;
        *map.entry("a").or_insert(0) += 1;
        *map.entry("b").or_insert(10) += 1;

        assert_eq!(map.get(&"a"), Some(&2));
        assert_eq!(map.get(&"b"), Some(&11));

        map.entry("c").or_insert_with(|| 100);
        assert_eq!(map.get(&"c"), Some(&100));

        map.entry("a").and_modify(|v| *v *= 10);
        assert_eq!(map.get(&"a"), Some(&20));

        assert_eq!(map.entry("d").key(), &"d");
    }

    #[test]
    fn test_entry_or_default() {
        let mut map: HashMap<&str, i32, SipHashBuilder> = HashMap::new();
        map.entry("x").or_default();
        assert_eq!(map.get(&"x"), Some(&0));
    }

    #[test]
    fn test_occupied_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("key", 1);

        match map.entry("key") {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), &"key");
                assert_eq!(*entry.get(), 1);
                assert_eq!(entry.insert(2), 1);
                assert_eq!(*entry.get(), 2);
                assert_eq!(entry.remove_entry(), ("key", 2));
            }
            Entry::Vacant(_) => panic!("expected occupied"),
        }
        assert!(map.is_empty());
    }

    #[test]
    fn test_vacant_entry() {
        let mut map: HashMap<&str, i32, SipHashBuilder> = HashMap::new();
        match map.entry("key") {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), &"key");
                assert_eq!(*entry.insert(42), 42);
            }
            Entry::Occupied(_) => panic!("expected vacant"),
        }
        assert_eq!(map.get(&"key"), Some(&42));

        match map.entry("unused") {
            Entry::Vacant(entry) => {
                assert_eq!(entry.into_key(), "unused");
            }
            Entry::Occupied(_) => panic!("expected vacant"),
        }
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_iterators() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i * 2);
        }

        let mut keys: Vec<i32> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());

        let mut values: Vec<i32> = map.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..100).map(|i| i * 2).collect::<Vec<_>>());

        for (k, v) in map.iter() {
            assert_eq!(*v, *k * 2);
        }
        assert_eq!(map.iter().len(), 100);
    }

    #[test]
    fn test_iter_mut_and_values_mut() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..50 {
            map.insert(i, i);
        }
        for (k, v) in map.iter_mut() {
            *v += *k;
        }
        for v in map.values_mut() {
            *v += 1;
        }
        for i in 0..50 {
            assert_eq!(map.get(&i), Some(&(i * 2 + 1)));
        }
    }

    #[test]
    fn test_drain() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i);
        }
        let drained: Vec<(i32, i32)> = map.drain().collect();
        assert_eq!(drained.len(), 100);
        assert!(map.is_empty());
        map.insert(1, 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_into_iter() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..50 {
            map.insert(i, i * 3);
        }
        let mut pairs: Vec<(i32, i32)> = map.into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs.len(), 50);
        assert_eq!(pairs[10], (10, 30));
    }

    #[test]
    fn test_retain() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i);
        }
        map.retain(|k, _| k % 2 == 0);
        assert_eq!(map.len(), 50);
        assert!(map.contains_key(&0));
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn test_retain_can_mutate_values() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..10 {
            map.insert(i, i);
        }
        map.retain(|_, v| {
            *v += 100;
            true
        });
        assert_eq!(map.get(&3), Some(&103));
    }

    #[test]
    fn test_merge() {
        let hasher = SipHashBuilder::default();
        let mut a = HashMap::with_hasher(hasher.clone());
        let mut b = HashMap::with_hasher(hasher);
        a.insert(1, "a1");
        a.insert(2, "a2");
        b.insert(2, "b2");
        b.insert(3, "b3");

        a.merge(&mut b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(&2), Some(&"a2"), "present key must keep its value");
        assert_eq!(a.get(&3), Some(&"b3"));
        assert_eq!(b.len(), 1);
        assert_eq!(b.get(&2), Some(&"b2"));
    }

    #[test]
    fn test_eq() {
        let hasher = SipHashBuilder::default();
        let mut a = HashMap::with_hasher(hasher.clone());
        let mut b = HashMap::with_capacity_and_hasher(500, hasher);
        for i in 0..100 {
            a.insert(i, i);
        }
        for i in (0..100).rev() {
            b.insert(i, i);
        }
        assert_eq!(a, b);
        b.insert(0, 999);
        assert_ne!(a, b);
    }

    #[test]
    fn test_extend_and_from_iter() {
        let map: HashMap<i32, i32, SipHashBuilder> = (0..100).map(|i| (i, i)).collect();
        assert_eq!(map.len(), 100);
        let mut map2: HashMap<i32, i32, SipHashBuilder> = HashMap::new();
        map2.extend((0..100).map(|i| (i, i)));
        assert_eq!(map, map2);
    }

    #[test]
    fn test_clone() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i.to_string());
        }
        let clone = map.clone();
        assert_eq!(map, clone);
        map.remove(&0);
        assert_eq!(clone.get(&0), Some(&"0".to_string()));
    }

    #[test]
    fn test_growth() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..10_000 {
            map.insert(i, i);
        }
        assert_eq!(map.len(), 10_000);
        for i in 0..10_000 {
            assert_eq!(map.get(&i), Some(&i));
        }
    }

    #[test]
    fn test_reserve_and_growth_left() {
        let mut map: HashMap<i32, i32, SipHashBuilder> = HashMap::new();
        map.reserve(1000);
        for i in 0..1000 {
            map.insert(i, i);
        }
        assert_eq!(map.growth_left(), 0);
        assert_eq!(map.len(), 1000);
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i);
        }
        map.clear();
        assert!(map.is_empty());
        map.insert(1, 1);
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn test_rehash_and_shrink() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..2000 {
            map.insert(i, i);
        }
        for i in 100..2000 {
            map.remove(&i);
        }
        map.rehash(0);
        let before = map.capacity();
        map.shrink_to_fit();
        assert!(map.capacity() <= before);
        for i in 0..100 {
            assert_eq!(map.get(&i), Some(&i));
        }
    }

    #[test]
    fn test_debug() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, 2);
        let rendered = alloc::format!("{map:?}");
        assert_eq!(rendered, "{1: 2}");
    }

    #[test]
    fn test_string_keys() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..500 {
            map.insert(i.to_string(), i);
        }
        assert_eq!(map.len(), 500);
        assert_eq!(map.get(&"250".to_string()), Some(&250));
        assert_eq!(map.remove(&"250".to_string()), Some(250));
        assert_eq!(map.get(&"250".to_string()), None);
    }
}
