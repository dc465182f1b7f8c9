use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::hash::RandomState;

use proptest::prelude::*;

use crate::hash_table::Config;
use crate::HashMap;
use crate::HashSet;

/// Operations applied in lockstep to the set under test and a model.
#[derive(Debug, Clone)]
enum SetOp {
    Insert(u16),
    Remove(u16),
    Contains(u16),
    Take(u16),
    Reserve(u16),
    Rehash,
    Clear,
}

fn set_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        8 => any::<u16>().prop_map(SetOp::Insert),
        4 => any::<u16>().prop_map(SetOp::Remove),
        4 => any::<u16>().prop_map(SetOp::Contains),
        2 => any::<u16>().prop_map(SetOp::Take),
        1 => (0u16..1000).prop_map(SetOp::Reserve),
        1 => Just(SetOp::Rehash),
        1 => Just(SetOp::Clear),
    ]
}

fn check_set_matches_model(set: &HashSet<u16, RandomState>, model: &BTreeSet<u16>) {
    assert_eq!(set.len(), model.len());
    let mut contents: Vec<u16> = set.iter().copied().collect();
    contents.sort_unstable();
    let expected: Vec<u16> = model.iter().copied().collect();
    assert_eq!(contents, expected);
}

#[derive(Debug, Clone)]
enum MapOp {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
    EntryAdd(u16, u32),
    Retain(u16),
    Clear,
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        8 => (any::<u16>(), any::<u32>()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        4 => any::<u16>().prop_map(MapOp::Remove),
        4 => any::<u16>().prop_map(MapOp::Get),
        3 => (any::<u16>(), any::<u32>()).prop_map(|(k, v)| MapOp::EntryAdd(k, v)),
        1 => any::<u16>().prop_map(MapOp::Retain),
        1 => Just(MapOp::Clear),
    ]
}

proptest! {
    #[test]
    fn set_matches_btreeset_model(ops in prop::collection::vec(set_op(), 1..400)) {
        let mut set: HashSet<u16, RandomState> = HashSet::new();
        let mut model: BTreeSet<u16> = BTreeSet::new();

        for op in ops {
            match op {
                SetOp::Insert(v) => {
                    prop_assert_eq!(set.insert(v), model.insert(v));
                }
                SetOp::Remove(v) => {
                    prop_assert_eq!(set.remove(&v), model.remove(&v));
                }
                SetOp::Contains(v) => {
                    prop_assert_eq!(set.contains(&v), model.contains(&v));
                }
                SetOp::Take(v) => {
                    prop_assert_eq!(set.take(&v), model.take(&v));
                }
                SetOp::Reserve(n) => {
                    set.reserve(n as usize);
                }
                SetOp::Rehash => {
                    set.rehash(0);
                }
                SetOp::Clear => {
                    set.clear();
                    model.clear();
                }
            }
        }
        check_set_matches_model(&set, &model);
    }

    #[test]
    fn set_survives_tight_configs(
        ops in prop::collection::vec(set_op(), 1..200),
        full_denominator in 2usize..12,
    ) {
        // Aggressive utilization ratios force frequent rehashes; the
        // contents must be unaffected.
        let config = Config {
            full_numerator: full_denominator - 1,
            full_denominator,
            rehashed_numerator: 1,
            rehashed_denominator: 2,
            backwards_insert_fuzz: true,
        };
        let mut set: HashSet<u16, RandomState> =
            HashSet::with_config_and_hasher(config, RandomState::new());
        let mut model: BTreeSet<u16> = BTreeSet::new();

        for op in ops {
            match op {
                SetOp::Insert(v) => {
                    prop_assert_eq!(set.insert(v), model.insert(v));
                }
                SetOp::Remove(v) => {
                    prop_assert_eq!(set.remove(&v), model.remove(&v));
                }
                SetOp::Contains(v) => {
                    prop_assert_eq!(set.contains(&v), model.contains(&v));
                }
                SetOp::Take(v) => {
                    prop_assert_eq!(set.take(&v), model.take(&v));
                }
                SetOp::Reserve(n) => set.reserve(n as usize),
                SetOp::Rehash => set.rehash(0),
                SetOp::Clear => {
                    set.clear();
                    model.clear();
                }
            }
        }
        check_set_matches_model(&set, &model);
    }

    #[test]
    fn map_matches_btreemap_model(ops in prop::collection::vec(map_op(), 1..400)) {
        let mut map: HashMap<u16, u32, RandomState> = HashMap::new();
        let mut model: BTreeMap<u16, u32> = BTreeMap::new();

        for op in ops {
            match op {
                MapOp::Insert(k, v) => {
                    prop_assert_eq!(map.insert(k, v), model.insert(k, v));
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(map.remove(&k), model.remove(&k));
                }
                MapOp::Get(k) => {
                    prop_assert_eq!(map.get(&k), model.get(&k));
                }
                MapOp::EntryAdd(k, v) => {
                    let slot = map.entry(k).or_insert(0);
                    *slot = slot.wrapping_add(v);
                    let slot = model.entry(k).or_insert(0);
                    *slot = slot.wrapping_add(v);
                }
                MapOp::Retain(threshold) => {
                    map.retain(|k, _| *k < threshold);
                    model.retain(|k, _| *k < threshold);
                }
                MapOp::Clear => {
                    map.clear();
                    model.clear();
                }
            }
        }

        assert_eq!(map.len(), model.len());
        let mut contents: Vec<(u16, u32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        contents.sort_unstable();
        let expected: Vec<(u16, u32)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn insert_then_erase_restores_footprint(keys in prop::collection::btree_set(any::<u32>(), 1..200)) {
        let mut set: HashSet<u32, RandomState> = HashSet::with_capacity(keys.len() * 2);
        let baseline_capacity = set.capacity();
        let baseline_load = set.load_factor();
        for &key in &keys {
            set.insert(key);
        }
        for &key in &keys {
            prop_assert!(set.remove(&key));
        }
        prop_assert_eq!(set.len(), 0);
        prop_assert_eq!(set.capacity(), baseline_capacity);
        prop_assert_eq!(set.load_factor(), baseline_load);
    }
}
