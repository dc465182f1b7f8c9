use alloc::format;
use core::hash::Hash;
use core::hash::Hasher;
use core::hint::black_box;

use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use graveyard_hash::HashTable as GraveyardHashTable;
use graveyard_hash::hash_table::Entry as GraveyardEntry;
use hashbrown::hash_table::Entry as HashbrownEntry;
use hashbrown::hash_table::HashTable as HashbrownHashTable;
use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher;

extern crate alloc;

#[derive(Clone, Debug, PartialEq, Eq)]
struct TestItem {
    key: String,
    value: u64,
}

impl TestItem {
    fn new(key: u64) -> Self {
        black_box(Self {
            key: format!("key_{}", key),
            value: key,
        })
    }
}

const SIZES: &[usize] = &[
    ((1 << 10) as f32 * 0.87) as usize,
    ((1 << 15) as f32 * 0.87) as usize,
    ((1 << 19) as f32 * 0.87) as usize,
];

fn hash_key(key: &str) -> u64 {
    let mut hasher = SipHasher::new();
    key.hash(&mut hasher);
    black_box(hasher.finish())
}

fn make_items(count: usize, offset: u64) -> Vec<(u64, TestItem)> {
    (0..count)
        .map(|i| {
            let item = TestItem::new(i as u64 + offset);
            let hash = hash_key(&item.key);
            (hash, item)
        })
        .collect()
}

fn fill_graveyard(items: &[(u64, TestItem)], capacity: usize) -> GraveyardHashTable<TestItem> {
    let mut table = GraveyardHashTable::<TestItem>::with_capacity(capacity);
    for (hash, item) in items.iter().cloned() {
        match table.entry(hash, |v| v.key == item.key, |v| hash_key(&v.key)) {
            GraveyardEntry::Vacant(entry) => {
                entry.insert(item);
            }
            GraveyardEntry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn fill_hashbrown(items: &[(u64, TestItem)], capacity: usize) -> HashbrownHashTable<TestItem> {
    let mut table = HashbrownHashTable::<TestItem>::with_capacity(capacity);
    for (hash, item) in items.iter().cloned() {
        match table.entry(hash, |v| v.key == item.key, |v| hash_key(&v.key)) {
            HashbrownEntry::Vacant(entry) => {
                entry.insert(item);
            }
            HashbrownEntry::Occupied(_) => unreachable!(),
        }
    }
    table
}

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| black_box(fill_graveyard(&hash_and_item, 0)))
        });
        group.bench_with_input(
            format!("graveyard_preallocated/{}", size),
            size,
            |b, &size| b.iter(|| black_box(fill_graveyard(&hash_and_item, size))),
        );

        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(&hash_and_item, 0)))
        });
        group.bench_with_input(
            format!("hashbrown_preallocated/{}", size),
            size,
            |b, &size| b.iter(|| black_box(fill_hashbrown(&hash_and_item, size))),
        );
    }

    group.finish();
}

fn bench_insert_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_random");
    let mut rng = OsRng;

    for size in SIZES.iter() {
        let hash_and_item = (0..*size)
            .map(|_| {
                let item = TestItem::new(rng.try_next_u64().unwrap());
                let hash = hash_key(&item.key);
                (hash, item)
            })
            .collect::<Vec<(u64, TestItem)>>();
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| black_box(fill_graveyard(&hash_and_item, 0)))
        });

        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(&hash_and_item, 0)))
        });
    }

    group.finish();
}

fn bench_find_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_hit");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        group.throughput(Throughput::Elements(*size as u64));

        let graveyard = fill_graveyard(&hash_and_item, 0);
        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in hash_and_item.iter() {
                    black_box(graveyard.find(*hash, |v| v.key == item.key));
                }
            })
        });

        let hashbrown = fill_hashbrown(&hash_and_item, 0);
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in hash_and_item.iter() {
                    black_box(hashbrown.find(*hash, |v| v.key == item.key));
                }
            })
        });
    }

    group.finish();
}

fn bench_find_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_miss");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        let missing = make_items(*size, u32::MAX as u64);
        group.throughput(Throughput::Elements(*size as u64));

        let graveyard = fill_graveyard(&hash_and_item, 0);
        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in missing.iter() {
                    black_box(graveyard.find(*hash, |v| v.key == item.key));
                }
            })
        });

        let hashbrown = fill_hashbrown(&hash_and_item, 0);
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for (hash, item) in missing.iter() {
                    black_box(hashbrown.find(*hash, |v| v.key == item.key));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter_batched(
                || fill_graveyard(&hash_and_item, 0),
                |mut table| {
                    for (hash, item) in hash_and_item.iter() {
                        black_box(table.remove(*hash, |v| v.key == item.key));
                    }
                    black_box(table)
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter_batched(
                || fill_hashbrown(&hash_and_item, 0),
                |mut table| {
                    for (hash, item) in hash_and_item.iter() {
                        let removed = match table.find_entry(*hash, |v| v.key == item.key) {
                            Ok(entry) => Some(entry.remove().0),
                            Err(_) => None,
                        };
                        black_box(removed);
                    }
                    black_box(table)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        group.throughput(Throughput::Elements(*size as u64));

        let graveyard = fill_graveyard(&hash_and_item, 0);
        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for item in graveyard.iter() {
                    sum = sum.wrapping_add(item.value);
                }
                black_box(sum)
            })
        });

        let hashbrown = fill_hashbrown(&hash_and_item, 0);
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for item in hashbrown.iter() {
                    sum = sum.wrapping_add(item.value);
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for size in SIZES.iter() {
        let hash_and_item = make_items(*size, 0);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter_batched(
                || fill_graveyard(&hash_and_item, 0),
                |mut table| {
                    for item in table.drain() {
                        black_box(item);
                    }
                    black_box(table)
                },
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter_batched(
                || fill_hashbrown(&hash_and_item, 0),
                |mut table| {
                    for item in table.drain() {
                        black_box(item);
                    }
                    black_box(table)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    for size in SIZES.iter() {
        let initial_hash_and_item = make_items(*size, 0);
        let remove_hash_and_key = initial_hash_and_item
            .iter()
            .step_by(2)
            .map(|(hash, item)| (*hash, item.key.clone()))
            .collect::<Vec<(u64, String)>>();
        let final_hash_and_item = make_items(*size / 2, *size as u64 * 2);
        group.throughput(Throughput::Elements(*size as u64 * 2));

        group.bench_function(format!("graveyard/{}", size), |b| {
            b.iter(|| {
                let mut table = fill_graveyard(&initial_hash_and_item, 0);

                for (hash, item) in initial_hash_and_item.iter() {
                    black_box(table.find(*hash, |v| v.key == item.key));
                }

                for (hash, key) in remove_hash_and_key.iter() {
                    black_box(table.remove(*hash, |v| v.key == *key));
                }

                for (hash, item) in final_hash_and_item.iter().cloned() {
                    match table.entry(hash, |v| v.key == item.key, |v| hash_key(&v.key)) {
                        GraveyardEntry::Vacant(entry) => {
                            entry.insert(item);
                        }
                        GraveyardEntry::Occupied(_) => unreachable!(),
                    }
                }

                black_box(table)
            })
        });

        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                let mut table = fill_hashbrown(&initial_hash_and_item, 0);

                for (hash, item) in initial_hash_and_item.iter() {
                    black_box(table.find(*hash, |v| v.key == item.key));
                }

                for (hash, key) in remove_hash_and_key.iter() {
                    let removed = match table.find_entry(*hash, |v| v.key == *key) {
                        Ok(entry) => Some(entry.remove().0),
                        Err(_) => None,
                    };
                    black_box(removed);
                }

                for (hash, item) in final_hash_and_item.iter().cloned() {
                    match table.entry(hash, |v| v.key == item.key, |v| hash_key(&v.key)) {
                        HashbrownEntry::Vacant(entry) => {
                            entry.insert(item);
                        }
                        HashbrownEntry::Occupied(_) => unreachable!(),
                    }
                }

                black_box(table)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_random,
    bench_find_hit,
    bench_find_miss,
    bench_remove,
    bench_iteration,
    bench_drain,
    bench_mixed_workload,
);

criterion_main!(benches);
