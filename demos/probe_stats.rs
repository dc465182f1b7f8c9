use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use graveyard_hash::HashTable;
use graveyard_hash::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,
    /// How many erase/insert churn rounds to run before sampling, to show
    /// how the layout drifts between rehashes.
    #[arg(short = 'r', long = "churn_rounds", default_value_t = 0)]
    churn_rounds: usize,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64> = HashTable::with_capacity(args.target_capacity);

    println!("Actual capacity: {}", table.capacity());
    println!("Filling table until the growth budget runs out...");

    let mut next_value = 0u64;
    while table.growth_left() > 0 {
        let value = next_value;
        next_value += 1;
        let hash = hash_u64(value);
        match table.entry(hash, |&v| v == value, |&v| hash_u64(v)) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }

    for round in 0..args.churn_rounds {
        let victim = round as u64;
        let hash = hash_u64(victim);
        if table.remove(hash, |&v| v == victim).is_none() {
            continue;
        }
        let value = next_value;
        next_value += 1;
        let hash = hash_u64(value);
        match table.entry(hash, |&v| v == value, |&v| hash_u64(v)) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => panic!("Value already exists in table: {}", value),
        }
    }

    println!("Inserted {} values into table", table.len());
    println!("Final load factor: {:.2}%", table.load_factor() * 100.0);

    table.probe_histogram(|&v| hash_u64(v)).print();
    table.debug_stats().print();
}
