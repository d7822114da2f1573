//! Benchmark tool for transposition table fill behaviour
//!
//! Fills tables of several sizes with random entries and reports the
//! hashfull progression and store throughput.

use anyhow::Result;
use clap::Parser;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::Instant;
use tsumugi_tt::{Bound, Move, ThreadPool, TranspositionTable, Value, DEPTH_ENTRY_OFFSET};

#[derive(Parser)]
#[command(about = "Hashfull progression benchmark for the transposition table")]
struct Args {
    /// Number of random stores per table
    #[arg(long, default_value_t = 100_000)]
    stores: usize,

    /// Table sizes in MB
    #[arg(long, value_delimiter = ',', default_values_t = vec![1, 8, 16, 32])]
    sizes: Vec<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("=== Transposition Table Hashfull Benchmark ===\n");

    for size_mb in &args.sizes {
        println!("Testing with {size_mb}MB table:");
        run_benchmark(*size_mb, args.stores);
        println!();
    }

    Ok(())
}

fn run_benchmark(size_mb: usize, stores: usize) {
    let pool = ThreadPool::default();
    let tt = TranspositionTable::new(size_mb, &pool);
    tt.new_search();
    let gen8 = tt.generation();

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(12345);
    let start_time = Instant::now();

    for i in 0..stores {
        let key = rng.next_u64();
        let depth = DEPTH_ENTRY_OFFSET + 1 + (rng.next_u32() % 20) as i32;
        let bound = match rng.next_u32() % 3 {
            0 => Bound::Exact,
            1 => Bound::Lower,
            _ => Bound::Upper,
        };

        let probe = tt.probe(key);
        probe.write(
            key,
            Value::new((rng.next_u32() % 2000) as i32 - 1000),
            rng.next_u32() % 10 == 0,
            bound,
            depth,
            Move::from_u16(rng.next_u32() as u16),
            Value::new((rng.next_u32() % 2000) as i32 - 1000),
            rng.next_u32() % 4 == 0,
            gen8,
        );

        if i % 10_000 == 0 && i > 0 {
            println!("  After {i} stores: hashfull={}", tt.hashfull(0));
        }
    }

    let elapsed = start_time.elapsed();
    let stores_per_sec = stores as f64 / elapsed.as_secs_f64();

    println!("  Total stores: {stores}");
    println!("  Time elapsed: {:.2}s", elapsed.as_secs_f64());
    println!("  Stores/sec: {stores_per_sec:.0}");
    println!("  Final hashfull: {} (current gen) / {} (all)", tt.hashfull(0), tt.hashfull(255));
}
