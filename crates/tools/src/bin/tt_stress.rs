//! Concurrent stress tool for the shared transposition table
//!
//! Hammers a single shared table with randomized probe/write traffic from
//! multiple threads and reports throughput, hit rate and final hashfull.
//! Useful for spotting crashes or throughput regressions in the lock-free
//! probe/write path under real contention.

use anyhow::Result;
use clap::Parser;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tsumugi_tt::{Bound, Move, ThreadPool, TranspositionTable, Value, DEPTH_ENTRY_OFFSET};

#[derive(Parser)]
#[command(about = "Concurrent probe/write stress test for the transposition table")]
struct Args {
    /// Table size in MB
    #[arg(long, default_value_t = 64)]
    hash_mb: usize,

    /// Number of worker threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Duration of the stress run in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Restrict keys to this many bits to force collisions (0 = full 64bit)
    #[arg(long, default_value_t = 24)]
    key_bits: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let pool = ThreadPool::new(args.threads);
    let tt = TranspositionTable::new(args.hash_mb, &pool);
    tt.new_search();
    log::info!(
        "stress: {} MB, {} threads, {}s, large_pages={}",
        args.hash_mb,
        args.threads,
        args.seconds,
        tt.uses_large_pages()
    );

    let key_mask = if args.key_bits == 0 || args.key_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << args.key_bits) - 1
    };

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let total_ops = AtomicU64::new(0);
    let total_hits = AtomicU64::new(0);
    let gen8 = tt.generation();

    std::thread::scope(|s| {
        for t in 0..args.threads as u64 {
            let tt = &tt;
            let total_ops = &total_ops;
            let total_hits = &total_hits;
            s.spawn(move || {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xC0FF_EE00 + t);
                let mut ops = 0u64;
                let mut hits = 0u64;

                while Instant::now() < deadline {
                    for _ in 0..4096 {
                        let key = rng.next_u64() & key_mask;
                        tt.prefetch(key);
                        let probe = tt.probe(key);
                        if probe.found {
                            hits += 1;
                        }
                        probe.write(
                            key,
                            Value::new((rng.next_u32() % 4000) as i32 - 2000),
                            rng.next_u32() % 16 == 0,
                            match rng.next_u32() % 3 {
                                0 => Bound::Exact,
                                1 => Bound::Lower,
                                _ => Bound::Upper,
                            },
                            DEPTH_ENTRY_OFFSET + 1 + (rng.next_u32() % 32) as i32,
                            Move::from_u16(rng.next_u32() as u16),
                            Value::new((rng.next_u32() % 4000) as i32 - 2000),
                            rng.next_u32() % 4 == 0,
                            gen8,
                        );
                        ops += 1;
                    }
                }

                total_ops.fetch_add(ops, Ordering::Relaxed);
                total_hits.fetch_add(hits, Ordering::Relaxed);
            });
        }
    });

    let ops = total_ops.load(Ordering::Relaxed);
    let hits = total_hits.load(Ordering::Relaxed);
    let ops_per_sec = ops as f64 / args.seconds as f64;

    println!("=== TT stress result ===");
    println!("ops:        {ops}");
    println!("ops/sec:    {ops_per_sec:.0}");
    println!("hit rate:   {:.1}%", 100.0 * hits as f64 / ops.max(1) as f64);
    println!("hashfull:   {} (current gen) / {} (all)", tt.hashfull(0), tt.hashfull(255));

    Ok(())
}
