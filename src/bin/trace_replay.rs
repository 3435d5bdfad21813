//! Replay a key trace against the cache policies and report miss ratios.
//!
//! Feeds the same access stream to every requested policy with the identity
//! loader, then prints per-policy misses, hit ratio, and wall-clock time.
//! The trace is either a file of whitespace-separated unsigned integers or
//! a seeded uniform pseudo-random stream.
//!
//! ```text
//! trace_replay --random 1000000 --universe 2000000 --capacity 10000
//! trace_replay --trace workload.txt --capacity 4096 --policies car,cart
//! ```

use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use carcache::policy::car::CarCore;
use carcache::policy::cart::CartCore;
use carcache::policy::lru::LruCore;
use carcache::traits::{from_fn, Loader, ReplacementCache};

#[derive(Parser, Debug)]
#[command(
    name = "trace_replay",
    about = "Replay a key trace against LRU, CAR, and CART and compare miss ratios"
)]
struct Args {
    /// Trace file of whitespace-separated unsigned integer keys.
    #[arg(long, conflicts_with = "random")]
    trace: Option<PathBuf>,

    /// Generate a uniform pseudo-random trace with this many accesses.
    #[arg(long)]
    random: Option<usize>,

    /// Key universe for generated traces; keys are drawn from [0, universe).
    #[arg(long, default_value_t = 2_000_000)]
    universe: u64,

    /// RNG seed for generated traces.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Cache capacity handed to every policy.
    #[arg(long, default_value_t = 10_000)]
    capacity: usize,

    /// Policies to run.
    #[arg(long, default_value = "lru,car,cart", value_delimiter = ',')]
    policies: Vec<String>,
}

fn identity() -> impl Loader<u64, Value = u64, Error = Infallible> {
    from_fn(|k: &u64| *k)
}

fn load_trace(args: &Args) -> Result<Vec<u64>, Box<dyn std::error::Error>> {
    if let Some(path) = &args.trace {
        let text = std::fs::read_to_string(path)?;
        let mut keys = Vec::new();
        for token in text.split_whitespace() {
            keys.push(token.parse::<u64>().map_err(|err| {
                format!("bad key {:?} in {}: {}", token, path.display(), err)
            })?);
        }
        return Ok(keys);
    }

    let len = args.random.unwrap_or(1_000_000);
    let mut rng = StdRng::seed_from_u64(args.seed);
    Ok((0..len).map(|_| rng.gen_range(0..args.universe)).collect())
}

fn build(
    name: &str,
    capacity: usize,
) -> Result<Box<dyn ReplacementCache<u64, u64, Error = Infallible>>, Box<dyn std::error::Error>> {
    let cache: Box<dyn ReplacementCache<u64, u64, Error = Infallible>> =
        match name.trim().to_ascii_lowercase().as_str() {
            "lru" => Box::new(LruCore::new(capacity, identity())?),
            "car" => Box::new(CarCore::new(capacity, identity())?),
            "cart" => Box::new(CartCore::new(capacity, identity())?),
            other => return Err(format!("unknown policy {:?}", other).into()),
        };
    Ok(cache)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let trace = load_trace(&args)?;
    if trace.is_empty() {
        return Err("empty trace".into());
    }

    println!(
        "{} accesses, capacity {}, {} distinct policies",
        trace.len(),
        args.capacity,
        args.policies.len()
    );

    for policy in &args.policies {
        let mut cache = build(policy, args.capacity)?;
        let start = Instant::now();
        let mut checksum = 0u64;
        for key in &trace {
            let value = match cache.try_get(key) {
                Ok(value) => *value,
                Err(never) => match never {},
            };
            checksum = checksum.wrapping_add(value);
        }
        let elapsed = start.elapsed();

        let misses = cache.misses();
        let hits = trace.len() as u64 - misses;
        println!(
            "{:<5} misses={:<10} hit_ratio={:>6.2}% elapsed={:?} checksum={:#x}",
            cache.name(),
            misses,
            hits as f64 / trace.len() as f64 * 100.0,
            elapsed,
            checksum
        );
    }
    Ok(())
}
