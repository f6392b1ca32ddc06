//! expiremap - Soak Driver
//!
//! Runs a configurable put/get workload against an `ExpireMap`, reports
//! statistics periodically, and after the workload stops waits until every
//! entry has expired and been reclaimed.

use anyhow::{bail, Context};
use bytes::Bytes;
use expiremap::{ExpireMap, ExpireMapConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Driver configuration
struct Config {
    /// Deadline shards (expirer threads)
    shards: usize,
    /// Expirations reclaimed per worker cycle
    max_batch: usize,
    /// Writer threads
    writers: usize,
    /// Distinct keys written
    keys: usize,
    /// Entry timeout in milliseconds
    ttl_ms: u64,
    /// How long to run the workload
    duration: Duration,
    /// Interval between statistics reports
    report_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let map = ExpireMapConfig::default();
        Self {
            shards: map.shard_count,
            max_batch: map.max_batch,
            writers: 4,
            keys: 10_000,
            ttl_ms: 500,
            duration: Duration::from_secs(10),
            report_interval: Duration::from_secs(1),
        }
    }
}

/// Parses the value following a flag.
fn value<T>(args: &[String], i: usize, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = args.get(i + 1) else {
        bail!("{flag} requires a value");
    };
    raw.parse()
        .with_context(|| format!("invalid value for {flag}: {raw}"))
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--shards" | "-s" => config.shards = value(&args, i, "--shards")?,
                "--max-batch" | "-b" => config.max_batch = value(&args, i, "--max-batch")?,
                "--writers" | "-w" => config.writers = value(&args, i, "--writers")?,
                "--keys" | "-k" => config.keys = value(&args, i, "--keys")?,
                "--ttl-ms" | "-t" => config.ttl_ms = value(&args, i, "--ttl-ms")?,
                "--duration-secs" | "-d" => {
                    config.duration = Duration::from_secs(value(&args, i, "--duration-secs")?)
                }
                "--report-ms" | "-r" => {
                    config.report_interval =
                        Duration::from_millis(value(&args, i, "--report-ms")?)
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("expiremap version {}", expiremap::VERSION);
                    std::process::exit(0);
                }
                other => {
                    print_help();
                    bail!("unknown argument: {other}");
                }
            }
            i += 2;
        }

        if config.keys == 0 {
            bail!("--keys must be at least 1");
        }
        if config.report_interval.is_zero() {
            bail!("--report-ms must be at least 1");
        }

        Ok(config)
    }

    fn map_config(&self) -> ExpireMapConfig {
        ExpireMapConfig {
            shard_count: self.shards,
            max_batch: self.max_batch,
            ..Default::default()
        }
    }
}

fn print_help() {
    println!(
        r#"
expiremap - Concurrent Expiring Map Soak Driver

USAGE:
    expiremap [OPTIONS]

OPTIONS:
    -s, --shards <N>           Deadline shards / expirer threads (default: 4)
    -b, --max-batch <B>        Expirations reclaimed per worker cycle (default: 256)
    -w, --writers <W>          Writer threads (default: 4)
    -k, --keys <K>             Distinct keys written (default: 10000)
    -t, --ttl-ms <T>           Entry timeout in milliseconds (default: 500)
    -d, --duration-secs <S>    Workload duration in seconds (default: 10)
    -r, --report-ms <R>        Statistics report interval (default: 1000)
    -v, --version              Print version information
    -h, --help                 Print this help message

LOGGING:
    Set RUST_LOG to change the log level (default: warn), e.g.
    $ RUST_LOG=expiremap=debug expiremap --shards 8
"#
    );
}

fn print_report(map: &ExpireMap<Bytes, Bytes>, started: Instant) {
    let stats = map.stats();
    println!(
        "[{:>6.1}s] entries={} pending={} puts={} hit_rate={:.2}% expired={} stale={}",
        started.elapsed().as_secs_f64(),
        stats.entries,
        stats.pending,
        stats.puts,
        stats.hit_rate() * 100.0,
        stats.expired,
        stats.stale,
    );
}

/// One writer: cycles through the key space, overwriting and reading back.
fn write_loop(
    map: Arc<ExpireMap<Bytes, Bytes>>,
    keys: Arc<Vec<Bytes>>,
    ttl_ms: u64,
    seed: usize,
    running: Arc<AtomicBool>,
) {
    let mut i = seed;
    while running.load(Ordering::Relaxed) {
        let key = &keys[i % keys.len()];
        map.put(key.clone(), Bytes::from(format!("value:{}", i)), ttl_ms);
        map.get(&keys[(i / 2) % keys.len()]);
        i = i.wrapping_add(7919);
    }
}

async fn report_loop(map: Arc<ExpireMap<Bytes, Bytes>>, every: Duration, started: Instant) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        print_report(&map, started);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_thread_names(true)
        .init();

    let config = Config::from_args()?;

    let map: Arc<ExpireMap<Bytes, Bytes>> = Arc::new(
        ExpireMap::with_config(config.map_config()).context("failed to start expiring map")?,
    );
    info!(
        shards = config.shards,
        writers = config.writers,
        keys = config.keys,
        ttl_ms = config.ttl_ms,
        "Starting workload"
    );

    let keys: Arc<Vec<Bytes>> = Arc::new(
        (0..config.keys)
            .map(|i| Bytes::from(format!("key:{}", i)))
            .collect(),
    );
    let running = Arc::new(AtomicBool::new(true));
    let started = Instant::now();

    let writers: Vec<_> = (0..config.writers)
        .map(|seed| {
            let map = Arc::clone(&map);
            let keys = Arc::clone(&keys);
            let running = Arc::clone(&running);
            let ttl_ms = config.ttl_ms;
            tokio::task::spawn_blocking(move || write_loop(map, keys, ttl_ms, seed, running))
        })
        .collect();

    tokio::select! {
        _ = tokio::time::sleep(config.duration) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            println!("Interrupted, stopping writers...");
        }
        _ = report_loop(Arc::clone(&map), config.report_interval, started) => {}
    }

    running.store(false, Ordering::Relaxed);
    for writer in writers {
        writer.await.context("writer task failed")?;
    }
    print_report(&map, started);

    // Everything written is now on its way out; wait for the expirers.
    let drain_deadline =
        Instant::now() + Duration::from_millis(config.ttl_ms) + Duration::from_secs(5);
    let mut ticker = tokio::time::interval(config.report_interval.min(Duration::from_millis(100)));
    while !map.is_empty() {
        if Instant::now() >= drain_deadline {
            warn!(remaining = map.size(), "Entries still present after drain deadline");
            break;
        }
        ticker.tick().await;
    }
    print_report(&map, started);

    map.shutdown();
    println!("Done.");
    Ok(())
}
