//! Command-line entry point for the pooled vs. unpooled benchmark.
//!
//! ```text
//! pool-bench --threads 5 --pool-sizes 5,10,20,50 --records 1000
//! pool-bench --backend postgres --database-url "Host=localhost;Database=benchmark_db;"
//! ```
//!
//! Set `RUST_LOG` to control log output (default: `info`).

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use pool_bench::{
    Backend, BenchConfig, Benchmark, BenchmarkResults, DbConfig, MemoryBackend, Operation, report,
};

#[derive(Parser)]
#[command(
    name = "pool-bench",
    version,
    about = "Compare pooled and unpooled database connection throughput"
)]
struct Cli {
    /// Concurrent workers per workload
    #[arg(long, default_value_t = 5)]
    threads: usize,

    /// Pool sizes to benchmark
    #[arg(long, value_delimiter = ',', default_values_t = [5, 10, 20, 50])]
    pool_sizes: Vec<u32>,

    /// Statements issued by each worker per workload
    #[arg(long, default_value_t = 1000)]
    records: u32,

    /// Workloads to run, in order
    #[arg(long, value_delimiter = ',', default_value = "insert,update,read")]
    operations: Vec<Operation>,

    /// Database backend
    #[arg(long, value_enum, default_value_t = BackendKind::Memory)]
    backend: BackendKind,

    /// Connection string for the postgres backend (Host=...;Database=...;)
    #[arg(long)]
    database_url: Option<String>,

    /// Simulated connect latency of the memory backend, in milliseconds
    #[arg(long, default_value_t = 20)]
    connect_latency_ms: u64,

    /// Simulated statement latency of the memory backend, in microseconds
    #[arg(long, default_value_t = 100)]
    statement_latency_us: u64,

    /// Roll back uncommitted work when a connection is returned to the pool
    #[arg(long)]
    reset_on_release: bool,

    /// Fail a worker that waits longer than this for a pooled connection
    #[arg(long)]
    acquire_timeout_secs: Option<u64>,

    /// Write results as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write results as CSV to this file
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    /// In-process table with simulated latency
    Memory,
    /// Live PostgreSQL server (requires the `postgres` feature)
    Postgres,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let cli = Cli::parse();
    let config = bench_config(&cli);

    match cli.backend {
        BackendKind::Memory => {
            let backend = MemoryBackend::new()
                .connect_latency(Duration::from_millis(cli.connect_latency_ms))
                .statement_latency(Duration::from_micros(cli.statement_latency_us));
            run(backend, config, &cli)
        }
        BackendKind::Postgres => run_postgres(config, &cli),
    }
}

/// `RUST_LOG` if set and valid, `info` otherwise.
fn env_filter() -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn bench_config(cli: &Cli) -> BenchConfig {
    let mut config = BenchConfig::new()
        .threads(cli.threads)
        .pool_sizes(cli.pool_sizes.clone())
        .num_records(cli.records)
        .operations(cli.operations.clone())
        .reset_on_release(cli.reset_on_release);
    if let Some(secs) = cli.acquire_timeout_secs {
        config = config.acquire_timeout(Duration::from_secs(secs));
    }
    config
}

fn db_config(cli: &Cli) -> Result<DbConfig> {
    match &cli.database_url {
        Some(url) => DbConfig::from_connection_string(url).context("invalid --database-url"),
        None => Ok(DbConfig::default()),
    }
}

#[cfg(feature = "postgres")]
fn run_postgres(config: BenchConfig, cli: &Cli) -> Result<()> {
    let db = db_config(cli)?;
    tracing::info!(host = %db.host, port = db.port, database = %db.database, "using PostgreSQL");
    run(pool_bench::PostgresBackend::new(&db), config, cli)
}

#[cfg(not(feature = "postgres"))]
fn run_postgres(_config: BenchConfig, cli: &Cli) -> Result<()> {
    db_config(cli)?;
    anyhow::bail!("the postgres backend requires building with `--features postgres`")
}

fn run<B: Backend>(backend: B, config: BenchConfig, cli: &Cli) -> Result<()> {
    let bench = Benchmark::new(backend, config)?;
    let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
    bench.run(&mut results)?;

    println!("{}", report::render_table(&results));

    if let Some(path) = &cli.json {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        report::write_json(&results, BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "wrote JSON results");
    }
    if let Some(path) = &cli.csv {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        report::write_csv(&results, BufWriter::new(file))?;
        tracing::info!(path = %path.display(), "wrote CSV results");
    }
    Ok(())
}
