//! Benchmark driver.

use std::sync::Arc;

use connpool::PoolConfig;

use crate::backend::{Backend, SessionFactory};
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::results::{BenchmarkResults, Measurement};
use crate::workload::{ConnectionSource, run_workload};

/// Runs every configured workload, pooled and unpooled, for each pool size.
#[derive(Debug)]
pub struct Benchmark<B: Backend> {
    backend: Arc<B>,
    config: BenchConfig,
}

impl<B: Backend> Benchmark<B> {
    /// Create a benchmark, validating `config`.
    pub fn new(backend: B, config: BenchConfig) -> Result<Self, BenchError> {
        config.validate()?;
        Ok(Self {
            backend: Arc::new(backend),
            config,
        })
    }

    /// Name of the backend under test.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The benchmark configuration.
    #[must_use]
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// The backend under test.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the full benchmark, appending to `results`.
    ///
    /// For each pool size the pooled scenario runs first, then the unpooled
    /// one. Each scenario starts from a freshly created table and runs the
    /// operations in order, so updates and reads see the inserted rows.
    pub fn run(&self, results: &mut BenchmarkResults) -> Result<(), BenchError> {
        tracing::info!(
            backend = self.backend_name(),
            threads = self.config.threads,
            records = self.config.num_records,
            pool_sizes = ?self.config.pool_sizes,
            "starting benchmark"
        );

        for &pool_size in &self.config.pool_sizes {
            let pooled = ConnectionSource::pooled(self.factory(), self.pool_config(pool_size))?;
            let outcome = self.run_scenario(&pooled, pool_size, results);
            pooled.close();
            outcome?;

            let unpooled = ConnectionSource::unpooled(self.factory());
            self.run_scenario(&unpooled, pool_size, results)?;
        }

        tracing::info!(measurements = results.measurements().len(), "benchmark complete");
        Ok(())
    }

    fn run_scenario(
        &self,
        source: &ConnectionSource<B>,
        pool_size: u32,
        results: &mut BenchmarkResults,
    ) -> Result<(), BenchError> {
        let scenario = source.scenario();
        self.backend.prepare_table()?;

        for &operation in &self.config.operations {
            let outcome = run_workload(
                source,
                operation,
                self.config.threads,
                self.config.num_records,
            )?;
            tracing::info!(
                operation = %operation,
                scenario = %scenario,
                pool_size,
                seconds = outcome.elapsed.as_secs_f64(),
                rows = outcome.rows,
                "workload timed"
            );
            results.record(Measurement {
                operation,
                scenario,
                pool_size,
                elapsed: outcome.elapsed,
                rows: outcome.rows,
            });
        }
        Ok(())
    }

    fn factory(&self) -> SessionFactory<B> {
        SessionFactory::new(Arc::clone(&self.backend))
    }

    fn pool_config(&self, pool_size: u32) -> PoolConfig {
        let warm = u32::try_from(self.config.threads).unwrap_or(u32::MAX);
        let mut config = PoolConfig::new()
            .min_connections(warm.min(pool_size))
            .max_connections(pool_size)
            .reset_on_release(self.config.reset_on_release);
        if let Some(timeout) = self.config.acquire_timeout {
            config = config.acquire_timeout(timeout);
        }
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::workload::{Operation, Scenario};

    #[test]
    fn test_invalid_config_rejected() {
        let err = Benchmark::new(MemoryBackend::new(), BenchConfig::new().threads(0)).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_pool_config_warms_up_to_thread_count() {
        let bench =
            Benchmark::new(MemoryBackend::new(), BenchConfig::new().threads(5)).unwrap();

        let small = bench.pool_config(3);
        assert_eq!(small.min_connections, 3);
        assert_eq!(small.max_connections, 3);

        let large = bench.pool_config(50);
        assert_eq!(large.min_connections, 5);
        assert_eq!(large.max_connections, 50);
    }

    #[test]
    fn test_run_records_every_cell() {
        let config = BenchConfig::new()
            .threads(2)
            .pool_sizes(vec![1, 4])
            .num_records(5);
        let bench = Benchmark::new(MemoryBackend::new(), config).unwrap();
        let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
        bench.run(&mut results).unwrap();

        assert_eq!(results.measurements().len(), 12);
        for size in [1, 4] {
            for op in Operation::ALL {
                for scenario in Scenario::ALL {
                    let m = results.get(op, scenario, size).unwrap();
                    assert_eq!(m.rows, 10, "{op} {scenario} {size}");
                }
            }
        }
    }
}
