//! Collected benchmark measurements.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::config::BenchConfig;
use crate::workload::{Operation, Scenario};

/// One timed workload run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Workload that ran.
    pub operation: Operation,
    /// How workers obtained connections.
    pub scenario: Scenario,
    /// Pool size of the benchmark round.
    pub pool_size: u32,
    /// Wall-clock time of the run.
    #[serde(rename = "seconds", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    /// Rows written or found.
    pub rows: u64,
}

fn as_secs_f64<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// All measurements of one benchmark, in recording order.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResults {
    backend: String,
    threads: usize,
    num_records: u32,
    measurements: Vec<Measurement>,
}

impl BenchmarkResults {
    /// Create an empty collection for a run against `backend`.
    #[must_use]
    pub fn new(backend: impl Into<String>, config: &BenchConfig) -> Self {
        Self {
            backend: backend.into(),
            threads: config.threads,
            num_records: config.num_records,
            measurements: Vec::new(),
        }
    }

    /// Append a measurement.
    pub fn record(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    /// Backend name.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Workers per workload.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Statements per worker.
    #[must_use]
    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// Every measurement, in recording order.
    #[must_use]
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Distinct pool sizes, in first-seen order.
    #[must_use]
    pub fn pool_sizes(&self) -> Vec<u32> {
        let mut sizes = Vec::new();
        for m in &self.measurements {
            if !sizes.contains(&m.pool_size) {
                sizes.push(m.pool_size);
            }
        }
        sizes
    }

    /// Distinct operations, in first-seen order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for m in &self.measurements {
            if !ops.contains(&m.operation) {
                ops.push(m.operation);
            }
        }
        ops
    }

    /// `(pool_size, elapsed)` pairs for one operation and scenario.
    #[must_use]
    pub fn series(&self, operation: Operation, scenario: Scenario) -> Vec<(u32, Duration)> {
        self.measurements
            .iter()
            .filter(|m| m.operation == operation && m.scenario == scenario)
            .map(|m| (m.pool_size, m.elapsed))
            .collect()
    }

    /// The latest measurement for one cell of the result grid.
    #[must_use]
    pub fn get(
        &self,
        operation: Operation,
        scenario: Scenario,
        pool_size: u32,
    ) -> Option<&Measurement> {
        self.measurements.iter().rev().find(|m| {
            m.operation == operation && m.scenario == scenario && m.pool_size == pool_size
        })
    }
}
