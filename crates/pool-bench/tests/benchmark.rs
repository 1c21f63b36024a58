//! End-to-end benchmark runs against in-process backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use connpool::PoolConfig;
use pool_bench::{
    Backend, BackendError, BenchConfig, BenchError, Benchmark, BenchmarkResults,
    ConnectionSource, MemoryBackend, Operation, Row, Scenario, Session, SessionFactory,
    Statement, report, run_workload,
};
use pool_testing::ConcurrencyProbe;

/// Memory backend that records how many statements run at once.
#[derive(Debug, Clone, Default)]
struct ProbedBackend {
    inner: MemoryBackend,
    probe: Arc<ConcurrencyProbe>,
    rollbacks: Arc<AtomicU64>,
}

struct ProbedSession {
    inner: <MemoryBackend as Backend>::Session,
    probe: Arc<ConcurrencyProbe>,
    rollbacks: Arc<AtomicU64>,
}

impl Backend for ProbedBackend {
    type Session = ProbedSession;

    fn name(&self) -> &'static str {
        "probed"
    }

    fn connect(&self) -> Result<ProbedSession, BackendError> {
        Ok(ProbedSession {
            inner: self.inner.connect()?,
            probe: Arc::clone(&self.probe),
            rollbacks: Arc::clone(&self.rollbacks),
        })
    }

    fn prepare_table(&self) -> Result<(), BackendError> {
        self.inner.prepare_table()
    }
}

impl Session for ProbedSession {
    fn execute(&mut self, stmt: &Statement<'_>) -> Result<u64, BackendError> {
        let _guard = self.probe.enter();
        thread::sleep(Duration::from_micros(200));
        self.inner.execute(stmt)
    }

    fn query_one(&mut self, stmt: &Statement<'_>) -> Result<Option<Row>, BackendError> {
        let _guard = self.probe.enter();
        self.inner.query_one(stmt)
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.inner.rollback()
    }
}

#[test]
fn test_full_run_fills_result_grid() {
    let backend = MemoryBackend::new().connect_latency(Duration::from_millis(2));
    let config = BenchConfig::new()
        .threads(3)
        .pool_sizes(vec![2, 5])
        .num_records(20);
    let bench = Benchmark::new(backend.clone(), config).unwrap();
    let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
    bench.run(&mut results).unwrap();

    assert_eq!(results.pool_sizes(), vec![2, 5]);
    assert_eq!(results.measurements().len(), 2 * 2 * 3);
    for scenario in Scenario::ALL {
        for op in Operation::ALL {
            let series = results.series(op, scenario);
            assert_eq!(series.len(), 2);
            assert!(series.iter().all(|(_, elapsed)| !elapsed.is_zero()));
        }
    }

    // Each run recreates the table, so the final state holds the last run's inserts.
    assert_eq!(backend.row_count(), 60);

    let stats = backend.stats();
    assert_eq!(stats.sessions_opened, stats.sessions_closed);
}

#[test]
fn test_pooled_scenario_reuses_sessions() {
    let backend = MemoryBackend::new();
    let factory = SessionFactory::new(Arc::new(backend.clone()));
    let source = ConnectionSource::pooled(factory, PoolConfig::fixed(2)).unwrap();

    for op in Operation::ALL {
        run_workload(&source, op, 6, 10).unwrap();
    }
    source.close();

    assert_eq!(backend.stats().sessions_opened, 2);
    assert_eq!(backend.stats().sessions_closed, 2);
}

#[test]
fn test_unpooled_scenario_opens_session_per_worker() {
    let backend = MemoryBackend::new();
    let factory = SessionFactory::new(Arc::new(backend.clone()));
    let source = ConnectionSource::unpooled(factory);

    for op in Operation::ALL {
        run_workload(&source, op, 6, 10).unwrap();
    }

    assert_eq!(backend.stats().sessions_opened, 18);
    assert_eq!(backend.stats().sessions_closed, 18);
}

#[test]
fn test_pool_size_bounds_concurrent_statements() {
    let backend = ProbedBackend::default();
    let factory = SessionFactory::new(Arc::new(backend.clone()));
    let source = ConnectionSource::pooled(factory, PoolConfig::fixed(3)).unwrap();

    run_workload(&source, Operation::Insert, 8, 25).unwrap();
    source.close();

    assert!(backend.probe.peak() <= 3, "peak {}", backend.probe.peak());
    assert_eq!(backend.probe.current(), 0);
    assert_eq!(backend.inner.row_count(), 200);
}

#[test]
fn test_reset_on_release_rolls_back_sessions() {
    let backend = ProbedBackend::default();
    let config = BenchConfig::new()
        .threads(2)
        .pool_sizes(vec![2])
        .num_records(5)
        .operations(vec![Operation::Insert, Operation::Read])
        .reset_on_release(true);
    let bench = Benchmark::new(backend.clone(), config).unwrap();
    let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
    bench.run(&mut results).unwrap();

    // Two pooled workloads with two workers each; unpooled pools never reset.
    assert_eq!(backend.rollbacks.load(Ordering::Relaxed), 4);
    assert_eq!(
        results
            .get(Operation::Read, Scenario::Pooling, 2)
            .unwrap()
            .rows,
        10
    );
}

#[test]
fn test_failing_backend_aborts_run() {
    #[derive(Debug)]
    struct Unreachable;

    impl Backend for Unreachable {
        type Session = <MemoryBackend as Backend>::Session;

        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn connect(&self) -> Result<Self::Session, BackendError> {
            Err(BackendError::Connect("connection refused".into()))
        }

        fn prepare_table(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    let config = BenchConfig::new().threads(2).pool_sizes(vec![2]).num_records(1);
    let bench = Benchmark::new(Unreachable, config).unwrap();
    let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());

    let err = bench.run(&mut results).unwrap_err();
    assert!(matches!(err, BenchError::Pool(_)), "{err}");
    assert!(results.is_empty());
}

#[test]
fn test_reports_from_real_run() {
    let config = BenchConfig::new()
        .threads(2)
        .pool_sizes(vec![1, 3])
        .num_records(4);
    let bench = Benchmark::new(MemoryBackend::new(), config).unwrap();
    let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
    bench.run(&mut results).unwrap();

    let table = report::render_table(&results);
    assert!(table.contains("4 rows Insert Performance"));
    assert!(table.contains("4 rows Update Performance"));
    assert!(table.contains("4 rows Read Performance"));

    let mut csv = Vec::new();
    report::write_csv(&results, &mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 1 + 12);

    let mut json = Vec::new();
    report::write_json(&results, &mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["backend"], "memory");
    assert_eq!(value["num_records"], 4);
}
