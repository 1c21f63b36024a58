//! Rendering and export of benchmark results.

use std::fmt::Write as _;
use std::io;
use std::time::Duration;

use crate::error::BenchError;
use crate::results::BenchmarkResults;
use crate::workload::{Operation, Scenario};

/// Render one comparison table per operation.
///
/// Each table lists the pooled and unpooled time for every pool size and
/// the ratio between them. Missing cells are shown as `-`.
#[must_use]
pub fn render_table(results: &BenchmarkResults) -> String {
    let mut out = String::new();
    let sizes = results.pool_sizes();

    for (i, op) in results.operations().into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} rows {} Performance ({}, {} threads)",
            results.num_records(),
            op.title(),
            results.backend(),
            results.threads()
        );
        let _ = writeln!(
            out,
            "{:>10}  {:>14}  {:>14}  {:>8}",
            "pool size",
            format!("{} (s)", Scenario::Pooling.title()),
            format!("{} (s)", Scenario::NoPooling.title()),
            "speedup"
        );

        for &size in &sizes {
            let pooled = elapsed(results, op, Scenario::Pooling, size);
            let unpooled = elapsed(results, op, Scenario::NoPooling, size);
            let _ = writeln!(
                out,
                "{:>10}  {:>14}  {:>14}  {:>8}",
                size,
                seconds(pooled),
                seconds(unpooled),
                speedup(pooled, unpooled)
            );
        }
    }
    out
}

fn elapsed(
    results: &BenchmarkResults,
    op: Operation,
    scenario: Scenario,
    size: u32,
) -> Option<Duration> {
    results.get(op, scenario, size).map(|m| m.elapsed)
}

fn seconds(value: Option<Duration>) -> String {
    value.map_or_else(|| "-".to_string(), |d| format!("{:.4}", d.as_secs_f64()))
}

fn speedup(pooled: Option<Duration>, unpooled: Option<Duration>) -> String {
    match (pooled, unpooled) {
        (Some(p), Some(u)) if !p.is_zero() => {
            format!("{:.2}x", u.as_secs_f64() / p.as_secs_f64())
        }
        _ => "-".to_string(),
    }
}

/// Write the results as pretty-printed JSON.
pub fn write_json<W: io::Write>(results: &BenchmarkResults, writer: W) -> Result<(), BenchError> {
    serde_json::to_writer_pretty(writer, results)?;
    Ok(())
}

/// Write one CSV record per measurement.
pub fn write_csv<W: io::Write>(results: &BenchmarkResults, writer: W) -> Result<(), BenchError> {
    let mut csv = csv::Writer::from_writer(writer);
    for measurement in results.measurements() {
        csv.serialize(measurement)?;
    }
    csv.flush()?;
    Ok(())
}
