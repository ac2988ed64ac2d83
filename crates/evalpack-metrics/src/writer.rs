// crates/evalpack-metrics/src/writer.rs
// ============================================================================
// Module: Evalpack Metric Result Writers
// Description: ResultWriter implementations bridging the runner to the
//              metric collector, structured logs, and fan-out.
// Purpose: Let a dispatcher forward EvalResults to Prometheus series and/or
//          structured logs without depending on this crate directly.
// Dependencies: evalpack_core, std::sync, tracing
// ============================================================================

//! ## Overview
//! [`MetricResultWriter`] looks up the [`evalpack_core::MetricDef`] attached
//! to each result's originating definition (by `eval_id`, registered ahead
//! of time via [`MetricResultWriter::register_defs`]) and records it against
//! a [`crate::collector::MetricCollector`]. Unknown ids and defs without a
//! metric are silently skipped; the first recorder error stops the batch
//! (remaining results are not attempted). [`MetadataResultWriter`] logs
//! every result as a structured event. [`CompositeResultWriter`] fans one
//! batch out to several writers, running every writer regardless of earlier
//! failures (mirrors the runner's own "one failure doesn't poison the
//! batch" posture).
//!
//! `ResultWriter::write_results` receives only the result batch, not the
//! originating session/turn context, so label injection here is limited to
//! what the registered [`evalpack_core::MetricDef`] already carries; a
//! caller wanting session-scoped series should bake `session_id` into the
//! definition's `metric.labels` (or the collector's base labels) before the
//! definition is dispatched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use evalpack_core::EvalDef;
use evalpack_core::EvalId;
use evalpack_core::EvalResult;
use evalpack_core::ResultWriter;
use evalpack_core::WriterError;

use crate::collector::MetricCollector;

// ============================================================================
// SECTION: Metric Result Writer
// ============================================================================

/// Forwards results carrying a registered metric to a [`MetricCollector`].
pub struct MetricResultWriter {
    collector: Arc<MetricCollector>,
    metrics_by_eval_id: RwLock<BTreeMap<EvalId, evalpack_core::MetricDef>>,
}

impl MetricResultWriter {
    /// Creates a writer recording into `collector`.
    #[must_use]
    pub fn new(collector: Arc<MetricCollector>) -> Self {
        Self {
            collector,
            metrics_by_eval_id: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers (or replaces) the metric attachment for every definition in
    /// `defs` that carries one. Call this once a pack/prompt's definitions
    /// are resolved, before results for them start arriving.
    pub fn register_defs(&self, defs: &[EvalDef]) {
        let Ok(mut metrics) = self.metrics_by_eval_id.write() else {
            return;
        };
        for def in defs {
            if let Some(metric) = &def.metric {
                metrics.insert(def.id.clone(), metric.clone());
            }
        }
    }
}

impl ResultWriter for MetricResultWriter {
    fn write_results(&self, results: &[EvalResult]) -> Result<(), WriterError> {
        let metrics = self.metrics_by_eval_id.read().map_err(|_| WriterError::Failed("metric registry lock poisoned".to_string()))?;

        for result in results {
            let Some(metric) = metrics.get(&result.eval_id) else {
                continue;
            };
            self.collector.record(result, metric).map_err(|err| WriterError::Failed(err.to_string()))?;
        }

        Ok(())
    }
}

// ============================================================================
// SECTION: Metadata Result Writer
// ============================================================================

/// Logs every result as a structured `tracing` event, independent of any
/// metric attachment.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataResultWriter;

impl ResultWriter for MetadataResultWriter {
    fn write_results(&self, results: &[EvalResult]) -> Result<(), WriterError> {
        for result in results {
            if result.skipped {
                tracing::info!(eval_id = %result.eval_id, eval_type = %result.eval_type, skip_reason = result.skip_reason.as_deref().unwrap_or(""), "eval skipped");
            } else if let Some(error) = &result.error {
                tracing::warn!(eval_id = %result.eval_id, eval_type = %result.eval_type, error = %error, "eval produced an error result");
            } else {
                tracing::info!(eval_id = %result.eval_id, eval_type = %result.eval_type, passed = result.passed, score = result.score, "eval completed");
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Composite Result Writer
// ============================================================================

/// Fans a single result batch out to several writers. Every writer runs
/// regardless of whether an earlier one failed; failures are joined into a
/// single [`WriterError`].
pub struct CompositeResultWriter {
    writers: Vec<Arc<dyn ResultWriter>>,
}

impl CompositeResultWriter {
    /// Creates a composite writer fanning out to `writers`, in order.
    #[must_use]
    pub fn new(writers: Vec<Arc<dyn ResultWriter>>) -> Self {
        Self { writers }
    }
}

impl ResultWriter for CompositeResultWriter {
    fn write_results(&self, results: &[EvalResult]) -> Result<(), WriterError> {
        let mut failures = Vec::new();
        for writer in &self.writers {
            if let Err(err) = writer.write_results(results) {
                failures.push(err.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WriterError::Failed(failures.join("; ")))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "test-only assertions")]

    use std::sync::Mutex;

    use evalpack_core::MetricType;
    use evalpack_core::Trigger;

    use super::*;

    fn def_with_metric(id: &str) -> EvalDef {
        EvalDef {
            id: EvalId::new(id),
            eval_type: "quality_check".to_string(),
            trigger: Trigger::EveryTurn,
            params: BTreeMap::new(),
            enabled: true,
            sample_percentage: 5.0,
            metric: Some(evalpack_core::MetricDef {
                name: "response_quality".to_string(),
                metric_type: MetricType::Gauge,
                range: None,
                labels: BTreeMap::new(),
                extra: BTreeMap::new(),
            }),
            threshold: None,
            when: None,
            description: None,
            message: None,
        }
    }

    fn passing_result(id: &str, score: f64) -> EvalResult {
        EvalResult {
            eval_id: EvalId::new(id),
            eval_type: "quality_check".to_string(),
            passed: true,
            score: Some(score),
            ..EvalResult::default()
        }
    }

    #[test]
    fn metric_writer_records_only_registered_eval_ids() {
        let collector = Arc::new(MetricCollector::default());
        let writer = MetricResultWriter::new(collector.clone());
        writer.register_defs(&[def_with_metric("q1")]);

        writer.write_results(&[passing_result("q1", 0.8), passing_result("unregistered", 0.5)]).unwrap();

        let mut out = String::new();
        collector.write_prometheus(&mut out).unwrap();
        assert!(out.contains("promptpack_response_quality 0.8"));
    }

    #[test]
    fn metric_writer_records_skipped_results_with_a_registered_metric() {
        let collector = Arc::new(MetricCollector::default());
        let writer = MetricResultWriter::new(collector.clone());
        writer.register_defs(&[def_with_metric("q1")]);

        let skipped = EvalResult::skipped(EvalId::new("q1"), "quality_check", "precondition unmet");
        writer.write_results(&[skipped]).unwrap();

        let mut out = String::new();
        collector.write_prometheus(&mut out).unwrap();
        assert!(out.contains("promptpack_response_quality 0"));
    }

    #[test]
    fn metric_writer_short_circuits_on_the_first_recorder_error() {
        let collector = Arc::new(MetricCollector::default());
        // Establish "response_quality" as a counter series directly, so the
        // writer's own (gauge-typed) registration for "q1" conflicts on the
        // first result.
        let mut counter_def = def_with_metric("pre").metric.expect("def_with_metric always attaches a metric");
        counter_def.metric_type = MetricType::Counter;
        collector.record(&passing_result("pre", 1.0), &counter_def).unwrap();

        let writer = MetricResultWriter::new(collector.clone());
        writer.register_defs(&[def_with_metric("q1"), def_with_metric("q2")]);

        let err = writer.write_results(&[passing_result("q1", 0.5), passing_result("q2", 0.5)]);
        assert!(err.is_err());

        let mut out = String::new();
        collector.write_prometheus(&mut out).unwrap();
        assert!(!out.contains("promptpack_response_quality 0.5"), "the second result must not be recorded once the first errors");
    }

    struct FailingWriter;
    impl ResultWriter for FailingWriter {
        fn write_results(&self, _results: &[EvalResult]) -> Result<(), WriterError> {
            Err(WriterError::Failed("boom".to_string()))
        }
    }

    struct CountingWriter(Mutex<usize>);
    impl ResultWriter for CountingWriter {
        fn write_results(&self, results: &[EvalResult]) -> Result<(), WriterError> {
            *self.0.lock().unwrap() += results.len();
            Ok(())
        }
    }

    #[test]
    fn composite_writer_runs_every_writer_even_after_a_failure() {
        let counting = Arc::new(CountingWriter(Mutex::new(0)));
        let composite = CompositeResultWriter::new(vec![Arc::new(FailingWriter), counting.clone()]);

        let err = composite.write_results(&[passing_result("q1", 0.5)]);
        assert!(err.is_err());
        assert_eq!(*counting.0.lock().unwrap(), 1);
    }

    #[test]
    fn metadata_writer_never_fails() {
        let writer = MetadataResultWriter;
        let error_result = EvalResult::error(EvalId::new("q1"), "quality_check", "handler panicked");
        assert!(writer.write_results(&[passing_result("q1", 0.5), error_result]).is_ok());
    }
}
