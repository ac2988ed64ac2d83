// demos/inproc-turn/src/main.rs
// ============================================================================
// Module: InProc Turn Dispatch Demo
// Description: End-to-end walkthrough of registry, runner, InProc dispatch,
//              and Prometheus metric export for a single turn.
// Purpose: A runnable, minimal demonstration standing in for an integration
//          test a reader can execute directly.
// Dependencies: evalpack_core, evalpack_dispatch, evalpack_metrics
// ============================================================================

//! ## Overview
//! Registers a stub `quality_check` handler, resolves one definition with a
//! `gauge` metric attached, dispatches it through [`InProcDispatcher`] with a
//! [`CompositeResultWriter`] fanning out to metrics and structured logs, and
//! prints both the returned results and the Prometheus text snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use evalpack_core::CancelSignal;
use evalpack_core::EvalContext;
use evalpack_core::EvalDef;
use evalpack_core::EvalHandler;
use evalpack_core::EvalId;
use evalpack_core::EvalResult;
use evalpack_core::HandlerError;
use evalpack_core::HandlerRegistry;
use evalpack_core::MetricDef;
use evalpack_core::MetricType;
use evalpack_core::SessionId;
use evalpack_core::Trigger;
use evalpack_dispatch::Dispatcher;
use evalpack_dispatch::InProcDispatcher;
use evalpack_metrics::CompositeResultWriter;
use evalpack_metrics::MetadataResultWriter;
use evalpack_metrics::MetricCollector;
use evalpack_metrics::MetricResultWriter;
use serde_json::Value;

/// Stub handler standing in for a real quality-scoring implementation.
struct QualityCheckHandler;

impl EvalHandler for QualityCheckHandler {
    fn eval_type(&self) -> &str {
        "quality_check"
    }

    fn eval(&self, _ctx: &EvalContext, _params: &BTreeMap<String, Value>) -> Result<EvalResult, HandlerError> {
        Ok(EvalResult {
            passed: true,
            score: Some(0.92),
            explanation: Some("stub quality score".to_string()),
            ..EvalResult::default()
        })
    }
}

#[tokio::main]
#[expect(clippy::print_stdout, reason = "this binary's entire purpose is printing the demo run's output")]
async fn main() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(Arc::new(QualityCheckHandler));

    let def = EvalDef {
        id: EvalId::new("q"),
        eval_type: "quality_check".to_string(),
        trigger: Trigger::EveryTurn,
        params: BTreeMap::new(),
        enabled: true,
        sample_percentage: 5.0,
        metric: Some(MetricDef {
            name: "response_quality".to_string(),
            metric_type: MetricType::Gauge,
            range: None,
            labels: BTreeMap::new(),
            extra: BTreeMap::new(),
        }),
        threshold: None,
        when: None,
        description: Some("Checks assistant response quality".to_string()),
        message: None,
    };

    let collector = Arc::new(MetricCollector::default());
    let metric_writer = Arc::new(MetricResultWriter::new(collector.clone()));
    metric_writer.register_defs(std::slice::from_ref(&def));
    let writer = Arc::new(CompositeResultWriter::new(vec![metric_writer, Arc::new(MetadataResultWriter)]));

    let dispatcher = InProcDispatcher::new(registry).with_writer(writer);

    let session_id = SessionId::new("t");
    let eval_ctx = EvalContext {
        turn_index: 1,
        session_id: session_id.clone(),
        ..EvalContext::default()
    };

    let results = dispatcher
        .dispatch_turn(&CancelSignal::new(), &[def], &eval_ctx, &session_id, 1)
        .await
        .unwrap_or_else(|err| {
            println!("dispatch failed: {err}");
            Vec::new()
        });

    println!("results:");
    for result in &results {
        println!("  eval_id={} passed={} score={:?}", result.eval_id, result.passed, result.score);
    }

    let mut prometheus = String::new();
    if collector.write_prometheus(&mut prometheus).is_ok() {
        println!("\nprometheus snapshot:\n{prometheus}");
    }
}
