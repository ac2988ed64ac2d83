// crates/evalpack-metrics/src/collector.rs
// ============================================================================
// Module: Evalpack Metric Collector
// Description: Labeled, multi-series Prometheus-format metric store.
// Purpose: Record eval outcomes as gauge/counter/histogram/boolean series
//          and expose the current snapshot as Prometheus text.
// Dependencies: evalpack_core, std::sync, tracing
// ============================================================================

//! ## Overview
//! [`MetricCollector`] is a process-local registry keyed by
//! `(metric_name, canonicalized_label_set)`. [`record`](MetricCollector::record)
//! updates one series per call; [`write_prometheus`](MetricCollector::write_prometheus)
//! serializes the full snapshot deterministically. The collector has no
//! notion of eval scopes or sessions; dynamic per-call labels (`session_id`,
//! `turn_index`) are the caller's responsibility to merge into the
//! [`evalpack_core::MetricDef`] before calling `record` (see
//! `crate::writer::MetricResultWriter`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use evalpack_core::EvalResult;
use evalpack_core::MetricDef;
use evalpack_core::MetricRange;
use evalpack_core::MetricType;
use thiserror::Error;

/// Default namespace prepended to every metric name unless already present.
pub const DEFAULT_NAMESPACE: &str = "promptpack";

/// Default histogram bucket boundaries.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Errors returned by [`MetricCollector::record`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// The recorded value did not match the series' established metric type
    /// (e.g. recording a histogram observation against a name already
    /// registered as a gauge).
    #[error("metric '{0}' was already recorded as a different metric type")]
    TypeMismatch(String),
}

// ============================================================================
// SECTION: Series
// ============================================================================

type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    labels: LabelSet,
}

#[derive(Debug, Clone)]
enum SeriesValue {
    Gauge(f64),
    Counter(u64),
    Histogram { observations: Vec<f64>, sum: f64, count: u64 },
    Boolean(f64),
}

#[derive(Debug, Clone)]
struct Series {
    metric_type: MetricType,
    value: SeriesValue,
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Process-local, thread-safe Prometheus-format metric store.
pub struct MetricCollector {
    namespace: String,
    base_labels: LabelSet,
    bucket_boundaries: Vec<f64>,
    series: Mutex<BTreeMap<SeriesKey, Series>>,
    first_seen_type: Mutex<BTreeMap<String, MetricType>>,
}

impl fmt::Debug for MetricCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricCollector").field("namespace", &self.namespace).field("base_labels", &self.base_labels).finish()
    }
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MetricCollector {
    /// Returns a builder for configuring namespace, base labels, and
    /// histogram bucket boundaries before construction.
    #[must_use]
    pub fn builder() -> MetricCollectorBuilder {
        MetricCollectorBuilder::default()
    }

    /// Records `result` against `metric_def`, creating the series on first
    /// use.
    ///
    /// `metric_def.labels` is expected to already carry any caller-injected
    /// dynamic labels (`session_id`/`turn_index`); this method only applies
    /// the base-labels-win merge on top.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::TypeMismatch`] if the metric name was
    /// previously recorded under a different [`MetricType`].
    pub fn record(&self, result: &EvalResult, metric_def: &MetricDef) -> Result<(), MetricError> {
        let name = self.effective_name(&metric_def.name);
        let labels = self.merged_labels(&metric_def.labels);
        let value = effective_value(result, metric_def.metric_type);

        if let Some(range) = metric_def.range {
            warn_if_out_of_range(&name, value, range);
        }

        self.check_type_consistency(&name, metric_def.metric_type)?;

        let key = SeriesKey { name, labels };
        let mut series = self.series.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = series.entry(key).or_insert_with(|| Series {
            metric_type: metric_def.metric_type,
            value: initial_value(metric_def.metric_type),
        });
        apply(&mut entry.value, metric_def.metric_type, value);
        Ok(())
    }

    fn check_type_consistency(&self, name: &str, metric_type: MetricType) -> Result<(), MetricError> {
        let mut types = self.first_seen_type.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match types.get(name) {
            Some(existing) if *existing != metric_type => Err(MetricError::TypeMismatch(name.to_string())),
            Some(_) => Ok(()),
            None => {
                types.insert(name.to_string(), metric_type);
                Ok(())
            }
        }
    }

    fn effective_name(&self, name: &str) -> String {
        let prefix = format!("{}_", self.namespace);
        if name.starts_with(&prefix) {
            name.to_string()
        } else {
            format!("{prefix}{name}")
        }
    }

    fn merged_labels(&self, metric_labels: &BTreeMap<String, String>) -> LabelSet {
        let mut merged = metric_labels.clone();
        for (key, value) in &self.base_labels {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Serializes the current snapshot as Prometheus text exposition format,
    /// writing through `w`.
    ///
    /// # Errors
    ///
    /// Returns a formatting error if `w` fails to accept output.
    pub fn write_prometheus(&self, w: &mut impl fmt::Write) -> fmt::Result {
        let series = self.series.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let types = self.first_seen_type.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut emitted_type_line: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();

        for (key, entry) in series.iter() {
            if emitted_type_line.insert(key.name.as_str()) {
                let type_name = prometheus_type_name(types.get(key.name.as_str()).copied().unwrap_or(entry.metric_type));
                writeln!(w, "# TYPE {} {type_name}", key.name)?;
            }

            match &entry.value {
                SeriesValue::Gauge(value) | SeriesValue::Boolean(value) => {
                    writeln!(w, "{}{} {}", key.name, format_labels(&key.labels, None), format_value(*value))?;
                }
                SeriesValue::Counter(count) => {
                    writeln!(w, "{}{} {count}", key.name, format_labels(&key.labels, None))?;
                }
                SeriesValue::Histogram { observations, sum, count } => {
                    for &bound in &self.bucket_boundaries {
                        let bucket_count = observations.iter().filter(|&&obs| obs <= bound).count();
                        writeln!(w, "{}_bucket{} {bucket_count}", key.name, format_labels(&key.labels, Some(format_bound(bound))))?;
                    }
                    writeln!(w, "{}_bucket{} {count}", key.name, format_labels(&key.labels, Some("+Inf".to_string())))?;
                    writeln!(w, "{}_sum{} {}", key.name, format_labels(&key.labels, None), format_value(*sum))?;
                    writeln!(w, "{}_count{} {count}", key.name, format_labels(&key.labels, None))?;
                }
            }
        }

        Ok(())
    }
}

/// Builder for [`MetricCollector`], mirroring `CompositeBrokerBuilder`'s
/// consuming-builder style.
#[derive(Debug, Clone)]
pub struct MetricCollectorBuilder {
    namespace: String,
    base_labels: LabelSet,
    bucket_boundaries: Vec<f64>,
}

impl Default for MetricCollectorBuilder {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            base_labels: LabelSet::new(),
            bucket_boundaries: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

impl MetricCollectorBuilder {
    /// Overrides the metric name namespace prefix (default `"promptpack"`).
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Adds a base label (e.g. `env`, `tenant_id`), applied to every series
    /// and winning over any `MetricDef`-supplied label with the same key.
    #[must_use]
    pub fn base_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_labels.insert(key.into(), value.into());
        self
    }

    /// Overrides the default histogram bucket boundaries.
    #[must_use]
    pub fn bucket_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.bucket_boundaries = boundaries;
        self
    }

    /// Builds the collector.
    #[must_use]
    pub fn build(self) -> MetricCollector {
        MetricCollector {
            namespace: self.namespace,
            base_labels: self.base_labels,
            bucket_boundaries: self.bucket_boundaries,
            series: Mutex::new(BTreeMap::new()),
            first_seen_type: Mutex::new(BTreeMap::new()),
        }
    }
}

// ============================================================================
// SECTION: Value Computation
// ============================================================================

/// Computes the effective numeric value for `result` under `metric_type`:
/// `metric_value` if present, else `score`, else `0.0`; booleans
/// take `1`/`0` from `passed` regardless of `score`/`metric_value`.
fn effective_value(result: &EvalResult, metric_type: MetricType) -> f64 {
    if metric_type == MetricType::Boolean {
        return f64::from(u8::from(result.passed));
    }
    result.effective_value()
}

fn initial_value(metric_type: MetricType) -> SeriesValue {
    match metric_type {
        MetricType::Gauge => SeriesValue::Gauge(0.0),
        MetricType::Counter => SeriesValue::Counter(0),
        MetricType::Histogram => SeriesValue::Histogram {
            observations: Vec::new(),
            sum: 0.0,
            count: 0,
        },
        MetricType::Boolean => SeriesValue::Boolean(0.0),
    }
}

fn apply(current: &mut SeriesValue, metric_type: MetricType, value: f64) {
    match (metric_type, current) {
        (MetricType::Gauge, SeriesValue::Gauge(stored)) => *stored = value,
        (MetricType::Boolean, SeriesValue::Boolean(stored)) => *stored = value,
        (MetricType::Counter, SeriesValue::Counter(stored)) => *stored += 1,
        (MetricType::Histogram, SeriesValue::Histogram { observations, sum, count }) => {
            observations.push(value);
            *sum += value;
            *count += 1;
        }
        _ => {
            // Type consistency is enforced before this point by
            // `check_type_consistency`; this arm is unreachable in practice.
        }
    }
}

fn warn_if_out_of_range(name: &str, value: f64, range: MetricRange) {
    if value < range.min || value > range.max {
        tracing::warn!(metric = name, value, min = range.min, max = range.max, "recorded metric value outside configured range");
    }
}

// ============================================================================
// SECTION: Prometheus Text Formatting
// ============================================================================

fn prometheus_type_name(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Gauge | MetricType::Boolean => "gauge",
        MetricType::Counter => "counter",
        MetricType::Histogram => "histogram",
    }
}

/// Formats a label set, with `le` (when present) always appended last.
/// An empty label set with no `le` is rendered without braces, for
/// backward-compat with unlabeled series.
fn format_labels(labels: &LabelSet, le: Option<String>) -> String {
    if labels.is_empty() && le.is_none() {
        return String::new();
    }
    let mut parts: Vec<String> = labels.iter().map(|(key, value)| format!("{key}=\"{value}\"")).collect();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    format!("{{{}}}", parts.join(","))
}

fn format_bound(bound: f64) -> String {
    format_value(bound)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        #[expect(clippy::cast_possible_truncation, reason = "guarded by the fract()==0.0 and magnitude check above")]
        let as_int = value as i64;
        as_int.to_string()
    } else {
        let mut rendered = format!("{value}");
        if rendered.contains('e') || rendered.contains('E') {
            rendered = format!("{value:.6}");
        }
        rendered
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
