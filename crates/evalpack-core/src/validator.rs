// crates/evalpack-core/src/validator.rs
// ============================================================================
// Module: Evalpack Validator
// Description: Structural validation of eval definitions.
// Purpose: Reject malformed definitions before the runner ever sees them.
// Dependencies: crate::model, crate::registry, regex
// ============================================================================

//! ## Overview
//! [`validate`] returns one human-readable error string per violated rule
//! (not one blob per definition), so a caller can report every problem in a
//! pack at once. [`validate_types`] is a separate pass against a live
//! [`HandlerRegistry`], since type resolution depends on what happens to be
//! registered in-process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::EvalDef;
use crate::model::MetricDef;
use crate::registry::HandlerRegistry;

static METRIC_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::unwrap_used, reason = "pattern is a compile-time constant")]
    Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").unwrap()
});
static LABEL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::unwrap_used, reason = "pattern is a compile-time constant")]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap()
});

// ============================================================================
// SECTION: Definition Validation
// ============================================================================

/// Validates a batch of definitions, returning one message per violated
/// rule. An empty result means every definition is valid.
///
/// Disabled definitions are still validated: `enabled` gates execution, not
/// shape.
#[must_use]
pub fn validate(defs: &[EvalDef]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen_ids: BTreeSet<&str> = BTreeSet::new();

    for def in defs {
        let id = def.id.as_str();

        if id.is_empty() {
            errors.push("definition id is required".to_string());
        } else if !seen_ids.insert(id) {
            errors.push(format!("duplicate definition id: {id}"));
        }

        if def.eval_type.is_empty() {
            errors.push(format!("definition {id}: type is required"));
        }

        if !(0.0 ..= 100.0).contains(&def.sample_percentage) {
            errors.push(format!("definition {id}: sample_percentage must be in [0, 100], got {}", def.sample_percentage));
        }

        if let Some(metric) = &def.metric {
            validate_metric(id, metric, &mut errors);
        }
    }

    errors
}

/// Validates a single [`MetricDef`], appending one message per violated
/// rule to `errors`.
fn validate_metric(def_id: &str, metric: &MetricDef, errors: &mut Vec<String>) {
    if metric.name.is_empty() {
        errors.push(format!("definition {def_id}: metric name is required"));
    } else if !METRIC_NAME_RE.is_match(&metric.name) {
        errors.push(format!("definition {def_id}: metric name '{}' does not match {}", metric.name, METRIC_NAME_RE.as_str()));
    }

    if let Some(range) = metric.range {
        if range.min > range.max {
            errors.push(format!("definition {def_id}: metric range.min ({}) must be <= range.max ({})", range.min, range.max));
        }
    }

    for label_name in metric.labels.keys() {
        if label_name.starts_with("__") {
            errors.push(format!("definition {def_id}: metric label '{label_name}' must not start with __"));
        } else if !LABEL_NAME_RE.is_match(label_name) {
            errors.push(format!("definition {def_id}: metric label '{label_name}' does not match {}", LABEL_NAME_RE.as_str()));
        }
    }
}

// ============================================================================
// SECTION: Type Validation
// ============================================================================

/// Validates that every non-empty `type` named by `defs` resolves against
/// `registry`.
#[must_use]
pub fn validate_types(defs: &[EvalDef], registry: &HandlerRegistry) -> Vec<String> {
    defs.iter()
        .filter(|def| !def.eval_type.is_empty())
        .filter(|def| !registry.has(&def.eval_type))
        .map(|def| format!("definition {}: unknown type '{}'", def.id.as_str(), def.eval_type))
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvalId;
    use crate::model::MetricRange;
    use crate::model::MetricType;
    use crate::model::Trigger;

    fn base_def(id: &str) -> EvalDef {
        EvalDef {
            id: EvalId::new(id),
            eval_type: "quality_check".to_string(),
            trigger: Trigger::EveryTurn,
            params: Default::default(),
            enabled: true,
            sample_percentage: 5.0,
            metric: None,
            threshold: None,
            when: None,
            description: None,
            message: None,
        }
    }

    #[test]
    fn valid_definition_has_no_errors() {
        assert!(validate(&[base_def("q")]).is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let errors = validate(&[base_def("dup"), base_def("dup")]);
        assert!(errors.iter().any(|e| e.contains("duplicate")));
    }

    #[test]
    fn sample_percentage_out_of_range_is_rejected() {
        let mut def = base_def("q");
        def.sample_percentage = 150.0;
        assert!(!validate(&[def]).is_empty());
    }

    #[test]
    fn disabled_definitions_are_still_validated() {
        let mut def = base_def("q");
        def.enabled = false;
        def.sample_percentage = -5.0;
        assert!(!validate(&[def]).is_empty());
    }

    #[test]
    fn metric_range_order_is_checked() {
        let mut def = base_def("q");
        def.metric = Some(MetricDef {
            name: "response_quality".to_string(),
            metric_type: MetricType::Gauge,
            range: Some(MetricRange { min: 1.0, max: 0.0 }),
            labels: Default::default(),
            extra: Default::default(),
        });
        let errors = validate(&[def]);
        assert!(errors.iter().any(|e| e.contains("range")));
    }

    #[test]
    fn metric_label_names_are_checked() {
        let mut def = base_def("q");
        let mut labels = std::collections::BTreeMap::new();
        labels.insert("__reserved".to_string(), "x".to_string());
        def.metric = Some(MetricDef {
            name: "response_quality".to_string(),
            metric_type: MetricType::Gauge,
            range: None,
            labels,
            extra: Default::default(),
        });
        let errors = validate(&[def]);
        assert!(errors.iter().any(|e| e.contains("__")));
    }

    #[test]
    fn metric_name_must_match_prometheus_shape() {
        let mut def = base_def("q");
        def.metric = Some(MetricDef {
            name: "9-not-valid".to_string(),
            metric_type: MetricType::Gauge,
            range: None,
            labels: Default::default(),
            extra: Default::default(),
        });
        assert!(!validate(&[def]).is_empty());
    }

    #[test]
    fn validate_types_flags_unknown_handler() {
        let registry = HandlerRegistry::new();
        let errors = validate_types(&[base_def("q")], &registry);
        assert_eq!(errors.len(), 1);
    }
}
