// crates/evalpack-core/src/resolver.rs
// ============================================================================
// Module: Evalpack Resolver
// Description: Merges pack-level and prompt-level eval definitions by id.
// Purpose: Produce the immutable, ordered definition list the runner sees.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! [`resolve`] walks `pack_defs` in order, substituting any
//! prompt-level override with the same id; then appends prompt-only
//! additions, in their original order. Neither list is mutated.

use std::collections::BTreeMap;

use crate::model::EvalDef;

/// Merges `pack_defs` and `prompt_defs` by `id`.
///
/// - A pack def whose `id` also appears in `prompt_defs` is replaced by the
///   prompt def (override), at the pack def's position.
/// - A pack def whose `id` does not appear in `prompt_defs` is kept as-is.
/// - A prompt def whose `id` does not appear in `pack_defs` is appended
///   after all pack-derived entries, in prompt order.
/// - Two empty inputs yield an empty result.
#[must_use]
pub fn resolve(pack_defs: &[EvalDef], prompt_defs: &[EvalDef]) -> Vec<EvalDef> {
    let prompt_by_id: BTreeMap<&str, &EvalDef> = prompt_defs.iter().map(|def| (def.id.as_str(), def)).collect();

    let mut emitted: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    let mut resolved = Vec::with_capacity(pack_defs.len() + prompt_defs.len());

    for pack_def in pack_defs {
        let id = pack_def.id.as_str();
        let def = prompt_by_id.get(id).map_or(pack_def, |override_def| *override_def);
        resolved.push(def.clone());
        emitted.insert(id);
    }

    for prompt_def in prompt_defs {
        if !emitted.contains(prompt_def.id.as_str()) {
            resolved.push(prompt_def.clone());
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvalId;
    use crate::model::Trigger;

    fn def(id: &str, eval_type: &str) -> EvalDef {
        EvalDef {
            id: EvalId::new(id),
            eval_type: eval_type.to_string(),
            trigger: Trigger::EveryTurn,
            params: Default::default(),
            enabled: true,
            sample_percentage: crate::model::DEFAULT_SAMPLE_PERCENTAGE,
            metric: None,
            threshold: None,
            when: None,
            description: None,
            message: None,
        }
    }

    #[test]
    fn prompt_def_overrides_pack_def_with_same_id() {
        let pack = vec![def("a", "T_a"), def("b", "T_b")];
        let prompt = vec![def("b", "T_b_override"), def("c", "T_c")];

        let resolved = resolve(&pack, &prompt);

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].id.as_str(), "a");
        assert_eq!(resolved[0].eval_type, "T_a");
        assert_eq!(resolved[1].id.as_str(), "b");
        assert_eq!(resolved[1].eval_type, "T_b_override");
        assert_eq!(resolved[2].id.as_str(), "c");
        assert_eq!(resolved[2].eval_type, "T_c");
    }

    #[test]
    fn pack_only_and_prompt_only_ids_are_both_kept() {
        let pack = vec![def("only-pack", "T1")];
        let prompt = vec![def("only-prompt", "T2")];
        let resolved = resolve(&pack, &prompt);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].id.as_str(), "only-pack");
        assert_eq!(resolved[1].id.as_str(), "only-prompt");
    }

    #[test]
    fn empty_inputs_yield_empty_result() {
        assert!(resolve(&[], &[]).is_empty());
    }

    #[test]
    fn cardinality_matches_union_by_id() {
        let pack = vec![def("a", "T"), def("b", "T")];
        let prompt = vec![def("b", "T2"), def("c", "T")];
        assert_eq!(resolve(&pack, &prompt).len(), 3);
    }
}
