// crates/evalpack-listener/src/loader.rs
// ============================================================================
// Module: Evalpack Pack Eval Loader Contract
// Description: External collaborator interface for loading resolved pack
//              definitions by prompt id.
// Purpose: Let the listener ask for a prompt's evals without depending on
//          any concrete pack storage (file/YAML loading is out of scope).
// Dependencies: async_trait, evalpack_core, thiserror
// ============================================================================

//! ## Overview
//! [`PackEvalLoader`] is consumed only by [`crate::listener::EventBusEvalListener`].
//! Concrete implementations
//! (file/YAML packs, a remote config service, ...) are out of scope here.

use async_trait::async_trait;
use evalpack_core::EvalDef;
use evalpack_core::PromptId;
use thiserror::Error;

/// Errors returned by [`PackEvalLoader::load_evals`].
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The loader failed to produce definitions for the given prompt id.
    #[error("failed to load evals for prompt: {0}")]
    Failed(String),
}

/// Resolves a prompt id to its already-merged (pack + prompt override) list
/// of eval definitions.
#[async_trait]
pub trait PackEvalLoader: Send + Sync {
    /// Loads the resolved eval definitions for `prompt_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Failed`] when the definitions cannot be
    /// produced.
    async fn load_evals(&self, prompt_id: &PromptId) -> Result<Vec<EvalDef>, LoaderError>;
}
