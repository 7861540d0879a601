//! Error types for the fee bundler

use std::fmt;
use thiserror::Error;

/// Main error type for bundle construction and submission
#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bundle must contain between {min} and {max} transactions, got {actual}")]
    TransactionCount { min: usize, max: usize, actual: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Node query {query} failed: {message}")]
    Oracle { query: &'static str, message: String },

    #[error("Cannot encode {field} {value:?}: {reason}")]
    Encoding {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Relay rejected bundle with status {status}: {body}")]
    RelayRejected { status: u16, body: String },

    #[error("Relay submission failed: {0}")]
    Submission(String),
}

impl BundlerError {
    pub(crate) fn encoding(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BundlerError::Encoding {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Check if the failure was transient on the transport side.
    ///
    /// Nothing in the pipeline retries; this only feeds the failure log.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BundlerError::Oracle { .. } | BundlerError::Submission(_)
        )
    }
}

/// Result type for bundler operations
pub type BundlerResult<T> = Result<T, BundlerError>;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    AllocateNonces,
    BuildFeeTx,
    SignFeeTx,
    BuildUserTxs,
    SignUserTxs,
    ComputeBlockWindow,
    Assemble,
    Submit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::AllocateNonces => "allocate_nonces",
            Stage::BuildFeeTx => "build_fee_tx",
            Stage::SignFeeTx => "sign_fee_tx",
            Stage::BuildUserTxs => "build_user_txs",
            Stage::SignUserTxs => "sign_user_txs",
            Stage::ComputeBlockWindow => "compute_block_window",
            Stage::Assemble => "assemble",
            Stage::Submit => "submit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundler error tagged with the stage that produced it
#[derive(Error, Debug)]
#[error("{stage} failed")]
pub struct PipelineError {
    pub stage: Stage,
    pub source: BundlerError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: BundlerError) -> Self {
        Self { stage, source }
    }
}

/// Attach a stage to a bundler result
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> StageExt<T> for BundlerResult<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
