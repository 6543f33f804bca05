//! Error types for the submitter

use crate::tx::SubmissionStage;

use thiserror::Error;

/// Errors raised by a [`ChainClient`](crate::chain::ChainClient) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}{}", rpc_data_suffix(.data))]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

fn rpc_data_suffix(data: &Option<String>) -> String {
    data.as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

/// Main error type for a submission attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to fetch nonce: {0}")]
    NonceFetchFailed(ChainError),

    #[error("Calldata encoding failed: {0}")]
    CalldataEncodingFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Fee estimation failed: {0}")]
    FeeEstimationFailed(String),

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(ChainError),

    #[error("Status query failed: {0}")]
    StatusQueryFailed(ChainError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SubmitError {
    /// Stage of the pipeline the error belongs to
    pub fn stage(&self) -> SubmissionStage {
        match self {
            SubmitError::InvalidAddress { .. } | SubmitError::Config(_) => {
                SubmissionStage::Building
            }
            SubmitError::NonceFetchFailed(_)
            | SubmitError::CalldataEncodingFailed(_)
            | SubmitError::SigningFailed(_) => SubmissionStage::Assembled,
            SubmitError::FeeEstimationFailed(_) => SubmissionStage::FeeChecked,
            SubmitError::BroadcastFailed(_) => SubmissionStage::Broadcast,
            SubmitError::StatusQueryFailed(_) => SubmissionStage::Polling,
        }
    }

    /// Check if the caller may start a fresh attempt.
    ///
    /// Only failures that happened before anything reached the node qualify.
    /// A failed broadcast may still have consumed the nonce.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::NonceFetchFailed(_) => true,
            SubmitError::FeeEstimationFailed(_) => true,
            _ => false,
        }
    }

    /// Whether the transaction may exist on chain despite this error
    pub fn transaction_sent(&self) -> bool {
        matches!(
            self,
            SubmitError::BroadcastFailed(ChainError::Timeout { .. })
                | SubmitError::StatusQueryFailed(_)
        )
    }

    /// Stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::InvalidAddress { .. } => "invalid_address",
            SubmitError::NonceFetchFailed(_) => "nonce_fetch_failed",
            SubmitError::CalldataEncodingFailed(_) => "calldata_encoding_failed",
            SubmitError::SigningFailed(_) => "signing_failed",
            SubmitError::FeeEstimationFailed(_) => "fee_estimation_failed",
            SubmitError::BroadcastFailed(_) => "broadcast_failed",
            SubmitError::StatusQueryFailed(_) => "status_query_failed",
            SubmitError::Config(_) => "config",
        }
    }
}

/// Result type for submission operations
pub type SubmitResult<T> = Result<T, SubmitError>;
