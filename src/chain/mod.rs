//! Chain module - node connectivity for the submitter
//!
//! This module provides:
//! - The [`ChainClient`] contract the pipeline drives
//! - A Starknet JSON-RPC implementation over HTTP
//! - Transaction status types

pub mod provider;
pub mod status;

pub use provider::ChainProvider;
pub use status::{ExecutionStatus, FinalityStatus, TransactionStatus};

use crate::error::ChainError;
use crate::tx::TransactionEnvelope;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;
use std::fmt;

/// Block context for reads and fee estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockId {
    #[default]
    Latest,
    Pending,
    #[serde(untagged)]
    Number(u64),
}

impl Serialize for BlockId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        match self {
            BlockId::Latest => serializer.serialize_str("latest"),
            BlockId::Pending => serializer.serialize_str("pending"),
            BlockId::Number(n) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("block_number", n)?;
                map.end()
            }
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Latest => f.write_str("latest"),
            BlockId::Pending => f.write_str("pending"),
            BlockId::Number(n) => write!(f, "#{}", n),
        }
    }
}

/// Fee estimate for a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub overall_fee: Felt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_consumed: Option<Felt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Felt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl FeeEstimate {
    pub fn new(overall_fee: u128) -> Self {
        Self {
            overall_fee: Felt::from(overall_fee),
            gas_consumed: None,
            gas_price: None,
            unit: None,
        }
    }
}

/// Node operations the submission pipeline depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current nonce of `account` at `block`
    async fn get_nonce(&self, block: BlockId, account: Felt) -> Result<Felt, ChainError>;

    /// Estimate the fee for broadcasting `envelope` as-is
    async fn estimate_fee(
        &self,
        envelope: &TransactionEnvelope,
        block: BlockId,
    ) -> Result<FeeEstimate, ChainError>;

    /// Submit a signed transaction, returning its hash
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<Felt, ChainError>;

    async fn get_status(&self, transaction_hash: Felt) -> Result<TransactionStatus, ChainError>;
}
