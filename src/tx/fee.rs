//! Fee guard: validate the assembled fee cap against a node estimate

use super::assembler::TransactionAssembler;
use super::envelope::TransactionEnvelope;
use crate::chain::{BlockId, ChainClient};
use crate::error::{SubmitError, SubmitResult};

use starknet_types_core::felt::Felt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Safety margin added on correction, as a divisor (`fee / 5` = 20%)
const FEE_MARGIN_DIVISOR: u128 = 5;

/// Outcome of the fee check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeReport {
    /// Overall fee estimated by the node
    pub estimated_fee: u128,
    /// Cap the envelope was assembled with
    pub original_cap: u128,
    /// Cap of the envelope that goes on the wire
    pub final_cap: u128,
}

impl FeeReport {
    pub fn corrected(&self) -> bool {
        self.final_cap != self.original_cap
    }
}

/// Envelope that passed the fee guard
#[derive(Debug, Clone)]
pub struct GuardedEnvelope {
    pub envelope: TransactionEnvelope,
    pub report: FeeReport,
}

/// Corrected cap for an estimate, or `None` when the cap already covers it
pub fn corrected_cap(estimated_fee: u128, cap: u128) -> SubmitResult<Option<u128>> {
    if estimated_fee <= cap {
        return Ok(None);
    }

    estimated_fee
        .checked_add(estimated_fee / FEE_MARGIN_DIVISOR)
        .map(Some)
        .ok_or_else(|| {
            SubmitError::FeeEstimationFailed(format!(
                "fee estimate {} overflows with safety margin",
                estimated_fee
            ))
        })
}

/// Convert an on-chain fee amount into `u128`
fn felt_to_u128(value: Felt) -> Option<u128> {
    let bytes = value.to_bytes_be();
    let (high, low) = bytes.split_at(16);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    let mut buffer = [0u8; 16];
    buffer.copy_from_slice(low);
    Some(u128::from_be_bytes(buffer))
}

/// Estimates the fee of an envelope and corrects its cap at most once
pub struct FeeGuard {
    client: Arc<dyn ChainClient>,
    /// Block context for estimation
    block: BlockId,
}

impl FeeGuard {
    pub fn new(client: Arc<dyn ChainClient>, block: BlockId) -> Self {
        Self { client, block }
    }

    /// Overall fee the node expects for broadcasting `envelope` as-is
    pub async fn estimate(&self, envelope: &TransactionEnvelope) -> SubmitResult<u128> {
        let estimate = self
            .client
            .estimate_fee(envelope, self.block)
            .await
            .map_err(|e| SubmitError::FeeEstimationFailed(e.to_string()))?;

        felt_to_u128(estimate.overall_fee).ok_or_else(|| {
            SubmitError::FeeEstimationFailed(format!(
                "overall fee {} exceeds supported range",
                estimate.overall_fee.to_hex_string()
            ))
        })
    }

    /// Check `envelope` and re-sign it with a margined cap if the estimate
    /// exceeds its cap. The corrected envelope is not estimated again.
    pub async fn guard(
        &self,
        envelope: TransactionEnvelope,
        assembler: &TransactionAssembler,
    ) -> SubmitResult<GuardedEnvelope> {
        let original_cap = envelope.max_fee();
        let estimated_fee = self.estimate(&envelope).await?;

        match corrected_cap(estimated_fee, original_cap)? {
            None => {
                debug!(
                    "Estimated fee {} within cap {}, keeping envelope",
                    estimated_fee, original_cap
                );
                Ok(GuardedEnvelope {
                    envelope,
                    report: FeeReport {
                        estimated_fee,
                        original_cap,
                        final_cap: original_cap,
                    },
                })
            }
            Some(new_cap) => {
                warn!(
                    "Estimated fee {} exceeds cap {}, raising cap to {}",
                    estimated_fee, original_cap, new_cap
                );
                let envelope = assembler.reprice(envelope, new_cap)?;
                crate::metrics::record_fee_correction();
                Ok(GuardedEnvelope {
                    envelope,
                    report: FeeReport {
                        estimated_fee,
                        original_cap,
                        final_cap: new_cap,
                    },
                })
            }
        }
    }
}
