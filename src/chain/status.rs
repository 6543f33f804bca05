//! Transaction status as reported by the node
//!
//! Starknet reports two independent dimensions:
//! - Finality: how far the transaction has progressed through consensus
//!   (received by the sequencer, accepted on L2, accepted on L1, or rejected)
//! - Execution: whether the transaction succeeded or reverted, only known once
//!   it has been executed

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalityStatus {
    Received,
    Rejected,
    AcceptedOnL2,
    AcceptedOnL1,
}

impl FinalityStatus {
    /// Whether no further finality transition is expected from a poll
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FinalityStatus::Rejected | FinalityStatus::AcceptedOnL2 | FinalityStatus::AcceptedOnL1
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinalityStatus::Received => "RECEIVED",
            FinalityStatus::Rejected => "REJECTED",
            FinalityStatus::AcceptedOnL2 => "ACCEPTED_ON_L2",
            FinalityStatus::AcceptedOnL1 => "ACCEPTED_ON_L1",
        }
    }
}

impl fmt::Display for FinalityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Reverted,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Succeeded => f.write_str("SUCCEEDED"),
            ExecutionStatus::Reverted => f.write_str("REVERTED"),
        }
    }
}

/// Result of `starknet_getTransactionStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub finality_status: FinalityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<ExecutionStatus>,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        self.finality_status.is_terminal()
    }
}
