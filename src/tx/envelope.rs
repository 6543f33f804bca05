//! Signed INVOKE v1 transaction envelope

use super::hash::invoke_v1_hash;
use crate::account::{CredentialProvider, Signature};
use crate::error::{SubmitError, SubmitResult};

use starknet_types_core::felt::Felt;

/// Signed, broadcastable transaction.
///
/// The fee cap and signature can only change together through
/// [`TransactionEnvelope::reprice`], so an envelope always carries a
/// signature produced over its own fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope {
    version: Felt,
    nonce: Felt,
    sender_address: Felt,
    max_fee: u128,
    calldata: Vec<Felt>,
    signature: Signature,
    /// Hash the signature was produced over
    hash: Felt,
}

/// Envelope fields before signing
#[derive(Debug, Clone)]
pub(crate) struct UnsignedInvoke {
    pub nonce: Felt,
    pub sender_address: Felt,
    pub max_fee: u128,
    pub calldata: Vec<Felt>,
}

impl UnsignedInvoke {
    /// Hash the fields and have the credential provider sign them
    pub fn sign(
        self,
        credentials: &dyn CredentialProvider,
        chain_id: Felt,
    ) -> SubmitResult<TransactionEnvelope> {
        let hash = invoke_v1_hash(
            self.sender_address,
            &self.calldata,
            self.max_fee,
            chain_id,
            self.nonce,
        );
        let signature = credentials
            .sign(&hash)
            .map_err(|e| SubmitError::SigningFailed(e.to_string()))?;

        Ok(TransactionEnvelope {
            version: Felt::ONE,
            nonce: self.nonce,
            sender_address: self.sender_address,
            max_fee: self.max_fee,
            calldata: self.calldata,
            signature,
            hash,
        })
    }
}

impl TransactionEnvelope {
    pub fn version(&self) -> Felt {
        self.version
    }

    pub fn nonce(&self) -> Felt {
        self.nonce
    }

    pub fn sender_address(&self) -> Felt {
        self.sender_address
    }

    pub fn max_fee(&self) -> u128 {
        self.max_fee
    }

    pub fn calldata(&self) -> &[Felt] {
        &self.calldata
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Transaction hash as computed locally before broadcast
    pub fn hash(&self) -> Felt {
        self.hash
    }

    /// Replace the fee cap and re-sign in one step
    pub(crate) fn reprice(
        self,
        max_fee: u128,
        credentials: &dyn CredentialProvider,
        chain_id: Felt,
    ) -> SubmitResult<Self> {
        UnsignedInvoke {
            nonce: self.nonce,
            sender_address: self.sender_address,
            max_fee,
            calldata: self.calldata,
        }
        .sign(credentials, chain_id)
    }

    #[cfg(test)]
    pub(crate) fn new_signed(
        nonce: Felt,
        sender_address: Felt,
        max_fee: u128,
        calldata: Vec<Felt>,
        signature: Signature,
    ) -> Self {
        let hash = invoke_v1_hash(sender_address, &calldata, max_fee, Felt::ZERO, nonce);
        Self {
            version: Felt::ONE,
            nonce,
            sender_address,
            max_fee,
            calldata,
            signature,
            hash,
        }
    }
}
