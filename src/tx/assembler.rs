//! Transaction assembly: nonce lookup, `__execute__` calldata and signing

use super::call::CallDescriptor;
use super::envelope::{TransactionEnvelope, UnsignedInvoke};
use crate::account::CredentialProvider;
use crate::chain::{BlockId, ChainClient};
use crate::error::{SubmitError, SubmitResult};

use starknet_types_core::felt::Felt;
use std::sync::Arc;
use tracing::debug;

/// Builds signed envelopes for one account
pub struct TransactionAssembler {
    /// Node access for nonce lookups
    client: Arc<dyn ChainClient>,
    /// Account identity and signer
    credentials: Arc<dyn CredentialProvider>,
    /// Chain id committed to in the transaction hash
    chain_id: Felt,
    /// Block the nonce is read at
    nonce_block: BlockId,
}

impl TransactionAssembler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        credentials: Arc<dyn CredentialProvider>,
        chain_id: Felt,
        nonce_block: BlockId,
    ) -> Self {
        Self {
            client,
            credentials,
            chain_id,
            nonce_block,
        }
    }

    /// Fetch a fresh nonce, encode the call and sign the envelope
    pub async fn assemble(
        &self,
        call: &CallDescriptor,
        max_fee: u128,
    ) -> SubmitResult<TransactionEnvelope> {
        let account = self.credentials.account();

        let nonce = self
            .client
            .get_nonce(self.nonce_block, account.address())
            .await
            .map_err(SubmitError::NonceFetchFailed)?;

        debug!(
            "Fetched nonce {} for {} at {}",
            nonce,
            account.address().to_hex_string(),
            self.nonce_block
        );

        let calldata = encode_execute_calldata(account.interface_version(), call)?;

        UnsignedInvoke {
            nonce,
            sender_address: account.address(),
            max_fee,
            calldata,
        }
        .sign(self.credentials.as_ref(), self.chain_id)
    }

    /// Rebuild the envelope with a new fee cap and a fresh signature
    pub fn reprice(
        &self,
        envelope: TransactionEnvelope,
        max_fee: u128,
    ) -> SubmitResult<TransactionEnvelope> {
        debug!(
            "Re-signing envelope with max fee {} (was {})",
            max_fee,
            envelope.max_fee()
        );
        envelope.reprice(max_fee, self.credentials.as_ref(), self.chain_id)
    }
}

/// Encode a call into the account's `__execute__` calldata.
///
/// Cairo 0 accounts take a call array followed by the flattened arguments,
/// Cairo 1 accounts take each call with its arguments inline.
pub fn encode_execute_calldata(
    interface_version: u8,
    call: &CallDescriptor,
) -> SubmitResult<Vec<Felt>> {
    let args = call.arguments();
    let args_len = Felt::from(args.len() as u64);

    let mut calldata = Vec::with_capacity(args.len() + 6);
    match interface_version {
        0 => {
            calldata.extend([
                Felt::ONE,
                call.target_contract(),
                call.selector(),
                Felt::ZERO,
                args_len,
                args_len,
            ]);
        }
        1 => {
            calldata.extend([Felt::ONE, call.target_contract(), call.selector(), args_len]);
        }
        other => {
            return Err(SubmitError::CalldataEncodingFailed(format!(
                "unsupported account Cairo version {}",
                other
            )))
        }
    }
    calldata.extend_from_slice(args);

    Ok(calldata)
}
