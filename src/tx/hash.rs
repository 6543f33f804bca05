//! Pedersen-based transaction hashing for INVOKE v1

use starknet_crypto::pedersen_hash;
use starknet_types_core::felt::Felt;

/// `"invoke"` encoded as a Cairo short string
const PREFIX_INVOKE: Felt = Felt::from_hex_unchecked("0x696e766f6b65");

/// Hash an array the way the Starknet OS does: a Pedersen chain starting at
/// zero, finished with the element count.
pub fn compute_hash_on_elements(data: &[Felt]) -> Felt {
    let acc = data
        .iter()
        .fold(Felt::ZERO, |acc, elem| pedersen_hash(&acc, elem));
    pedersen_hash(&acc, &Felt::from(data.len() as u64))
}

/// Hash signed by the account for an INVOKE v1 transaction
pub fn invoke_v1_hash(
    sender_address: Felt,
    calldata: &[Felt],
    max_fee: u128,
    chain_id: Felt,
    nonce: Felt,
) -> Felt {
    compute_hash_on_elements(&[
        PREFIX_INVOKE,
        Felt::ONE,
        sender_address,
        Felt::ZERO,
        compute_hash_on_elements(calldata),
        Felt::from(max_fee),
        chain_id,
        nonce,
    ])
}

/// Encode an ASCII string of at most 31 characters as a felt
pub fn short_string_to_felt(value: &str) -> Option<Felt> {
    if value.len() > 31 || !value.is_ascii() {
        return None;
    }
    let mut buffer = [0u8; 32];
    buffer[32 - value.len()..].copy_from_slice(value.as_bytes());
    Some(Felt::from_bytes_be(&buffer))
}

/// Resolve a chain id given either as hex or as a short string (`SN_SEPOLIA`)
pub fn parse_chain_id(value: &str) -> Option<Felt> {
    if value.starts_with("0x") {
        Felt::from_hex(value).ok()
    } else {
        short_string_to_felt(value)
    }
}
