//! Contract call descriptors

use crate::error::{SubmitError, SubmitResult};

use lazy_static::lazy_static;
use regex::Regex;
use sha3::{Digest, Keccak256};
use starknet_types_core::felt::Felt;

lazy_static! {
    static ref HEX_ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{1,64}$").expect("valid regex");
}

/// Entry points that resolve to the zero selector
const DEFAULT_ENTRY_POINTS: [&str; 2] = ["__default__", "__l1_default__"];

/// A single contract invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    target_contract: Felt,
    entry_point: String,
    selector: Felt,
    arguments: Vec<Felt>,
}

impl CallDescriptor {
    /// Build a call from a hex contract address, an entry point name and raw
    /// arguments
    pub fn new(
        contract_address: &str,
        entry_point: &str,
        arguments: Vec<Felt>,
    ) -> SubmitResult<Self> {
        Ok(Self {
            target_contract: parse_address(contract_address)?,
            entry_point: entry_point.to_string(),
            selector: selector_from_name(entry_point),
            arguments,
        })
    }

    pub fn target_contract(&self) -> Felt {
        self.target_contract
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn selector(&self) -> Felt {
        self.selector
    }

    pub fn arguments(&self) -> &[Felt] {
        &self.arguments
    }
}

/// Parse a Starknet contract address
pub fn parse_address(value: &str) -> SubmitResult<Felt> {
    let invalid = |reason: &str| SubmitError::InvalidAddress {
        address: value.to_string(),
        reason: reason.to_string(),
    };

    if !HEX_ADDRESS.is_match(value) {
        return Err(invalid("expected 0x-prefixed hex"));
    }

    // Addresses live below 2^251: at most 63 significant digits, the leading
    // one below 8. Checked on the text, as the field reduces larger values.
    let digits = value[2..].trim_start_matches('0');
    let too_large = digits.len() > 63 || (digits.len() == 63 && digits.as_bytes()[0] >= b'8');
    if too_large {
        return Err(invalid("out of address range"));
    }

    Felt::from_hex(value).map_err(|e| invalid(&e.to_string()))
}

/// `sn_keccak` of an entry point name: Keccak-256 truncated to 250 bits
pub fn selector_from_name(name: &str) -> Felt {
    if DEFAULT_ENTRY_POINTS.contains(&name) {
        return Felt::ZERO;
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Keccak256::digest(name.as_bytes()));
    digest[0] &= 0x03;
    Felt::from_bytes_be(&digest)
}

/// Parse a human-readable argument: `0x` hex or decimal.
///
/// Values at or above the field prime are rejected rather than reduced.
pub fn parse_felt(value: &str) -> SubmitResult<Felt> {
    let value = value.trim();
    let invalid = || SubmitError::Config(format!("Invalid calldata value '{}'", value));

    let (parsed, canonical) = match value.strip_prefix("0x") {
        Some(hex) => {
            let felt = Felt::from_hex(value).map_err(|_| invalid())?;
            (felt, format!("0x{}", canonical_digits(&hex.to_ascii_lowercase())))
        }
        None => {
            let felt = Felt::from_dec_str(value).map_err(|_| invalid())?;
            (felt, canonical_digits(value).to_string())
        }
    };

    let round_trip = if value.starts_with("0x") {
        parsed.to_hex_string()
    } else {
        parsed.to_biguint().to_string()
    };
    if round_trip != canonical {
        return Err(invalid());
    }

    Ok(parsed)
}

/// Digits without leading zeros, `"0"` for zero
fn canonical_digits(digits: &str) -> &str {
    match digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    }
}
