//! Account credentials and signing
//!
//! The submission pipeline never touches key material directly. It asks a
//! [`CredentialProvider`] for the account it acts on and for a signature over
//! a transaction hash.

mod keystore;

pub use keystore::LocalKeystore;

use starknet_types_core::felt::Felt;
use thiserror::Error;

/// Starknet account as seen by the submitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    address: Felt,
    public_key: Felt,
    /// Cairo version of the account contract; selects the `__execute__`
    /// calldata layout
    interface_version: u8,
}

impl Account {
    pub fn new(address: Felt, public_key: Felt, interface_version: u8) -> Self {
        Self {
            address,
            public_key,
            interface_version,
        }
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    pub fn interface_version(&self) -> u8 {
        self.interface_version
    }
}

/// ECDSA signature over the Stark curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: Felt,
    pub s: Felt,
}

impl Signature {
    /// Wire representation: `[r, s]`
    pub fn to_vec(&self) -> Vec<Felt> {
        vec![self.r, self.s]
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignerError {
    #[error("Private key not found in environment variable {0}")]
    MissingKey(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Public key {expected} does not match the private key (derived {derived})")]
    KeyMismatch { expected: String, derived: String },

    #[error("Signature generation failed: {0}")]
    Sign(String),
}

/// Source of account identity and signatures.
///
/// Implementations must be deterministic: signing the same hash twice yields
/// the same signature.
pub trait CredentialProvider: Send + Sync {
    fn account(&self) -> &Account;

    fn sign(&self, hash: &Felt) -> Result<Signature, SignerError>;
}
