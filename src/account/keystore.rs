//! In-memory keystore holding a single Stark private key

use super::{Account, CredentialProvider, Signature, SignerError};
use crate::tx::parse_felt;

use starknet_crypto::{get_public_key, rfc6979_generate_k, sign, SignError};
use starknet_types_core::felt::Felt;
use std::fmt;
use tracing::debug;

/// Credential provider backed by a private key held in memory
pub struct LocalKeystore {
    account: Account,
    secret: Felt,
}

impl LocalKeystore {
    /// Create a keystore, checking the secret against the account's public key
    pub fn new(account: Account, secret: Felt) -> Result<Self, SignerError> {
        if secret == Felt::ZERO {
            return Err(SignerError::InvalidKey("private key is zero".to_string()));
        }

        let derived = get_public_key(&secret);
        if derived != account.public_key() {
            return Err(SignerError::KeyMismatch {
                expected: account.public_key().to_hex_string(),
                derived: derived.to_hex_string(),
            });
        }

        debug!(
            "Keystore loaded for account {}",
            account.address().to_hex_string()
        );

        Ok(Self { account, secret })
    }

    /// Build a keystore whose public key is derived from the secret
    pub fn from_secret(
        address: Felt,
        interface_version: u8,
        secret: Felt,
    ) -> Result<Self, SignerError> {
        let public_key = get_public_key(&secret);
        Self::new(Account::new(address, public_key, interface_version), secret)
    }

    /// Load the private key, `0x` hex or decimal, from an environment variable
    pub fn from_env(account: Account, key_var: &str) -> Result<Self, SignerError> {
        let raw = std::env::var(key_var).map_err(|_| SignerError::MissingKey(key_var.to_string()))?;
        Self::new(account, parse_secret(key_var, &raw)?)
    }
}

/// The value itself never appears in the error
fn parse_secret(key_var: &str, raw: &str) -> Result<Felt, SignerError> {
    parse_felt(raw).map_err(|_| {
        SignerError::InvalidKey(format!("{} is not a hex or decimal field element", key_var))
    })
}

impl CredentialProvider for LocalKeystore {
    fn account(&self) -> &Account {
        &self.account
    }

    fn sign(&self, hash: &Felt) -> Result<Signature, SignerError> {
        let mut seed: Option<Felt> = None;
        loop {
            let k = rfc6979_generate_k(hash, &self.secret, seed.as_ref());
            match sign(&self.secret, hash, &k) {
                Ok(signature) => {
                    return Ok(Signature {
                        r: signature.r,
                        s: signature.s,
                    })
                }
                Err(SignError::InvalidK) => {
                    seed = Some(seed.unwrap_or(Felt::ZERO) + Felt::ONE);
                }
                Err(e) => return Err(SignerError::Sign(e.to_string())),
            }
        }
    }
}

impl fmt::Debug for LocalKeystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeystore")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starknet_crypto::verify;

    fn secret() -> Felt {
        Felt::from_hex_unchecked(
            "0x4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3",
        )
    }

    fn address() -> Felt {
        Felt::from_hex_unchecked(
            "0x064b48806902a367c8598f4f95c305e8c1a1acba5f082d294a43793113115691",
        )
    }

    #[test]
    fn test_signature_is_deterministic_and_valid() {
        let keystore = LocalKeystore::from_secret(address(), 1, secret()).unwrap();
        let hash = Felt::from_hex_unchecked("0x2a");

        let first = keystore.sign(&hash).unwrap();
        let second = keystore.sign(&hash).unwrap();
        assert_eq!(first, second);

        let public_key = keystore.account().public_key();
        assert!(verify(&public_key, &hash, &first.r, &first.s).unwrap());
    }

    #[test]
    fn test_public_key_mismatch_is_rejected() {
        let account = Account::new(address(), Felt::from(7u64), 0);
        let err = LocalKeystore::new(account, secret()).unwrap_err();
        assert!(matches!(err, SignerError::KeyMismatch { .. }));
    }

    #[test]
    fn test_missing_env_key() {
        let account = Account::new(address(), get_public_key(&secret()), 0);
        let err =
            LocalKeystore::from_env(account, "STRKLOOP_TEST_KEY_THAT_IS_NOT_SET").unwrap_err();
        assert_eq!(
            err,
            SignerError::MissingKey("STRKLOOP_TEST_KEY_THAT_IS_NOT_SET".to_string())
        );
    }

    #[test]
    fn test_secret_accepts_hex_and_decimal() {
        let secret = Felt::from(0x5d1f_c1efu64);
        assert_eq!(parse_secret("KEY", "0x5d1fc1ef").unwrap(), secret);
        assert_eq!(parse_secret("KEY", "1562362351\n").unwrap(), secret);

        let err = parse_secret("KEY", "0xnot-a-key").unwrap_err();
        assert!(matches!(err, SignerError::InvalidKey(_)));
        assert!(!err.to_string().contains("not-a-key"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keystore = LocalKeystore::from_secret(address(), 0, secret()).unwrap();
        let printed = format!("{:?}", keystore);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&secret().to_hex_string()));
    }
}
