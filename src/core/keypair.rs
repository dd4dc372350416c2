//! ed25519 keypair wrapper with Solana text encodings.

use crate::core::errors::KeyringError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use zeroize::Zeroizing;

/// An ed25519 keypair. Public keys and signatures are rendered as base58.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Build from a 32-byte ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Build from the 64-byte `secret || public` form, checking both halves agree.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, KeyringError> {
        let bytes: Zeroizing<[u8; 64]> = Zeroizing::new(bytes.try_into().map_err(|_| {
            KeyringError::InvalidSecretKey(format!("expected 64 bytes, got {}", bytes.len()))
        })?);
        let signing_key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| KeyringError::InvalidSecretKey(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Parse the hex-encoded 64-byte form used by secret-key exports.
    pub fn from_secret_hex(secret: &str) -> Result<Self, KeyringError> {
        let bytes = Zeroizing::new(
            hex::decode(secret.trim()).map_err(|e| KeyringError::InvalidSecretKey(e.to_string()))?,
        );
        Self::from_keypair_bytes(&bytes)
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Base58 public key, the Solana address form.
    pub fn public_key(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }

    /// Detached signature over raw bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Detached signature over raw bytes, base58-encoded.
    pub fn sign_base58(&self, message: &[u8]) -> String {
        bs58::encode(self.sign(message)).into_string()
    }

    pub fn secret_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.secret_bytes()[..]))
    }

    pub fn secret_base58(&self) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(&self.secret_bytes()[..]).into_string())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Decode a base58 address into its 32 public key bytes.
pub fn decode_address(address: &str) -> Result<[u8; 32], KeyringError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|_| KeyringError::AddressNotFound(address.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| KeyringError::AddressNotFound(address.to_string()))
}

/// Verify a base58 signature produced by [`Keypair::sign_base58`].
pub fn verify_base58(address: &str, message: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = decode_address(address) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = bs58::decode(signature).into_vec() else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hex_roundtrip_keeps_public_key() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let restored = Keypair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let mut bytes = *kp.secret_bytes();
        bytes[63] ^= 0xff;
        assert!(matches!(
            Keypair::from_keypair_bytes(&bytes),
            Err(KeyringError::InvalidSecretKey(_))
        ));
    }

    #[test]
    fn test_signature_verifies() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let sig = kp.sign_base58(b"hello");
        assert!(verify_base58(&kp.public_key(), b"hello", &sig));
        assert!(!verify_base58(&kp.public_key(), b"other", &sig));
    }

    #[test]
    fn test_debug_is_redacted() {
        let kp = Keypair::from_seed(&[9u8; 32]);
        let dbg = format!("{:?}", kp);
        assert!(dbg.contains(&kp.public_key()));
        assert!(!dbg.contains(kp.secret_hex().as_str()));
    }
}
