//! Solana key derivation
//!
//! Maps (seed, account index, derivation scheme) to an ed25519 keypair.
//! - `bip44` / `bip44-change`: SLIP-0010 ed25519, hardened-only
//! - `sollet-deprecated`: BIP-32 secp256k1, private key reused as ed25519 seed
//!
//! Every function here is pure and deterministic.

use crate::core::domain::DerivationPath;
use crate::core::errors::KeyringError;
use crate::core::keypair::Keypair;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

const ED25519_CURVE_KEY: &[u8] = b"ed25519 seed";

/// BIP-39 seeds are 64 bytes; BIP-32 accepts 16..=64.
const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// SLIP-0010 ed25519 node.
struct Slip10Node {
    chain_code: [u8; 32],
    key: Zeroizing<[u8; 32]>,
}

impl Slip10Node {
    fn from_seed(seed: &[u8]) -> Result<Self, KeyringError> {
        let mut mac = HmacSha512::new_from_slice(ED25519_CURVE_KEY)
            .map_err(|e| KeyringError::InvalidSeed(format!("HMAC initialization failed: {}", e)))?;
        mac.update(seed);
        Ok(Self::split(&mac.finalize().into_bytes()))
    }

    /// ed25519 only supports hardened children.
    fn derive_child(&self, index: u32) -> Result<Self, KeyringError> {
        if index & crate::core::domain::HARDENED == 0 {
            return Err(KeyringError::InvalidDerivationPath(format!(
                "ed25519 derivation requires hardened index, got {}",
                index
            )));
        }

        // 0x00 || key || index
        let mut data = Zeroizing::new(Vec::with_capacity(37));
        data.push(0x00);
        data.extend_from_slice(&self.key[..]);
        data.extend_from_slice(&index.to_be_bytes());

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| KeyringError::InvalidSeed(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&data);
        Ok(Self::split(&mac.finalize().into_bytes()))
    }

    fn split(output: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&output[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&output[32..64]);
        Self { chain_code, key }
    }
}

/// Decode and length-check a hex seed.
pub fn decode_seed(seed_hex: &str) -> Result<Zeroizing<Vec<u8>>, KeyringError> {
    let seed = Zeroizing::new(
        hex::decode(seed_hex.trim())
            .map_err(|e| KeyringError::InvalidSeed(format!("seed is not hex: {}", e)))?,
    );
    if seed.len() < MIN_SEED_LEN || seed.len() > MAX_SEED_LEN {
        return Err(KeyringError::InvalidSeed(format!(
            "seed must be {}..={} bytes, got {}",
            MIN_SEED_LEN,
            MAX_SEED_LEN,
            seed.len()
        )));
    }
    Ok(seed)
}

/// Derive the keypair for one account index from raw seed bytes.
pub fn derive_from_seed(
    seed: &[u8],
    account_index: u32,
    path: DerivationPath,
) -> Result<Keypair, KeyringError> {
    if seed.len() < MIN_SEED_LEN || seed.len() > MAX_SEED_LEN {
        return Err(KeyringError::InvalidSeed(format!("bad seed length {}", seed.len())));
    }
    if account_index >= crate::core::domain::HARDENED {
        return Err(KeyringError::InvalidDerivationPath(format!(
            "account index {} exceeds the hardened range",
            account_index
        )));
    }

    let private_key = match path.slip10_components(account_index) {
        Some(components) => {
            let mut node = Slip10Node::from_seed(seed)?;
            for index in components {
                node = node.derive_child(index)?;
            }
            node.key
        }
        None => derive_sollet_private_key(seed, account_index)?,
    };

    Ok(Keypair::from_seed(&private_key))
}

/// Derive the keypair for one account index from a hex seed.
pub fn derive(seed_hex: &str, account_index: u32, path: DerivationPath) -> Result<Keypair, KeyringError> {
    let seed = decode_seed(seed_hex)?;
    derive_from_seed(&seed, account_index, path)
}

/// Derive keypairs for every index, preserving input order.
pub fn derive_many(
    seed_hex: &str,
    path: DerivationPath,
    account_indices: &[u32],
) -> Result<Vec<Keypair>, KeyringError> {
    let seed = decode_seed(seed_hex)?;
    account_indices
        .iter()
        .map(|&index| derive_from_seed(&seed, index, path))
        .collect()
}

/// Legacy sollet scheme: secp256k1 BIP-32 at `m/501'/{i}'/0/0`.
fn derive_sollet_private_key(seed: &[u8], account_index: u32) -> Result<Zeroizing<[u8; 32]>, KeyringError> {
    use coins_bip32::prelude::*;

    let path: coins_bip32::path::DerivationPath = crate::core::domain::DerivationPath::SolletDeprecated
        .full_path(account_index)
        .parse()
        .map_err(|e| KeyringError::InvalidDerivationPath(format!("{}", e)))?;

    let root = XPriv::root_from_seed(seed, None)
        .map_err(|e| KeyringError::InvalidSeed(format!("BIP-32 root failed: {}", e)))?;
    let child = root
        .derive_path(&path)
        .map_err(|e| KeyringError::InvalidDerivationPath(format!("BIP-32 derivation failed: {}", e)))?;

    let signing_key: &SigningKey = child.as_ref();
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&signing_key.to_bytes());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const SEED_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn test_slip10_master_vector() {
        // SLIP-0010 ed25519 test vector 1, chain m
        let seed = hex::decode(SEED_HEX).unwrap();
        let master = Slip10Node::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(&master.key[..]),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            hex::encode(master.chain_code),
            "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb"
        );
    }

    #[test]
    fn test_slip10_hardened_child_vector() {
        // SLIP-0010 ed25519 test vector 1, chain m/0H
        let seed = hex::decode(SEED_HEX).unwrap();
        let child = Slip10Node::from_seed(&seed)
            .unwrap()
            .derive_child(crate::core::domain::HARDENED)
            .unwrap();
        assert_eq!(
            hex::encode(&child.key[..]),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_non_hardened_rejected() {
        let seed = hex::decode(SEED_HEX).unwrap();
        let master = Slip10Node::from_seed(&seed).unwrap();
        assert!(master.derive_child(1).is_err());
    }

    #[test_case(DerivationPath::Bip44 ; "bip44")]
    #[test_case(DerivationPath::Bip44Change ; "bip44 change")]
    #[test_case(DerivationPath::SolletDeprecated ; "sollet deprecated")]
    fn test_derivation_is_deterministic(path: DerivationPath) {
        let a = derive(SEED_HEX, 3, path).unwrap();
        let b = derive(SEED_HEX, 3, path).unwrap();
        let c = derive(SEED_HEX, 4, path).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn test_schemes_produce_distinct_keys() {
        let bip44 = derive(SEED_HEX, 0, DerivationPath::Bip44).unwrap();
        let change = derive(SEED_HEX, 0, DerivationPath::Bip44Change).unwrap();
        let sollet = derive(SEED_HEX, 0, DerivationPath::SolletDeprecated).unwrap();
        assert_ne!(bip44.public_key(), change.public_key());
        assert_ne!(change.public_key(), sollet.public_key());
    }

    #[test]
    fn test_derive_many_preserves_order() {
        let many = derive_many(SEED_HEX, DerivationPath::Bip44, &[5, 0, 2]).unwrap();
        let keys: Vec<String> = many.iter().map(|k| k.public_key()).collect();
        assert_eq!(keys[0], derive(SEED_HEX, 5, DerivationPath::Bip44).unwrap().public_key());
        assert_eq!(keys[1], derive(SEED_HEX, 0, DerivationPath::Bip44).unwrap().public_key());
        assert_eq!(keys[2], derive(SEED_HEX, 2, DerivationPath::Bip44).unwrap().public_key());
    }

    #[test_case("zz" ; "not hex")]
    #[test_case("0011" ; "too short")]
    #[test_case(&"00".repeat(65) ; "too long")]
    fn test_invalid_seed(seed_hex: &str) {
        assert!(matches!(
            derive(seed_hex, 0, DerivationPath::Bip44),
            Err(KeyringError::InvalidSeed(_))
        ));
    }
}
