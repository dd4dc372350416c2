//! Mnemonic-backed hierarchical keyring
//!
//! Keeps one ordered list of (account index, keypair) entries so the index
//! and key sequences cannot drift apart.

use super::{Keyring, KeyringJson, TransactionSigner};
use crate::core::derivation;
use crate::core::domain::DerivationPath;
use crate::core::errors::{KeyringError, KeyringResult};
use crate::core::keypair::Keypair;
use crate::core::message_guard::looks_like_transaction_message;
use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Persisted HD keyring. Holds the mnemonic and seed in plaintext, so it must
/// only be written through encrypted storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HdKeyringJson {
    pub mnemonic: String,
    /// Hex-encoded BIP-39 seed.
    #[serde(alias = "seedHex")]
    pub seed: String,
    pub account_indices: Vec<u32>,
    pub derivation_path: DerivationPath,
}

impl fmt::Debug for HdKeyringJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyringJson")
            .field("mnemonic", &"<redacted>")
            .field("seed", &"<redacted>")
            .field("account_indices", &self.account_indices)
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

/// One derived account.
#[derive(Debug, Clone)]
pub struct HdAccount {
    pub account_index: u32,
    pub keypair: Keypair,
}

pub struct HdKeyring {
    mnemonic: SecretString,
    seed: Zeroizing<Vec<u8>>,
    derivation_path: DerivationPath,
    accounts: Vec<HdAccount>,
    strict_message_signing: bool,
}

impl HdKeyring {
    /// Validate the mnemonic and derive keypairs for `account_indices`.
    /// Nothing is kept if validation or derivation fails.
    pub fn from_mnemonic(
        mnemonic: &str,
        derivation_path: Option<DerivationPath>,
        account_indices: &[u32],
    ) -> KeyringResult<Self> {
        let derivation_path = derivation_path.unwrap_or_default();
        let parsed = Mnemonic::parse_in_normalized(Language::English, mnemonic).map_err(|e| {
            warn!("Rejected mnemonic: {}", e);
            KeyringError::InvalidMnemonic
        })?;
        let seed = Zeroizing::new(parsed.to_seed("").to_vec());

        let accounts = Self::derive_accounts(&seed, derivation_path, account_indices)?;
        info!(
            "HD keyring created: path={}, accounts={}",
            derivation_path,
            accounts.len()
        );

        Ok(Self {
            mnemonic: SecretString::new(parsed.to_string()),
            seed,
            derivation_path,
            accounts,
            strict_message_signing: false,
        })
    }

    /// Rebuild from persisted state. The mnemonic is trusted and not re-validated.
    pub fn from_json(json: &HdKeyringJson) -> KeyringResult<Self> {
        let seed = derivation::decode_seed(&json.seed)?;
        let accounts = Self::derive_accounts(&seed, json.derivation_path, &json.account_indices)?;
        debug!("HD keyring restored with {} accounts", accounts.len());

        Ok(Self {
            mnemonic: SecretString::new(json.mnemonic.clone()),
            seed,
            derivation_path: json.derivation_path,
            accounts,
            strict_message_signing: false,
        })
    }

    pub fn with_strict_message_signing(mut self, strict: bool) -> Self {
        self.strict_message_signing = strict;
        self
    }

    fn derive_accounts(
        seed: &[u8],
        derivation_path: DerivationPath,
        account_indices: &[u32],
    ) -> KeyringResult<Vec<HdAccount>> {
        account_indices
            .iter()
            .map(|&account_index| {
                derivation::derive_from_seed(seed, account_index, derivation_path)
                    .map(|keypair| HdAccount { account_index, keypair })
            })
            .collect()
    }

    pub fn mnemonic(&self) -> &SecretString {
        &self.mnemonic
    }

    pub fn derivation_path(&self) -> DerivationPath {
        self.derivation_path
    }

    pub fn accounts(&self) -> &[HdAccount] {
        &self.accounts
    }

    pub fn account_indices(&self) -> Vec<u32> {
        self.accounts.iter().map(|a| a.account_index).collect()
    }

    /// Derive and append an account. Without an explicit index the next one
    /// after the current maximum is used (0 for an empty keyring).
    ///
    /// Idempotent per index: importing an index the keyring already holds
    /// appends nothing and returns the existing `(public_key, index)`, so the
    /// keyring never carries two entries for one index.
    pub fn import_account_index(&mut self, account_index: Option<u32>) -> KeyringResult<(String, u32)> {
        let account_index = match account_index {
            Some(index) => index,
            None => match self.accounts.iter().map(|a| a.account_index).max() {
                Some(max) => max.checked_add(1).ok_or_else(|| {
                    KeyringError::InvalidDerivationPath("account index overflow".to_string())
                })?,
                None => 0,
            },
        };

        if let Some(existing) = self.accounts.iter().find(|a| a.account_index == account_index) {
            return Ok((existing.keypair.public_key(), account_index));
        }

        let keypair = derivation::derive_from_seed(&self.seed, account_index, self.derivation_path)?;
        let public_key = keypair.public_key();
        self.accounts.push(HdAccount { account_index, keypair });
        info!("Imported account index {} -> {}", account_index, public_key);
        Ok((public_key, account_index))
    }

    /// Public key for an account index (looked up by index, not position).
    pub fn get_public_key(&self, account_index: u32) -> KeyringResult<String> {
        self.accounts
            .iter()
            .find(|a| a.account_index == account_index)
            .map(|a| a.keypair.public_key())
            .ok_or(KeyringError::AccountIndexNotFound(account_index))
    }

    /// Base58 secret for `address`, or `None` if it is not held.
    pub fn export_secret_key(&self, address: &str) -> Option<String> {
        self.keypair(address).ok().map(|kp| kp.secret_base58().to_string())
    }

    fn keypair(&self, address: &str) -> KeyringResult<&Keypair> {
        self.accounts
            .iter()
            .map(|a| &a.keypair)
            .find(|kp| kp.public_key() == address)
            .ok_or_else(|| KeyringError::AddressNotFound(address.to_string()))
    }
}

impl fmt::Debug for HdKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyring")
            .field("derivation_path", &self.derivation_path)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}

impl Keyring for HdKeyring {
    fn public_keys(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.keypair.public_key()).collect()
    }

    fn delete_public_key(&mut self, public_key: &str) {
        if let Some(pos) = self.accounts.iter().position(|a| a.keypair.public_key() == public_key) {
            let removed = self.accounts.remove(pos);
            info!("Removed account index {}", removed.account_index);
        }
    }

    fn to_json(&self) -> KeyringJson {
        KeyringJson::Hd(HdKeyringJson {
            mnemonic: self.mnemonic.expose_secret().clone(),
            seed: hex::encode(&self.seed[..]),
            account_indices: self.account_indices(),
            derivation_path: self.derivation_path,
        })
    }
}

#[async_trait]
impl TransactionSigner for HdKeyring {
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String> {
        let keypair = self.keypair(address)?;
        debug!("Signing {} bytes with {}", tx.len(), address);
        Ok(keypair.sign_base58(tx))
    }

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String> {
        if self.strict_message_signing && looks_like_transaction_message(msg) {
            warn!("Refused message signature for {}: payload parses as a transaction", address);
            return Err(KeyringError::MessageLooksLikeTransaction);
        }
        self.sign_transaction(msg, address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keypair::verify_base58;
    use pretty_assertions::assert_eq;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn keyring(indices: &[u32]) -> HdKeyring {
        HdKeyring::from_mnemonic(MNEMONIC, Some(DerivationPath::Bip44), indices).unwrap()
    }

    #[test]
    fn test_invalid_checksum_rejected() {
        let bad = MNEMONIC.replace("about", "abandon");
        assert!(matches!(
            HdKeyring::from_mnemonic(&bad, None, &[0]),
            Err(KeyringError::InvalidMnemonic)
        ));
    }

    #[test]
    fn test_default_path_is_bip44_change() {
        let kr = HdKeyring::from_mnemonic(MNEMONIC, None, &[0]).unwrap();
        assert_eq!(kr.derivation_path(), DerivationPath::Bip44Change);
    }

    #[test]
    fn test_import_uses_max_plus_one() {
        let mut kr = keyring(&[0, 2]);
        let (_, index) = kr.import_account_index(None).unwrap();
        assert_eq!(index, 3);
        assert_eq!(kr.account_indices(), vec![0, 2, 3]);
    }

    #[test]
    fn test_import_into_empty_keyring_starts_at_zero() {
        let mut kr = keyring(&[]);
        assert_eq!(kr.import_account_index(None).unwrap().1, 0);
    }

    #[test]
    fn test_import_existing_index_is_idempotent() {
        let mut kr = keyring(&[0, 1]);
        let (pk, index) = kr.import_account_index(Some(1)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(pk, kr.get_public_key(1).unwrap());
        assert_eq!(kr.public_keys().len(), 2);
    }

    #[test]
    fn test_get_public_key_by_index_not_position() {
        let kr = keyring(&[4, 1]);
        let expected = derivation::derive_from_seed(&kr.seed, 1, DerivationPath::Bip44)
            .unwrap()
            .public_key();
        assert_eq!(kr.get_public_key(1).unwrap(), expected);
        assert!(matches!(kr.get_public_key(0), Err(KeyringError::AccountIndexNotFound(0))));
    }

    #[test]
    fn test_delete_preserves_order() {
        let mut kr = keyring(&[0, 1, 2]);
        let keys = kr.public_keys();
        kr.delete_public_key(&keys[1]);
        assert_eq!(kr.public_keys(), vec![keys[0].clone(), keys[2].clone()]);
        assert_eq!(kr.account_indices(), vec![0, 2]);

        kr.delete_public_key("not-a-member");
        assert_eq!(kr.account_indices(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_sign_message_matches_transaction_signature() {
        let kr = keyring(&[0]);
        let pk = kr.get_public_key(0).unwrap();
        let a = kr.sign_message(b"hello", &pk).await.unwrap();
        let b = kr.sign_transaction(b"hello", &pk).await.unwrap();
        assert_eq!(a, b);
        assert!(verify_base58(&pk, b"hello", &a));
    }

    #[tokio::test]
    async fn test_strict_mode_refuses_transaction_shaped_message() {
        let kr = keyring(&[0]).with_strict_message_signing(true);
        let pk = kr.get_public_key(0).unwrap();
        let tx = crate::core::message_guard::tests::legacy_transfer_message();
        assert!(matches!(
            kr.sign_message(&tx, &pk).await,
            Err(KeyringError::MessageLooksLikeTransaction)
        ));
        assert!(kr.sign_transaction(&tx, &pk).await.is_ok());
        assert!(kr.sign_message(b"plain text", &pk).await.is_ok());
    }

    #[test]
    fn test_debug_hides_mnemonic() {
        let kr = keyring(&[0]);
        assert!(!format!("{:?}", kr).contains("abandon"));
        let KeyringJson::Hd(json) = kr.to_json() else {
            panic!("expected hd json");
        };
        assert!(!format!("{:?}", json).contains("abandon"));
        assert_eq!(json.mnemonic, MNEMONIC);
    }
}
