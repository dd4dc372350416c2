//! Keyrings
//!
//! Four backends behind one contract:
//! - `SecretKeyring`: individually imported secret keys
//! - `HdKeyring`: mnemonic-derived accounts
//! - `LedgerKeyring`: device-exposed addresses, signed over a transport
//! - `KeystoneKeyring`: air-gapped accounts, signed over a QR exchange

pub mod factory;
pub mod hd;
pub mod keystone;
pub mod ledger;
pub mod records;
pub mod secret;

pub use factory::KeyringFactory;
pub use hd::{HdAccount, HdKeyring, HdKeyringJson};
pub use keystone::{KeystoneKeyring, KeystoneKeyringJson};
pub use ledger::{LedgerKeyring, LedgerKeyringJson, LedgerSession};
pub use secret::{SecretKeyring, SecretKeyringJson};

use crate::core::errors::{KeyringError, KeyringResult};
use crate::hardware::ledger::LedgerTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Key set management shared by every backend.
pub trait Keyring: Send + Sync {
    fn public_keys(&self) -> Vec<String>;

    /// Remove `public_key`; unknown keys are ignored.
    fn delete_public_key(&mut self, public_key: &str);

    fn to_json(&self) -> KeyringJson;
}

/// Signing contract. Both calls fail with `AddressNotFound` for an address
/// the keyring does not hold.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String>;

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String>;
}

/// Persisted form of any keyring, tagged by backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyringJson {
    Secret(SecretKeyringJson),
    Hd(HdKeyringJson),
    Ledger(LedgerKeyringJson),
    Keystone(KeystoneKeyringJson),
}

impl KeyringJson {
    pub fn from_json_str(raw: &str) -> KeyringResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_string(&self) -> KeyringResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug)]
pub enum BlockchainKeyring {
    Secret(SecretKeyring),
    Hd(HdKeyring),
    Ledger(LedgerKeyring),
    Keystone(KeystoneKeyring),
}

impl BlockchainKeyring {
    /// Rebuild with default settings. Use `KeyringFactory::from_json` to apply
    /// a configuration.
    pub fn from_json(json: &KeyringJson) -> KeyringResult<Self> {
        Ok(match json {
            KeyringJson::Secret(j) => BlockchainKeyring::Secret(SecretKeyring::from_json(j)?),
            KeyringJson::Hd(j) => BlockchainKeyring::Hd(HdKeyring::from_json(j)?),
            KeyringJson::Ledger(j) => BlockchainKeyring::Ledger(LedgerKeyring::from_json(j)?),
            KeyringJson::Keystone(j) => BlockchainKeyring::Keystone(KeystoneKeyring::from_json(j)?),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BlockchainKeyring::Secret(_) => "secret",
            BlockchainKeyring::Hd(_) => "hd",
            BlockchainKeyring::Ledger(_) => "ledger",
            BlockchainKeyring::Keystone(_) => "keystone",
        }
    }

    fn as_keyring(&self) -> &dyn Keyring {
        match self {
            BlockchainKeyring::Secret(k) => k,
            BlockchainKeyring::Hd(k) => k,
            BlockchainKeyring::Ledger(k) => k,
            BlockchainKeyring::Keystone(k) => k,
        }
    }

    fn as_keyring_mut(&mut self) -> &mut dyn Keyring {
        match self {
            BlockchainKeyring::Secret(k) => k,
            BlockchainKeyring::Hd(k) => k,
            BlockchainKeyring::Ledger(k) => k,
            BlockchainKeyring::Keystone(k) => k,
        }
    }

    /// Signer for this keyring. Ledger keyrings need an open transport.
    pub fn signer<'a>(
        &'a self,
        transport: Option<&'a dyn LedgerTransport>,
    ) -> KeyringResult<Box<dyn TransactionSigner + 'a>> {
        let signer: Box<dyn TransactionSigner + 'a> = match self {
            BlockchainKeyring::Secret(k) => Box::new(Ref(k)),
            BlockchainKeyring::Hd(k) => Box::new(Ref(k)),
            BlockchainKeyring::Keystone(k) => Box::new(Ref(k)),
            BlockchainKeyring::Ledger(k) => {
                let transport = transport
                    .ok_or_else(|| KeyringError::TransportFailure("no Ledger transport session".to_string()))?;
                Box::new(k.session(transport))
            }
        };
        Ok(signer)
    }
}

impl Keyring for BlockchainKeyring {
    fn public_keys(&self) -> Vec<String> {
        self.as_keyring().public_keys()
    }

    fn delete_public_key(&mut self, public_key: &str) {
        self.as_keyring_mut().delete_public_key(public_key)
    }

    fn to_json(&self) -> KeyringJson {
        self.as_keyring().to_json()
    }
}

/// Borrowed signer.
struct Ref<'a, T>(&'a T);

#[async_trait]
impl<T: TransactionSigner> TransactionSigner for Ref<'_, T> {
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String> {
        self.0.sign_transaction(tx, address).await
    }

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String> {
        self.0.sign_message(msg, address).await
    }
}
