//! Software keyring over individually imported secret keys.

use super::{Keyring, KeyringJson, TransactionSigner};
use crate::core::errors::{KeyringError, KeyringResult};
use crate::core::keypair::Keypair;
use crate::core::message_guard::looks_like_transaction_message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Persisted form: hex-encoded 64-byte keypairs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyringJson {
    pub secret_keys: Vec<String>,
}

impl fmt::Debug for SecretKeyringJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyringJson")
            .field("secret_keys", &format_args!("<{} redacted>", self.secret_keys.len()))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SecretKeyring {
    keypairs: Vec<Keypair>,
    strict_message_signing: bool,
}

impl SecretKeyring {
    pub fn from_secret_keys(secret_keys: &[String]) -> KeyringResult<Self> {
        let keypairs = secret_keys
            .iter()
            .map(|s| Keypair::from_secret_hex(s))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Secret keyring loaded with {} keys", keypairs.len());
        Ok(Self {
            keypairs,
            strict_message_signing: false,
        })
    }

    pub fn from_json(json: &SecretKeyringJson) -> KeyringResult<Self> {
        Self::from_secret_keys(&json.secret_keys)
    }

    pub fn with_strict_message_signing(mut self, strict: bool) -> Self {
        self.strict_message_signing = strict;
        self
    }

    fn keypair(&self, address: &str) -> KeyringResult<&Keypair> {
        self.keypairs
            .iter()
            .find(|kp| kp.public_key() == address)
            .ok_or_else(|| KeyringError::AddressNotFound(address.to_string()))
    }

    /// Base58 secret for `address`, or `None` if it is not held.
    pub fn export_secret_key(&self, address: &str) -> Option<String> {
        self.keypair(address).ok().map(|kp| kp.secret_base58().to_string())
    }

    /// Import a hex-encoded keypair and return its public key.
    pub fn import_secret_key(&mut self, secret_key: &str) -> KeyringResult<String> {
        let keypair = Keypair::from_secret_hex(secret_key)?;
        let public_key = keypair.public_key();
        if self.keypairs.iter().any(|kp| kp.public_key() == public_key) {
            return Err(KeyringError::DuplicatePublicKey(public_key));
        }
        self.keypairs.push(keypair);
        Ok(public_key)
    }
}

impl Keyring for SecretKeyring {
    fn public_keys(&self) -> Vec<String> {
        self.keypairs.iter().map(|kp| kp.public_key()).collect()
    }

    fn delete_public_key(&mut self, public_key: &str) {
        self.keypairs.retain(|kp| kp.public_key() != public_key);
    }

    fn to_json(&self) -> KeyringJson {
        KeyringJson::Secret(SecretKeyringJson {
            secret_keys: self.keypairs.iter().map(|kp| kp.secret_hex().to_string()).collect(),
        })
    }
}

#[async_trait]
impl TransactionSigner for SecretKeyring {
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String> {
        let keypair = self.keypair(address)?;
        debug!("Signing {} bytes with {}", tx.len(), address);
        Ok(keypair.sign_base58(tx))
    }

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String> {
        if self.strict_message_signing && looks_like_transaction_message(msg) {
            return Err(KeyringError::MessageLooksLikeTransaction);
        }
        self.sign_transaction(msg, address).await
    }
}
