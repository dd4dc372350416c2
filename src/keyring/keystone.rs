//! Keyring over accounts exported by a Keystone device.
//!
//! Signing is delegated to an `AirgapExchange` engine which talks to the
//! device through an `AirgapInteraction`. By default the interaction is a
//! channel whose application end is handed out by `take_port`.

use super::{Keyring, KeyringJson, TransactionSigner};
use crate::core::domain::{ImportedDerivationPath, Ur};
use crate::core::errors::{KeyringError, KeyringResult};
use crate::hardware::keystone::engine::parse_fingerprint;
use crate::hardware::keystone::{channel, AirgapExchange, AirgapInteraction, AirgapPort, FixedRead, KeystoneSolanaEngine};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_ORIGIN: &str = "sol-keyring";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoneKeyringJson {
    pub accounts: Vec<ImportedDerivationPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfp: Option<String>,
}

pub struct KeystoneKeyring {
    engine: Box<dyn AirgapExchange>,
    interaction: Arc<dyn AirgapInteraction>,
    port: Option<AirgapPort>,
}

impl KeystoneKeyring {
    pub fn new(engine: Box<dyn AirgapExchange>) -> Self {
        let (interaction, port) = channel();
        Self {
            engine,
            interaction: Arc::new(interaction),
            port: Some(port),
        }
    }

    pub fn from_accounts(accounts: Vec<ImportedDerivationPath>) -> KeyringResult<Self> {
        Self::from_accounts_with_origin(accounts, None, DEFAULT_ORIGIN)
    }

    pub fn from_accounts_with_origin(
        accounts: Vec<ImportedDerivationPath>,
        xfp: Option<&str>,
        origin: &str,
    ) -> KeyringResult<Self> {
        let fingerprint = xfp.map(parse_fingerprint).transpose()?;
        let engine = KeystoneSolanaEngine::new(origin).with_accounts(accounts, fingerprint)?;
        Ok(Self::new(Box::new(engine)))
    }

    pub fn from_json(json: &KeystoneKeyringJson) -> KeyringResult<Self> {
        Self::from_accounts_with_origin(json.accounts.clone(), json.xfp.as_deref(), DEFAULT_ORIGIN)
    }

    /// Build by importing from an already-scanned account export.
    pub async fn from_ur(ur: Ur) -> KeyringResult<Self> {
        Self::from_ur_with_origin(ur, DEFAULT_ORIGIN).await
    }

    pub async fn from_ur_with_origin(ur: Ur, origin: &str) -> KeyringResult<Self> {
        let mut keyring = Self::new(Box::new(KeystoneSolanaEngine::new(origin)));
        keyring.keystone_import(ur).await?;
        Ok(keyring)
    }

    /// Replace the interaction. Any port handed out earlier goes dead.
    pub fn with_interaction(mut self, interaction: Arc<dyn AirgapInteraction>) -> Self {
        self.interaction = interaction;
        self.port = None;
        self
    }

    /// Application end of the default channel. Available once.
    pub fn take_port(&mut self) -> Option<AirgapPort> {
        self.port.take()
    }

    /// Import the accounts in `ur` without touching the interaction.
    pub async fn keystone_import(&mut self, ur: Ur) -> KeyringResult<()> {
        let reader = FixedRead::new(ur);
        self.engine.read_keyring(&reader).await?;
        info!("Keystone import complete: {} accounts", self.engine.accounts().len());
        Ok(())
    }

    pub fn get_accounts(&self) -> Vec<ImportedDerivationPath> {
        self.engine.accounts()
    }

    /// Master key fingerprint of the device the accounts came from.
    pub fn xfp(&self) -> Option<String> {
        self.engine.master_fingerprint()
    }

    fn require_known(&self, address: &str) -> KeyringResult<()> {
        if self.engine.accounts().iter().any(|a| a.public_key == address) {
            Ok(())
        } else {
            warn!("Keystone signing refused for unknown address {}", address);
            Err(KeyringError::AddressNotFound(address.to_string()))
        }
    }
}

impl fmt::Debug for KeystoneKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoneKeyring")
            .field("accounts", &self.engine.accounts().len())
            .field("xfp", &self.xfp())
            .finish_non_exhaustive()
    }
}

impl Keyring for KeystoneKeyring {
    fn public_keys(&self) -> Vec<String> {
        self.engine.accounts().into_iter().map(|a| a.public_key).collect()
    }

    fn delete_public_key(&mut self, public_key: &str) {
        self.engine.remove_account(public_key);
    }

    fn to_json(&self) -> KeyringJson {
        KeyringJson::Keystone(KeystoneKeyringJson {
            accounts: self.get_accounts(),
            xfp: self.xfp(),
        })
    }
}

#[async_trait]
impl TransactionSigner for KeystoneKeyring {
    /// Signature comes back hex-encoded.
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String> {
        self.require_known(address)?;
        let sig = self
            .engine
            .sign_transaction(self.interaction.as_ref(), address, tx)
            .await?;
        Ok(hex::encode(sig))
    }

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String> {
        self.require_known(address)?;
        let sig = self
            .engine
            .sign_message(self.interaction.as_ref(), address, msg)
            .await?;
        Ok(hex::encode(sig))
    }
}
