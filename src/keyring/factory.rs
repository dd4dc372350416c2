//! Keyring construction under a `KeyringConfig`.

use super::{
    BlockchainKeyring, HdKeyring, HdKeyringJson, KeyringJson, KeystoneKeyring, KeystoneKeyringJson, LedgerKeyring,
    LedgerKeyringJson, SecretKeyring, SecretKeyringJson,
};
use crate::core::config::KeyringConfig;
use crate::core::domain::{DerivationPath, ImportedDerivationPath, Ur};
use crate::core::errors::KeyringResult;
use crate::hardware::ledger::{ApduExchange, SolanaLedgerApp};
use tracing::debug;

/// One entry point per backend, each applying the shared configuration.
#[derive(Debug, Clone, Default)]
pub struct KeyringFactory {
    config: KeyringConfig,
}

impl KeyringFactory {
    pub fn new(config: KeyringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KeyringConfig {
        &self.config
    }

    // HD

    /// `path` falls back to the configured default scheme.
    pub fn hd_from_mnemonic(
        &self,
        mnemonic: &str,
        path: Option<DerivationPath>,
        account_indices: &[u32],
    ) -> KeyringResult<HdKeyring> {
        let path = path.unwrap_or(self.config.default_derivation_path);
        Ok(HdKeyring::from_mnemonic(mnemonic, Some(path), account_indices)?
            .with_strict_message_signing(self.config.strict_message_signing))
    }

    pub fn hd_from_json(&self, json: &HdKeyringJson) -> KeyringResult<HdKeyring> {
        Ok(HdKeyring::from_json(json)?.with_strict_message_signing(self.config.strict_message_signing))
    }

    // Secret keys

    pub fn secret_from_keys(&self, secret_keys: &[String]) -> KeyringResult<SecretKeyring> {
        Ok(SecretKeyring::from_secret_keys(secret_keys)?
            .with_strict_message_signing(self.config.strict_message_signing))
    }

    pub fn secret_from_json(&self, json: &SecretKeyringJson) -> KeyringResult<SecretKeyring> {
        self.secret_from_keys(&json.secret_keys)
    }

    // Ledger

    pub fn ledger_from_accounts(&self, accounts: Vec<ImportedDerivationPath>) -> KeyringResult<LedgerKeyring> {
        LedgerKeyring::from_accounts(accounts)
    }

    pub fn ledger_from_json(&self, json: &LedgerKeyringJson) -> KeyringResult<LedgerKeyring> {
        LedgerKeyring::from_json(json)
    }

    /// Transport session for the Solana app over a raw APDU exchange.
    pub fn ledger_app<E: ApduExchange>(&self, exchange: E) -> SolanaLedgerApp<E> {
        SolanaLedgerApp::new(exchange).with_chunk_size(self.config.ledger_chunk_size)
    }

    // Keystone

    pub fn keystone_from_accounts(&self, accounts: Vec<ImportedDerivationPath>) -> KeyringResult<KeystoneKeyring> {
        KeystoneKeyring::from_accounts_with_origin(accounts, None, &self.config.keystone_origin)
    }

    pub async fn keystone_from_ur(&self, ur: Ur) -> KeyringResult<KeystoneKeyring> {
        KeystoneKeyring::from_ur_with_origin(ur, &self.config.keystone_origin).await
    }

    pub fn keystone_from_json(&self, json: &KeystoneKeyringJson) -> KeyringResult<KeystoneKeyring> {
        KeystoneKeyring::from_accounts_with_origin(json.accounts.clone(), json.xfp.as_deref(), &self.config.keystone_origin)
    }

    /// Rebuild any persisted keyring.
    pub fn from_json(&self, json: &KeyringJson) -> KeyringResult<BlockchainKeyring> {
        let keyring = match json {
            KeyringJson::Secret(j) => BlockchainKeyring::Secret(self.secret_from_json(j)?),
            KeyringJson::Hd(j) => BlockchainKeyring::Hd(self.hd_from_json(j)?),
            KeyringJson::Ledger(j) => BlockchainKeyring::Ledger(self.ledger_from_json(j)?),
            KeyringJson::Keystone(j) => BlockchainKeyring::Keystone(self.keystone_from_json(j)?),
        };
        debug!("Restored {} keyring", keyring.kind());
        Ok(keyring)
    }
}
