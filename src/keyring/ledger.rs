//! Keyring over addresses a Ledger has exposed.
//!
//! Holds no key material. Each signature is one request over a transport
//! session the caller owns and lends for the call.

use super::records::ImportedAccounts;
use super::{Keyring, KeyringJson, TransactionSigner};
use crate::core::domain::ImportedDerivationPath;
use crate::core::errors::KeyringResult;
use crate::hardware::ledger::{LedgerRequest, LedgerTransport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKeyringJson {
    pub derivation_paths: Vec<ImportedDerivationPath>,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerKeyring {
    accounts: ImportedAccounts,
}

impl LedgerKeyring {
    pub fn from_accounts(accounts: Vec<ImportedDerivationPath>) -> KeyringResult<Self> {
        let accounts = ImportedAccounts::from_records(accounts)?;
        info!("Ledger keyring loaded with {} accounts", accounts.len());
        Ok(Self { accounts })
    }

    pub fn from_json(json: &LedgerKeyringJson) -> KeyringResult<Self> {
        Self::from_accounts(json.derivation_paths.clone())
    }

    /// Add one device-exposed address.
    pub fn ledger_import(&mut self, path: &str, account: u32, public_key: &str) -> KeyringResult<()> {
        self.accounts.insert(ImportedDerivationPath {
            path: path.to_string(),
            account,
            public_key: public_key.to_string(),
        })
    }

    pub fn key_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn accounts(&self) -> &[ImportedDerivationPath] {
        self.accounts.records()
    }

    /// Pair this keyring with a transport for signing.
    pub fn session<'a>(&'a self, transport: &'a dyn LedgerTransport) -> LedgerSession<'a> {
        LedgerSession {
            keyring: self,
            transport,
        }
    }

    pub async fn sign_transaction(
        &self,
        transport: &dyn LedgerTransport,
        tx: &[u8],
        address: &str,
    ) -> KeyringResult<String> {
        let record = self.accounts.require(address)?;
        self.dispatch(transport, LedgerRequest::sign_transaction(tx, &record.path, record.account))
            .await
    }

    pub async fn sign_message(
        &self,
        transport: &dyn LedgerTransport,
        msg: &[u8],
        address: &str,
    ) -> KeyringResult<String> {
        let record = self.accounts.require(address)?;
        self.dispatch(transport, LedgerRequest::sign_message(msg, &record.path, record.account))
            .await
    }

    async fn dispatch(&self, transport: &dyn LedgerTransport, request: LedgerRequest) -> KeyringResult<String> {
        info!("Ledger {} for account {}", request.method, request.account());
        transport.request(request).await.map_err(|e| {
            warn!("Ledger request failed: {}", e);
            e
        })
    }
}

impl Keyring for LedgerKeyring {
    fn public_keys(&self) -> Vec<String> {
        self.accounts.public_keys()
    }

    fn delete_public_key(&mut self, public_key: &str) {
        self.accounts.remove(public_key);
    }

    fn to_json(&self) -> KeyringJson {
        KeyringJson::Ledger(LedgerKeyringJson {
            derivation_paths: self.accounts.records().to_vec(),
        })
    }
}

/// A Ledger keyring bound to an open transport.
pub struct LedgerSession<'a> {
    keyring: &'a LedgerKeyring,
    transport: &'a dyn LedgerTransport,
}

#[async_trait]
impl TransactionSigner for LedgerSession<'_> {
    async fn sign_transaction(&self, tx: &[u8], address: &str) -> KeyringResult<String> {
        self.keyring.sign_transaction(self.transport, tx, address).await
    }

    async fn sign_message(&self, msg: &[u8], address: &str) -> KeyringResult<String> {
        self.keyring.sign_message(self.transport, msg, address).await
    }
}
