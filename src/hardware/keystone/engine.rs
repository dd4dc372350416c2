//! Solana engine for a Keystone device
//!
//! Holds the accounts the device exported and turns signing requests into
//! `sol-sign-request` / `sol-signature` round trips over an interaction.

use super::interaction::AirgapInteraction;
use super::registry::{CryptoKeypath, CryptoMultiAccounts, SignType, SolSignRequest, SolSignature, UR_SOL_SIGNATURE};
use crate::core::domain::ImportedDerivationPath;
use crate::core::errors::{KeyringError, KeyringResult};
use crate::core::keypair::decode_address;
use crate::keyring::records::ImportedAccounts;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Vendor exchange capability the Keystone keyring delegates to.
#[async_trait]
pub trait AirgapExchange: Send + Sync {
    /// Read an account export through `interaction` and replace the held records.
    async fn read_keyring(&mut self, interaction: &dyn AirgapInteraction) -> KeyringResult<()>;

    fn accounts(&self) -> Vec<ImportedDerivationPath>;

    /// Master key fingerprint as 8 hex digits.
    fn master_fingerprint(&self) -> Option<String>;

    fn remove_account(&mut self, public_key: &str) -> bool;

    async fn sign_transaction(
        &self,
        interaction: &dyn AirgapInteraction,
        address: &str,
        tx: &[u8],
    ) -> KeyringResult<Vec<u8>>;

    async fn sign_message(
        &self,
        interaction: &dyn AirgapInteraction,
        address: &str,
        msg: &[u8],
    ) -> KeyringResult<Vec<u8>>;
}

pub struct KeystoneSolanaEngine {
    accounts: ImportedAccounts,
    master_fingerprint: Option<u32>,
    origin: String,
}

pub fn format_fingerprint(fp: u32) -> String {
    format!("{:08x}", fp)
}

pub fn parse_fingerprint(xfp: &str) -> KeyringResult<u32> {
    u32::from_str_radix(xfp.trim(), 16).map_err(|_| KeyringError::InvalidUr(format!("bad master fingerprint: {}", xfp)))
}

impl KeystoneSolanaEngine {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            accounts: ImportedAccounts::new(),
            master_fingerprint: None,
            origin: origin.into(),
        }
    }

    /// Seed with records that were imported earlier.
    pub fn with_accounts(
        mut self,
        records: Vec<ImportedDerivationPath>,
        master_fingerprint: Option<u32>,
    ) -> KeyringResult<Self> {
        self.accounts = ImportedAccounts::from_records(records)?;
        self.master_fingerprint = master_fingerprint;
        Ok(self)
    }

    /// Records from a decoded account export.
    pub fn records_from_export(export: &CryptoMultiAccounts) -> KeyringResult<Vec<ImportedDerivationPath>> {
        export
            .keys
            .iter()
            .map(|key| {
                let origin = key
                    .origin
                    .as_ref()
                    .ok_or_else(|| KeyringError::InvalidUr("exported key has no origin path".to_string()))?;
                let account = origin
                    .account_index()
                    .ok_or_else(|| KeyringError::InvalidUr(format!("path too short: {}", origin.path_string())))?;
                if key.key_data.len() != 32 {
                    return Err(KeyringError::InvalidUr(format!(
                        "expected 32-byte ed25519 key, got {}",
                        key.key_data.len()
                    )));
                }
                Ok(ImportedDerivationPath {
                    path: origin.path_string(),
                    account,
                    public_key: bs58::encode(&key.key_data).into_string(),
                })
            })
            .collect()
    }

    async fn sign(
        &self,
        interaction: &dyn AirgapInteraction,
        address: &str,
        data: &[u8],
        sign_type: SignType,
    ) -> KeyringResult<Vec<u8>> {
        let record = self.accounts.require(address)?;
        let request = SolSignRequest {
            request_id: Uuid::new_v4(),
            sign_data: data.to_vec(),
            derivation_path: CryptoKeypath::parse(&record.path, self.master_fingerprint)?,
            address: Some(decode_address(address)?.to_vec()),
            origin: Some(self.origin.clone()),
            sign_type,
        };
        debug!("Keystone sign request {} for {}", request.request_id, address);

        let reply = interaction.exchange(request.to_ur()?).await?;
        if reply.ur_type != UR_SOL_SIGNATURE {
            return Err(KeyringError::ExchangeFailure(format!("unexpected reply type {}", reply.ur_type)));
        }
        let signature = SolSignature::from_ur(&reply)?;
        if signature.request_id != request.request_id {
            warn!("Keystone reply for {} does not match request {}", signature.request_id, request.request_id);
            return Err(KeyringError::ExchangeFailure("signature does not match the request".to_string()));
        }
        if signature.signature.len() != 64 {
            return Err(KeyringError::ExchangeFailure(format!(
                "signature has {} bytes",
                signature.signature.len()
            )));
        }
        Ok(signature.signature)
    }
}

#[async_trait]
impl AirgapExchange for KeystoneSolanaEngine {
    async fn read_keyring(&mut self, interaction: &dyn AirgapInteraction) -> KeyringResult<()> {
        let ur = interaction.read().await?;
        let export = CryptoMultiAccounts::from_ur(&ur)?;
        let accounts = ImportedAccounts::from_records(Self::records_from_export(&export)?)?;
        info!(
            "Keystone export read: {} accounts, xfp {}",
            accounts.len(),
            format_fingerprint(export.master_fingerprint)
        );
        self.accounts = accounts;
        self.master_fingerprint = Some(export.master_fingerprint);
        Ok(())
    }

    fn accounts(&self) -> Vec<ImportedDerivationPath> {
        self.accounts.records().to_vec()
    }

    fn master_fingerprint(&self) -> Option<String> {
        self.master_fingerprint.map(format_fingerprint)
    }

    fn remove_account(&mut self, public_key: &str) -> bool {
        self.accounts.remove(public_key)
    }

    async fn sign_transaction(
        &self,
        interaction: &dyn AirgapInteraction,
        address: &str,
        tx: &[u8],
    ) -> KeyringResult<Vec<u8>> {
        self.sign(interaction, address, tx, SignType::Transaction).await
    }

    async fn sign_message(
        &self,
        interaction: &dyn AirgapInteraction,
        address: &str,
        msg: &[u8],
    ) -> KeyringResult<Vec<u8>> {
        self.sign(interaction, address, msg, SignType::Message).await
    }
}
