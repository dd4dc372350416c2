//! Collaborators the onboarding flow waits on: attaching a device and
//! resolving which account to onboard.

use super::steps::ResolveFlow;
use crate::core::domain::{DerivationPath, Ur, WalletDescriptor};
use crate::core::errors::{KeyringError, KeyringResult};
use crate::hardware::keystone::engine::KeystoneSolanaEngine;
use crate::hardware::keystone::registry::CryptoMultiAccounts;
use crate::hardware::ledger::{LedgerRequest, LedgerTransport};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What a resolver can reach for the chosen backend.
pub enum ResolveContext<'a> {
    Ledger { transport: &'a dyn LedgerTransport },
    Keystone { ur: &'a Ur },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Candidates in preference order; the flow onboards the first.
    pub accounts: Vec<WalletDescriptor>,
    pub derivation_path: DerivationPath,
}

#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, flow: &ResolveFlow, context: ResolveContext<'_>) -> KeyringResult<Resolution>;
}

/// Finds and opens a hardware transport session.
#[async_trait]
pub trait HardwareConnector: Send + Sync {
    async fn connect(&self) -> KeyringResult<Box<dyn LedgerTransport>>;
}

/// Lists the accounts in a scanned Keystone export.
#[derive(Debug, Clone, Default)]
pub struct KeystoneAccountResolver;

#[async_trait]
impl AccountResolver for KeystoneAccountResolver {
    async fn resolve(&self, _flow: &ResolveFlow, context: ResolveContext<'_>) -> KeyringResult<Resolution> {
        let ResolveContext::Keystone { ur } = context else {
            return Err(KeyringError::InternalConsistencyFault(
                "Keystone resolver given a Ledger context".to_string(),
            ));
        };

        let export = CryptoMultiAccounts::from_ur(ur)?;
        let accounts: Vec<WalletDescriptor> = KeystoneSolanaEngine::records_from_export(&export)?
            .into_iter()
            .filter_map(|record| match DerivationPath::parse_hardware_path(&record.path) {
                Some((scheme, index)) => Some(WalletDescriptor::new(record.public_key, scheme, index)),
                None => {
                    warn!("Skipping Keystone account at unsupported path {}", record.path);
                    None
                }
            })
            .collect();

        let derivation_path = accounts
            .first()
            .map(|a| a.derivation_path)
            .ok_or_else(|| KeyringError::ExchangeFailure("export contains no Solana accounts".to_string()))?;
        info!("Keystone export resolved to {} accounts", accounts.len());
        Ok(Resolution {
            accounts,
            derivation_path,
        })
    }
}

/// Resolves accounts by asking a Ledger for public keys.
#[derive(Debug, Clone)]
pub struct LedgerProbeResolver {
    derivation_path: DerivationPath,
    /// Public keys already onboarded; `Create` skips them.
    known: HashSet<String>,
    /// Index `Derive` hands out.
    next_index: u32,
    /// How many indices `Create`, `Search` and `Import` look at.
    probe_limit: u32,
}

impl LedgerProbeResolver {
    pub fn new(derivation_path: DerivationPath) -> Self {
        Self {
            derivation_path,
            known: HashSet::new(),
            next_index: 0,
            probe_limit: 10,
        }
    }

    pub fn with_known(mut self, known: impl IntoIterator<Item = String>) -> Self {
        self.known = known.into_iter().collect();
        self
    }

    pub fn with_next_index(mut self, next_index: u32) -> Self {
        self.next_index = next_index;
        self
    }

    pub fn with_probe_limit(mut self, probe_limit: u32) -> Self {
        self.probe_limit = probe_limit.max(1);
        self
    }

    async fn probe(
        &self,
        transport: &dyn LedgerTransport,
        scheme: DerivationPath,
        index: u32,
    ) -> KeyringResult<WalletDescriptor> {
        let path = scheme.hardware_path(index);
        let public_key = transport.request(LedgerRequest::get_public_key(&path, index)).await?;
        debug!("Probed {} -> {}", path, public_key);
        Ok(WalletDescriptor::new(public_key, scheme, index))
    }

    fn single(&self, descriptor: WalletDescriptor) -> Resolution {
        Resolution {
            derivation_path: descriptor.derivation_path,
            accounts: vec![descriptor],
        }
    }
}

#[async_trait]
impl AccountResolver for LedgerProbeResolver {
    async fn resolve(&self, flow: &ResolveFlow, context: ResolveContext<'_>) -> KeyringResult<Resolution> {
        let ResolveContext::Ledger { transport } = context else {
            return Err(KeyringError::InternalConsistencyFault(
                "Ledger resolver given a Keystone context".to_string(),
            ));
        };

        match flow {
            ResolveFlow::Create => {
                for index in 0..self.probe_limit {
                    let candidate = self.probe(transport, self.derivation_path, index).await?;
                    if !self.known.contains(&candidate.public_key) {
                        return Ok(self.single(candidate));
                    }
                }
                Err(KeyringError::AccountIndexNotFound(self.probe_limit))
            }
            ResolveFlow::Derive => {
                let candidate = self.probe(transport, self.derivation_path, self.next_index).await?;
                Ok(self.single(candidate))
            }
            ResolveFlow::Search { public_key } => {
                for scheme in [DerivationPath::Bip44Change, DerivationPath::Bip44] {
                    for index in 0..self.probe_limit {
                        let candidate = self.probe(transport, scheme, index).await?;
                        if &candidate.public_key == public_key {
                            return Ok(self.single(candidate));
                        }
                    }
                }
                Err(KeyringError::AddressNotFound(public_key.clone()))
            }
            ResolveFlow::Import => {
                let mut accounts = Vec::with_capacity(self.probe_limit as usize);
                for index in 0..self.probe_limit {
                    accounts.push(self.probe(transport, self.derivation_path, index).await?);
                }
                Ok(Resolution {
                    accounts,
                    derivation_path: self.derivation_path,
                })
            }
        }
    }
}
