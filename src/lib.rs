//! Solana keyrings and hardware onboarding.
//!
//! - `core`: derivation schemes, keypairs, configuration, errors
//! - `keyring`: secret-key, HD, Ledger and Keystone keyrings behind one
//!   signing contract
//! - `hardware`: Ledger APDU transport and the Keystone QR exchange
//! - `onboard`: the step machine that onboards a hardware account

pub mod core;
pub mod hardware;
pub mod keyring;
pub mod logging;
pub mod onboard;

pub use crate::core::config::KeyringConfig;
pub use crate::core::domain::{
    DerivationPath, HardwareType, ImportedDerivationPath, SignedWalletDescriptor, Ur, WalletDescriptor,
};
pub use crate::core::errors::{KeyringError, KeyringResult};
pub use keyring::{
    BlockchainKeyring, HdKeyring, Keyring, KeyringFactory, KeyringJson, KeystoneKeyring, LedgerKeyring, SecretKeyring,
    TransactionSigner,
};
pub use onboard::{FlowEvent, FlowSpec, OnboardingSequencer, ResolveFlow};
