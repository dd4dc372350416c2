pub mod config;
pub mod derivation;
pub mod domain;
pub mod errors;
pub mod keypair;
pub mod message_guard;

pub use domain::{
    DerivationPath, HardwareType, ImportedDerivationPath, SignedWalletDescriptor, Ur, WalletDescriptor,
};
pub use errors::{KeyringError, KeyringResult};
pub use keypair::Keypair;
