//! Request/response boundary to a connected Ledger.
//!
//! The keyring never sees HID frames; it hands one `LedgerRequest` to a
//! session and gets the device's answer back as text.

use crate::core::errors::{KeyringError, KeyringResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const METHOD_SIGN_TRANSACTION: &str = "ledger-solana-sign-transaction";
pub const METHOD_SIGN_MESSAGE: &str = "ledger-solana-sign-message";
pub const METHOD_GET_PUBLIC_KEY: &str = "ledger-solana-get-public-key";

/// One remote call. `params` is `[base58 payload, path, account]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub method: String,
    pub params: (String, String, u32),
}

impl LedgerRequest {
    pub fn new(method: &str, payload: &[u8], path: &str, account: u32) -> Self {
        Self {
            method: method.to_string(),
            params: (bs58::encode(payload).into_string(), path.to_string(), account),
        }
    }

    pub fn sign_transaction(tx: &[u8], path: &str, account: u32) -> Self {
        Self::new(METHOD_SIGN_TRANSACTION, tx, path, account)
    }

    pub fn sign_message(msg: &[u8], path: &str, account: u32) -> Self {
        Self::new(METHOD_SIGN_MESSAGE, msg, path, account)
    }

    pub fn get_public_key(path: &str, account: u32) -> Self {
        Self::new(METHOD_GET_PUBLIC_KEY, &[], path, account)
    }

    pub fn payload(&self) -> KeyringResult<Vec<u8>> {
        bs58::decode(&self.params.0)
            .into_vec()
            .map_err(|e| KeyringError::TransportFailure(format!("payload is not base58: {}", e)))
    }

    pub fn path(&self) -> &str {
        &self.params.1
    }

    pub fn account(&self) -> u32 {
        self.params.2
    }
}

/// An open session to a hardware device. Owned by the caller and borrowed
/// for one request at a time.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Issue one request. Signatures and public keys come back base58.
    async fn request(&self, request: LedgerRequest) -> KeyringResult<String>;
}
