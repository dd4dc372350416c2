//! Ledger Solana app over an APDU exchange
//!
//! Implements `LedgerTransport` for a physical device: requests are turned
//! into chunked APDUs and the raw answer is encoded as base58.

use super::apdu::{
    ApduCommand, ApduInstruction, ApduResponse, MAX_PAYLOAD, P1_CONFIRM, P1_NON_CONFIRM, P2_EXTEND, P2_MORE,
};
use super::transport::{
    LedgerRequest, LedgerTransport, METHOD_GET_PUBLIC_KEY, METHOD_SIGN_MESSAGE, METHOD_SIGN_TRANSACTION,
};
use crate::core::domain::HARDENED;
use crate::core::errors::{KeyringError, KeyringResult};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, info};

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Deepest path the one-byte depth prefix is allowed to describe.
const MAX_PATH_DEPTH: usize = 10;

/// BIP32 path as sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Path {
    path: Vec<u32>,
}

impl Bip32Path {
    pub fn new(path: Vec<u32>) -> KeyringResult<Self> {
        if path.is_empty() || path.len() > MAX_PATH_DEPTH {
            return Err(KeyringError::InvalidDerivationPath(format!(
                "path depth {} outside 1..={}",
                path.len(),
                MAX_PATH_DEPTH
            )));
        }
        Ok(Self { path })
    }

    pub fn components(&self) -> &[u32] {
        &self.path
    }

    /// `[depth][u32 BE]...`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 4 * self.path.len());
        bytes.push(self.path.len() as u8);
        for index in &self.path {
            bytes.extend_from_slice(&index.to_be_bytes());
        }
        bytes
    }
}

impl FromStr for Bip32Path {
    type Err = KeyringError;

    /// Parses `44'/501'/0'/0'`, with or without a leading `m/`.
    fn from_str(path_str: &str) -> Result<Self, Self::Err> {
        let trimmed = path_str.trim();
        let body = trimmed.strip_prefix("m/").unwrap_or(trimmed);
        if body.is_empty() || body == "m" {
            return Err(KeyringError::InvalidDerivationPath(format!(
                "path needs at least one component: {}",
                path_str
            )));
        }

        let mut path = Vec::new();
        for part in body.split('/') {
            let hardened = part.ends_with('\'') || part.ends_with('h');
            let num_str = part.trim_end_matches('\'').trim_end_matches('h');
            let num: u32 = num_str
                .parse()
                .map_err(|_| KeyringError::InvalidDerivationPath(format!("bad component '{}' in {}", part, path_str)))?;
            if num >= HARDENED {
                return Err(KeyringError::InvalidDerivationPath(format!("component out of range: {}", part)));
            }
            path.push(if hardened { HARDENED | num } else { num });
        }

        Self::new(path)
    }
}

/// Raw APDU round trip to a device (HID, BLE, speculos...).
#[async_trait]
pub trait ApduExchange: Send + Sync {
    async fn exchange(&self, command: &ApduCommand) -> KeyringResult<ApduResponse>;
}

#[async_trait]
impl<E: ApduExchange + ?Sized> ApduExchange for &E {
    async fn exchange(&self, command: &ApduCommand) -> KeyringResult<ApduResponse> {
        (**self).exchange(command).await
    }
}

/// The Solana app on a connected Ledger.
pub struct SolanaLedgerApp<E> {
    exchange: E,
    chunk_size: usize,
}

impl<E: ApduExchange> SolanaLedgerApp<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange,
            chunk_size: MAX_PAYLOAD,
        }
    }

    /// Limit frame payloads; clamped to 1..=255.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PAYLOAD);
        self
    }

    pub async fn get_public_key(&self, path: &Bip32Path) -> KeyringResult<[u8; PUBLIC_KEY_LEN]> {
        let command = ApduCommand::new(ApduInstruction::GetPublicKey, P1_NON_CONFIRM, 0, path.to_bytes());
        let data = self.exchange.exchange(&command).await?.into_result()?;
        data.get(..PUBLIC_KEY_LEN)
            .and_then(|bytes| <[u8; PUBLIC_KEY_LEN]>::try_from(bytes).ok())
            .ok_or_else(|| KeyringError::TransportFailure(format!("public key response has {} bytes", data.len())))
    }

    /// Sign with the key at `path`. `ins` selects transaction or off-chain message.
    pub async fn sign(&self, ins: ApduInstruction, path: &Bip32Path, payload: &[u8]) -> KeyringResult<[u8; SIGNATURE_LEN]> {
        let mut data = vec![1u8]; // one signer
        data.extend_from_slice(&path.to_bytes());
        data.extend_from_slice(payload);

        let chunks: Vec<&[u8]> = data.chunks(self.chunk_size).collect();
        let last = chunks.len().saturating_sub(1);
        let mut response = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut p2 = 0;
            if i > 0 {
                p2 |= P2_EXTEND;
            }
            if i < last {
                p2 |= P2_MORE;
            }
            let command = ApduCommand::new(ins, P1_CONFIRM, p2, chunk.to_vec());
            debug!("Sending frame {}/{} ({} bytes)", i + 1, chunks.len(), chunk.len());
            response = Some(self.exchange.exchange(&command).await?.into_result()?);
        }

        let data = response.unwrap_or_default();
        <[u8; SIGNATURE_LEN]>::try_from(data.as_slice())
            .map_err(|_| KeyringError::TransportFailure(format!("signature response has {} bytes", data.len())))
    }
}

#[async_trait]
impl<E: ApduExchange> LedgerTransport for SolanaLedgerApp<E> {
    async fn request(&self, request: LedgerRequest) -> KeyringResult<String> {
        let path: Bip32Path = request.path().parse()?;
        info!("Ledger request {} at {}", request.method, request.path());

        let bytes = match request.method.as_str() {
            METHOD_SIGN_TRANSACTION => {
                self.sign(ApduInstruction::SignTransaction, &path, &request.payload()?)
                    .await?
                    .to_vec()
            }
            METHOD_SIGN_MESSAGE => {
                self.sign(ApduInstruction::SignOffchainMessage, &path, &request.payload()?)
                    .await?
                    .to_vec()
            }
            METHOD_GET_PUBLIC_KEY => self.get_public_key(&path).await?.to_vec(),
            other => {
                return Err(KeyringError::TransportFailure(format!("unsupported method: {}", other)));
            }
        };
        Ok(bs58::encode(bytes).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every command and answers from a script.
    #[derive(Clone, Default)]
    struct ScriptedDevice {
        sent: Arc<Mutex<Vec<ApduCommand>>>,
        replies: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedDevice {
        fn reply(&self, bytes: Vec<u8>) {
            self.replies.lock().push(bytes);
        }
    }

    #[async_trait]
    impl ApduExchange for ScriptedDevice {
        async fn exchange(&self, command: &ApduCommand) -> KeyringResult<ApduResponse> {
            self.sent.lock().push(command.clone());
            let mut replies = self.replies.lock();
            let next = if replies.is_empty() { vec![0x90, 0x00] } else { replies.remove(0) };
            ApduResponse::from_bytes(&next)
        }
    }

    fn ok(data: &[u8]) -> Vec<u8> {
        let mut v = data.to_vec();
        v.extend_from_slice(&[0x90, 0x00]);
        v
    }

    #[test]
    fn test_path_parsing() {
        let path: Bip32Path = "44'/501'/3'/0'".parse().unwrap();
        assert_eq!(path.components(), [HARDENED | 44, HARDENED | 501, HARDENED | 3, HARDENED]);
        let rooted: Bip32Path = "m/501'/0'/0/0".parse().unwrap();
        assert_eq!(rooted.components(), [HARDENED | 501, HARDENED, 0, 0]);
        assert!("m/".parse::<Bip32Path>().is_err());
        assert!("44'/x'".parse::<Bip32Path>().is_err());
    }

    #[test]
    fn test_path_depth_is_bounded() {
        assert!(Bip32Path::new(vec![HARDENED; 10]).is_ok());
        assert!(matches!(
            Bip32Path::new(vec![HARDENED; 11]),
            Err(KeyringError::InvalidDerivationPath(_))
        ));
        assert!(Bip32Path::new(Vec::new()).is_err());
        assert!("0/1/2/3/4/5/6/7/8/9/10".parse::<Bip32Path>().is_err());
    }

    #[test]
    fn test_path_bytes() {
        let path: Bip32Path = "44'/501'".parse().unwrap();
        assert_eq!(path.to_bytes(), vec![2, 0x80, 0, 0, 44, 0x80, 0, 0x01, 0xF5]);
    }

    #[tokio::test]
    async fn test_sign_is_chunked_with_extend_and_more_flags() {
        let device = ScriptedDevice::default();
        device.reply(ok(&[]));
        device.reply(ok(&[]));
        device.reply(ok(&[7u8; 64]));
        let app = SolanaLedgerApp::new(device.clone()).with_chunk_size(10);

        // 1 signer + 1 depth + 12 path bytes + 16 payload = 30 bytes -> 3 frames
        let path: Bip32Path = "44'/501'/0'".parse().unwrap();
        let sig = app.sign(ApduInstruction::SignTransaction, &path, &[9u8; 16]).await.unwrap();
        assert_eq!(sig, [7u8; 64]);

        let sent = device.sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].p2, P2_MORE);
        assert_eq!(sent[1].p2, P2_EXTEND | P2_MORE);
        assert_eq!(sent[2].p2, P2_EXTEND);
        assert!(sent.iter().all(|c| c.p1 == P1_CONFIRM && c.ins == 0x06));
        assert_eq!(sent[0].data[0], 1);
    }

    #[tokio::test]
    async fn test_request_returns_base58_signature() {
        let device = ScriptedDevice::default();
        device.reply(ok(&[3u8; 64]));
        let app = SolanaLedgerApp::new(device.clone());

        let sig = app
            .request(LedgerRequest::sign_message(b"hi", "44'/501'/0'/0'", 0))
            .await
            .unwrap();
        assert_eq!(sig, bs58::encode([3u8; 64]).into_string());
        assert_eq!(device.sent.lock()[0].ins, ApduInstruction::SignOffchainMessage as u8);
    }

    #[tokio::test]
    async fn test_device_rejection_is_transport_failure() {
        let device = ScriptedDevice::default();
        device.reply(vec![0x69, 0x85]);
        let app = SolanaLedgerApp::new(device);
        let err = app
            .request(LedgerRequest::sign_transaction(b"tx", "44'/501'/0'", 0))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_public_key() {
        let device = ScriptedDevice::default();
        device.reply(ok(&[5u8; 32]));
        let app = SolanaLedgerApp::new(device.clone());
        let pk = app
            .request(LedgerRequest::get_public_key("44'/501'/1'", 1))
            .await
            .unwrap();
        assert_eq!(pk, bs58::encode([5u8; 32]).into_string());
        let sent = device.sent.lock();
        assert_eq!(sent[0].p1, P1_NON_CONFIRM);
        assert_eq!(sent[0].data[0], 3);
    }
}
