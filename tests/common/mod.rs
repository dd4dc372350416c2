//! Simulated devices shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use parking_lot::Mutex;
use sol_keyring::core::derivation::derive;
use sol_keyring::core::keypair::Keypair;
use sol_keyring::hardware::keystone::registry::{
    CryptoHdKey, CryptoKeypath, CryptoMultiAccounts, SolSignRequest, SolSignature, UR_QR_HARDWARE_CALL,
};
use sol_keyring::hardware::keystone::AirgapPort;
use sol_keyring::hardware::ledger::apdu::{ApduCommand, ApduInstruction, ApduResponse, P2_MORE};
use sol_keyring::hardware::ledger::ApduExchange;
use sol_keyring::{DerivationPath, KeyringError, KeyringResult, Ur};
use std::sync::Arc;

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const XFP: u32 = 0x73c5da0a;

pub fn seed_hex() -> String {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, MNEMONIC).unwrap();
    hex::encode(mnemonic.to_seed(""))
}

/// Keypair a device holding `MNEMONIC` would use for `path`.
pub fn device_key(path: &str) -> KeyringResult<Keypair> {
    let (scheme, index) = DerivationPath::parse_hardware_path(path)
        .ok_or_else(|| KeyringError::InvalidDerivationPath(path.to_string()))?;
    derive(&seed_hex(), index, scheme)
}

fn path_from_bytes(bytes: &[u8]) -> Option<(String, usize)> {
    let depth = *bytes.first()? as usize;
    let body = bytes.get(1..1 + depth * 4)?;
    let parts: Vec<String> = body
        .chunks(4)
        .map(|c| {
            let raw = u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
            if raw & 0x8000_0000 != 0 {
                format!("{}'", raw & 0x7fff_ffff)
            } else {
                raw.to_string()
            }
        })
        .collect();
    Some((parts.join("/"), 1 + depth * 4))
}

fn ok(data: Vec<u8>) -> ApduResponse {
    ApduResponse { data, sw1: 0x90, sw2: 0x00 }
}

fn status(code: u16) -> ApduResponse {
    ApduResponse {
        data: vec![],
        sw1: (code >> 8) as u8,
        sw2: code as u8,
    }
}

/// Speaks the Solana app protocol with keys derived from `MNEMONIC`.
#[derive(Default)]
pub struct SimulatedLedger {
    pending: Mutex<Vec<u8>>,
    frames: Mutex<Vec<ApduCommand>>,
    reject_signing: bool,
}

impl SimulatedLedger {
    /// A device whose user declines every signing prompt.
    pub fn rejecting() -> Self {
        Self {
            reject_signing: true,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<ApduCommand> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl ApduExchange for SimulatedLedger {
    async fn exchange(&self, command: &ApduCommand) -> KeyringResult<ApduResponse> {
        self.frames.lock().push(command.clone());

        if command.ins == ApduInstruction::GetPublicKey as u8 {
            let Some((path, _)) = path_from_bytes(&command.data) else {
                return Ok(status(0x6A80));
            };
            let key = device_key(&path)?;
            return Ok(ok(key.public_key_bytes().to_vec()));
        }

        let mut pending = self.pending.lock();
        pending.extend_from_slice(&command.data);
        if command.p2 & P2_MORE != 0 {
            return Ok(ok(vec![]));
        }
        let data = std::mem::take(&mut *pending);
        if self.reject_signing {
            return Ok(status(0x6985));
        }
        // [signer count][path][payload]
        let Some((path, used)) = data.get(1..).and_then(path_from_bytes) else {
            return Ok(status(0x6A80));
        };
        let key = device_key(&path)?;
        Ok(ok(key.sign(&data[1 + used..]).to_vec()))
    }
}

/// Account export a Keystone holding `MNEMONIC` shows for `indices`.
pub fn keystone_export(indices: &[u32]) -> Ur {
    CryptoMultiAccounts {
        master_fingerprint: XFP,
        keys: indices
            .iter()
            .map(|i| {
                let path = DerivationPath::Bip44Change.hardware_path(*i);
                CryptoHdKey {
                    key_data: device_key(&path).unwrap().public_key_bytes().to_vec(),
                    origin: Some(CryptoKeypath::parse(&path, Some(XFP)).unwrap()),
                }
            })
            .collect(),
        device: Some("Keystone 3 Pro".to_string()),
    }
    .to_ur()
    .unwrap()
}

/// Serve `port` like a Keystone: answer key-derivation calls with the export
/// and sign whatever sign request was played last.
pub fn spawn_keystone(port: AirgapPort, indices: Vec<u32>) -> Arc<Mutex<Vec<String>>> {
    let played = Arc::new(Mutex::new(Vec::<Ur>::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let on_play = {
        let played = played.clone();
        let seen = seen.clone();
        move |ur: Ur| {
            seen.lock().push(ur.ur_type.clone());
            played.lock().push(ur);
            async { Ok::<(), KeyringError>(()) }
        }
    };
    let on_read = move || {
        let answer = keystone_answer(played.lock().last(), &indices);
        async move { answer }
    };
    tokio::spawn(port.serve(on_play, on_read));
    seen
}

fn keystone_answer(last: Option<&Ur>, indices: &[u32]) -> KeyringResult<Ur> {
    let ur = last.ok_or_else(|| KeyringError::ExchangeFailure("nothing played".into()))?;
    if ur.ur_type == UR_QR_HARDWARE_CALL {
        return Ok(keystone_export(indices));
    }
    let request = SolSignRequest::from_ur(ur)?;
    let key = device_key(&request.derivation_path.path_string())?;
    SolSignature {
        request_id: request.request_id,
        signature: key.sign(&request.sign_data).to_vec(),
    }
    .to_ur()
}
