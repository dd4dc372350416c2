//! Value types shared by keyrings and the onboarding flow.

use crate::core::errors::KeyringError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Solana coin type in BIP-44 paths.
pub const SOLANA_COIN_TYPE: u32 = 501;

/// Hardened index offset.
pub const HARDENED: u32 = 0x8000_0000;

/// Scheme mapping an account index to key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DerivationPath {
    /// `m/44'/501'/{i}'`
    #[serde(rename = "bip44")]
    Bip44,
    /// `m/44'/501'/{i}'/0'`
    #[serde(rename = "bip44-change")]
    #[default]
    Bip44Change,
    /// Legacy sollet scheme, BIP-32 secp256k1 at `m/501'/{i}'/0/0`.
    #[serde(rename = "sollet-deprecated")]
    SolletDeprecated,
}

impl DerivationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationPath::Bip44 => "bip44",
            DerivationPath::Bip44Change => "bip44-change",
            DerivationPath::SolletDeprecated => "sollet-deprecated",
        }
    }

    /// Full path string for an account index, rooted at `m`.
    pub fn full_path(&self, account_index: u32) -> String {
        format!("m/{}", self.hardware_path(account_index))
    }

    /// Path string as hardware devices report it (no `m/` prefix).
    pub fn hardware_path(&self, account_index: u32) -> String {
        match self {
            DerivationPath::Bip44 => format!("44'/{}'/{}'", SOLANA_COIN_TYPE, account_index),
            DerivationPath::Bip44Change => {
                format!("44'/{}'/{}'/0'", SOLANA_COIN_TYPE, account_index)
            }
            DerivationPath::SolletDeprecated => {
                format!("{}'/{}'/0/0", SOLANA_COIN_TYPE, account_index)
            }
        }
    }

    /// Hardened SLIP-0010 components, or `None` for the secp256k1 sollet scheme.
    pub fn slip10_components(&self, account_index: u32) -> Option<Vec<u32>> {
        let account = HARDENED | account_index;
        match self {
            DerivationPath::Bip44 => Some(vec![HARDENED | 44, HARDENED | SOLANA_COIN_TYPE, account]),
            DerivationPath::Bip44Change => Some(vec![
                HARDENED | 44,
                HARDENED | SOLANA_COIN_TYPE,
                account,
                HARDENED,
            ]),
            DerivationPath::SolletDeprecated => None,
        }
    }

    /// Recover the scheme and account index from a device path such as
    /// `44'/501'/3'/0'`.
    pub fn parse_hardware_path(path: &str) -> Option<(DerivationPath, u32)> {
        let body = path.trim().trim_start_matches("m/");
        let parts: Vec<&str> = body.split('/').collect();
        let (scheme, account) = match parts.as_slice() {
            ["44'", "501'", account] => (DerivationPath::Bip44, *account),
            ["44'", "501'", account, "0'"] => (DerivationPath::Bip44Change, *account),
            ["501'", account, "0", "0"] => (DerivationPath::SolletDeprecated, *account),
            _ => return None,
        };
        let index: u32 = account.strip_suffix('\'')?.parse().ok()?;
        (index < HARDENED).then_some((scheme, index))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivationPath {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bip44" => Ok(DerivationPath::Bip44),
            "bip44-change" => Ok(DerivationPath::Bip44Change),
            "sollet-deprecated" => Ok(DerivationPath::SolletDeprecated),
            other => Err(KeyringError::InvalidDerivationPath(other.to_string())),
        }
    }
}

/// Minimal identity of one derived or imported account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    pub public_key: String,
    pub derivation_path: DerivationPath,
    pub account_index: u32,
}

impl WalletDescriptor {
    pub fn new(public_key: impl Into<String>, derivation_path: DerivationPath, account_index: u32) -> Self {
        Self {
            public_key: public_key.into(),
            derivation_path,
            account_index,
        }
    }

    /// Consumes the descriptor and yields its signed form.
    pub fn into_signed(self, signature: impl Into<String>, xfp: Option<String>) -> SignedWalletDescriptor {
        SignedWalletDescriptor {
            descriptor: self,
            signature: signature.into(),
            xfp,
        }
    }

    /// The imported-record view of this descriptor, using the hardware path form.
    pub fn to_imported(&self) -> ImportedDerivationPath {
        ImportedDerivationPath {
            path: self.derivation_path.hardware_path(self.account_index),
            account: self.account_index,
            public_key: self.public_key.clone(),
        }
    }
}

/// Terminal artifact of an onboarding flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedWalletDescriptor {
    #[serde(flatten)]
    pub descriptor: WalletDescriptor,
    pub signature: String,
    /// Master key fingerprint reported by an air-gapped device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xfp: Option<String>,
}

impl SignedWalletDescriptor {
    pub fn public_key(&self) -> &str {
        &self.descriptor.public_key
    }

    pub fn account_index(&self) -> u32 {
        self.descriptor.account_index
    }
}

/// One address a hardware or air-gapped device has exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedDerivationPath {
    pub path: String,
    pub account: u32,
    pub public_key: String,
}

/// Typed payload moved to and from an air-gapped device. `cbor` is hex text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Ur {
    #[serde(rename = "type")]
    pub ur_type: String,
    pub cbor: String,
}

impl Ur {
    pub fn new(ur_type: impl Into<String>, cbor: &[u8]) -> Self {
        Self {
            ur_type: ur_type.into(),
            cbor: hex::encode(cbor),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ur_type.is_empty() && self.cbor.is_empty()
    }

    pub fn cbor_bytes(&self) -> Result<Vec<u8>, KeyringError> {
        hex::decode(&self.cbor).map_err(|e| KeyringError::InvalidUr(format!("cbor is not hex: {}", e)))
    }
}

/// Backend kinds the onboarding flow can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    #[default]
    Keystone,
    Ledger,
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareType::Keystone => f.write_str("keystone"),
            HardwareType::Ledger => f.write_str("ledger"),
        }
    }
}
