//! CBOR registry types exchanged with a Keystone device
//!
//! Integer-keyed maps with semantic tags, encoded through `ciborium::Value`.

use crate::core::domain::{Ur, HARDENED};
use crate::core::errors::{KeyringError, KeyringResult};
use ciborium::value::{Integer, Value};
use uuid::Uuid;

pub const UR_CRYPTO_MULTI_ACCOUNTS: &str = "crypto-multi-accounts";
pub const UR_SOL_SIGN_REQUEST: &str = "sol-sign-request";
pub const UR_SOL_SIGNATURE: &str = "sol-signature";
pub const UR_QR_HARDWARE_CALL: &str = "qr-hardware-call";

const TAG_UUID: u64 = 37;
const TAG_CRYPTO_HDKEY: u64 = 303;
const TAG_CRYPTO_KEYPATH: u64 = 304;
const TAG_KEY_DERIVATION_CALL: u64 = 1306;
const TAG_KEY_DERIVATION_SCHEMA: u64 = 1307;

const CURVE_ED25519: u64 = 1;
const ALGO_SLIP10: u64 = 0;

fn invalid(msg: impl Into<String>) -> KeyringError {
    KeyringError::InvalidUr(msg.into())
}

fn uint(n: u64) -> Value {
    Value::Integer(Integer::from(n))
}

fn as_u64(value: &Value) -> KeyringResult<u64> {
    value
        .as_integer()
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| invalid("expected unsigned integer"))
}

fn as_u32(value: &Value) -> KeyringResult<u32> {
    u32::try_from(as_u64(value)?).map_err(|_| invalid("integer out of u32 range"))
}

fn as_bytes(value: &Value) -> KeyringResult<Vec<u8>> {
    value.as_bytes().cloned().ok_or_else(|| invalid("expected byte string"))
}

fn untag(value: &Value, tag: u64) -> &Value {
    match value {
        Value::Tag(t, inner) if *t == tag => inner,
        other => other,
    }
}

fn as_map(value: &Value) -> KeyringResult<&[(Value, Value)]> {
    value.as_map().map(|m| m.as_slice()).ok_or_else(|| invalid("expected map"))
}

fn field(map: &[(Value, Value)], key: u64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().and_then(|i| u64::try_from(i).ok()) == Some(key))
        .map(|(_, v)| v)
}

fn required(map: &[(Value, Value)], key: u64) -> KeyringResult<&Value> {
    field(map, key).ok_or_else(|| invalid(format!("missing field {}", key)))
}

fn encode(value: &Value) -> KeyringResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| invalid(format!("CBOR encode failed: {}", e)))?;
    Ok(out)
}

fn decode(ur: &Ur, expected_type: &str) -> KeyringResult<Value> {
    if ur.ur_type != expected_type {
        return Err(invalid(format!("expected {} UR, got {}", expected_type, ur.ur_type)));
    }
    let bytes = ur.cbor_bytes()?;
    ciborium::de::from_reader(bytes.as_slice()).map_err(|e| invalid(format!("CBOR decode failed: {}", e)))
}

fn encode_uuid(id: &Uuid) -> Value {
    Value::Tag(TAG_UUID, Box::new(Value::Bytes(id.as_bytes().to_vec())))
}

fn decode_uuid(value: &Value) -> KeyringResult<Uuid> {
    Uuid::from_slice(&as_bytes(untag(value, TAG_UUID))?).map_err(|e| invalid(format!("bad request id: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathComponent {
    pub index: u32,
    pub hardened: bool,
}

/// `crypto-keypath`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoKeypath {
    pub components: Vec<PathComponent>,
    pub source_fingerprint: Option<u32>,
}

impl CryptoKeypath {
    /// Parse `44'/501'/0'/0'` (an `m/` prefix is accepted).
    pub fn parse(path: &str, source_fingerprint: Option<u32>) -> KeyringResult<Self> {
        let body = path.trim().trim_start_matches("m/");
        let components = body
            .split('/')
            .filter(|p| !p.is_empty())
            .map(|part| {
                let hardened = part.ends_with('\'');
                let index: u32 = part
                    .trim_end_matches('\'')
                    .parse()
                    .map_err(|_| KeyringError::InvalidDerivationPath(path.to_string()))?;
                if index >= HARDENED {
                    return Err(KeyringError::InvalidDerivationPath(path.to_string()));
                }
                Ok(PathComponent { index, hardened })
            })
            .collect::<KeyringResult<Vec<_>>>()?;
        Ok(Self {
            components,
            source_fingerprint,
        })
    }

    pub fn path_string(&self) -> String {
        self.components
            .iter()
            .map(|c| format!("{}{}", c.index, if c.hardened { "'" } else { "" }))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Account index of a Solana path (`44'/501'/{i}'...`).
    pub fn account_index(&self) -> Option<u32> {
        self.components.get(2).map(|c| c.index)
    }

    fn to_value(&self) -> Value {
        let flat = self
            .components
            .iter()
            .flat_map(|c| [uint(c.index as u64), Value::Bool(c.hardened)])
            .collect();
        let mut map = vec![(uint(1), Value::Array(flat))];
        if let Some(fp) = self.source_fingerprint {
            map.push((uint(2), uint(fp as u64)));
        }
        Value::Tag(TAG_CRYPTO_KEYPATH, Box::new(Value::Map(map)))
    }

    fn from_value(value: &Value) -> KeyringResult<Self> {
        let map = as_map(untag(value, TAG_CRYPTO_KEYPATH))?;
        let flat = required(map, 1)?.as_array().ok_or_else(|| invalid("keypath components"))?;
        if flat.len() % 2 != 0 {
            return Err(invalid("keypath components must be index/hardened pairs"));
        }
        let components = flat
            .chunks(2)
            .map(|pair| {
                Ok(PathComponent {
                    index: as_u32(&pair[0])?,
                    hardened: pair[1].as_bool().ok_or_else(|| invalid("hardened flag"))?,
                })
            })
            .collect::<KeyringResult<Vec<_>>>()?;
        let source_fingerprint = field(map, 2).map(as_u32).transpose()?;
        Ok(Self {
            components,
            source_fingerprint,
        })
    }
}

/// `crypto-hdkey`, reduced to what an ed25519 account export carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoHdKey {
    pub key_data: Vec<u8>,
    pub origin: Option<CryptoKeypath>,
}

impl CryptoHdKey {
    fn to_value(&self) -> Value {
        let mut map = vec![(uint(3), Value::Bytes(self.key_data.clone()))];
        if let Some(origin) = &self.origin {
            map.push((uint(6), origin.to_value()));
        }
        Value::Tag(TAG_CRYPTO_HDKEY, Box::new(Value::Map(map)))
    }

    fn from_value(value: &Value) -> KeyringResult<Self> {
        let map = as_map(untag(value, TAG_CRYPTO_HDKEY))?;
        Ok(Self {
            key_data: as_bytes(required(map, 3)?)?,
            origin: field(map, 6).map(CryptoKeypath::from_value).transpose()?,
        })
    }
}

/// `crypto-multi-accounts`: the account export a Keystone shows on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoMultiAccounts {
    pub master_fingerprint: u32,
    pub keys: Vec<CryptoHdKey>,
    pub device: Option<String>,
}

impl CryptoMultiAccounts {
    pub fn to_ur(&self) -> KeyringResult<Ur> {
        let mut map = vec![
            (uint(1), uint(self.master_fingerprint as u64)),
            (uint(2), Value::Array(self.keys.iter().map(CryptoHdKey::to_value).collect())),
        ];
        if let Some(device) = &self.device {
            map.push((uint(3), Value::Text(device.clone())));
        }
        Ok(Ur::new(UR_CRYPTO_MULTI_ACCOUNTS, &encode(&Value::Map(map))?))
    }

    pub fn from_ur(ur: &Ur) -> KeyringResult<Self> {
        let value = decode(ur, UR_CRYPTO_MULTI_ACCOUNTS)?;
        let map = as_map(&value)?;
        let keys = required(map, 2)?
            .as_array()
            .ok_or_else(|| invalid("keys must be an array"))?
            .iter()
            .map(CryptoHdKey::from_value)
            .collect::<KeyringResult<Vec<_>>>()?;
        Ok(Self {
            master_fingerprint: as_u32(required(map, 1)?)?,
            keys,
            device: field(map, 3).and_then(|v| v.as_text()).map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignType {
    Transaction = 1,
    Message = 2,
}

/// `sol-sign-request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolSignRequest {
    pub request_id: Uuid,
    pub sign_data: Vec<u8>,
    pub derivation_path: CryptoKeypath,
    pub address: Option<Vec<u8>>,
    pub origin: Option<String>,
    pub sign_type: SignType,
}

impl SolSignRequest {
    pub fn to_ur(&self) -> KeyringResult<Ur> {
        let mut map = vec![
            (uint(1), encode_uuid(&self.request_id)),
            (uint(2), Value::Bytes(self.sign_data.clone())),
            (uint(3), self.derivation_path.to_value()),
        ];
        if let Some(address) = &self.address {
            map.push((uint(4), Value::Bytes(address.clone())));
        }
        if let Some(origin) = &self.origin {
            map.push((uint(5), Value::Text(origin.clone())));
        }
        map.push((uint(6), uint(self.sign_type as u64)));
        Ok(Ur::new(UR_SOL_SIGN_REQUEST, &encode(&Value::Map(map))?))
    }

    pub fn from_ur(ur: &Ur) -> KeyringResult<Self> {
        let value = decode(ur, UR_SOL_SIGN_REQUEST)?;
        let map = as_map(&value)?;
        let sign_type = match field(map, 6).map(as_u64).transpose()? {
            None | Some(1) => SignType::Transaction,
            Some(2) => SignType::Message,
            Some(other) => return Err(invalid(format!("unknown sign type {}", other))),
        };
        Ok(Self {
            request_id: decode_uuid(required(map, 1)?)?,
            sign_data: as_bytes(required(map, 2)?)?,
            derivation_path: CryptoKeypath::from_value(required(map, 3)?)?,
            address: field(map, 4).map(as_bytes).transpose()?,
            origin: field(map, 5).and_then(|v| v.as_text()).map(str::to_string),
            sign_type,
        })
    }
}

/// `sol-signature`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolSignature {
    pub request_id: Uuid,
    pub signature: Vec<u8>,
}

impl SolSignature {
    pub fn to_ur(&self) -> KeyringResult<Ur> {
        let map = vec![
            (uint(1), encode_uuid(&self.request_id)),
            (uint(2), Value::Bytes(self.signature.clone())),
        ];
        Ok(Ur::new(UR_SOL_SIGNATURE, &encode(&Value::Map(map))?))
    }

    pub fn from_ur(ur: &Ur) -> KeyringResult<Self> {
        let value = decode(ur, UR_SOL_SIGNATURE)?;
        let map = as_map(&value)?;
        Ok(Self {
            request_id: decode_uuid(required(map, 1)?)?,
            signature: as_bytes(required(map, 2)?)?,
        })
    }
}

/// `qr-hardware-call` asking the device to export ed25519 keys at `paths`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationCall {
    pub paths: Vec<CryptoKeypath>,
    pub origin: Option<String>,
}

impl KeyDerivationCall {
    pub fn to_ur(&self) -> KeyringResult<Ur> {
        let schemas = self
            .paths
            .iter()
            .map(|path| {
                Value::Tag(
                    TAG_KEY_DERIVATION_SCHEMA,
                    Box::new(Value::Map(vec![
                        (uint(1), path.to_value()),
                        (uint(2), uint(CURVE_ED25519)),
                        (uint(3), uint(ALGO_SLIP10)),
                    ])),
                )
            })
            .collect();
        let params = Value::Tag(
            TAG_KEY_DERIVATION_CALL,
            Box::new(Value::Map(vec![(uint(1), Value::Array(schemas))])),
        );
        let mut map = vec![(uint(1), uint(0)), (uint(2), params)];
        if let Some(origin) = &self.origin {
            map.push((uint(3), Value::Text(origin.clone())));
        }
        Ok(Ur::new(UR_QR_HARDWARE_CALL, &encode(&Value::Map(map))?))
    }
}
