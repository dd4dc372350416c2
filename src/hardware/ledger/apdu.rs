//! APDU (Application Protocol Data Unit) framing for the Ledger Solana app

use crate::core::errors::KeyringError;
use tracing::debug;

/// Class byte shared by Ledger apps
pub const CLA: u8 = 0xE0;

/// Solana app instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduInstruction {
    GetAppConfiguration = 0x04,
    GetPublicKey = 0x05,
    SignTransaction = 0x06,
    SignOffchainMessage = 0x07,
}

/// P1: ask the user to confirm on the device
pub const P1_CONFIRM: u8 = 0x01;
pub const P1_NON_CONFIRM: u8 = 0x00;
/// P2: this frame continues a previous one
pub const P2_EXTEND: u8 = 0x01;
/// P2: more frames follow
pub const P2_MORE: u8 = 0x02;

/// Largest payload a single short APDU can carry
pub const MAX_PAYLOAD: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: ApduInstruction, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla: CLA,
            ins: ins as u8,
            p1,
            p2,
            data,
        }
    }

    /// Serialize as a short APDU. Payloads over 255 bytes are rejected.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KeyringError> {
        let lc = u8::try_from(self.data.len()).map_err(|_| {
            KeyringError::TransportFailure(format!("APDU payload too long: {}", self.data.len()))
        })?;

        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, lc]);
        bytes.extend_from_slice(&self.data);

        debug!(
            "APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Len={}",
            self.cla, self.ins, self.p1, self.p2, lc
        );
        Ok(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyringError> {
        if bytes.len() < 2 {
            return Err(KeyringError::TransportFailure("APDU response too short".to_string()));
        }

        let len = bytes.len();
        let sw1 = bytes[len - 2];
        let sw2 = bytes[len - 1];
        let data = bytes[..len - 2].to_vec();

        debug!("APDU response: SW1={:02X} SW2={:02X} DataLen={}", sw1, sw2, data.len());
        Ok(Self { data, sw1, sw2 })
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == 0x9000
    }

    pub fn status_code(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    pub fn error_description(&self) -> String {
        match self.status_code() {
            0x9000 => "success".to_string(),
            0x6700 => "wrong data length".to_string(),
            0x6982 => "security status not satisfied".to_string(),
            0x6985 => "rejected on device".to_string(),
            0x6A80 => "invalid data".to_string(),
            0x6A81 => "invalid off-chain message header".to_string(),
            0x6B00 => "invalid parameters".to_string(),
            0x6D00 => "instruction not supported".to_string(),
            0x6E00 => "Solana app not open".to_string(),
            0x6FAA => "device locked".to_string(),
            code => format!("unknown status: {:04X}", code),
        }
    }

    /// Turn a non-success status word into a transport failure.
    pub fn into_result(self) -> Result<Vec<u8>, KeyringError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(KeyringError::TransportFailure(format!(
                "{} ({:04X})",
                self.error_description(),
                self.status_code()
            )))
        }
    }
}
