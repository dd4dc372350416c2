use thiserror::Error;

/// Errors raised by keyrings, the hardware adapters and the onboarding flow.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// Mnemonic failed word-list or checksum validation.
    #[error("Invalid seed words")]
    InvalidMnemonic,

    /// Signing or export requested for an address the keyring does not hold.
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// HD lookup by account index with no matching entry.
    #[error("Account index not found: {0}")]
    AccountIndexNotFound(u32),

    /// Malformed seed handed to the derivation engine.
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// An imported record would repeat a public key already in the keyring.
    #[error("Duplicate public key: {0}")]
    DuplicatePublicKey(String),

    /// Broken internal state. Never produced by a valid call sequence.
    #[error("Internal consistency fault: {0}")]
    InternalConsistencyFault(String),

    /// Hardware device round trip failed or was rejected.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Air-gapped play/read round trip failed or was rejected.
    #[error("Exchange failure: {0}")]
    ExchangeFailure(String),

    #[error("Invalid UR payload: {0}")]
    InvalidUr(String),

    /// Message signing refused because the payload parses as a transaction.
    #[error("Message payload is shaped like a transaction")]
    MessageLooksLikeTransaction,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type KeyringResult<T> = Result<T, KeyringError>;

impl KeyringError {
    /// Everything except an internal consistency fault can be handled by the
    /// caller without abandoning the flow.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, KeyringError::InternalConsistencyFault(_))
    }

    /// Device round-trip failures. The onboarding flow flags these as a
    /// connect failure when it steps back.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeyringError::TransportFailure(_) | KeyringError::ExchangeFailure(_)
        )
    }
}
