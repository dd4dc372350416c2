use crate::core::domain::DerivationPath;
use crate::core::errors::KeyringError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment override for the default derivation scheme.
pub const ENV_DERIVATION_PATH: &str = "KEYRING_DERIVATION_PATH";
/// Environment override for strict message signing (`1`/`true`/`yes`).
pub const ENV_STRICT_MESSAGE_SIGNING: &str = "KEYRING_STRICT_MESSAGE_SIGNING";
/// Environment override for the log filter.
pub const ENV_LOG: &str = "KEYRING_LOG";

/// Keyring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringConfig {
    /// Scheme used when a caller does not name one
    #[serde(default)]
    pub default_derivation_path: DerivationPath,

    /// Refuse `sign_message` payloads that parse as a transaction message
    #[serde(default)]
    pub strict_message_signing: bool,

    /// Origin string embedded in air-gapped sign requests
    #[serde(default = "KeyringConfig::default_keystone_origin")]
    pub keystone_origin: String,

    /// Maximum APDU payload per frame when talking to a Ledger
    #[serde(default = "KeyringConfig::default_ledger_chunk_size")]
    pub ledger_chunk_size: usize,

    /// tracing filter directive
    #[serde(default = "KeyringConfig::default_log_filter")]
    pub log_filter: String,
}

impl KeyringConfig {
    fn default_keystone_origin() -> String { "sol-keyring".to_string() }
    fn default_ledger_chunk_size() -> usize { 255 }
    fn default_log_filter() -> String { "info".to_string() }

    pub fn from_toml_str(raw: &str) -> Result<Self, KeyringError> {
        let config: Self = toml::from_str(raw).map_err(|e| KeyringError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeyringError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KeyringError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Apply `KEYRING_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(mut self) -> Result<Self, KeyringError> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), KeyringError> {
        if let Some(path) = lookup(ENV_DERIVATION_PATH) {
            self.default_derivation_path = path.parse()?;
        }
        if let Some(flag) = lookup(ENV_STRICT_MESSAGE_SIGNING) {
            self.strict_message_signing = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), KeyringError> {
        if self.ledger_chunk_size == 0 || self.ledger_chunk_size > 255 {
            return Err(KeyringError::Config(format!(
                "ledger_chunk_size must be 1..=255, got {}",
                self.ledger_chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            default_derivation_path: DerivationPath::default(),
            strict_message_signing: false,
            keystone_origin: Self::default_keystone_origin(),
            ledger_chunk_size: Self::default_ledger_chunk_size(),
            log_filter: Self::default_log_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = KeyringConfig::from_toml_str("").unwrap();
        assert_eq!(config, KeyringConfig::default());
    }

    #[test]
    fn test_toml_fields() {
        let config = KeyringConfig::from_toml_str(
            r#"
            default_derivation_path = "bip44"
            strict_message_signing = true
            ledger_chunk_size = 128
            "#,
        )
        .unwrap();
        assert_eq!(config.default_derivation_path, DerivationPath::Bip44);
        assert!(config.strict_message_signing);
        assert_eq!(config.ledger_chunk_size, 128);
        assert_eq!(config.keystone_origin, "sol-keyring");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            KeyringConfig::from_toml_str("ledger_chunk_size = 0"),
            Err(KeyringError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DERIVATION_PATH, "sollet-deprecated"),
            (ENV_STRICT_MESSAGE_SIGNING, "TRUE"),
            (ENV_LOG, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = KeyringConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_derivation_path, DerivationPath::SolletDeprecated);
        assert!(config.strict_message_signing);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_bad_override_path() {
        let mut config = KeyringConfig::default();
        let result = config.apply_overrides(|k| (k == ENV_DERIVATION_PATH).then(|| "m/44".to_string()));
        assert!(matches!(result, Err(KeyringError::InvalidDerivationPath(_))));
    }
}
