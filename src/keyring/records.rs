//! Imported-account store shared by the Ledger keyring and the Keystone engine.

use crate::core::domain::ImportedDerivationPath;
use crate::core::errors::KeyringError;

/// Ordered set of device-exposed records, unique by public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedAccounts {
    records: Vec<ImportedDerivationPath>,
}

impl ImportedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting repeated public keys.
    pub fn from_records(records: Vec<ImportedDerivationPath>) -> Result<Self, KeyringError> {
        let mut accounts = Self::new();
        for record in records {
            accounts.insert(record)?;
        }
        Ok(accounts)
    }

    pub fn insert(&mut self, record: ImportedDerivationPath) -> Result<(), KeyringError> {
        if self.contains(&record.public_key) {
            return Err(KeyringError::DuplicatePublicKey(record.public_key));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn contains(&self, public_key: &str) -> bool {
        self.find(public_key).is_some()
    }

    pub fn find(&self, public_key: &str) -> Option<&ImportedDerivationPath> {
        self.records.iter().find(|r| r.public_key == public_key)
    }

    /// Exact-match lookup, failing with `AddressNotFound`.
    pub fn require(&self, public_key: &str) -> Result<&ImportedDerivationPath, KeyringError> {
        self.find(public_key)
            .ok_or_else(|| KeyringError::AddressNotFound(public_key.to_string()))
    }

    /// Returns whether a record was removed.
    pub fn remove(&mut self, public_key: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.public_key != public_key);
        before != self.records.len()
    }

    pub fn public_keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.public_key.clone()).collect()
    }

    pub fn records(&self) -> &[ImportedDerivationPath] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pk: &str, account: u32) -> ImportedDerivationPath {
        ImportedDerivationPath {
            path: format!("44'/501'/{}'", account),
            account,
            public_key: pk.to_string(),
        }
    }

    #[test]
    fn test_duplicate_public_key_rejected() {
        let result = ImportedAccounts::from_records(vec![record("a", 0), record("a", 1)]);
        assert!(matches!(result, Err(KeyringError::DuplicatePublicKey(pk)) if pk == "a"));
    }

    #[test]
    fn test_require_and_remove() {
        let mut accounts = ImportedAccounts::from_records(vec![record("a", 0), record("b", 1)]).unwrap();
        assert_eq!(accounts.require("b").unwrap().account, 1);
        assert!(matches!(accounts.require("c"), Err(KeyringError::AddressNotFound(_))));

        assert!(accounts.remove("a"));
        assert!(!accounts.remove("a"));
        assert_eq!(accounts.public_keys(), vec!["b".to_string()]);
    }
}
