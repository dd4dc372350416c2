//! HD keyring behaviour through the public API.

mod common;

use common::{seed_hex, MNEMONIC};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sol_keyring::core::derivation::derive;
use sol_keyring::core::keypair::verify_base58;
use sol_keyring::keyring::{HdKeyring, Keyring, KeyringJson, TransactionSigner};
use sol_keyring::{BlockchainKeyring, DerivationPath, KeyringError};
use std::collections::{BTreeSet, HashMap};

#[test]
fn test_known_address_for_default_path() {
    let keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &[0]).unwrap();
    assert_eq!(keyring.derivation_path(), DerivationPath::Bip44Change);
    assert_eq!(
        keyring.get_public_key(0).unwrap(),
        "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
    );
}

#[test]
fn test_schemes_derive_distinct_keys() {
    let keys: BTreeSet<String> = [
        DerivationPath::Bip44,
        DerivationPath::Bip44Change,
        DerivationPath::SolletDeprecated,
    ]
    .into_iter()
    .map(|path| {
        HdKeyring::from_mnemonic(MNEMONIC, Some(path), &[0])
            .unwrap()
            .get_public_key(0)
            .unwrap()
    })
    .collect();
    assert_eq!(keys.len(), 3);
}

#[test]
fn test_bad_checksum_is_rejected() {
    let bad = MNEMONIC.replace("about", "abandon");
    assert!(matches!(
        HdKeyring::from_mnemonic(&bad, None, &[0]),
        Err(KeyringError::InvalidMnemonic)
    ));
}

#[test]
fn test_import_appends_after_highest_index() {
    let mut keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &[3, 1]).unwrap();
    let (_, index) = keyring.import_account_index(None).unwrap();
    assert_eq!(index, 4);
    assert_eq!(keyring.account_indices(), vec![3, 1, 4]);

    let mut empty = HdKeyring::from_mnemonic(MNEMONIC, None, &[]).unwrap();
    assert_eq!(empty.import_account_index(None).unwrap().1, 0);
}

#[test]
fn test_unknown_index_lookup() {
    let keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &[0]).unwrap();
    assert!(matches!(
        keyring.get_public_key(7),
        Err(KeyringError::AccountIndexNotFound(7))
    ));
}

#[tokio::test]
async fn test_restored_keyring_signs_identically() {
    let keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &[0, 2]).unwrap();
    let raw = keyring.to_json().to_json_string().unwrap();
    assert!(raw.contains("\"kind\":\"hd\""));

    let restored = BlockchainKeyring::from_json(&KeyringJson::from_json_str(&raw).unwrap()).unwrap();
    assert_eq!(restored.public_keys(), keyring.public_keys());

    let address = keyring.get_public_key(2).unwrap();
    let signature = restored.signer(None).unwrap().sign_message(b"gm", &address).await.unwrap();
    assert!(verify_base58(&address, b"gm", &signature));
    assert_eq!(signature, keyring.sign_message(b"gm", &address).await.unwrap());
}

#[tokio::test]
async fn test_signing_with_foreign_address_fails() {
    let keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &[0]).unwrap();
    let foreign = derive(&seed_hex(), 9, DerivationPath::Bip44Change).unwrap().public_key();
    assert!(matches!(
        keyring.sign_transaction(b"tx", &foreign).await,
        Err(KeyringError::AddressNotFound(_))
    ));
}

#[derive(Debug, Clone)]
enum AccountOp {
    Import(Option<u32>),
    Delete(prop::sample::Index),
}

fn account_op() -> impl Strategy<Value = AccountOp> {
    prop_oneof![
        proptest::option::of(0u32..24).prop_map(AccountOp::Import),
        any::<prop::sample::Index>().prop_map(AccountOp::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_interleaved_import_delete_keeps_index_key_pairing(
        initial in prop::collection::btree_set(0u32..16, 0..4),
        ops in prop::collection::vec(account_op(), 1..12),
    ) {
        let seed = seed_hex();
        let mut derived: HashMap<u32, String> = HashMap::new();
        let mut key_for = |index: u32| {
            derived
                .entry(index)
                .or_insert_with(|| derive(&seed, index, DerivationPath::Bip44Change).unwrap().public_key())
                .clone()
        };

        let mut expected: Vec<u32> = initial.into_iter().collect();
        let mut keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &expected).unwrap();

        for op in ops {
            match op {
                AccountOp::Import(requested) => {
                    let next = expected.iter().max().map_or(0, |max| max + 1);
                    let (public_key, index) = keyring.import_account_index(requested).unwrap();
                    match requested {
                        Some(wanted) => {
                            prop_assert_eq!(index, wanted);
                        }
                        None => {
                            prop_assert_eq!(index, next);
                        }
                    }
                    prop_assert_eq!(public_key, key_for(index));
                    if !expected.contains(&index) {
                        expected.push(index);
                    }
                }
                AccountOp::Delete(pick) => {
                    if expected.is_empty() {
                        continue;
                    }
                    let index = expected.remove(pick.index(expected.len()));
                    keyring.delete_public_key(&key_for(index));
                }
            }

            // Survivors keep their order and each position still pairs its
            // index with the key derived for it.
            prop_assert_eq!(keyring.account_indices(), expected.clone());
            let keys = keyring.public_keys();
            prop_assert_eq!(keys.len(), expected.len());
            for (position, index) in expected.iter().enumerate() {
                prop_assert_eq!(&keys[position], &key_for(*index));
                prop_assert_eq!(keyring.get_public_key(*index).unwrap(), key_for(*index));
            }
        }
    }

    #[test]
    fn prop_accounts_match_requested_indices(indices in prop::collection::btree_set(0u32..64, 0..5)) {
        let indices: Vec<u32> = indices.into_iter().collect();
        let keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &indices).unwrap();

        prop_assert_eq!(keyring.public_keys().len(), indices.len());
        for index in &indices {
            let expected = derive(&seed_hex(), *index, DerivationPath::Bip44Change).unwrap().public_key();
            prop_assert_eq!(keyring.get_public_key(*index).unwrap(), expected);
        }
    }

    #[test]
    fn prop_delete_removes_only_that_key(indices in prop::collection::btree_set(0u32..32, 1..5), pick in any::<prop::sample::Index>()) {
        let indices: Vec<u32> = indices.into_iter().collect();
        let mut keyring = HdKeyring::from_mnemonic(MNEMONIC, None, &indices).unwrap();
        let keys = keyring.public_keys();
        let victim = keys[pick.index(keys.len())].clone();

        keyring.delete_public_key(&victim);
        let remaining = keyring.public_keys();
        prop_assert_eq!(remaining.len(), keys.len() - 1);
        prop_assert!(!remaining.contains(&victim));
    }
}
