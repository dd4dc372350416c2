//! Keystone keyring over the channel interaction, with a simulated device on
//! the application end.

mod common;

use common::{device_key, keystone_export, spawn_keystone, XFP};
use sol_keyring::core::keypair::verify_base58;
use sol_keyring::hardware::keystone::engine::format_fingerprint;
use sol_keyring::hardware::keystone::registry::UR_SOL_SIGN_REQUEST;
use sol_keyring::keyring::{Keyring, KeyringFactory, KeystoneKeyring, TransactionSigner};
use sol_keyring::{BlockchainKeyring, KeyringConfig, KeyringError, KeyringJson, Ur};

/// Keystone signatures are hex; the rest of the crate verifies base58.
fn verify_hex(address: &str, msg: &[u8], signature: &str) -> bool {
    let bytes = hex::decode(signature).unwrap();
    verify_base58(address, msg, &bs58::encode(bytes).into_string())
}

#[tokio::test]
async fn test_import_from_export() {
    let keyring = KeystoneKeyring::from_ur(keystone_export(&[0, 1, 2])).await.unwrap();
    let accounts = keyring.get_accounts();
    assert_eq!(accounts.len(), 3);
    assert_eq!(accounts[2].path, "44'/501'/2'/0'");
    assert_eq!(accounts[2].account, 2);
    assert_eq!(accounts[0].public_key, device_key("44'/501'/0'/0'").unwrap().public_key());
    assert_eq!(keyring.xfp(), Some(format_fingerprint(XFP)));
}

#[tokio::test]
async fn test_sign_transaction_and_message_round_trip() {
    let mut keyring = KeystoneKeyring::from_ur(keystone_export(&[0, 1])).await.unwrap();
    let seen = spawn_keystone(keyring.take_port().unwrap(), vec![0, 1]);
    let address = keyring.public_keys()[1].clone();

    let tx = vec![1u8, 0, 1, 3];
    let sig = keyring.sign_transaction(&tx, &address).await.unwrap();
    assert!(verify_hex(&address, &tx, &sig));

    let sig = keyring.sign_message(b"hello keystone", &address).await.unwrap();
    assert!(verify_hex(&address, b"hello keystone", &sig));

    assert_eq!(seen.lock().as_slice(), [UR_SOL_SIGN_REQUEST, UR_SOL_SIGN_REQUEST]);
}

#[tokio::test]
async fn test_dropped_port_is_an_exchange_failure() {
    let mut keyring = KeystoneKeyring::from_ur(keystone_export(&[0])).await.unwrap();
    drop(keyring.take_port());
    let address = keyring.public_keys()[0].clone();
    assert!(matches!(
        keyring.sign_message(b"x", &address).await,
        Err(KeyringError::ExchangeFailure(_))
    ));
}

#[tokio::test]
async fn test_wrong_ur_type_is_rejected() {
    let ur = Ur::new("crypto-account", &[0xa0]);
    assert!(matches!(
        KeystoneKeyring::from_ur(ur).await,
        Err(KeyringError::InvalidUr(_))
    ));
}

#[tokio::test]
async fn test_restored_keyring_keeps_accounts_and_origin() {
    let factory = KeyringFactory::new(KeyringConfig {
        keystone_origin: "integration".to_string(),
        ..KeyringConfig::default()
    });
    let keyring = factory.keystone_from_ur(keystone_export(&[0, 4])).await.unwrap();
    let raw = keyring.to_json().to_json_string().unwrap();

    let BlockchainKeyring::Keystone(mut restored) = factory.from_json(&KeyringJson::from_json_str(&raw).unwrap()).unwrap()
    else {
        panic!("expected keystone keyring");
    };
    assert_eq!(restored.public_keys(), keyring.public_keys());
    assert_eq!(restored.xfp(), keyring.xfp());

    spawn_keystone(restored.take_port().unwrap(), vec![0, 4]);
    let address = restored.public_keys()[1].clone();
    let sig = restored.sign_message(b"again", &address).await.unwrap();
    assert!(verify_hex(&address, b"again", &sig));
}

#[tokio::test]
async fn test_deleted_account_cannot_sign() {
    let mut keyring = KeystoneKeyring::from_ur(keystone_export(&[0, 1])).await.unwrap();
    let address = keyring.public_keys()[0].clone();
    keyring.delete_public_key(&address);
    assert_eq!(keyring.public_keys().len(), 1);
    assert!(matches!(
        keyring.sign_message(b"x", &address).await,
        Err(KeyringError::AddressNotFound(_))
    ));
}
