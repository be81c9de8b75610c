//! End-to-end flows across key wrapping, payload encryption, and the client
//! password scheme.

use std::sync::Arc;

use medcard_core::{
    BloodTestResult, ClientVault, CryptoConfig, EncryptedPayload, KdfParams, MasterKeyWrapper,
    MasterSecret, MedcardError, MemoryStore, PayloadCipher, RecordCipher, UserKeyring,
    WrappedUserKey,
};

const FAST: KdfParams = KdfParams { iterations: 1_000 };

fn config(kdf: KdfParams) -> CryptoConfig {
    let secret = MasterSecret::from_hex(&"a1".repeat(32)).unwrap();
    CryptoConfig::new(secret, kdf).unwrap()
}

fn is_lower_hex(s: &str) -> bool {
    s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

#[test]
fn wrap_encrypt_decrypt_at_default_iterations() {
    let config = config(KdfParams::default());
    assert_eq!(config.kdf.iterations, 100_000);

    let wrapper = MasterKeyWrapper::new(&config);
    let user_key = MasterKeyWrapper::generate_user_key();
    assert_eq!(user_key.expose().len(), 64);

    let wrapped = wrapper.wrap(&user_key).unwrap();
    let fields: Vec<&str> = wrapped.as_str().split(':').collect();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0].len(), 32);
    assert_eq!(fields[1].len(), 32);
    assert!(fields.iter().all(|f| is_lower_hex(f)));

    let unwrapped = wrapper.unwrap(&wrapped).unwrap();
    assert_eq!(unwrapped.expose(), user_key.expose());

    let cipher = PayloadCipher::new(&config);
    let payload = cipher.encrypt(b"hello world", &wrapped).unwrap();
    assert_eq!(payload.as_str().split(':').count(), 3);
    assert_eq!(cipher.decrypt(&payload, &wrapped).unwrap(), b"hello world");
}

#[test]
fn payload_bound_to_its_user() {
    let config = config(FAST);
    let wrapper = MasterKeyWrapper::new(&config);
    let cipher = PayloadCipher::new(&config);

    let alice = wrapper.wrap(&MasterKeyWrapper::generate_user_key()).unwrap();
    let bob = wrapper.wrap(&MasterKeyWrapper::generate_user_key()).unwrap();

    let payload = cipher.encrypt(b"alice only", &alice).unwrap();
    assert!(matches!(
        cipher.decrypt(&payload, &bob),
        Err(MedcardError::DecryptionFailure)
    ));
}

#[test]
fn wrapped_key_needs_matching_master_secret() {
    let wrapped = MasterKeyWrapper::new(&config(FAST))
        .wrap(&MasterKeyWrapper::generate_user_key())
        .unwrap();

    let other = CryptoConfig::new(MasterSecret::generate(), FAST).unwrap();
    let result = MasterKeyWrapper::new(&other).unwrap(&wrapped);
    assert!(matches!(result, Err(MedcardError::DecryptionFailure)));
}

#[test]
fn malformed_inputs_are_rejected_before_decryption() {
    let config = config(FAST);
    let wrapper = MasterKeyWrapper::new(&config);
    let cipher = PayloadCipher::new(&config);
    let wrapped = wrapper.wrap(&MasterKeyWrapper::generate_user_key()).unwrap();

    for bad in ["", "abc", "zz:00:11", "00:11:22:33", "a:b:c", "0011:"] {
        let result = wrapper.unwrap(&WrappedUserKey::new(bad));
        assert!(
            matches!(result, Err(MedcardError::MalformedEnvelope(_))),
            "wrapped key {:?} gave {:?}",
            bad,
            result
        );

        let result = cipher.decrypt(&EncryptedPayload::new(bad), &wrapped);
        assert!(
            matches!(result, Err(MedcardError::MalformedEnvelope(_))),
            "payload {:?} gave {:?}",
            bad,
            result
        );
    }
}

#[tokio::test]
async fn keyring_registration_to_records() {
    let config = config(FAST);
    let keyring = UserKeyring::new(&config, Arc::new(MemoryStore::new()));
    keyring.register_user("user_42").await.unwrap();

    let results = vec![BloodTestResult::new(
        chrono::NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
    )
    .with_value("Hemoglobin", 13.9)
    .with_value("WBC", 5.4)];

    let user_cipher = keyring.cipher_for_user("user_42").await.unwrap();
    let records = RecordCipher::new(&user_cipher);
    let sealed = records.seal_results(&results).unwrap();

    let opened = keyring.decrypt_for_user("user_42", &sealed).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&opened).unwrap();
    assert_eq!(json[0]["Date"], "05.01.2023");
    assert_eq!(json[0]["WBC"], 5.4);

    assert_eq!(records.open_results(&sealed).unwrap(), results);
}

#[tokio::test]
async fn client_scheme_across_devices() {
    let salts = Arc::new(MemoryStore::new());
    let laptop = ClientVault::new(salts.clone(), FAST);
    let phone = ClientVault::new(salts, FAST);

    let payload = laptop
        .setup("user_7", "correct horse")
        .await
        .unwrap()
        .encrypt(b"{\"WBC\":5.4}")
        .unwrap();
    assert_eq!(payload.as_str().split(':').count(), 3);

    let unlocked = phone
        .unlock("user_7", "correct horse", Some(&payload))
        .await
        .unwrap();
    assert!(unlocked.is_verified());
    assert_eq!(unlocked.cipher().decrypt(&payload).unwrap(), b"{\"WBC\":5.4}");

    let wrong = phone.unlock("user_7", "battery staple", Some(&payload)).await;
    assert!(matches!(wrong, Err(MedcardError::DecryptionFailure)));
}
