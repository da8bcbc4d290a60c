use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tether::credentials::{MAX_REGISTRATION_ID, MIN_REGISTRATION_ID};
use tether::{init_credentials, SessionConfig, SessionError, TetherClient};

#[test]
fn fresh_identities_share_no_key_material() {
    let a = init_credentials().unwrap();
    let b = init_credentials().unwrap();

    assert_ne!(a.noise_key.public(), b.noise_key.public());
    assert_ne!(a.pairing_ephemeral_key_pair.public(), b.pairing_ephemeral_key_pair.public());
    assert_ne!(a.signed_identity_key.public(), b.signed_identity_key.public());
    assert_ne!(a.signed_pre_key.key_pair.public(), b.signed_pre_key.key_pair.public());
    assert_ne!(a.adv_secret_key, b.adv_secret_key);
}

#[test]
fn fresh_identity_is_unregistered_and_valid() {
    let creds = init_credentials().unwrap();

    assert!((MIN_REGISTRATION_ID..=MAX_REGISTRATION_ID).contains(&creds.registration_id));
    assert_eq!(creds.signed_pre_key.key_id, 1);
    assert!(creds
        .signed_pre_key
        .verify(creds.signed_identity_key.public()));
    assert_eq!(STANDARD.decode(&creds.adv_secret_key).unwrap().len(), 32);
    assert!(creds.me.is_none());
    assert!(!creds.registered);
    assert!(!creds.account_settings.unarchive_chats);
    assert!(creds.processed_history_messages.is_empty());
    assert!(creds.is_consistent());
}

#[test]
fn credentials_survive_json_persistence() {
    let creds = init_credentials().unwrap();
    let json = serde_json::to_string(&creds).unwrap();
    let restored: tether::AuthenticationCredentials = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, creds);
}

#[test]
fn config_loads_from_json_with_defaults() {
    let config = SessionConfig::from_json(r#"{ "keep_alive_interval_ms": 15000 }"#).unwrap();
    assert_eq!(config.keep_alive_interval_ms, 15_000);
    assert_eq!(config.pairing_brand, "TETHER");
    assert_eq!(config.liveness_threshold().as_millis(), 20_000);
}

#[test]
fn client_rejects_invalid_config() {
    let config = SessionConfig {
        keep_alive_interval_ms: 0,
        ..SessionConfig::default()
    };
    assert!(matches!(
        TetherClient::bootstrap(config),
        Err(SessionError::Config(_))
    ));

    let config = SessionConfig {
        pairing_brand: "BAD~BRAND".into(),
        ..SessionConfig::default()
    };
    assert!(matches!(
        TetherClient::bootstrap(config),
        Err(SessionError::Config(_))
    ));
}
