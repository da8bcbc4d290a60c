use tether::credentials::Contact;
use tether::pairing::{PAIRING_ALPHABET, PAIRING_CODE_LEN};
use tether::{SessionConfig, SessionError, SessionEvent, TetherClient};

fn client() -> TetherClient {
    TetherClient::bootstrap(SessionConfig::default()).unwrap()
}

fn split_session_id(session_id: &str) -> (&str, &str, &str) {
    let (brand, rest) = session_id.split_once('~').expect("brand separator");
    let (code, suffix) = rest.split_once('#').expect("suffix separator");
    (brand, code, suffix)
}

#[test]
fn issued_code_and_session_id_are_well_formed() {
    let client = client();
    let session = client.request_pairing_code("15550100", None).unwrap();

    assert_eq!(session.code.len(), PAIRING_CODE_LEN);
    assert!(session.code.bytes().all(|b| PAIRING_ALPHABET.contains(&b)));

    let (brand, code, suffix) = split_session_id(&session.session_id);
    assert_eq!(brand, "TETHER");
    assert_eq!(code, session.code);
    assert_eq!(suffix.len(), 24);
    assert!(suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[test]
fn identity_is_prepared_for_registration() {
    let client = client();
    let session = client.request_pairing_code("15550100", None).unwrap();

    let creds = client.credentials().lock();
    assert_eq!(creds.pairing_code.as_deref(), Some(session.code.as_str()));
    assert_eq!(
        creds.me,
        Some(Contact {
            id: "15550100".into(),
            name: Some("~".into()),
        })
    );
    assert!(!creds.registered);
    assert!(creds.is_consistent());
}

#[test]
fn custom_code_is_used_verbatim_with_fresh_suffix() {
    let client = client();
    let first = client.request_pairing_code("15550100", Some("ABCD1234")).unwrap();
    let second = client.request_pairing_code("15550100", Some("ABCD1234")).unwrap();

    assert_eq!(first.code, "ABCD1234");
    assert_eq!(second.code, "ABCD1234");
    assert_ne!(first.session_id, second.session_id);
    assert!(first.session_id.starts_with("TETHER~ABCD1234#"));
}

#[test]
fn session_ids_do_not_repeat() {
    let client = client();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..64 {
        let session = client.request_pairing_code("15550100", None).unwrap();
        assert!(seen.insert(session.session_id));
    }
}

#[test]
fn configured_brand_prefixes_the_session_id() {
    let config = SessionConfig {
        pairing_brand: "ACME".into(),
        ..SessionConfig::default()
    };
    let client = TetherClient::bootstrap(config).unwrap();
    let session = client.request_pairing_code("15550100", None).unwrap();
    assert!(session.session_id.starts_with(&format!("ACME~{}#", session.code)));
}

#[tokio::test]
async fn credential_update_is_published() {
    let client = client();
    let mut events = client.subscribe();
    let session = client.request_pairing_code("15550100", None).unwrap();

    match events.recv().await.unwrap() {
        SessionEvent::CredentialsUpdated(snapshot) => {
            assert_eq!(snapshot.pairing_code, Some(session.code));
            assert_eq!(snapshot.me.map(|me| me.id), Some("15550100".to_string()));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn registered_identity_cannot_pair_again() {
    let client = client();
    client.request_pairing_code("15550100", None).unwrap();
    client.credentials().lock().complete_registration(Contact {
        id: "15550100".into(),
        name: Some("desk".into()),
    });

    assert_eq!(
        client.request_pairing_code("15550100", None),
        Err(SessionError::AlreadyRegistered)
    );
    let creds = client.credentials().lock();
    assert!(creds.pairing_code.is_none());
    assert!(creds.is_consistent());
}

#[test]
fn empty_custom_code_falls_back_to_a_generated_one() {
    let client = client();
    let session = client.request_pairing_code("15551234567", Some("")).unwrap();

    assert_eq!(session.code.len(), PAIRING_CODE_LEN);
    assert!(session.code.bytes().all(|b| PAIRING_ALPHABET.contains(&b)));
    let (_, code, _) = split_session_id(&session.session_id);
    assert_eq!(code, session.code);
    assert_eq!(
        client.credentials().lock().pairing_code.as_deref(),
        Some(session.code.as_str())
    );
}
