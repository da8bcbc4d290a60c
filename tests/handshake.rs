use std::sync::Arc;
use std::time::Duration;

use tether::credentials::Contact;
use tether::e2e_common::{
    decode_client_finish, establish, handshake_frame, MemoryTransport, TransparentChannel,
};
use tether::handshake::{
    CborPayloadBuilder, ClientHello, ClientPayload, HandshakeCoordinator, HandshakeMessage,
    HandshakeState, ServerHello,
};
use tether::transport::DuplexTransport;
use tether::{Connection, EventEmitter, SessionConfig, SessionError, SessionEvent, TetherClient};

fn client() -> TetherClient {
    TetherClient::bootstrap(SessionConfig::default()).unwrap()
}

fn decode_hello(frame: &[u8]) -> ClientHello {
    assert_eq!(frame[0], 0x00, "hello must use handshake framing");
    match HandshakeMessage::from_bytes(&frame[1..]).unwrap() {
        HandshakeMessage::ClientHello(hello) => hello,
        other => panic!("expected client hello, got {:?}", other),
    }
}

#[tokio::test]
async fn fresh_identity_registers() {
    let client = client();
    let (conn, transport) = establish(&client).await.unwrap();

    assert!(conn.is_established());
    assert!(conn.watchdog_running());

    let sent = transport.sent();
    assert_eq!(sent.len(), 2, "hello and finish only");

    let creds = client.credentials().lock().clone();
    let hello = decode_hello(&sent[0]);
    assert_eq!(hello.ephemeral.len(), 32);
    assert_ne!(hello.ephemeral.as_slice(), creds.noise_key.public());

    let finish = decode_client_finish(&sent[1]).unwrap();
    assert_eq!(finish.static_key.as_slice(), creds.noise_key.public());
    match ClientPayload::from_bytes(&finish.payload).unwrap() {
        ClientPayload::Registration(reg) => {
            assert_eq!(reg.registration_id, creds.registration_id);
            assert_eq!(reg.identity_key.as_slice(), creds.signed_identity_key.public());
            assert_eq!(reg.signed_pre_key_id, 1);
            assert_eq!(reg.signed_pre_key_signature, creds.signed_pre_key.signature);
        }
        other => panic!("expected registration payload, got {:?}", other),
    }
}

#[tokio::test]
async fn linked_identity_logs_in() {
    let client = client();
    client.credentials().lock().complete_registration(Contact {
        id: "15550100".into(),
        name: Some("desk".into()),
    });

    let (_conn, transport) = establish(&client).await.unwrap();
    let finish = decode_client_finish(&transport.sent()[1]).unwrap();
    match ClientPayload::from_bytes(&finish.payload).unwrap() {
        ClientPayload::Login(login) => {
            assert_eq!(login.account_id, "15550100");
            assert!(!login.passive);
        }
        other => panic!("expected login payload, got {:?}", other),
    }
}

#[tokio::test]
async fn each_attempt_uses_a_fresh_ephemeral_key() {
    let client = client();
    let (_first, first_transport) = establish(&client).await.unwrap();
    let (_second, second_transport) = establish(&client).await.unwrap();

    let a = decode_hello(&first_transport.sent()[0]);
    let b = decode_hello(&second_transport.sent()[0]);
    assert_ne!(a.ephemeral, b.ephemeral);
}

#[tokio::test]
async fn malformed_response_fails_and_tears_down() {
    let client = client();
    let mut events = client.subscribe();
    let transport = MemoryTransport::new();
    transport.respond_with(vec![0x00, 0xff, 0x13]);

    let err = client
        .connect(TransparentChannel::new(), transport.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::HandshakeFailed(_)), "{err:?}");
    assert_eq!(transport.sent().len(), 1, "no finish after a bad response");
    assert_eq!(transport.close_count(), 1);

    match events.recv().await.unwrap() {
        SessionEvent::ConnectionClosed { error, .. } => assert_eq!(error, Some(err)),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn unexpected_message_kind_fails() {
    let client = client();
    let transport = MemoryTransport::new();
    transport.respond_with(
        handshake_frame(&HandshakeMessage::ClientHello(ClientHello {
            ephemeral: vec![1; 32],
        }))
        .unwrap(),
    );

    let err = client
        .connect(TransparentChannel::new(), transport)
        .await
        .unwrap_err();
    match err {
        SessionError::HandshakeFailed(reason) => assert!(reason.contains("client hello")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn rejected_server_hello_leaves_coordinator_failed() {
    let credentials = tether::init_credentials().unwrap().into_shared();
    let transport = Arc::new(MemoryTransport::new());
    transport.connect().await.unwrap();
    transport.respond_with(
        handshake_frame(&HandshakeMessage::ServerHello(ServerHello {
            ephemeral: vec![9; 7],
            static_key: vec![1; 32],
            payload: Vec::new(),
        }))
        .unwrap(),
    );
    let conn = Connection::new(TransparentChannel::new(), transport, EventEmitter::new());
    let mut coordinator = HandshakeCoordinator::new(
        credentials,
        Arc::new(CborPayloadBuilder::default()),
        &SessionConfig::default(),
    );

    let err = coordinator.begin_handshake(&conn).await.unwrap_err();
    assert!(matches!(err, SessionError::HandshakeFailed(_)));
    assert_eq!(coordinator.state(), HandshakeState::Failed);
    assert!(!conn.is_established());
    assert!(!conn.watchdog_running());

    // A spent coordinator is not reusable.
    let again = coordinator.begin_handshake(&conn).await.unwrap_err();
    assert!(matches!(again, SessionError::HandshakeFailed(_)));
    assert_eq!(coordinator.state(), HandshakeState::Failed);
}

#[tokio::test]
async fn closed_transport_fails_before_hello() {
    let credentials = tether::init_credentials().unwrap().into_shared();
    let transport = Arc::new(MemoryTransport::new());
    let conn = Connection::new(TransparentChannel::new(), transport.clone(), EventEmitter::new());
    let mut coordinator = HandshakeCoordinator::new(
        credentials,
        Arc::new(CborPayloadBuilder::default()),
        &SessionConfig::default(),
    );

    assert!(coordinator.begin_handshake(&conn).await.is_err());
    assert_eq!(coordinator.state(), HandshakeState::Failed);
    assert!(transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out() {
    let config = SessionConfig {
        connect_timeout_ms: 2_000,
        ..SessionConfig::default()
    };
    let client = TetherClient::bootstrap(config).unwrap();
    let transport = MemoryTransport::new();

    let started = tokio::time::Instant::now();
    let err = client
        .connect(TransparentChannel::new(), transport.clone())
        .await
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(2_000));
    match err {
        SessionError::HandshakeFailed(reason) => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!transport.is_open());
}

#[tokio::test]
async fn refused_connect_is_a_transport_error() {
    let client = client();
    let transport = MemoryTransport::new();
    transport.refuse_connect();

    let err = client
        .connect(TransparentChannel::new(), transport.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn application_send_before_establish_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    transport.connect().await.unwrap();
    let conn = Connection::new(TransparentChannel::new(), transport.clone(), EventEmitter::new());

    assert_eq!(
        conn.send_encrypted(b"too early").await,
        Err(SessionError::ConnectionClosed)
    );
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn failed_hello_transmission_fails_the_handshake() {
    let credentials = tether::init_credentials().unwrap().into_shared();
    let transport = Arc::new(MemoryTransport::with_server_hello().unwrap());
    transport.connect().await.unwrap();
    transport.fail_sends();
    let conn = Connection::new(TransparentChannel::new(), transport.clone(), EventEmitter::new());
    let mut coordinator = HandshakeCoordinator::new(
        credentials,
        Arc::new(CborPayloadBuilder::default()),
        &SessionConfig::default(),
    );

    match coordinator.begin_handshake(&conn).await.unwrap_err() {
        SessionError::HandshakeFailed(reason) => {
            assert!(reason.contains("client hello"), "{reason}");
            assert!(reason.contains("broken pipe"), "{reason}");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(coordinator.state(), HandshakeState::Failed);
    assert!(transport.sent().is_empty());
    assert!(!conn.is_established());
    assert!(!conn.watchdog_running());
}
