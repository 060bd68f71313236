use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;

use safenote_devnode::{DevnodeConfig, DevnodeState};
use safenote_sdk::session::{MSG_ALREADY_VERIFIED, MSG_AVAILABLE, MSG_USER_REJECTED};
use safenote_sdk::{
    Category, DecryptOutcome, HttpLedgerGateway, LedgerGateway, ManualAccountProvider, NewNote,
    NoteSession, SdkError, SessionConfig,
};

const ACCOUNT: &str = "0xa11ce00000000000000000000000000000000001";

async fn start(config: DevnodeConfig) -> (String, Arc<DevnodeState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(DevnodeState::new(config));
    let serve_state = state.clone();
    tokio::spawn(async move {
        safenote_devnode::serve(listener, serve_state).await.unwrap();
    });
    (base, state)
}

fn session_config(base: &str) -> SessionConfig {
    SessionConfig::default()
        .with_ledger_url(base)
        .with_relayer_url(base)
        .with_poll_interval(Duration::from_millis(20))
}

fn session(base: &str) -> NoteSession {
    let accounts = Arc::new(ManualAccountProvider::connected(ACCOUNT));
    NoteSession::over_http(session_config(base), accounts).unwrap()
}

#[tokio::test]
async fn test_create_refresh_decrypt_over_http() {
    let (base, node) = start(DevnodeConfig::default()).await;
    let session = session(&base);

    assert!(session.connect().await.unwrap().is_empty());

    let created = session
        .create(NewNote::new("T", "42", Category::Personal))
        .await
        .unwrap();
    assert_eq!(created.title, "T");
    assert_eq!(created.category, Category::Personal);

    let notes = session.refresh().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].is_verified);
    assert_eq!(notes[0].decrypted_value, 0);

    let outcome = assert_ok!(session.decrypt(&created.id).await);
    assert_eq!(outcome, DecryptOutcome::Verified(42));

    let note = session.note(&created.id).unwrap();
    assert!(note.is_verified);
    assert_eq!(note.decrypted_value, 42);
    assert!(node.ledger.note(&created.id).await.unwrap().is_verified);
}

#[tokio::test]
async fn test_second_decrypt_short_circuits() {
    let (base, _node) = start(DevnodeConfig::default()).await;
    let session = session(&base);
    session.connect().await.unwrap();

    let created = session
        .create(NewNote::new("Budget", "1200", Category::Financial))
        .await
        .unwrap();
    session.decrypt(&created.id).await.unwrap();

    let outcome = session.decrypt(&created.id).await.unwrap();
    assert_eq!(outcome.value(), Some(1200));
    assert_eq!(session.status().message, MSG_ALREADY_VERIFIED);
}

#[tokio::test]
async fn test_ledger_status_codes_map_to_errors() {
    let (base, _node) = start(DevnodeConfig::default()).await;
    let session = session(&base);
    session.connect().await.unwrap();
    let created = session
        .create(NewNote::new("T", "5", Category::Work))
        .await
        .unwrap();
    session.decrypt(&created.id).await.unwrap();

    let gateway = HttpLedgerGateway::new(&session_config(&base)).unwrap();
    let err = gateway
        .submit_decryption_proof(&created.id, &[0u8; 32], &[1])
        .await
        .unwrap_err();
    assert!(err.is_already_verified());

    assert!(matches!(
        gateway.get_note("note-0").await,
        Err(SdkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_declined_signer() {
    let (base, node) = start(DevnodeConfig::default()).await;
    node.ledger.reject_signer(ACCOUNT).await;
    let session = session(&base);
    session.connect().await.unwrap();

    let err = session
        .create(NewNote::new("T", "1", Category::Work))
        .await
        .unwrap_err();
    assert!(err.is_user_rejected());
    assert_eq!(session.status().message, MSG_USER_REJECTED);
    assert!(node.ledger.note_ids().await.is_empty());
}

#[tokio::test]
async fn test_availability() {
    let (base, node) = start(DevnodeConfig::default()).await;
    let session = session(&base);

    assert!(session.check_availability().await.unwrap());
    assert_eq!(session.status().message, MSG_AVAILABLE);

    node.ledger.set_available(false);
    assert!(!session.check_availability().await.unwrap());
}

#[tokio::test]
async fn test_create_waits_for_delayed_confirmation() {
    let config = DevnodeConfig {
        confirmation_delay: Duration::from_millis(200),
        ..DevnodeConfig::default()
    };
    let (base, _node) = start(config).await;
    let session = session(&base);
    session.connect().await.unwrap();

    let created = session
        .create(NewNote::new("T", "9", Category::Work))
        .await
        .unwrap();
    assert_eq!(session.notes().len(), 1);
    assert_eq!(session.decrypt(&created.id).await.unwrap().value(), Some(9));
}

#[tokio::test]
async fn test_unreachable_ledger_is_not_connected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let gateway = HttpLedgerGateway::new(&session_config(&base)).unwrap();
    assert!(matches!(
        gateway.list_note_ids().await,
        Err(SdkError::NotConnected)
    ));
}
