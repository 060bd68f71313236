/// Session façade: the entry point a presentation layer drives.
/// Each intent (connect, refresh, create, decrypt, check availability) runs
/// against the gateways, updates the note cache, appends to the operation
/// history and publishes a transient status. Observers subscribe to
/// `SessionEvent`s instead of polling.
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::account::AccountProvider;
use crate::config::SessionConfig;
use crate::decryption::{DecryptOutcome, DecryptionCoordinator, VerificationCheck};
use crate::encryption::{EncryptionGateway, RelayerEncryptionGateway, SessionState};
use crate::error::{Result, SdkError};
use crate::guard::{decrypt_flight, FlightGuard, SingleFlight, CREATE_FLIGHT};
use crate::history::{
    OperationEntry, OperationHistoryLog, OperationKind, OperationOutcome, ALL_NOTES, NEW_NOTE,
    SYSTEM,
};
use crate::ledger::{HttpLedgerGateway, LedgerGateway};
use crate::note::{NewNote, SecureNote};
use crate::status::{TransactionStatus, TransactionStatusTracker};
use crate::store::{CreateStage, NoteStats, NoteStore, Page};

const EVENT_CAPACITY: usize = 64;

pub const MSG_CONNECT_FIRST: &str = "Please connect wallet first";
pub const MSG_IN_FLIGHT: &str = "Operation already in progress";
pub const MSG_INIT_FAILED: &str = "Encryption session initialization failed";
pub const MSG_LOAD_FAILED: &str = "Failed to load notes";
pub const MSG_CREATING: &str = "Creating encrypted note with FHE...";
pub const MSG_AWAITING_CONFIRMATION: &str = "Waiting for transaction confirmation...";
pub const MSG_CREATED: &str = "Note created and encrypted successfully!";
pub const MSG_USER_REJECTED: &str = "Transaction rejected by user";
pub const MSG_VERIFYING: &str = "Verifying decryption on-chain...";
pub const MSG_ALREADY_VERIFIED: &str = "Data already verified on-chain";
pub const MSG_VERIFIED_CONCURRENTLY: &str = "Data is already verified on-chain";
pub const MSG_DECRYPTED: &str = "Note decrypted successfully!";
pub const MSG_DECRYPT_FAILED: &str = "Decryption failed";
pub const MSG_AVAILABLE: &str = "FHE system is available!";
pub const MSG_AVAILABILITY_FAILED: &str = "Availability check failed";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    NotesChanged,
    HistoryRecorded(OperationEntry),
    StatusChanged(TransactionStatus),
}

pub struct NoteSession {
    config: SessionConfig,
    accounts: Arc<dyn AccountProvider>,
    ledger: Arc<dyn LedgerGateway>,
    encryption: Arc<dyn EncryptionGateway>,
    store: NoteStore,
    coordinator: DecryptionCoordinator,
    history: OperationHistoryLog,
    status: TransactionStatusTracker,
    flights: SingleFlight,
    events: broadcast::Sender<SessionEvent>,
}

impl NoteSession {
    pub fn new(
        config: SessionConfig,
        accounts: Arc<dyn AccountProvider>,
        ledger: Arc<dyn LedgerGateway>,
        encryption: Arc<dyn EncryptionGateway>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let status_events = events.clone();
        let status = TransactionStatusTracker::new(config.success_ttl, config.error_ttl)
            .with_listener(move |status| {
                let _ = status_events.send(SessionEvent::StatusChanged(status.clone()));
            });

        Self {
            store: NoteStore::new(accounts.clone(), ledger.clone(), encryption.clone()),
            coordinator: DecryptionCoordinator::new(
                accounts.clone(),
                ledger.clone(),
                encryption.clone(),
            ),
            history: OperationHistoryLog::new(config.history_capacity),
            status,
            flights: SingleFlight::new(),
            events,
            config,
            accounts,
            ledger,
            encryption,
        }
    }

    /// Session over the HTTP ledger facade and encryption relayer named in `config`.
    pub fn over_http(config: SessionConfig, accounts: Arc<dyn AccountProvider>) -> Result<Self> {
        let ledger = Arc::new(HttpLedgerGateway::new(&config)?);
        let encryption = Arc::new(RelayerEncryptionGateway::new(&config)?);
        Ok(Self::new(config, accounts, ledger, encryption))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Prepares a freshly connected account: encryption session first, then
    /// the initial load.
    pub async fn connect(&self) -> Result<Vec<SecureNote>> {
        if !self.accounts.is_connected() {
            self.status.error(MSG_CONNECT_FIRST);
            return Err(SdkError::NotConnected);
        }
        self.initialize_encryption().await?;
        self.refresh().await
    }

    pub async fn initialize_encryption(&self) -> Result<()> {
        if self.encryption.session_state() == SessionState::Ready {
            return Ok(());
        }
        match self.encryption.initialize_session().await {
            Ok(()) => {
                info!("Encryption session initialized");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to initialize encryption session: {}", e);
                self.status.error(MSG_INIT_FAILED);
                Err(e)
            }
        }
    }

    pub async fn refresh(&self) -> Result<Vec<SecureNote>> {
        if !self.accounts.is_connected() {
            self.status.error(MSG_CONNECT_FIRST);
            self.record(OperationKind::Load, ALL_NOTES, OperationOutcome::Failed);
            return Err(SdkError::NotConnected);
        }

        match self.store.refresh_all().await {
            Ok(notes) => {
                self.record(OperationKind::Load, ALL_NOTES, OperationOutcome::Success);
                self.emit(SessionEvent::NotesChanged);
                Ok(notes)
            }
            Err(e) => {
                warn!("Failed to load notes: {}", e);
                self.status.error(MSG_LOAD_FAILED);
                self.record(OperationKind::Load, ALL_NOTES, OperationOutcome::Failed);
                Err(e)
            }
        }
    }

    pub async fn create(&self, input: NewNote) -> Result<SecureNote> {
        let _flight = self.acquire(CREATE_FLIGHT, OperationKind::Create, NEW_NOTE)?;

        let status = &self.status;
        let on_stage = |stage: CreateStage| match stage {
            CreateStage::Encrypting => status.pending(MSG_CREATING),
            CreateStage::AwaitingConfirmation => status.pending(MSG_AWAITING_CONFIRMATION),
        };

        match self.store.create(&input, &on_stage).await {
            Ok(note) => {
                self.status.success(MSG_CREATED);
                self.record(OperationKind::Create, &note.id, OperationOutcome::Success);
                self.emit(SessionEvent::NotesChanged);
                Ok(note)
            }
            Err(e) => {
                warn!("Create failed: {}", e);
                let message = match &e {
                    SdkError::NotConnected => MSG_CONNECT_FIRST.to_string(),
                    SdkError::UserRejected => MSG_USER_REJECTED.to_string(),
                    other => format!("Submission failed: {}", other),
                };
                self.status.error(message);
                self.record(OperationKind::Create, NEW_NOTE, OperationOutcome::Failed);
                Err(e)
            }
        }
    }

    pub async fn decrypt(&self, note_id: &str) -> Result<DecryptOutcome> {
        let _flight = self.acquire(decrypt_flight(note_id), OperationKind::Decrypt, note_id)?;

        if self.accounts.is_connected() {
            self.status.pending(MSG_VERIFYING);
        }

        let outcome = match self.coordinator.run(note_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = match &e {
                    SdkError::NotConnected => MSG_CONNECT_FIRST,
                    _ => MSG_DECRYPT_FAILED,
                };
                self.status.error(message);
                self.record(OperationKind::Decrypt, note_id, OperationOutcome::Failed);
                return Err(e);
            }
        };

        // The ledger record is authoritative, not the locally computed value.
        let reconciled = match self.store.refresh_all().await {
            Ok(_) => {
                self.emit(SessionEvent::NotesChanged);
                self.store.get(note_id).and_then(|n| n.verified_value())
            }
            Err(e) => {
                warn!("Refresh after decrypting {} failed: {}", note_id, e);
                None
            }
        };

        self.record(OperationKind::Decrypt, note_id, outcome.history_outcome());
        let outcome = match outcome {
            DecryptOutcome::Verified(local) => {
                self.status.success(MSG_DECRYPTED);
                DecryptOutcome::Verified(reconciled.unwrap_or(local))
            }
            DecryptOutcome::AlreadyVerified { value, detected } => {
                self.status.success(match detected {
                    VerificationCheck::BeforeProtocol => MSG_ALREADY_VERIFIED,
                    VerificationCheck::DuringSubmission => MSG_VERIFIED_CONCURRENTLY,
                });
                DecryptOutcome::AlreadyVerified {
                    value: reconciled.or(value),
                    detected,
                }
            }
        };
        Ok(outcome)
    }

    /// Only a positive answer is announced; `false` is not an error.
    pub async fn check_availability(&self) -> Result<bool> {
        match self.ledger.check_availability().await {
            Ok(true) => {
                self.status.success(MSG_AVAILABLE);
                self.record(OperationKind::Check, SYSTEM, OperationOutcome::Available);
                Ok(true)
            }
            Ok(false) => {
                self.record(OperationKind::Check, SYSTEM, OperationOutcome::Unavailable);
                Ok(false)
            }
            Err(e) => {
                warn!("Availability check failed: {}", e);
                self.status.error(MSG_AVAILABILITY_FAILED);
                self.record(OperationKind::Check, SYSTEM, OperationOutcome::Failed);
                Err(e)
            }
        }
    }

    pub fn notes(&self) -> Vec<SecureNote> {
        self.store.notes()
    }

    pub fn note(&self, id: &str) -> Option<SecureNote> {
        self.store.get(id)
    }

    pub fn search(&self, term: &str) -> Vec<SecureNote> {
        self.store.filter(term)
    }

    /// `page` is 1-indexed; page size comes from the session config.
    pub fn page(&self, term: &str, page: usize) -> Page<SecureNote> {
        self.store.page(term, self.config.page_size, page)
    }

    pub fn stats(&self) -> NoteStats {
        self.store.stats()
    }

    pub fn is_refreshing(&self) -> bool {
        self.store.is_refreshing()
    }

    pub fn history(&self) -> Vec<OperationEntry> {
        self.history.entries()
    }

    pub fn recent_history(&self, n: usize) -> Vec<OperationEntry> {
        self.history.recent(n)
    }

    pub fn status(&self) -> TransactionStatus {
        self.status.current()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A rejected attempt still lands in history as failed.
    fn acquire(
        &self,
        key: impl Into<String>,
        kind: OperationKind,
        note_id: &str,
    ) -> Result<FlightGuard> {
        self.flights.try_acquire(key).map_err(|e| {
            warn!("{}", e);
            self.status.error(MSG_IN_FLIGHT);
            self.record(kind, note_id, OperationOutcome::Failed);
            e
        })
    }

    fn record(&self, kind: OperationKind, note_id: &str, outcome: OperationOutcome) {
        let entry = self.history.record(kind, note_id, outcome);
        self.emit(SessionEvent::HistoryRecorded(entry));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
