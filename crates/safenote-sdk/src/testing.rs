//! In-memory gateway doubles for exercising the orchestration without a ledger
//! node or an encryption relayer.
//!
//! `FakeEncryption` produces ciphertexts of the form `b"fhe:" ++ value_be`,
//! which `InMemoryLedger` understands, so the two cooperate without sharing
//! state. Neither does any cryptography.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::codec::{decode_clear_values, encode_clear_values, CiphertextHandle, HexBytes};
use crate::encryption::{
    DecryptionResult, EncryptedInput, EncryptionGateway, ProofSubmitter, SessionState,
};
use crate::error::{Result, SdkError};
use crate::ledger::{Confirmation, CreateNoteRequest, LedgerGateway, TxHandle};
use crate::note::{Category, NoteRecord};

pub const FAKE_CONTRACT: &str = "0x5afe000000000000000000000000000000000001";
pub const FAKE_ACCOUNT: &str = "0xa11ce00000000000000000000000000000000001";

const CIPHERTEXT_TAG: &[u8] = b"fhe:";

pub fn fake_ciphertext(value: u64) -> Vec<u8> {
    let mut bytes = CIPHERTEXT_TAG.to_vec();
    bytes.extend_from_slice(&value.to_be_bytes());
    bytes
}

pub fn fake_value_of(ciphertext: &[u8]) -> Option<u64> {
    let body = ciphertext.strip_prefix(CIPHERTEXT_TAG)?;
    let bytes: [u8; 8] = body.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

struct StoredNote {
    record: NoteRecord,
    value: u64,
    handle: CiphertextHandle,
}

#[derive(Default)]
struct LedgerState {
    order: Vec<String>,
    notes: HashMap<String, StoredNote>,
    txs: HashMap<String, Confirmation>,
    next_tx: u64,
    clock_secs: u64,
    unreadable: HashSet<String>,
    rejecting_signers: HashSet<String>,
    race_on_submit: HashSet<String>,
    revert_on_submit: HashMap<String, String>,
    revert_creates: Option<String>,
    duplicate_ids: bool,
    disconnected: bool,
    available: bool,
}

/// Ledger double with failure knobs and call counters.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    confirmations_open: watch::Sender<bool>,
    get_note_calls: AtomicUsize,
    create_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let (confirmations_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(LedgerState {
                clock_secs: 1_700_000_000,
                available: true,
                ..LedgerState::default()
            }),
            confirmations_open,
            get_note_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// Seeds a committed note directly.
    pub fn insert_note(&self, id: &str, title: &str, value: u64, category: Category, verified: bool) {
        let mut state = self.state.lock();
        state.clock_secs += 1;
        let record = NoteRecord {
            id: id.to_string(),
            title: title.to_string(),
            content: value.to_string(),
            creator: FAKE_ACCOUNT.to_string(),
            timestamp: state.clock_secs,
            is_verified: verified,
            decrypted_value: if verified { value } else { 0 },
            public_value1: category.code(),
            public_value2: 0,
        };
        let handle = CiphertextHandle::from_bytes(&fake_ciphertext(value));
        state.order.push(id.to_string());
        state.notes.insert(
            id.to_string(),
            StoredNote {
                record,
                value,
                handle,
            },
        );
    }

    pub fn record(&self, id: &str) -> Option<NoteRecord> {
        self.state.lock().notes.get(id).map(|n| n.record.clone())
    }

    pub fn note_count(&self) -> usize {
        self.state.lock().notes.len()
    }

    /// `get_note(id)` fails with `LedgerUnavailable`.
    pub fn make_unreadable(&self, id: &str) {
        self.state.lock().unreadable.insert(id.to_string());
    }

    pub fn reject_signer(&self, account: &str) {
        self.state.lock().rejecting_signers.insert(account.to_string());
    }

    /// Another verifier settles `id` just before our proof lands.
    pub fn race_verification(&self, id: &str) {
        self.state.lock().race_on_submit.insert(id.to_string());
    }

    /// The next proof submission for `id` is accepted, then reverts with `reason`.
    pub fn revert_verification(&self, id: &str, reason: &str) {
        self.state
            .lock()
            .revert_on_submit
            .insert(id.to_string(), reason.to_string());
    }

    pub fn revert_creates(&self, reason: &str) {
        self.state.lock().revert_creates = Some(reason.to_string());
    }

    /// `list_note_ids` reports every id twice.
    pub fn duplicate_listing(&self) {
        self.state.lock().duplicate_ids = true;
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Flips a verified record back. A real ledger never does this.
    pub fn force_unverify(&self, id: &str) {
        if let Some(note) = self.state.lock().notes.get_mut(id) {
            note.record.is_verified = false;
            note.record.decrypted_value = 0;
        }
    }

    /// `await_confirmation` blocks until `release_confirmations`.
    pub fn hold_confirmations(&self) {
        self.confirmations_open.send_replace(false);
    }

    pub fn release_confirmations(&self) {
        self.confirmations_open.send_replace(true);
    }

    pub fn get_note_calls(&self) -> usize {
        self.get_note_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn push_tx(state: &mut LedgerState, outcome: Confirmation) -> TxHandle {
        state.next_tx += 1;
        let tx = format!("0xtx{:04}", state.next_tx);
        state.txs.insert(tx.clone(), outcome);
        TxHandle(tx)
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn contract_address(&self) -> Result<String> {
        Ok(FAKE_CONTRACT.to_string())
    }

    async fn list_note_ids(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(SdkError::NotConnected);
        }
        let mut ids = state.order.clone();
        if state.duplicate_ids {
            ids.extend(state.order.iter().cloned());
        }
        Ok(ids)
    }

    async fn get_note(&self, id: &str) -> Result<NoteRecord> {
        self.get_note_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.unreadable.contains(id) {
            return Err(SdkError::LedgerUnavailable(format!("cannot decode {}", id)));
        }
        state
            .notes
            .get(id)
            .map(|n| n.record.clone())
            .ok_or_else(|| SdkError::NotFound(id.to_string()))
    }

    async fn create_note(&self, request: CreateNoteRequest) -> Result<TxHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.rejecting_signers.contains(&request.signer) {
            return Err(SdkError::UserRejected);
        }
        if let Some(reason) = state.revert_creates.clone() {
            return Ok(Self::push_tx(&mut state, Confirmation::Failed(reason)));
        }
        if state.notes.contains_key(&request.id) {
            return Err(SdkError::LedgerUnavailable(format!("{} already exists", request.id)));
        }
        let value = fake_value_of(request.encrypted_value.as_slice())
            .ok_or_else(|| SdkError::LedgerUnavailable("malformed ciphertext".into()))?;
        if request.input_proof.is_empty() {
            return Err(SdkError::LedgerUnavailable("missing input proof".into()));
        }

        state.clock_secs += 1;
        let record = NoteRecord {
            id: request.id.clone(),
            title: request.title,
            content: request.plaintext_mirror,
            creator: request.signer,
            timestamp: state.clock_secs,
            is_verified: false,
            decrypted_value: 0,
            public_value1: request.category_code,
            public_value2: request.aux_code,
        };
        let handle = CiphertextHandle::from_bytes(request.encrypted_value.as_slice());
        state.order.push(request.id.clone());
        state.notes.insert(
            request.id,
            StoredNote {
                record,
                value,
                handle,
            },
        );
        Ok(Self::push_tx(&mut state, Confirmation::Committed))
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation> {
        let mut open = self.confirmations_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|e| SdkError::LedgerUnavailable(e.to_string()))?;

        self.state
            .lock()
            .txs
            .get(&tx.0)
            .cloned()
            .ok_or_else(|| SdkError::LedgerUnavailable(format!("unknown transaction {}", tx.0)))
    }

    async fn get_encrypted_handle(&self, id: &str) -> Result<CiphertextHandle> {
        self.state
            .lock()
            .notes
            .get(id)
            .map(|n| n.handle.clone())
            .ok_or_else(|| SdkError::NotFound(id.to_string()))
    }

    async fn submit_decryption_proof(
        &self,
        id: &str,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxHandle> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let raced = state.race_on_submit.remove(id);
        if let Some(reason) = state.revert_on_submit.remove(id) {
            if !state.notes.contains_key(id) {
                return Err(SdkError::NotFound(id.to_string()));
            }
            return Ok(Self::push_tx(&mut state, Confirmation::Failed(reason)));
        }

        let note = state
            .notes
            .get_mut(id)
            .ok_or_else(|| SdkError::NotFound(id.to_string()))?;
        if raced {
            note.record.is_verified = true;
            note.record.decrypted_value = note.value;
        }
        if note.record.is_verified {
            return Err(SdkError::AlreadyVerified(id.to_string()));
        }

        let values = decode_clear_values(clear_values)?;
        if proof.is_empty() || values.first() != Some(&note.value) {
            return Err(SdkError::LedgerUnavailable("invalid decryption proof".into()));
        }
        note.record.is_verified = true;
        note.record.decrypted_value = note.value;

        Ok(Self::push_tx(&mut state, Confirmation::Committed))
    }

    async fn check_availability(&self) -> Result<bool> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(SdkError::LedgerUnavailable("node unreachable".into()));
        }
        Ok(state.available)
    }
}

/// Encryption double. Counts every call that reaches the subsystem.
#[derive(Default)]
pub struct FakeEncryption {
    ready: tokio::sync::Mutex<bool>,
    ready_flag: AtomicBool,
    fail_init: AtomicBool,
    fail_encrypt: AtomicBool,
    init_calls: AtomicUsize,
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl FakeEncryption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_initialization(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_encryption(&self, fail: bool) {
        self.fail_encrypt.store(fail, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn require_ready(&self) -> Result<()> {
        if self.ready_flag.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SdkError::InitializationFailed("session not initialized".into()))
        }
    }
}

#[async_trait]
impl EncryptionGateway for FakeEncryption {
    async fn initialize_session(&self) -> Result<()> {
        let mut ready = self.ready.lock().await;
        if *ready {
            return Ok(());
        }
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the lock.
        tokio::task::yield_now().await;
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(SdkError::InitializationFailed("key fetch failed".into()));
        }
        *ready = true;
        self.ready_flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn session_state(&self) -> SessionState {
        if self.ready_flag.load(Ordering::SeqCst) {
            SessionState::Ready
        } else if self.fail_init.load(Ordering::SeqCst) && self.init_calls() > 0 {
            SessionState::Failed
        } else {
            SessionState::Uninitialized
        }
    }

    async fn encrypt(&self, contract: &str, account: &str, value: u64) -> Result<EncryptedInput> {
        self.require_ready()?;
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(SdkError::EncryptionFailed("relayer rejected input".into()));
        }
        Ok(EncryptedInput {
            ciphertext: HexBytes(fake_ciphertext(value)),
            proof: HexBytes(format!("input-proof:{}:{}", contract, account).into_bytes()),
        })
    }

    async fn request_clear_value_with_proof(
        &self,
        handles: &[CiphertextHandle],
        _contract: &str,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionResult> {
        self.require_ready()?;
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);

        let mut clear_values = HashMap::new();
        let mut ordered = Vec::with_capacity(handles.len());
        for handle in handles {
            let bytes = HexBytes::from_hex(handle.as_str())?;
            let value = fake_value_of(bytes.as_slice()).ok_or_else(|| {
                SdkError::EncryptionFailed(format!("unknown handle {}", handle))
            })?;
            clear_values.insert(handle.clone(), value);
            ordered.push(value);
        }

        submitter
            .submit(&encode_clear_values(&ordered), b"decryption-proof")
            .await?;

        Ok(DecryptionResult { clear_values })
    }
}
