//! In-memory note contract. Writes take effect when submitted; the
//! transaction itself reports `pending` until the configured confirmation
//! delay has passed. A write whose proof does not check out is still accepted
//! as a transaction and then reports `failed`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use safenote_sdk::codec::decode_clear_values;
use safenote_sdk::ledger::wire::{TxStatus, TxStatusResponse};
use safenote_sdk::ledger::CreateNoteRequest;
use safenote_sdk::{CiphertextHandle, NoteRecord};

use crate::error::{DevnodeError, Result};
use crate::sealing::Sealer;

struct StoredNote {
    record: NoteRecord,
    ciphertext: Vec<u8>,
    handle: CiphertextHandle,
}

struct PendingTx {
    ready_at: Instant,
    outcome: std::result::Result<(), String>,
}

#[derive(Default)]
struct State {
    order: Vec<String>,
    notes: HashMap<String, StoredNote>,
    txs: HashMap<String, PendingTx>,
    next_tx: u64,
    rejected_signers: HashSet<String>,
}

pub struct NoteLedger {
    contract_address: String,
    sealer: Arc<Sealer>,
    confirmation_delay: Duration,
    state: RwLock<State>,
    available: AtomicBool,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl NoteLedger {
    pub fn new(contract_address: &str, sealer: Arc<Sealer>, confirmation_delay: Duration) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            sealer,
            confirmation_delay,
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Subsequent creates signed by `account` are declined.
    pub async fn reject_signer(&self, account: &str) {
        self.state
            .write()
            .await
            .rejected_signers
            .insert(account.to_lowercase());
    }

    pub async fn note_ids(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    pub async fn note(&self, id: &str) -> Result<NoteRecord> {
        self.state
            .read()
            .await
            .notes
            .get(id)
            .map(|n| n.record.clone())
            .ok_or_else(|| DevnodeError::NotFound(id.to_string()))
    }

    pub async fn handle(&self, id: &str) -> Result<CiphertextHandle> {
        self.state
            .read()
            .await
            .notes
            .get(id)
            .map(|n| n.handle.clone())
            .ok_or_else(|| DevnodeError::NotFound(id.to_string()))
    }

    /// Ciphertext behind a handle previously issued by this ledger.
    pub async fn ciphertext(&self, handle: &CiphertextHandle) -> Result<Vec<u8>> {
        self.state
            .read()
            .await
            .notes
            .values()
            .find(|n| &n.handle == handle)
            .map(|n| n.ciphertext.clone())
            .ok_or_else(|| DevnodeError::NotFound(handle.to_string()))
    }

    pub async fn create(&self, request: CreateNoteRequest) -> Result<String> {
        let mut state = self.state.write().await;
        if state
            .rejected_signers
            .contains(&request.signer.to_lowercase())
        {
            warn!("Signer {} declined create of {}", request.signer, request.id);
            return Err(DevnodeError::SignerRejected);
        }
        if request.id.is_empty() || request.title.is_empty() {
            return Err(DevnodeError::InvalidRequest("id and title are required".into()));
        }
        if state.notes.contains_key(&request.id) {
            return Err(DevnodeError::InvalidRequest(format!(
                "note {} already exists",
                request.id
            )));
        }

        let ciphertext = request.encrypted_value.0;
        let expected = self.sealer.input_proof(
            &self.contract_address,
            &request.signer,
            &ciphertext,
        );
        if request.input_proof.as_slice() != expected.as_slice() {
            warn!("Create of {} reverted: input proof rejected", request.id);
            return Ok(self.push_tx(&mut state, Err("input proof rejected".into())));
        }
        self.sealer.open(&ciphertext)?;

        let record = NoteRecord {
            id: request.id.clone(),
            title: request.title,
            content: request.plaintext_mirror,
            creator: request.signer,
            timestamp: now_secs(),
            is_verified: false,
            decrypted_value: 0,
            public_value1: request.category_code,
            public_value2: request.aux_code,
        };
        let handle = CiphertextHandle::from_bytes(&ciphertext);
        state.order.push(request.id.clone());
        state.notes.insert(
            request.id.clone(),
            StoredNote {
                record,
                ciphertext,
                handle,
            },
        );
        info!("Note {} stored", request.id);

        Ok(self.push_tx(&mut state, Ok(())))
    }

    pub async fn verify(&self, id: &str, clear_values: &[u8], proof: &[u8]) -> Result<String> {
        let mut state = self.state.write().await;
        let note = state
            .notes
            .get(id)
            .ok_or_else(|| DevnodeError::NotFound(id.to_string()))?;
        if note.record.is_verified {
            debug!("Note {} already verified", id);
            return Err(DevnodeError::AlreadyVerified);
        }

        let expected = self.sealer.decryption_proof(
            &self.contract_address,
            std::slice::from_ref(&note.handle),
            clear_values,
        );
        if proof != expected.as_slice() {
            warn!("Verification of {} reverted: decryption proof rejected", id);
            return Ok(self.push_tx(&mut state, Err("decryption proof rejected".into())));
        }
        let value = match decode_clear_values(clear_values)?.as_slice() {
            [value] => *value,
            other => {
                return Err(DevnodeError::InvalidRequest(format!(
                    "expected one clear value, got {}",
                    other.len()
                )))
            }
        };

        if let Some(note) = state.notes.get_mut(id) {
            note.record.is_verified = true;
            note.record.decrypted_value = value;
        }
        info!("Note {} verified", id);

        Ok(self.push_tx(&mut state, Ok(())))
    }

    pub async fn tx_status(&self, tx: &str) -> Result<TxStatusResponse> {
        let state = self.state.read().await;
        let pending = state
            .txs
            .get(tx)
            .ok_or_else(|| DevnodeError::UnknownTransaction(tx.to_string()))?;

        if Instant::now() < pending.ready_at {
            return Ok(TxStatusResponse {
                status: TxStatus::Pending,
                reason: None,
            });
        }
        Ok(match &pending.outcome {
            Ok(()) => TxStatusResponse {
                status: TxStatus::Committed,
                reason: None,
            },
            Err(reason) => TxStatusResponse {
                status: TxStatus::Failed,
                reason: Some(reason.clone()),
            },
        })
    }

    fn push_tx(&self, state: &mut State, outcome: std::result::Result<(), String>) -> String {
        state.next_tx += 1;
        let tx = format!("0x{:064x}", state.next_tx);
        state.txs.insert(
            tx.clone(),
            PendingTx {
                ready_at: Instant::now() + self.confirmation_delay,
                outcome,
            },
        );
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safenote_sdk::codec::encode_clear_values;
    use safenote_sdk::HexBytes;

    const CONTRACT: &str = "0x5afe";
    const ACCOUNT: &str = "0xa11ce";

    fn ledger(delay: Duration) -> (Arc<Sealer>, NoteLedger) {
        let sealer = Arc::new(Sealer::new("test"));
        let ledger = NoteLedger::new(CONTRACT, sealer.clone(), delay);
        (sealer, ledger)
    }

    fn request(sealer: &Sealer, id: &str, value: u64) -> CreateNoteRequest {
        let ciphertext = sealer.seal(value);
        let proof = sealer.input_proof(CONTRACT, ACCOUNT, &ciphertext);
        CreateNoteRequest {
            id: id.to_string(),
            title: "T".to_string(),
            encrypted_value: HexBytes(ciphertext),
            input_proof: HexBytes(proof),
            category_code: 1,
            aux_code: 0,
            plaintext_mirror: value.to_string(),
            signer: ACCOUNT.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_verify() {
        let (sealer, ledger) = ledger(Duration::ZERO);
        ledger.create(request(&sealer, "note-1", 42)).await.unwrap();

        let record = ledger.note("note-1").await.unwrap();
        assert!(!record.is_verified);
        assert_eq!(record.public_value1, 1);

        let handle = ledger.handle("note-1").await.unwrap();
        let encoded = encode_clear_values(&[42]);
        let proof = sealer.decryption_proof(CONTRACT, std::slice::from_ref(&handle), &encoded);
        ledger.verify("note-1", &encoded, &proof).await.unwrap();

        let record = ledger.note("note-1").await.unwrap();
        assert!(record.is_verified);
        assert_eq!(record.decrypted_value, 42);

        assert!(matches!(
            ledger.verify("note-1", &encoded, &proof).await,
            Err(DevnodeError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn test_proof_for_other_signer_reverts() {
        let (sealer, ledger) = ledger(Duration::ZERO);
        let mut req = request(&sealer, "note-1", 1);
        req.signer = "0xb0b".to_string();

        let tx = ledger.create(req).await.unwrap();
        let status = ledger.tx_status(&tx).await.unwrap();
        assert_eq!(status.status, TxStatus::Failed);
        assert_eq!(status.reason.as_deref(), Some("input proof rejected"));
        assert!(ledger.note_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_clear_value_reverts() {
        let (sealer, ledger) = ledger(Duration::ZERO);
        ledger.create(request(&sealer, "note-1", 5)).await.unwrap();
        let handle = ledger.handle("note-1").await.unwrap();

        let forged = encode_clear_values(&[6]);
        let proof = sealer.decryption_proof("0xother", std::slice::from_ref(&handle), &forged);
        let tx = ledger.verify("note-1", &forged, &proof).await.unwrap();
        assert_eq!(ledger.tx_status(&tx).await.unwrap().status, TxStatus::Failed);
        assert!(!ledger.note("note-1").await.unwrap().is_verified);
    }

    #[tokio::test]
    async fn test_rejected_signer() {
        let (sealer, ledger) = ledger(Duration::ZERO);
        ledger.reject_signer("0xA11CE").await;
        assert!(matches!(
            ledger.create(request(&sealer, "note-1", 1)).await,
            Err(DevnodeError::SignerRejected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tx_pending_until_delay() {
        let (sealer, ledger) = ledger(Duration::from_secs(1));
        let tx = ledger.create(request(&sealer, "note-1", 1)).await.unwrap();
        assert_eq!(ledger.tx_status(&tx).await.unwrap().status, TxStatus::Pending);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(
            ledger.tx_status(&tx).await.unwrap().status,
            TxStatus::Committed
        );
        assert!(ledger.tx_status("0xnope").await.is_err());
    }
}
