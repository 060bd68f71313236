//! Session cache of notes, reconciled against the ledger.
//!
//! `refresh_all`, `create` and the decrypt reconcile step are serialized by a
//! single mutation lock, so a refresh can never interleave with a create that
//! is waiting on confirmation. Readers see either the previous collection or
//! the next one, never a partial refresh.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::account::{require_account, AccountProvider};
use crate::encryption::EncryptionGateway;
use crate::error::{Result, SdkError};
use crate::ledger::{Confirmation, CreateNoteRequest, LedgerGateway};
use crate::note::{NewNote, NoteIdGenerator, SecureNote};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateStage {
    Encrypting,
    AwaitingConfirmation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NoteStats {
    pub total: usize,
    pub verified: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-indexed
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Case-insensitive substring match on title, content or category.
pub fn filter_notes(notes: &[SecureNote], term: &str) -> Vec<SecureNote> {
    let needle = term.trim().to_lowercase();
    notes
        .iter()
        .filter(|note| needle.is_empty() || note.matches(&needle))
        .cloned()
        .collect()
}

/// Pages past the end (and page 0) come back empty.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, page: usize) -> Page<T> {
    let total_items = items.len();
    let total_pages = if page_size == 0 {
        0
    } else {
        total_items.div_ceil(page_size)
    };

    let slice = match page.checked_sub(1) {
        Some(index) if page_size > 0 => {
            let start = index.saturating_mul(page_size);
            let end = start.saturating_add(page_size).min(total_items);
            items.get(start..end).unwrap_or(&[])
        }
        _ => &[],
    };

    Page {
        items: slice.to_vec(),
        page,
        page_size,
        total_items,
        total_pages,
    }
}

/// Keeps failures from `create` inside its documented error set.
fn ledger_failure(err: SdkError) -> SdkError {
    match err {
        SdkError::UserRejected | SdkError::LedgerUnavailable(_) | SdkError::NotConnected => err,
        other => SdkError::LedgerUnavailable(other.to_string()),
    }
}

fn encryption_failure(err: SdkError) -> SdkError {
    match err {
        SdkError::EncryptionFailed(_) | SdkError::InitializationFailed(_) => err,
        other => SdkError::EncryptionFailed(other.to_string()),
    }
}

pub struct NoteStore {
    accounts: Arc<dyn AccountProvider>,
    ledger: Arc<dyn LedgerGateway>,
    encryption: Arc<dyn EncryptionGateway>,
    notes: RwLock<Vec<SecureNote>>,
    mutation: Mutex<()>,
    refreshing: AtomicBool,
    ids: NoteIdGenerator,
}

impl NoteStore {
    pub fn new(
        accounts: Arc<dyn AccountProvider>,
        ledger: Arc<dyn LedgerGateway>,
        encryption: Arc<dyn EncryptionGateway>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            encryption,
            notes: RwLock::new(Vec::new()),
            mutation: Mutex::new(()),
            refreshing: AtomicBool::new(false),
            ids: NoteIdGenerator::new(),
        }
    }

    pub async fn refresh_all(&self) -> Result<Vec<SecureNote>> {
        let _mutation = self.mutation.lock().await;
        self.reload().await
    }

    /// Caller holds the mutation lock.
    async fn reload(&self) -> Result<Vec<SecureNote>> {
        self.refreshing.store(true, Ordering::SeqCst);
        let result = self.fetch_all().await;
        self.refreshing.store(false, Ordering::SeqCst);

        let mut fresh = result?;
        {
            let mut notes = self.notes.write();
            for note in fresh.iter_mut().filter(|n| !n.is_verified) {
                if let Some(cached) = notes.iter().find(|c| c.id == note.id && c.is_verified) {
                    warn!(
                        "Ledger reports {} unverified after verification; keeping verified state",
                        note.id
                    );
                    note.is_verified = true;
                    note.decrypted_value = cached.decrypted_value;
                }
            }
            *notes = fresh.clone();
        }

        info!("Loaded {} notes", fresh.len());
        Ok(fresh)
    }

    async fn fetch_all(&self) -> Result<Vec<SecureNote>> {
        let ids = self.ledger.list_note_ids().await?;
        let mut seen = HashSet::with_capacity(ids.len());
        let mut fresh = Vec::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.ledger.get_note(&id).await {
                Ok(record) => fresh.push(SecureNote::from(record)),
                Err(e) => warn!("Skipping unreadable note {}: {}", id, e),
            }
        }
        Ok(fresh)
    }

    /// Encrypts and submits a new note, waits for confirmation, then reloads.
    pub async fn create(
        &self,
        input: &NewNote,
        on_stage: &(dyn Fn(CreateStage) + Send + Sync),
    ) -> Result<SecureNote> {
        let account = require_account(self.accounts.as_ref())?;
        let note = input.validate()?;

        let _mutation = self.mutation.lock().await;

        on_stage(CreateStage::Encrypting);
        self.encryption.initialize_session().await?;
        let contract = self
            .ledger
            .contract_address()
            .await
            .map_err(ledger_failure)?;
        let encrypted = self
            .encryption
            .encrypt(&contract, &account, note.value)
            .await
            .map_err(encryption_failure)?;

        let id = self.ids.next_id();
        let request = CreateNoteRequest {
            id: id.clone(),
            title: note.title.clone(),
            encrypted_value: encrypted.ciphertext,
            input_proof: encrypted.proof,
            category_code: note.category.code(),
            aux_code: 0,
            plaintext_mirror: note.content.clone(),
            signer: account.clone(),
        };
        let tx = self
            .ledger
            .create_note(request)
            .await
            .map_err(ledger_failure)?;

        on_stage(CreateStage::AwaitingConfirmation);
        let confirmation = self
            .ledger
            .await_confirmation(&tx)
            .await
            .map_err(ledger_failure)?;
        if let Confirmation::Failed(reason) = confirmation {
            return Err(SdkError::LedgerUnavailable(format!(
                "create transaction {} failed: {}",
                tx.0, reason
            )));
        }
        info!("Note {} committed in {}", id, tx.0);

        let notes = match self.reload().await {
            Ok(notes) => notes,
            Err(e) => {
                warn!("Refresh after creating {} failed: {}", id, e);
                self.notes()
            }
        };
        if let Some(created) = notes.into_iter().find(|n| n.id == id) {
            return Ok(created);
        }

        // Committed but not yet readable; cache it until the next refresh.
        let optimistic = SecureNote {
            id,
            title: note.title,
            content: note.content,
            category: note.category,
            creator: account,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            is_verified: false,
            decrypted_value: 0,
            public_value1: note.category.code(),
            public_value2: 0,
        };
        self.notes.write().push(optimistic.clone());
        Ok(optimistic)
    }

    pub fn notes(&self) -> Vec<SecureNote> {
        self.notes.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<SecureNote> {
        self.notes.read().iter().find(|n| n.id == id).cloned()
    }

    pub fn filter(&self, term: &str) -> Vec<SecureNote> {
        filter_notes(&self.notes.read(), term)
    }

    pub fn page(&self, term: &str, page_size: usize, page: usize) -> Page<SecureNote> {
        paginate(&self.filter(term), page_size, page)
    }

    pub fn stats(&self) -> NoteStats {
        let notes = self.notes.read();
        NoteStats {
            total: notes.len(),
            verified: notes.iter().filter(|n| n.is_verified).count(),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ManualAccountProvider;
    use crate::note::Category;
    use crate::testing::{FakeEncryption, InMemoryLedger, FAKE_ACCOUNT};

    fn no_progress(_: CreateStage) {}

    fn setup() -> (Arc<InMemoryLedger>, Arc<FakeEncryption>, Arc<NoteStore>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let encryption = Arc::new(FakeEncryption::new());
        let store = Arc::new(NoteStore::new(
            Arc::new(ManualAccountProvider::connected(FAKE_ACCOUNT)),
            ledger.clone(),
            encryption.clone(),
        ));
        (ledger, encryption, store)
    }

    fn note(id: &str, title: &str, content: &str, category: Category) -> SecureNote {
        SecureNote {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            category,
            creator: FAKE_ACCOUNT.into(),
            timestamp: 0,
            is_verified: false,
            decrypted_value: 0,
            public_value1: category.code(),
            public_value2: 0,
        }
    }

    #[tokio::test]
    async fn test_refresh_skips_unreadable_notes() {
        let (ledger, _, store) = setup();
        ledger.insert_note("note-1", "a", 1, Category::Work, false);
        ledger.insert_note("note-2", "b", 2, Category::Work, false);
        ledger.insert_note("note-3", "c", 3, Category::Work, false);
        ledger.make_unreadable("note-2");

        let notes = store.refresh_all().await.unwrap();
        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["note-1", "note-3"]);
        assert_eq!(store.notes().len(), 2);
        assert!(!store.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_never_exceeds_listed_ids() {
        let (ledger, _, store) = setup();
        ledger.insert_note("note-1", "a", 1, Category::Work, false);
        ledger.insert_note("note-2", "b", 2, Category::Work, false);
        ledger.duplicate_listing();

        let listed = ledger.list_note_ids().await.unwrap().len();
        let notes = store.refresh_all().await.unwrap();
        assert!(notes.len() <= listed);
        assert_eq!(notes.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_collection() {
        let (ledger, _, store) = setup();
        ledger.insert_note("note-1", "a", 1, Category::Work, false);
        store.refresh_all().await.unwrap();

        ledger.set_disconnected(true);
        assert!(matches!(store.refresh_all().await, Err(SdkError::NotConnected)));
        assert_eq!(store.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_verified_flag_is_monotonic() {
        let (ledger, _, store) = setup();
        ledger.insert_note("note-1", "a", 5, Category::Work, true);
        store.refresh_all().await.unwrap();

        ledger.force_unverify("note-1");
        let notes = store.refresh_all().await.unwrap();
        assert!(notes[0].is_verified);
        assert_eq!(notes[0].decrypted_value, 5);
    }

    #[tokio::test]
    async fn test_create_then_refresh_yields_unverified_note() {
        let (ledger, encryption, store) = setup();
        let created = store
            .create(&NewNote::new("T", "42", Category::Personal), &no_progress)
            .await
            .unwrap();

        assert_eq!(created.title, "T");
        assert!(!created.is_verified);
        assert_eq!(created.decrypted_value, 0);
        assert_eq!(created.category, Category::Personal);
        assert_eq!(created.creator, FAKE_ACCOUNT);
        assert_eq!(encryption.encrypt_calls(), 1);

        let notes = store.refresh_all().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, created.id);
        assert_eq!(ledger.record(&created.id).unwrap().content, "42");
    }

    #[tokio::test]
    async fn test_create_reports_stages_in_order() {
        let (_, _, store) = setup();
        let stages = parking_lot::Mutex::new(Vec::new());
        store
            .create(&NewNote::new("T", "1", Category::Work), &|stage| {
                stages.lock().push(stage)
            })
            .await
            .unwrap();
        assert_eq!(
            *stages.lock(),
            vec![CreateStage::Encrypting, CreateStage::AwaitingConfirmation]
        );
    }

    #[tokio::test]
    async fn test_create_failures() {
        let (ledger, encryption, store) = setup();

        let err = store
            .create(&NewNote::new("", "1", Category::Work), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ValidationFailed(_)));
        assert_eq!(encryption.encrypt_calls(), 0);

        ledger.reject_signer(FAKE_ACCOUNT);
        let err = store
            .create(&NewNote::new("T", "1", Category::Work), &no_progress)
            .await
            .unwrap_err();
        assert!(err.is_user_rejected());

        encryption.fail_encryption(true);
        let err = store
            .create(&NewNote::new("T", "1", Category::Work), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::EncryptionFailed(_)));
        assert_eq!(ledger.note_count(), 0);
    }

    #[tokio::test]
    async fn test_reverted_create_is_ledger_unavailable() {
        let (ledger, _, store) = setup();
        ledger.revert_creates("out of gas");
        let err = store
            .create(&NewNote::new("T", "1", Category::Work), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::LedgerUnavailable(msg) if msg.contains("out of gas")));
        assert!(store.notes().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_waits_for_pending_create() {
        let (ledger, _, store) = setup();
        ledger.hold_confirmations();

        let creating = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create(&NewNote::new("T", "3", Category::Work), &no_progress)
                    .await
            })
        };
        tokio::task::yield_now().await;

        let refreshing = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh_all().await })
        };
        tokio::task::yield_now().await;
        assert!(!refreshing.is_finished());

        ledger.release_confirmations();
        let created = creating.await.unwrap().unwrap();
        let notes = refreshing.await.unwrap().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, created.id);
    }

    #[test]
    fn test_filter_is_case_insensitive_across_fields() {
        let notes = vec![
            note("1", "Rent", "1200", Category::Financial),
            note("2", "Standup", "9", Category::Work),
            note("3", "Birthday", "1985", Category::Personal),
        ];

        let titles = |found: Vec<SecureNote>| -> Vec<String> {
            found.into_iter().map(|n| n.title).collect()
        };
        assert_eq!(titles(filter_notes(&notes, "RENT")), vec!["Rent"]);
        assert_eq!(titles(filter_notes(&notes, "198")), vec!["Birthday"]);
        assert_eq!(titles(filter_notes(&notes, "Work")), vec!["Standup"]);
        assert_eq!(filter_notes(&notes, "").len(), 3);
        assert!(filter_notes(&notes, "zzz").is_empty());
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (1..=12).collect();

        let first = paginate(&items, 5, 1);
        assert_eq!(first.items, vec![1, 2, 3, 4, 5]);
        assert_eq!(first.total_pages, 3);

        assert_eq!(paginate(&items, 5, 3).items, vec![11, 12]);
        assert!(paginate(&items, 5, 4).items.is_empty());
        assert!(paginate(&items, 5, 0).items.is_empty());
        assert!(paginate(&items, 0, 1).items.is_empty());
        assert!(paginate(&items, 5, usize::MAX).items.is_empty());
        assert_eq!(paginate::<u32>(&[], 5, 1).total_pages, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let (ledger, _, store) = setup();
        ledger.insert_note("note-1", "a", 1, Category::Work, true);
        ledger.insert_note("note-2", "b", 2, Category::Work, false);
        store.refresh_all().await.unwrap();
        assert_eq!(
            store.stats(),
            NoteStats {
                total: 2,
                verified: 1
            }
        );
    }
}
