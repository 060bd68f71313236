/// Verified decryption of a single note:
/// 1. Start: a connected account is required
/// 2. CheckOnLedger: a note the ledger already verified short-circuits here,
///    before any call into the encryption subsystem
/// 3. FetchHandle: ciphertext handle for the note
/// 4. RunProtocol: clear value + proof from the encryption subsystem, forwarded
///    to the ledger by `LedgerProofSubmitter`. A concurrent verifier winning the
///    race surfaces as `AlreadyVerified` and counts as success
///
/// Reconciling the note cache afterwards is left to the caller, which owns the
/// session's mutation lock.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::account::{require_account, AccountProvider};
use crate::encryption::{EncryptionGateway, ProofSubmitter};
use crate::error::{Result, SdkError};
use crate::history::OperationOutcome;
use crate::ledger::{Confirmation, LedgerGateway};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecryptStep {
    Start,
    CheckOnLedger,
    FetchHandle,
    RunProtocol,
}

impl fmt::Display for DecryptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecryptStep::Start => "start",
            DecryptStep::CheckOnLedger => "check-on-ledger",
            DecryptStep::FetchHandle => "fetch-handle",
            DecryptStep::RunProtocol => "run-protocol",
        };
        f.write_str(s)
    }
}

/// Where an existing verification was noticed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationCheck {
    /// The ledger record was already verified when read.
    BeforeProtocol,
    /// Another verifier landed first; our proof submission was refused.
    DuringSubmission,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecryptOutcome {
    Verified(u64),
    AlreadyVerified {
        value: Option<u64>,
        detected: VerificationCheck,
    },
}

impl DecryptOutcome {
    pub fn value(&self) -> Option<u64> {
        match self {
            DecryptOutcome::Verified(value) => Some(*value),
            DecryptOutcome::AlreadyVerified { value, .. } => *value,
        }
    }

    pub fn history_outcome(&self) -> OperationOutcome {
        match self {
            DecryptOutcome::Verified(_) => OperationOutcome::Success,
            DecryptOutcome::AlreadyVerified {
                detected: VerificationCheck::BeforeProtocol,
                ..
            } => OperationOutcome::Verified,
            DecryptOutcome::AlreadyVerified {
                detected: VerificationCheck::DuringSubmission,
                ..
            } => OperationOutcome::AlreadyVerified,
        }
    }
}

/// A revert carrying this reason means another verifier landed first.
pub const ALREADY_VERIFIED_REASON: &str = "data already verified";

fn is_already_verified_reason(reason: &str) -> bool {
    reason.to_lowercase().contains(ALREADY_VERIFIED_REASON)
}

/// Submits the attestation for one note and waits for the transaction to settle.
pub struct LedgerProofSubmitter {
    ledger: Arc<dyn LedgerGateway>,
    note_id: String,
}

impl LedgerProofSubmitter {
    pub fn new(ledger: Arc<dyn LedgerGateway>, note_id: &str) -> Self {
        Self {
            ledger,
            note_id: note_id.to_string(),
        }
    }
}

#[async_trait]
impl ProofSubmitter for LedgerProofSubmitter {
    async fn submit(&self, encoded_clear_values: &[u8], decryption_proof: &[u8]) -> Result<()> {
        let tx = self
            .ledger
            .submit_decryption_proof(&self.note_id, encoded_clear_values, decryption_proof)
            .await?;

        match self.ledger.await_confirmation(&tx).await? {
            Confirmation::Committed => Ok(()),
            Confirmation::Failed(reason) if is_already_verified_reason(&reason) => {
                warn!("Verification of {} reverted: {}", self.note_id, reason);
                Err(SdkError::AlreadyVerified(self.note_id.clone()))
            }
            Confirmation::Failed(reason) => Err(SdkError::LedgerUnavailable(format!(
                "verification of {} reverted: {}",
                self.note_id, reason
            ))),
        }
    }
}

pub struct DecryptionCoordinator {
    accounts: Arc<dyn AccountProvider>,
    ledger: Arc<dyn LedgerGateway>,
    encryption: Arc<dyn EncryptionGateway>,
}

impl DecryptionCoordinator {
    pub fn new(
        accounts: Arc<dyn AccountProvider>,
        ledger: Arc<dyn LedgerGateway>,
        encryption: Arc<dyn EncryptionGateway>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            encryption,
        }
    }

    pub async fn run(&self, note_id: &str) -> Result<DecryptOutcome> {
        info!("decrypt {}: {}", note_id, DecryptStep::Start);
        let account = require_account(self.accounts.as_ref())?;

        info!("decrypt {}: {}", note_id, DecryptStep::CheckOnLedger);
        let record = self.ledger.get_note(note_id).await?;
        if record.is_verified {
            info!("decrypt {}: already verified on ledger", note_id);
            return Ok(DecryptOutcome::AlreadyVerified {
                value: Some(record.decrypted_value),
                detected: VerificationCheck::BeforeProtocol,
            });
        }

        info!("decrypt {}: {}", note_id, DecryptStep::FetchHandle);
        let handle = self.ledger.get_encrypted_handle(note_id).await?;
        let contract = self.ledger.contract_address().await?;

        info!(
            "decrypt {}: {} (handle {}, account {})",
            note_id,
            DecryptStep::RunProtocol,
            handle,
            account
        );
        self.encryption.initialize_session().await?;
        let submitter = LedgerProofSubmitter::new(self.ledger.clone(), note_id);
        let result = self
            .encryption
            .request_clear_value_with_proof(std::slice::from_ref(&handle), &contract, &submitter)
            .await;

        match result {
            Ok(decrypted) => {
                let value = decrypted.value_for(&handle).ok_or_else(|| {
                    SdkError::EncryptionFailed(format!("no clear value returned for {}", handle))
                })?;
                info!("decrypt {}: verified", note_id);
                Ok(DecryptOutcome::Verified(value))
            }
            Err(e) if e.is_already_verified() => {
                info!("decrypt {}: verified concurrently by another party", note_id);
                Ok(DecryptOutcome::AlreadyVerified {
                    value: None,
                    detected: VerificationCheck::DuringSubmission,
                })
            }
            Err(e) => {
                warn!("decrypt {}: failed: {}", note_id, e);
                Err(e)
            }
        }
    }
}
