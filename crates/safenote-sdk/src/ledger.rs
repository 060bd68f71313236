//! Ledger contract surface: note enumeration and reads, note creation,
//! ciphertext handles and verified-decryption submission.
//!
//! Writes return a [`TxHandle`] as soon as the transaction is submitted;
//! [`LedgerGateway::await_confirmation`] suspends until it is included or
//! rejected. Nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use safenote_network::{join_url, HttpClient, NetworkError};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::codec::{CiphertextHandle, HexBytes};
use crate::config::SessionConfig;
use crate::error::{Result, SdkError};
use crate::note::NoteRecord;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Committed,
    Failed(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub id: String,
    pub title: String,
    pub encrypted_value: HexBytes,
    pub input_proof: HexBytes,
    /// Stored as the record's first public value
    pub category_code: u64,
    /// Stored as the record's second public value
    pub aux_code: u64,
    pub plaintext_mirror: String,
    /// Account that signs the transaction
    pub signer: String,
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Address of the note contract. Encryptions are bound to it.
    async fn contract_address(&self) -> Result<String>;

    async fn list_note_ids(&self) -> Result<Vec<String>>;

    async fn get_note(&self, id: &str) -> Result<NoteRecord>;

    async fn create_note(&self, request: CreateNoteRequest) -> Result<TxHandle>;

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation>;

    async fn get_encrypted_handle(&self, id: &str) -> Result<CiphertextHandle>;

    /// Fails with `AlreadyVerified` when the ledger already holds a verification for `id`.
    async fn submit_decryption_proof(
        &self,
        id: &str,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxHandle>;

    async fn check_availability(&self) -> Result<bool>;
}

/// JSON bodies exchanged with the ledger contract facade.
pub mod wire {
    use serde::{Deserialize, Serialize};

    use crate::codec::{CiphertextHandle, HexBytes};
    use crate::ledger::TxHandle;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ContractResponse {
        pub address: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct NoteIdsResponse {
        pub ids: Vec<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct HandleResponse {
        pub handle: CiphertextHandle,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TxResponse {
        pub tx: TxHandle,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct VerifyRequest {
        pub clear_values: HexBytes,
        pub proof: HexBytes,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum TxStatus {
        Pending,
        Committed,
        Failed,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TxStatusResponse {
        pub status: TxStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub reason: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AvailabilityResponse {
        pub available: bool,
    }
}

/// Maps transport failures onto the ledger error taxonomy.
fn ledger_error(err: NetworkError, id: &str) -> SdkError {
    match err.status_code() {
        Some(404) => SdkError::NotFound(id.to_string()),
        Some(409) => SdkError::AlreadyVerified(id.to_string()),
        Some(403) => SdkError::UserRejected,
        _ => SdkError::LedgerUnavailable(err.to_string()),
    }
}

pub struct HttpLedgerGateway {
    client: HttpClient,
    base_url: String,
    poll_interval: Duration,
    contract: OnceCell<String>,
}

impl HttpLedgerGateway {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = HttpClient::new(config.network_config())?;
        Ok(Self {
            client,
            base_url: config.ledger_url.clone(),
            poll_interval: config.confirmation_poll_interval,
            contract: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn contract_address(&self) -> Result<String> {
        let address = self
            .contract
            .get_or_try_init(|| async {
                let response: wire::ContractResponse = self
                    .client
                    .get_json(&self.url("contract"))
                    .await
                    .map_err(|e| ledger_error(e, "contract"))?;
                Ok::<_, SdkError>(response.address)
            })
            .await?;
        Ok(address.clone())
    }

    async fn list_note_ids(&self) -> Result<Vec<String>> {
        let response: wire::NoteIdsResponse = self
            .client
            .get_json(&self.url("notes"))
            .await
            .map_err(|e| match e {
                NetworkError::Connection(_) => SdkError::NotConnected,
                other => ledger_error(other, "notes"),
            })?;
        Ok(response.ids)
    }

    async fn get_note(&self, id: &str) -> Result<NoteRecord> {
        self.client
            .get_json(&self.url(&format!("notes/{}", id)))
            .await
            .map_err(|e| ledger_error(e, id))
    }

    async fn create_note(&self, request: CreateNoteRequest) -> Result<TxHandle> {
        let id = request.id.clone();
        let response: wire::TxResponse = self
            .client
            .post_json(&self.url("notes"), &request)
            .await
            .map_err(|e| ledger_error(e, &id))?;
        debug!("Create transaction for {} submitted: {}", id, response.tx.0);
        Ok(response.tx)
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation> {
        let url = self.url(&format!("tx/{}", tx.0));
        loop {
            let response: wire::TxStatusResponse = self
                .client
                .get_json(&url)
                .await
                .map_err(|e| ledger_error(e, &tx.0))?;

            match response.status {
                wire::TxStatus::Pending => tokio::time::sleep(self.poll_interval).await,
                wire::TxStatus::Committed => return Ok(Confirmation::Committed),
                wire::TxStatus::Failed => {
                    let reason = response.reason.unwrap_or_else(|| "reverted".to_string());
                    warn!("Transaction {} failed: {}", tx.0, reason);
                    return Ok(Confirmation::Failed(reason));
                }
            }
        }
    }

    async fn get_encrypted_handle(&self, id: &str) -> Result<CiphertextHandle> {
        let response: wire::HandleResponse = self
            .client
            .get_json(&self.url(&format!("notes/{}/handle", id)))
            .await
            .map_err(|e| ledger_error(e, id))?;
        Ok(response.handle)
    }

    async fn submit_decryption_proof(
        &self,
        id: &str,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxHandle> {
        let body = wire::VerifyRequest {
            clear_values: HexBytes(clear_values.to_vec()),
            proof: HexBytes(proof.to_vec()),
        };
        let response: wire::TxResponse = self
            .client
            .post_json(&self.url(&format!("notes/{}/verify", id)), &body)
            .await
            .map_err(|e| ledger_error(e, id))?;
        Ok(response.tx)
    }

    async fn check_availability(&self) -> Result<bool> {
        let response: wire::AvailabilityResponse = self
            .client
            .get_json(&self.url("available"))
            .await
            .map_err(|e| ledger_error(e, "available"))?;
        Ok(response.available)
    }
}
