//! Encryption subsystem surface: session setup, input encryption with a
//! well-formedness proof, and the client half of verified public decryption.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use safenote_network::{join_url, HttpClient};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::codec::{CiphertextHandle, HexBytes};
use crate::config::SessionConfig;
use crate::error::{Result, SdkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub ciphertext: HexBytes,
    pub proof: HexBytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecryptionResult {
    pub clear_values: HashMap<CiphertextHandle, u64>,
}

impl DecryptionResult {
    pub fn value_for(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.clear_values.get(handle).copied()
    }
}

/// Forwards a decryption attestation to the ledger and waits for the outcome.
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    async fn submit(&self, encoded_clear_values: &[u8], decryption_proof: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait EncryptionGateway: Send + Sync {
    /// Idempotent. Concurrent callers share a single initialization.
    async fn initialize_session(&self) -> Result<()>;

    fn session_state(&self) -> SessionState;

    /// Ciphertext bound to `contract` and `account`. Never returns a partial result.
    async fn encrypt(&self, contract: &str, account: &str, value: u64) -> Result<EncryptedInput>;

    /// Obtains clear values plus a decryption proof for `handles`, hands them to
    /// `submitter`, and returns once the submission settles. An `AlreadyVerified`
    /// from the submitter is returned unchanged.
    async fn request_clear_value_with_proof(
        &self,
        handles: &[CiphertextHandle],
        contract: &str,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionResult>;
}

/// JSON bodies exchanged with the encryption relayer.
pub mod wire {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::codec::{CiphertextHandle, HexBytes};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct KeysResponse {
        pub key_id: String,
        pub public_key: HexBytes,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InputProofRequest {
        pub contract: String,
        pub account: String,
        pub value: u64,
        pub key_id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InputProofResponse {
        pub ciphertext: HexBytes,
        pub proof: HexBytes,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PublicDecryptRequest {
        pub handles: Vec<CiphertextHandle>,
        pub contract: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PublicDecryptResponse {
        pub clear_values: HashMap<CiphertextHandle, u64>,
        pub encoded_clear_values: HexBytes,
        pub decryption_proof: HexBytes,
    }
}

pub struct RelayerEncryptionGateway {
    client: HttpClient,
    base_url: String,
    keys: OnceCell<wire::KeysResponse>,
    init_failed: AtomicBool,
}

impl RelayerEncryptionGateway {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = HttpClient::new(config.network_config())?;
        Ok(Self {
            client,
            base_url: config.relayer_url.clone(),
            keys: OnceCell::new(),
            init_failed: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn session_keys(&self) -> Result<&wire::KeysResponse> {
        self.keys
            .get()
            .ok_or_else(|| SdkError::InitializationFailed("session not initialized".into()))
    }
}

#[async_trait]
impl EncryptionGateway for RelayerEncryptionGateway {
    async fn initialize_session(&self) -> Result<()> {
        let result = self
            .keys
            .get_or_try_init(|| async {
                let keys: wire::KeysResponse = self
                    .client
                    .get_json(&self.url("keys"))
                    .await
                    .map_err(|e| SdkError::InitializationFailed(e.to_string()))?;
                if keys.public_key.is_empty() {
                    return Err(SdkError::InitializationFailed("empty public key".into()));
                }
                info!("Encryption session ready (key {})", keys.key_id);
                Ok::<_, SdkError>(keys)
            })
            .await;

        match result {
            Ok(_) => {
                self.init_failed.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!("Encryption session initialization failed: {}", e);
                self.init_failed.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn session_state(&self) -> SessionState {
        if self.keys.initialized() {
            SessionState::Ready
        } else if self.init_failed.load(Ordering::SeqCst) {
            SessionState::Failed
        } else {
            SessionState::Uninitialized
        }
    }

    async fn encrypt(&self, contract: &str, account: &str, value: u64) -> Result<EncryptedInput> {
        let keys = self.session_keys()?;
        let request = wire::InputProofRequest {
            contract: contract.to_string(),
            account: account.to_string(),
            value,
            key_id: keys.key_id.clone(),
        };

        let response: wire::InputProofResponse = self
            .client
            .post_json(&self.url("input-proof"), &request)
            .await
            .map_err(|e| SdkError::EncryptionFailed(e.to_string()))?;

        if response.ciphertext.is_empty() || response.proof.is_empty() {
            return Err(SdkError::EncryptionFailed(
                "relayer returned an incomplete ciphertext".into(),
            ));
        }

        Ok(EncryptedInput {
            ciphertext: response.ciphertext,
            proof: response.proof,
        })
    }

    async fn request_clear_value_with_proof(
        &self,
        handles: &[CiphertextHandle],
        contract: &str,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionResult> {
        self.session_keys()?;
        let request = wire::PublicDecryptRequest {
            handles: handles.to_vec(),
            contract: contract.to_string(),
        };

        let response: wire::PublicDecryptResponse = self
            .client
            .post_json(&self.url("public-decrypt"), &request)
            .await
            .map_err(|e| SdkError::EncryptionFailed(e.to_string()))?;

        if let Some(missing) = handles
            .iter()
            .find(|h| !response.clear_values.contains_key(*h))
        {
            return Err(SdkError::EncryptionFailed(format!(
                "relayer returned no clear value for {}",
                missing
            )));
        }

        submitter
            .submit(
                response.encoded_clear_values.as_slice(),
                response.decryption_proof.as_slice(),
            )
            .await?;

        Ok(DecryptionResult {
            clear_values: response.clear_values,
        })
    }
}
