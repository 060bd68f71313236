use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use safenote_sdk::codec::encode_clear_values;
use safenote_sdk::encryption::wire::{
    InputProofRequest, InputProofResponse, KeysResponse, PublicDecryptRequest,
    PublicDecryptResponse,
};
use safenote_sdk::HexBytes;

use crate::error::{DevnodeError, Result};
use crate::ledger::NoteLedger;
use crate::sealing::Sealer;

/// Mock encryption relayer. Decryption reads ciphertexts straight from the
/// local ledger, so handles from any other ledger are unknown here.
pub struct EncryptionRelayer {
    sealer: Arc<Sealer>,
    ledger: Arc<NoteLedger>,
}

impl EncryptionRelayer {
    pub fn new(sealer: Arc<Sealer>, ledger: Arc<NoteLedger>) -> Self {
        Self { sealer, ledger }
    }

    pub fn keys(&self) -> KeysResponse {
        KeysResponse {
            key_id: self.sealer.key_id(),
            public_key: HexBytes(self.sealer.public_key()),
        }
    }

    pub fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse> {
        if request.key_id != self.sealer.key_id() {
            return Err(DevnodeError::InvalidRequest(format!(
                "unknown key id {}",
                request.key_id
            )));
        }
        if request.contract.is_empty() || request.account.is_empty() {
            return Err(DevnodeError::InvalidRequest(
                "contract and account are required".into(),
            ));
        }

        let ciphertext = self.sealer.seal(request.value);
        let proof = self
            .sealer
            .input_proof(&request.contract, &request.account, &ciphertext);
        debug!("Encrypted input for {} on {}", request.account, request.contract);

        Ok(InputProofResponse {
            ciphertext: HexBytes(ciphertext),
            proof: HexBytes(proof),
        })
    }

    pub async fn public_decrypt(
        &self,
        request: &PublicDecryptRequest,
    ) -> Result<PublicDecryptResponse> {
        if request.handles.is_empty() {
            return Err(DevnodeError::InvalidRequest("no handles given".into()));
        }

        let mut values = Vec::with_capacity(request.handles.len());
        for handle in &request.handles {
            let ciphertext = self.ledger.ciphertext(handle).await?;
            values.push(self.sealer.open(&ciphertext)?);
        }

        let encoded = encode_clear_values(&values);
        let proof = self
            .sealer
            .decryption_proof(&request.contract, &request.handles, &encoded);
        info!("Publicly decrypted {} handle(s)", values.len());

        let clear_values: HashMap<_, _> = request
            .handles
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect();

        Ok(PublicDecryptResponse {
            clear_values,
            encoded_clear_values: HexBytes(encoded),
            decryption_proof: HexBytes(proof),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use safenote_sdk::ledger::CreateNoteRequest;

    const CONTRACT: &str = "0x5afe";
    const ACCOUNT: &str = "0xa11ce";

    fn setup() -> (Arc<NoteLedger>, EncryptionRelayer) {
        let sealer = Arc::new(Sealer::new("test"));
        let ledger = Arc::new(NoteLedger::new(CONTRACT, sealer.clone(), Duration::ZERO));
        let relayer = EncryptionRelayer::new(sealer, ledger.clone());
        (ledger, relayer)
    }

    #[tokio::test]
    async fn test_encrypt_store_decrypt() {
        let (ledger, relayer) = setup();
        let input = relayer
            .input_proof(&InputProofRequest {
                contract: CONTRACT.to_string(),
                account: ACCOUNT.to_string(),
                value: 42,
                key_id: relayer.keys().key_id,
            })
            .unwrap();

        ledger
            .create(CreateNoteRequest {
                id: "note-1".to_string(),
                title: "T".to_string(),
                encrypted_value: input.ciphertext,
                input_proof: input.proof,
                category_code: 1,
                aux_code: 0,
                plaintext_mirror: "42".to_string(),
                signer: ACCOUNT.to_string(),
            })
            .await
            .unwrap();

        let handle = ledger.handle("note-1").await.unwrap();
        let response = relayer
            .public_decrypt(&PublicDecryptRequest {
                handles: vec![handle.clone()],
                contract: CONTRACT.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.clear_values[&handle], 42);

        ledger
            .verify(
                "note-1",
                response.encoded_clear_values.as_slice(),
                response.decryption_proof.as_slice(),
            )
            .await
            .unwrap();
        assert!(ledger.note("note-1").await.unwrap().is_verified);
    }

    #[test]
    fn test_unknown_key_id_is_refused() {
        let (_, relayer) = setup();
        let result = relayer.input_proof(&InputProofRequest {
            contract: CONTRACT.to_string(),
            account: ACCOUNT.to_string(),
            value: 1,
            key_id: "stale".to_string(),
        });
        assert!(matches!(result, Err(DevnodeError::InvalidRequest(_))));
    }
}
