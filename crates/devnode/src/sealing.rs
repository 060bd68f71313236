//! Stand-in for the encryption subsystem. A ciphertext is
//! `tag || nonce || (value XOR keystream)` with the keystream derived from the
//! node secret, and proofs are SHA-256 digests keyed by the same secret.
//! This hides nothing from whoever runs the node.

use rand::RngCore;
use sha2::{Digest, Sha256};

use safenote_sdk::CiphertextHandle;

use crate::error::{DevnodeError, Result};

const CIPHERTEXT_TAG: &[u8] = b"snc1";
const NONCE_LEN: usize = 16;
const CIPHERTEXT_LEN: usize = CIPHERTEXT_TAG.len() + NONCE_LEN + 8;

pub struct Sealer {
    secret: Vec<u8>,
}

impl Sealer {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn digest(&self, domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update((self.secret.len() as u64).to_le_bytes());
        hasher.update(&self.secret);
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let result = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    fn keystream(&self, nonce: &[u8]) -> [u8; 8] {
        let digest = self.digest(b"keystream:", &[nonce]);
        let mut stream = [0u8; 8];
        stream.copy_from_slice(&digest[..8]);
        stream
    }

    pub fn key_id(&self) -> String {
        hex::encode(&self.digest(b"key_id:", &[])[..8])
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.digest(b"public_key:", &[]).to_vec()
    }

    pub fn seal(&self, value: u64) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let stream = self.keystream(&nonce);
        let mut out = Vec::with_capacity(CIPHERTEXT_LEN);
        out.extend_from_slice(CIPHERTEXT_TAG);
        out.extend_from_slice(&nonce);
        out.extend(
            value
                .to_be_bytes()
                .iter()
                .zip(stream.iter())
                .map(|(v, k)| v ^ k),
        );
        out
    }

    pub fn open(&self, ciphertext: &[u8]) -> Result<u64> {
        if ciphertext.len() != CIPHERTEXT_LEN {
            return Err(DevnodeError::InvalidRequest(format!(
                "ciphertext must be {} bytes, got {}",
                CIPHERTEXT_LEN,
                ciphertext.len()
            )));
        }
        let body = ciphertext
            .strip_prefix(CIPHERTEXT_TAG)
            .ok_or_else(|| DevnodeError::InvalidRequest("unknown ciphertext tag".into()))?;
        let (nonce, masked) = body.split_at(NONCE_LEN);

        let stream = self.keystream(nonce);
        let mut value = [0u8; 8];
        for (i, byte) in value.iter_mut().enumerate() {
            *byte = masked[i] ^ stream[i];
        }
        Ok(u64::from_be_bytes(value))
    }

    /// Binds a ciphertext to the contract and account it was produced for.
    pub fn input_proof(&self, contract: &str, account: &str, ciphertext: &[u8]) -> Vec<u8> {
        self.digest(
            b"input_proof:",
            &[
                contract.to_lowercase().as_bytes(),
                account.to_lowercase().as_bytes(),
                ciphertext,
            ],
        )
        .to_vec()
    }

    /// Attests that `encoded_clear_values` decrypts `handles`, in order.
    pub fn decryption_proof(
        &self,
        contract: &str,
        handles: &[CiphertextHandle],
        encoded_clear_values: &[u8],
    ) -> Vec<u8> {
        let joined = handles
            .iter()
            .map(|h| h.as_str().to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        self.digest(
            b"decryption_proof:",
            &[
                contract.to_lowercase().as_bytes(),
                joined.as_bytes(),
                encoded_clear_values,
            ],
        )
        .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_recovers_sealed_value() {
        let sealer = Sealer::new("secret");
        let ciphertext = sealer.seal(42);
        assert_eq!(sealer.open(&ciphertext).unwrap(), 42);
    }

    #[test]
    fn test_sealing_is_randomized() {
        let sealer = Sealer::new("secret");
        assert_ne!(sealer.seal(7), sealer.seal(7));
    }

    #[test]
    fn test_open_rejects_foreign_bytes() {
        let sealer = Sealer::new("secret");
        assert!(sealer.open(b"fhe:12345678").is_err());
    }

    #[test]
    fn test_proofs_depend_on_secret_and_binding() {
        let a = Sealer::new("a");
        let b = Sealer::new("b");
        let ct = a.seal(1);
        assert_ne!(
            a.input_proof("0x01", "0xaa", &ct),
            b.input_proof("0x01", "0xaa", &ct)
        );
        assert_ne!(
            a.input_proof("0x01", "0xaa", &ct),
            a.input_proof("0x01", "0xbb", &ct)
        );
        assert_eq!(
            a.input_proof("0x01", "0xAA", &ct),
            a.input_proof("0x01", "0xaa", &ct)
        );
    }
}
