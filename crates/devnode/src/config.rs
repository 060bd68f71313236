use std::time::Duration;

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5afe0000000000000000000000000000000000aa";

#[derive(Clone, Debug)]
pub struct DevnodeConfig {
    pub host: String,
    pub port: u16,
    pub contract_address: String,
    /// Keys the input and decryption proofs. Anyone holding it can forge both.
    pub proof_secret: String,
    /// How long a submitted transaction reports `pending`.
    pub confirmation_delay: Duration,
}

impl Default for DevnodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8545,
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            proof_secret: "devnode-proof-secret".to_string(),
            confirmation_delay: Duration::from_millis(0),
        }
    }
}

impl DevnodeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let port = match std::env::var("PORT") {
            Ok(s) => s
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT {}: {}", s, e))?,
            Err(_) => defaults.port,
        };

        let contract_address =
            std::env::var("CONTRACT_ADDRESS").unwrap_or(defaults.contract_address);
        if !contract_address.starts_with("0x") {
            anyhow::bail!("CONTRACT_ADDRESS must be 0x-prefixed: {}", contract_address);
        }

        let proof_secret = match std::env::var("PROOF_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("PROOF_SECRET not set, using the built-in development secret");
                defaults.proof_secret
            }
        };

        let confirmation_delay = std::env::var("CONFIRMATION_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.confirmation_delay);

        Ok(Self {
            host,
            port,
            contract_address,
            proof_secret,
            confirmation_delay,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let config = DevnodeConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:8545");
        assert!(config.confirmation_delay.is_zero());
    }
}
