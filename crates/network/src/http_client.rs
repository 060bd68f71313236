use std::time::Duration;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{NetworkError, Result};

/// Error body shape returned by the ledger facade and the relayer.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpClient {
    client: Client,
    config: Config,
}

impl HttpClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone());

        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| NetworkError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error("GET", e))?;
        check_status(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| NetworkError::Decode(format!("JSON parse failed: {}", e)))
    }

    pub async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<Response> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error("POST", e))?;
        check_status(response).await
    }

    pub async fn post_json<T: Serialize, R: DeserializeOwned>(&self, url: &str, body: &T) -> Result<R> {
        let response = self.post(url, body).await?;
        response
            .json()
            .await
            .map_err(|e| NetworkError::Decode(format!("JSON parse failed: {}", e)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport_error(method: &str, e: reqwest::Error) -> NetworkError {
    if e.is_connect() || e.is_timeout() {
        NetworkError::Connection(format!("{} request failed: {}", method, e))
    } else {
        NetworkError::Http(format!("{} request failed: {}", method, e))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NetworkError::Status {
        code: status.as_u16(),
        message: error_message(&body, status.canonical_reason().unwrap_or("request failed")),
    })
}

fn error_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback.to_string(),
    }
}
