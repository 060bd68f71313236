//! JSON-over-HTTP transport used by the secure-notes gateways.
//!
//! ```rust,no_run
//! use safenote_network::{Config, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> safenote_network::Result<()> {
//!     let client = HttpClient::new(Config::default())?;
//!     let body: serde_json::Value = client.get_json("http://127.0.0.1:8545/available").await?;
//!     println!("{}", body);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http_client;

pub use config::{Config, DEFAULT_TIMEOUT_SECS};
pub use error::{NetworkError, Result};
pub use http_client::{join_url, HttpClient};
