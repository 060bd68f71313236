//! Local development node for secure notes: an in-memory note ledger and a
//! mock encryption relayer behind one HTTP router. Ciphertexts and proofs are
//! placeholders keyed by a shared secret, never real FHE.

pub mod config;
pub mod error;
pub mod ledger;
pub mod relayer;
pub mod sealing;
pub mod server;

pub use config::DevnodeConfig;
pub use error::{DevnodeError, Result};
pub use server::{router, run, serve, DevnodeState};
