pub mod account;
pub mod codec;
pub mod config;
pub mod decryption;
pub mod encryption;
pub mod error;
pub mod guard;
pub mod history;
pub mod ledger;
pub mod note;
pub mod session;
pub mod status;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use account::{AccountProvider, ManualAccountProvider};
pub use codec::{CiphertextHandle, HexBytes};
pub use config::SessionConfig;
pub use decryption::{DecryptOutcome, VerificationCheck};
pub use encryption::{EncryptionGateway, RelayerEncryptionGateway};
pub use error::{Result, SdkError};
pub use history::{OperationEntry, OperationKind, OperationOutcome};
pub use ledger::{HttpLedgerGateway, LedgerGateway};
pub use note::{Category, NewNote, NoteRecord, SecureNote};
pub use session::{NoteSession, SessionEvent};
pub use status::{StatusKind, TransactionStatus};
pub use store::{NoteStats, Page};
