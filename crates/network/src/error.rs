use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-2xx response. `message` is the server's `error` field when it sent one.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl NetworkError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetworkError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
