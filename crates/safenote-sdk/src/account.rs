use parking_lot::RwLock;

use crate::error::{Result, SdkError};

/// Source of the signer account for the current session.
pub trait AccountProvider: Send + Sync {
    fn current_account(&self) -> Option<String>;

    fn is_connected(&self) -> bool {
        self.current_account().is_some()
    }
}

/// Returns the connected account address or `NotConnected`.
pub fn require_account(provider: &dyn AccountProvider) -> Result<String> {
    if !provider.is_connected() {
        return Err(SdkError::NotConnected);
    }
    provider.current_account().ok_or(SdkError::NotConnected)
}

/// Account provider driven by explicit connect/disconnect calls.
#[derive(Default)]
pub struct ManualAccountProvider {
    account: RwLock<Option<String>>,
}

impl ManualAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(address: impl Into<String>) -> Self {
        Self {
            account: RwLock::new(Some(address.into())),
        }
    }

    pub fn connect(&self, address: impl Into<String>) {
        *self.account.write() = Some(address.into());
    }

    pub fn disconnect(&self) {
        *self.account.write() = None;
    }
}

impl AccountProvider for ManualAccountProvider {
    fn current_account(&self) -> Option<String> {
        self.account.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_connect_disconnect() {
        let provider = ManualAccountProvider::new();
        assert_err!(require_account(&provider));

        provider.connect("0xabc");
        assert_eq!(assert_ok!(require_account(&provider)), "0xabc");

        provider.disconnect();
        assert!(!provider.is_connected());
    }
}
