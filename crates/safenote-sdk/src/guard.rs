use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, SdkError};

pub const CREATE_FLIGHT: &str = "create";

pub fn decrypt_flight(note_id: &str) -> String {
    format!("decrypt:{}", note_id)
}

/// Rejects a second start of an operation while the first is still running.
#[derive(Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Releases its key on drop.
pub struct FlightGuard {
    key: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: impl Into<String>) -> Result<FlightGuard> {
        let key = key.into();
        if !self.active.lock().insert(key.clone()) {
            return Err(SdkError::OperationInFlight(key));
        }
        Ok(FlightGuard {
            key,
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.lock().contains(key)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_release() {
        let flights = SingleFlight::new();
        let guard = flights.try_acquire(CREATE_FLIGHT).unwrap();
        assert!(matches!(
            flights.try_acquire(CREATE_FLIGHT),
            Err(SdkError::OperationInFlight(_))
        ));

        // Other keys are independent.
        let other = flights.try_acquire(decrypt_flight("note-1")).unwrap();
        drop(guard);
        assert!(!flights.is_active(CREATE_FLIGHT));
        assert!(flights.try_acquire(CREATE_FLIGHT).is_ok());
        assert!(flights.is_active("decrypt:note-1"));
        drop(other);
    }
}
