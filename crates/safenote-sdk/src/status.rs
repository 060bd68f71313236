//! Single-slot transaction status with timed expiry.
//!
//! Each publish overwrites the slot. Pending statuses stay until replaced;
//! success and error statuses clear themselves after their TTL unless a newer
//! status superseded them first. Listeners hear about both publishes and
//! expiries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub visible: bool,
    pub status: StatusKind,
    pub message: String,
}

impl TransactionStatus {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            status: StatusKind::Pending,
            message: String::new(),
        }
    }
}

type Listener = Arc<dyn Fn(&TransactionStatus) + Send + Sync>;

struct Slot {
    status: TransactionStatus,
    generation: u64,
    expires_at: Option<Instant>,
}

pub struct TransactionStatusTracker {
    success_ttl: Duration,
    error_ttl: Duration,
    slot: Arc<Mutex<Slot>>,
    listener: Option<Listener>,
}

impl TransactionStatusTracker {
    pub fn new(success_ttl: Duration, error_ttl: Duration) -> Self {
        Self {
            success_ttl,
            error_ttl,
            slot: Arc::new(Mutex::new(Slot {
                status: TransactionStatus::hidden(),
                generation: 0,
                expires_at: None,
            })),
            listener: None,
        }
    }

    pub fn with_listener(
        mut self,
        listener: impl Fn(&TransactionStatus) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn pending(&self, message: impl Into<String>) {
        self.publish(StatusKind::Pending, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(StatusKind::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(StatusKind::Error, message);
    }

    pub fn publish(&self, kind: StatusKind, message: impl Into<String>) {
        let ttl = match kind {
            StatusKind::Pending => None,
            StatusKind::Success => Some(self.success_ttl),
            StatusKind::Error => Some(self.error_ttl),
        };
        let status = TransactionStatus {
            visible: true,
            status: kind,
            message: message.into(),
        };
        debug!("status: {:?} {}", kind, status.message);

        let generation = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.status = status.clone();
            slot.expires_at = ttl.map(|ttl| Instant::now() + ttl);
            slot.generation
        };
        self.notify(&status);

        if let Some(ttl) = ttl {
            self.schedule_expiry(generation, ttl);
        }
    }

    /// The visible status, or hidden once its TTL has passed.
    pub fn current(&self) -> TransactionStatus {
        let slot = self.slot.lock();
        match slot.expires_at {
            Some(deadline) if Instant::now() >= deadline => TransactionStatus::hidden(),
            _ => slot.status.clone(),
        }
    }

    fn notify(&self, status: &TransactionStatus) {
        if let Some(listener) = &self.listener {
            listener(status);
        }
    }

    fn schedule_expiry(&self, generation: u64, ttl: Duration) {
        // Without a runtime the slot still expires lazily in `current`.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slot = self.slot.clone();
        let listener = self.listener.clone();

        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            let expired = {
                let mut slot = slot.lock();
                if slot.generation == generation {
                    slot.status = TransactionStatus::hidden();
                    slot.expires_at = None;
                    true
                } else {
                    false
                }
            };
            if expired {
                if let Some(listener) = listener {
                    listener(&TransactionStatus::hidden());
                }
            }
        });
    }
}
