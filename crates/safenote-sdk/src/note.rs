use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Personal,
    Work,
    Financial,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Personal, Category::Work, Category::Financial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Financial => "financial",
        }
    }

    /// Code written to the record's first public value.
    pub fn code(&self) -> u64 {
        match self {
            Category::Personal => 1,
            Category::Work => 2,
            Category::Financial => 3,
        }
    }

    /// Code 0 was written by older clients for every non-personal note.
    pub fn from_code(code: u64) -> Self {
        match code {
            0 | 2 => Category::Work,
            3 => Category::Financial,
            _ => Category::Personal,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| SdkError::ValidationFailed(format!("unknown category: {}", s)))
    }
}

/// A note record as the ledger contract returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,
    pub title: String,
    /// Plaintext mirror of the encrypted value. Display only, not protected.
    pub content: String,
    pub creator: String,
    /// Seconds
    pub timestamp: u64,
    pub is_verified: bool,
    pub decrypted_value: u64,
    pub public_value1: u64,
    pub public_value2: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureNote {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub creator: String,
    pub timestamp: u64,
    pub is_verified: bool,
    /// Zero unless `is_verified`.
    pub decrypted_value: u64,
    pub public_value1: u64,
    pub public_value2: u64,
}

impl SecureNote {
    pub fn verified_value(&self) -> Option<u64> {
        self.is_verified.then_some(self.decrypted_value)
    }

    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.title.to_lowercase().contains(needle_lowercase)
            || self.content.to_lowercase().contains(needle_lowercase)
            || self.category.as_str().contains(needle_lowercase)
    }
}

impl From<NoteRecord> for SecureNote {
    fn from(record: NoteRecord) -> Self {
        // A value present on an unverified record is stale.
        let decrypted_value = if record.is_verified {
            record.decrypted_value
        } else {
            0
        };

        Self {
            category: Category::from_code(record.public_value1),
            id: record.id,
            title: record.title,
            content: record.content,
            creator: record.creator,
            timestamp: record.timestamp,
            is_verified: record.is_verified,
            decrypted_value,
            public_value1: record.public_value1,
            public_value2: record.public_value2,
        }
    }
}

/// User input for a new note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub category: Category,
}

/// A `NewNote` whose content parsed as an integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedNote {
    pub title: String,
    pub content: String,
    pub value: u64,
    pub category: Category,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>, category: Category) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category,
        }
    }

    pub fn validate(&self) -> Result<ValidatedNote> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(SdkError::ValidationFailed("title is required".into()));
        }

        let content = self.content.trim();
        if content.is_empty() {
            return Err(SdkError::ValidationFailed("content is required".into()));
        }
        let value = content.parse::<u64>().map_err(|_| {
            SdkError::ValidationFailed(format!("content must be an unsigned integer: {}", content))
        })?;

        Ok(ValidatedNote {
            title: title.to_string(),
            content: content.to_string(),
            value,
            category: self.category,
        })
    }
}

/// Issues `note-<millis>` ids that never repeat within a session.
#[derive(Debug, Default)]
pub struct NoteIdGenerator {
    last_millis: AtomicI64,
}

impl NoteIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn next_id_at(&self, now_millis: i64) -> String {
        let mut last = self.last_millis.load(Ordering::SeqCst);
        loop {
            let candidate = now_millis.max(last + 1);
            match self.last_millis.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return format!("note-{}", candidate),
                Err(actual) => last = actual,
            }
        }
    }
}
