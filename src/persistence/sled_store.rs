//! Persistence layer backed by `sled`
//!
//! Two trees are kept in one database:
//! - `dead_letters`: messages that exhausted their retries. Keys are prefixed
//!   with the dead-letter timestamp so a scan yields them chronologically.
//! - `unacked`: envelopes a worker has taken but not yet acknowledged or
//!   dead-lettered, keyed by `channel/id`. Whatever is left here when the
//!   process stops is redelivered on the next start.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::dispatcher::{Envelope, MessageId};
use crate::utils::error::StoreError;

const DEAD_LETTERS_TREE: &str = "dead_letters";
const UNACKED_TREE: &str = "unacked";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Persistence {
    db: Db,
    dead_letters: Tree,
    unacked: Tree,
}

impl Persistence {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// A database that lives only as long as this handle.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let dead_letters = db.open_tree(DEAD_LETTERS_TREE)?;
        let unacked = db.open_tree(UNACKED_TREE)?;
        Ok(Self {
            db,
            dead_letters,
            unacked,
        })
    }

    /// Records a message that could not be processed.
    pub fn record_dead_letter(
        &self,
        envelope: &Envelope,
        attempts: u32,
        last_error: &str,
    ) -> Result<DeadLetter, StoreError> {
        let record = DeadLetter {
            envelope: envelope.clone(),
            attempts,
            last_error: last_error.to_string(),
            dead_lettered_at: Utc::now(),
        };

        let key = format!(
            "{:020}_{}",
            record.dead_lettered_at.timestamp_millis(),
            envelope.id()
        );
        self.dead_letters
            .insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    /// All dead letters, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        self.dead_letters
            .iter()
            .map(|entry| -> Result<DeadLetter, StoreError> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    pub fn find_dead_letter(&self, id: MessageId) -> Result<Option<DeadLetter>, StoreError> {
        let suffix = format!("_{id}");
        for entry in self.dead_letters.iter() {
            let (key, value) = entry?;
            if key.ends_with(suffix.as_bytes()) {
                return Ok(Some(serde_json::from_slice(&value)?));
            }
        }
        Ok(None)
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    /// Marks an envelope as taken by a worker but not yet settled.
    pub fn mark_unacked(&self, envelope: &Envelope) -> Result<(), StoreError> {
        self.unacked
            .insert(unacked_key(envelope), serde_json::to_vec(envelope)?)?;
        Ok(())
    }

    pub fn clear_unacked(&self, envelope: &Envelope) -> Result<(), StoreError> {
        self.unacked.remove(unacked_key(envelope))?;
        Ok(())
    }

    /// Every unsettled envelope, ordered by original admission time.
    pub fn unacked(&self) -> Result<Vec<Envelope>, StoreError> {
        let mut envelopes = self
            .unacked
            .iter()
            .map(|entry| -> Result<Envelope, StoreError> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        envelopes.sort_by_key(|e| e.enqueued_at());
        Ok(envelopes)
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn unacked_key(envelope: &Envelope) -> Vec<u8> {
    format!("{}/{}", envelope.channel(), envelope.id()).into_bytes()
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .field("dead_letters", &self.dead_letters.len())
            .field("unacked", &self.unacked.len())
            .finish()
    }
}
