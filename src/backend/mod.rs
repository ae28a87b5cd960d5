//! Key-value backend contract.
//!
//! The records core talks to its store only through [`RecordBackend`]: hash-like
//! per-record fields, per-user sorted sets, conditional field writes, batched
//! command pipelines and per-key expiration. Two implementations exist:
//! [`redis_backend::RedisBackend`] for production and [`memory::MemoryBackend`] for tests
//! and Redis-less runs.

pub mod memory;
pub mod redis_backend;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::BackendError;

/// Field name to stored text.
pub type Fields = HashMap<String, String>;

/// A single write command queued in a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write `field` only when the hash does not have it yet. Reply: 1 if written.
    SetFieldIfAbsent {
        key: String,
        field: String,
        value: String,
    },
    /// Write every field unconditionally. Reply: number of fields that were new.
    SetFields {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Insert or overwrite a sorted-set member score. Reply: 1 if the member was new.
    ScoreMember {
        key: String,
        member: String,
        score: f64,
    },
    /// Reset the key's time to live. Reply: 1 if the key exists.
    Expire { key: String, ttl: Duration },
}

/// Write commands sent together in one round trip.
///
/// A batch is a pipeline, not a transaction: if the backend fails midway some
/// commands may already be applied and nothing is rolled back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command and return its reply position.
    pub fn push(&mut self, command: Command) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[async_trait]
pub trait RecordBackend: Send + Sync + 'static {
    /// Run every command of `batch`, returning one integer reply per command.
    async fn execute(&self, batch: Batch) -> Result<Vec<i64>, BackendError>;

    /// Fetch the field sets of several hashes in one round trip.
    ///
    /// Order follows `keys`; a missing or expired key yields an empty map.
    async fn fields_many(&self, keys: &[String]) -> Result<Vec<Fields>, BackendError>;

    async fn fields(&self, key: &str) -> Result<Fields, BackendError> {
        let mut all = self.fields_many(&[key.to_string()]).await?;
        Ok(all.pop().unwrap_or_default())
    }

    /// Members ranked `start..=stop` by score, highest first.
    async fn range_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BackendError>;

    /// Remove members from a sorted set, returning how many existed.
    async fn remove_members(&self, key: &str, members: &[String]) -> Result<u64, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}
