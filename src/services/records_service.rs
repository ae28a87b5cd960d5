use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{Batch, RecordBackend};
use crate::clock::{offset_hours, Clock, Stamp};
use crate::errors::RecordsError;
use crate::store::{Record, RecencyIndex, RecordStore};

/// Rolling expiration applied to records and indexes on every write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(42 * 24 * 60 * 60);

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub ttl: Duration,
    /// Offset used for the human-readable timestamps.
    pub utc_offset: FixedOffset,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            utc_offset: offset_hours(-3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub user_id: String,
    pub match_id: String,
    pub updated_at: String,
    /// True when this write created the record.
    #[serde(rename = "created_at_set")]
    pub created: bool,
}

/// Normalize pagination: `limit` into `1..=100`, `offset` to at least 0.
pub fn clamp_page(limit: i64, offset: i64) -> (usize, usize) {
    let limit = limit.clamp(1, MAX_LIMIT) as usize;
    let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    (limit, offset)
}

fn require_id(value: &str, name: &str) -> Result<(), RecordsError> {
    if value.is_empty() {
        return Err(RecordsError::Validation(format!(
            "Missing or invalid '{name}'."
        )));
    }
    Ok(())
}

/// Records keyed by (user, match) plus a per-user recency index.
///
/// Writes go to both structures in one pipelined round trip. Reads of the
/// index heal it by dropping members whose record is gone.
#[derive(Clone)]
pub struct RecordsService {
    records: RecordStore,
    index: RecencyIndex,
    backend: Arc<dyn RecordBackend>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
}

impl RecordsService {
    pub fn new(
        backend: Arc<dyn RecordBackend>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            records: RecordStore::new(backend.clone(), settings.ttl),
            index: RecencyIndex::new(backend.clone(), settings.ttl),
            backend,
            clock,
            utc_offset: settings.utc_offset,
        }
    }

    /// Create or update a record and bump it to the top of the user's index.
    ///
    /// `None` payloads leave the stored field untouched. The record write, the
    /// index score and both expirations are pipelined, not transactional.
    pub async fn upsert(
        &self,
        user_id: &str,
        match_id: &str,
        input: Option<&Value>,
        output: Option<&Value>,
    ) -> Result<UpsertOutcome, RecordsError> {
        require_id(user_id, "user_id")?;
        require_id(match_id, "match")?;

        let stamp = Stamp::at(self.clock.now(), self.utc_offset);

        let mut batch = Batch::new();
        let created_at = self
            .records
            .stage_upsert(&mut batch, user_id, match_id, &stamp, input, output);
        self.index
            .stage_score(&mut batch, user_id, match_id, stamp.score);

        let replies = self.backend.execute(batch).await?;
        let created = replies.get(created_at).copied() == Some(1);

        tracing::debug!(user_id, match_id, created, "record upserted");

        Ok(UpsertOutcome {
            user_id: user_id.to_string(),
            match_id: match_id.to_string(),
            updated_at: stamp.display,
            created,
        })
    }

    /// Replace only the output, keeping any stored input.
    pub async fn set_output(
        &self,
        user_id: &str,
        match_id: &str,
        output: &Value,
    ) -> Result<UpsertOutcome, RecordsError> {
        self.upsert(user_id, match_id, None, Some(output)).await
    }

    pub async fn get_one(
        &self,
        user_id: &str,
        match_id: &str,
    ) -> Result<Option<Record>, RecordsError> {
        require_id(user_id, "user_id")?;
        require_id(match_id, "match")?;

        Ok(self.records.get(user_id, match_id).await?)
    }

    /// Most recently written records of a user, newest first.
    ///
    /// Out-of-range `limit`/`offset` are clamped rather than rejected. Index
    /// members whose record has expired are left out of the page and removed
    /// from the index on a best-effort basis.
    pub async fn get_recent(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, RecordsError> {
        require_id(user_id, "user_id")?;
        let (limit, offset) = clamp_page(limit, offset);

        let match_ids = self.index.range_desc(user_id, offset, limit).await?;
        if match_ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self.records.get_many(user_id, &match_ids).await?;

        let mut out = Vec::with_capacity(fetched.len());
        let mut stale = Vec::new();
        for (match_id, record) in match_ids.into_iter().zip(fetched) {
            match record {
                Some(record) => out.push(record),
                None => stale.push(match_id),
            }
        }

        if !stale.is_empty() {
            match self.index.remove(user_id, &stale).await {
                Ok(removed) => {
                    tracing::debug!(user_id, removed, "dropped stale index entries")
                }
                Err(e) => tracing::warn!(
                    "failed to drop {} stale index entries for {}: {}",
                    stale.len(),
                    user_id,
                    e
                ),
            }
        }

        Ok(out)
    }
}
