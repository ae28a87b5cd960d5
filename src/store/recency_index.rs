use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Batch, Command, RecordBackend};
use crate::errors::BackendError;

/// Same unescaped scheme as `record_key`; a `:` inside a user id is kept verbatim.
pub fn index_key(user_id: &str) -> String {
    format!("user:{user_id}:records")
}

/// Per-user sorted set of match ids scored by last write time.
///
/// The whole index shares one rolling expiration, so members can outlive the
/// records they point at. Readers are expected to drop such stale members.
#[derive(Clone)]
pub struct RecencyIndex {
    backend: Arc<dyn RecordBackend>,
    ttl: Duration,
}

impl RecencyIndex {
    pub fn new(backend: Arc<dyn RecordBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Queue a score overwrite and an expiration refresh into `batch`.
    pub fn stage_score(&self, batch: &mut Batch, user_id: &str, match_id: &str, score: f64) {
        let key = index_key(user_id);
        batch.push(Command::ScoreMember {
            key: key.clone(),
            member: match_id.to_string(),
            score,
        });
        batch.push(Command::Expire { key, ttl: self.ttl });
    }

    /// Set a member's score on its own. Returns whether the member was new.
    pub async fn upsert_score(
        &self,
        user_id: &str,
        match_id: &str,
        score: f64,
    ) -> Result<bool, BackendError> {
        let mut batch = Batch::new();
        self.stage_score(&mut batch, user_id, match_id, score);
        let replies = self.backend.execute(batch).await?;
        Ok(replies.first().copied() == Some(1))
    }

    /// Up to `count` match ids starting at rank `offset`, most recent first.
    pub async fn range_desc(
        &self,
        user_id: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, BackendError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.backend
            .range_desc(&index_key(user_id), offset, offset + count - 1)
            .await
    }

    pub async fn remove(&self, user_id: &str, match_ids: &[String]) -> Result<u64, BackendError> {
        if match_ids.is_empty() {
            return Ok(0);
        }
        self.backend
            .remove_members(&index_key(user_id), match_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (RecencyIndex, MemoryBackend) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap());
        let backend = MemoryBackend::new(Arc::new(clock));
        let index = RecencyIndex::new(Arc::new(backend.clone()), Duration::from_secs(60));
        (index, backend)
    }

    #[tokio::test]
    async fn last_score_wins() {
        let (index, backend) = setup();
        assert!(index.upsert_score("u", "m1", 10.0).await.unwrap());
        assert!(index.upsert_score("u", "m2", 20.0).await.unwrap());
        assert!(!index.upsert_score("u", "m1", 30.0).await.unwrap());

        assert_eq!(index.range_desc("u", 0, 10).await.unwrap(), vec!["m1", "m2"]);
        assert_eq!(backend.members(&index_key("u"))[0], ("m1".to_string(), 30.0));
        assert_eq!(backend.ttl(&index_key("u")), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn range_pages_by_offset_and_count() {
        let (index, _) = setup();
        for (i, m) in ["a", "b", "c", "d"].iter().enumerate() {
            index.upsert_score("u", m, i as f64).await.unwrap();
        }

        assert_eq!(index.range_desc("u", 1, 2).await.unwrap(), vec!["c", "b"]);
        assert_eq!(index.range_desc("u", 3, 5).await.unwrap(), vec!["a"]);
        assert!(index.range_desc("u", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_is_a_no_op_for_unknown_members() {
        let (index, _) = setup();
        index.upsert_score("u", "a", 1.0).await.unwrap();

        assert_eq!(index.remove("u", &["zz".to_string()]).await.unwrap(), 0);
        assert_eq!(index.remove("nobody", &["a".to_string()]).await.unwrap(), 0);
        assert_eq!(index.remove("u", &["a".to_string()]).await.unwrap(), 1);
        assert!(index.range_desc("u", 0, 5).await.unwrap().is_empty());
    }
}
