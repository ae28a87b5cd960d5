use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::backend::{Batch, Command, Fields, RecordBackend};
use crate::clock::Stamp;
use crate::errors::BackendError;
use crate::store::codec;

/// Ids are not escaped, so ids containing `:` can collide:
/// (`a:b`, `c`) and (`a`, `b:c`) both map to `record:a:b:c`.
pub fn record_key(user_id: &str, match_id: &str) -> String {
    format!("record:{user_id}:{match_id}")
}

/// One stored (user, match) record with its payload decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub user_id: String,
    pub match_id: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Record {
    /// Build a record from its raw field set; an empty set means no record.
    pub fn from_fields(user_id: &str, match_id: &str, mut fields: Fields) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }

        let mut take = |name: &str| fields.remove(name).filter(|v| !v.is_empty());
        let user_id = take("user_id").unwrap_or_else(|| user_id.to_string());
        let match_id = take("match_id").unwrap_or_else(|| match_id.to_string());
        let created_at = take("created_at");
        let updated_at = take("updated_at");

        Some(Self {
            user_id,
            match_id,
            input: codec::decode(fields.get("input").map(String::as_str)),
            output: codec::decode(fields.get("output").map(String::as_str)),
            created_at,
            updated_at,
        })
    }
}

/// Per-(user, match) field sets with a rolling expiration.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn RecordBackend>,
    ttl: Duration,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn RecordBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Queue the writes of an upsert into `batch`.
    ///
    /// Returns the reply position of the conditional `created_at` write, which
    /// reads 1 when this write created the record.
    pub fn stage_upsert(
        &self,
        batch: &mut Batch,
        user_id: &str,
        match_id: &str,
        stamp: &Stamp,
        input: Option<&Value>,
        output: Option<&Value>,
    ) -> usize {
        let key = record_key(user_id, match_id);

        let created = batch.push(Command::SetFieldIfAbsent {
            key: key.clone(),
            field: "created_at".into(),
            value: stamp.display.clone(),
        });

        let mut fields = vec![
            ("user_id".to_string(), user_id.to_string()),
            ("match_id".to_string(), match_id.to_string()),
            ("updated_at".to_string(), stamp.display.clone()),
        ];
        // JSON null means "not provided" and never overwrites a stored field.
        if let Some(input) = input.filter(|v| !v.is_null()) {
            fields.push(("input".into(), codec::encode(input)));
        }
        if let Some(output) = output.filter(|v| !v.is_null()) {
            fields.push(("output".into(), codec::encode(output)));
        }
        batch.push(Command::SetFields {
            key: key.clone(),
            fields,
        });

        batch.push(Command::Expire { key, ttl: self.ttl });
        created
    }

    /// Write a record on its own. Returns whether `created_at` was set by this call.
    pub async fn upsert(
        &self,
        user_id: &str,
        match_id: &str,
        stamp: &Stamp,
        input: Option<&Value>,
        output: Option<&Value>,
    ) -> Result<bool, BackendError> {
        let mut batch = Batch::new();
        let created = self.stage_upsert(&mut batch, user_id, match_id, stamp, input, output);
        let replies = self.backend.execute(batch).await?;
        Ok(replies.get(created).copied() == Some(1))
    }

    pub async fn get(&self, user_id: &str, match_id: &str) -> Result<Option<Record>, BackendError> {
        let fields = self.backend.fields(&record_key(user_id, match_id)).await?;
        Ok(Record::from_fields(user_id, match_id, fields))
    }

    /// Fetch several records of one user in a single round trip, keeping order.
    pub async fn get_many(
        &self,
        user_id: &str,
        match_ids: &[String],
    ) -> Result<Vec<Option<Record>>, BackendError> {
        let keys: Vec<String> = match_ids
            .iter()
            .map(|m| record_key(user_id, m))
            .collect();
        let all = self.backend.fields_many(&keys).await?;

        Ok(match_ids
            .iter()
            .zip(all)
            .map(|(m, fields)| Record::from_fields(user_id, m, fields))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::{offset_hours, Clock, ManualClock};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(3600);

    fn setup() -> (RecordStore, MemoryBackend, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap());
        let backend = MemoryBackend::new(Arc::new(clock.clone()));
        (RecordStore::new(Arc::new(backend.clone()), TTL), backend, clock)
    }

    #[test]
    fn key_combines_user_and_match() {
        assert_eq!(record_key("u1", "m-7"), "record:u1:m-7");
        assert_eq!(record_key("a:b", "c"), record_key("a", "b:c"));
    }

    #[tokio::test]
    async fn first_write_sets_created_at_once() {
        let (store, backend, clock) = setup();
        let first = Stamp::at(clock.now(), offset_hours(0));

        let created = store
            .upsert("u1", "m1", &first, Some(&json!({"a": 1})), None)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(backend.ttl(&record_key("u1", "m1")), Some(TTL));

        clock.advance(chrono::Duration::seconds(5));
        let second = Stamp::at(clock.now(), offset_hours(0));
        let created = store
            .upsert("u1", "m1", &second, None, Some(&json!("done")))
            .await
            .unwrap();
        assert!(!created);

        let record = store.get("u1", "m1").await.unwrap().unwrap();
        assert_eq!(record.created_at.as_deref(), Some("2025-05-05 10:00:00"));
        assert_eq!(record.updated_at.as_deref(), Some("2025-05-05 10:00:05"));
        assert_eq!(record.input, Some(json!({"a": 1})));
        assert_eq!(record.output, Some(json!("done")));
    }

    #[tokio::test]
    async fn get_many_preserves_order_and_marks_missing() {
        let (store, _, clock) = setup();
        let stamp = Stamp::at(clock.now(), offset_hours(0));
        store.upsert("u1", "a", &stamp, None, None).await.unwrap();
        store.upsert("u1", "c", &stamp, None, None).await.unwrap();

        let ids: Vec<String> = ["c", "b", "a"].iter().map(|s| s.to_string()).collect();
        let found: Vec<Option<String>> = store
            .get_many("u1", &ids)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.map(|r| r.match_id))
            .collect();
        assert_eq!(found, vec![Some("c".into()), None, Some("a".into())]);
    }

    #[test]
    fn empty_field_set_is_no_record() {
        assert_eq!(Record::from_fields("u", "m", Fields::new()), None);
    }
}
