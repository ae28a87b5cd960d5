use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::backend::{Batch, Command, Fields, RecordBackend};
use crate::clock::Clock;
use crate::errors::BackendError;

#[derive(Debug, Clone)]
enum Slot {
    Hash(Fields),
    Sorted(HashMap<String, f64>),
}

impl Slot {
    fn is_empty(&self) -> bool {
        match self {
            Slot::Hash(fields) => fields.is_empty(),
            Slot::Sorted(members) => members.is_empty(),
        }
    }
}

/// A single stored key with its optional expiration instant.
#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type InnerMap = HashMap<String, Entry>;

/// In-process backend with Redis-like hash, sorted-set and TTL semantics.
///
/// Expired keys are never returned. They are dropped lazily when a write
/// touches them, or in bulk by [`MemoryBackend::purge_expired`].
#[derive(Clone)]
pub struct MemoryBackend {
    map: Arc<RwLock<InnerMap>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InnerMap> {
        self.map.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InnerMap> {
        self.map.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop a key outright, as if it had expired. Returns whether it was live.
    pub fn delete(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.write()
            .remove(key)
            .map_or(false, |entry| entry.is_live(now))
    }

    /// Remaining time to live of a live key; `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let map = self.read();
        let entry = map.get(key).filter(|e| e.is_live(now))?;
        let at = entry.expires_at?;
        (at - now).to_std().ok()
    }

    /// All members of a live sorted set with their scores, highest first.
    pub fn members(&self, key: &str) -> Vec<(String, f64)> {
        let now = self.clock.now();
        let map = self.read();
        match map.get(key).filter(|e| e.is_live(now)) {
            Some(Entry {
                slot: Slot::Sorted(members),
                ..
            }) => ranked(members),
            _ => Vec::new(),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired key, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.write();
        let before = map.len();

        map.retain(|_k, entry| entry.is_live(now));

        let after = map.len();
        let removed = before.saturating_sub(after);

        if removed > 0 {
            tracing::info!(
                "Cleanup: removed {} expired keys ({} remaining)",
                removed,
                after
            );
        }
        removed
    }

    fn apply(
        map: &mut InnerMap,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<i64, BackendError> {
        let target = command_key(command);
        if map.get(target).map_or(false, |e| !e.is_live(now)) {
            map.remove(target);
        }

        let reply = match command {
            Command::SetFieldIfAbsent { key, field, value } => {
                let fields = hash_mut(map, key)?;
                if fields.contains_key(field) {
                    0
                } else {
                    fields.insert(field.clone(), value.clone());
                    1
                }
            }
            Command::SetFields { key, fields: new } => {
                let fields = hash_mut(map, key)?;
                let mut added = 0;
                for (field, value) in new {
                    if fields.insert(field.clone(), value.clone()).is_none() {
                        added += 1;
                    }
                }
                added
            }
            Command::ScoreMember { key, member, score } => {
                let members = sorted_mut(map, key)?;
                i64::from(members.insert(member.clone(), *score).is_none())
            }
            Command::Expire { key, ttl } => match map.get_mut(key) {
                Some(entry) => {
                    entry.expires_at = chrono::Duration::from_std(*ttl)
                        .ok()
                        .and_then(|ttl| now.checked_add_signed(ttl));
                    1
                }
                None => 0,
            },
        };

        if map.get(target).map_or(false, |e| e.slot.is_empty()) {
            map.remove(target);
        }
        Ok(reply)
    }
}

fn command_key(command: &Command) -> &str {
    match command {
        Command::SetFieldIfAbsent { key, .. }
        | Command::SetFields { key, .. }
        | Command::ScoreMember { key, .. }
        | Command::Expire { key, .. } => key,
    }
}

fn hash_mut<'a>(map: &'a mut InnerMap, key: &str) -> Result<&'a mut Fields, BackendError> {
    let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
        slot: Slot::Hash(HashMap::new()),
        expires_at: None,
    });
    match &mut entry.slot {
        Slot::Hash(fields) => Ok(fields),
        Slot::Sorted(_) => Err(BackendError::WrongType(key.to_string())),
    }
}

fn sorted_mut<'a>(
    map: &'a mut InnerMap,
    key: &str,
) -> Result<&'a mut HashMap<String, f64>, BackendError> {
    let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
        slot: Slot::Sorted(HashMap::new()),
        expires_at: None,
    });
    match &mut entry.slot {
        Slot::Sorted(members) => Ok(members),
        Slot::Hash(_) => Err(BackendError::WrongType(key.to_string())),
    }
}

/// Score descending, ties by member descending (Redis reverse-range order).
fn ranked(members: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut out: Vec<(String, f64)> = members
        .iter()
        .map(|(m, s)| (m.clone(), *s))
        .collect();
    out.sort_by(|(ma, sa), (mb, sb)| sb.total_cmp(sa).then_with(|| mb.cmp(ma)));
    out
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn execute(&self, batch: Batch) -> Result<Vec<i64>, BackendError> {
        let now = self.clock.now();
        let mut map = self.write();
        let mut replies = Vec::with_capacity(batch.len());

        // Commands applied before a failure stay applied, like a pipeline.
        for command in batch.commands() {
            replies.push(Self::apply(&mut map, command, now)?);
        }
        Ok(replies)
    }

    async fn fields_many(&self, keys: &[String]) -> Result<Vec<Fields>, BackendError> {
        let now = self.clock.now();
        let map = self.read();

        keys.iter()
            .map(|key| match map.get(key).filter(|e| e.is_live(now)) {
                Some(Entry {
                    slot: Slot::Hash(fields),
                    ..
                }) => Ok(fields.clone()),
                Some(_) => Err(BackendError::WrongType(key.clone())),
                None => Ok(Fields::new()),
            })
            .collect()
    }

    async fn range_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now();
        let map = self.read();

        let members = match map.get(key).filter(|e| e.is_live(now)) {
            Some(Entry {
                slot: Slot::Sorted(members),
                ..
            }) => members,
            Some(_) => return Err(BackendError::WrongType(key.to_string())),
            None => return Ok(Vec::new()),
        };

        if start > stop {
            return Ok(Vec::new());
        }
        Ok(ranked(members)
            .into_iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(m, _)| m)
            .collect())
    }

    async fn remove_members(&self, key: &str, members: &[String]) -> Result<u64, BackendError> {
        let now = self.clock.now();
        let mut map = self.write();

        let Some(entry) = map.get_mut(key).filter(|e| e.is_live(now)) else {
            return Ok(0);
        };
        let Slot::Sorted(set) = &mut entry.slot else {
            return Err(BackendError::WrongType(key.to_string()));
        };

        let removed = members.iter().filter(|m| set.remove(*m).is_some()).count() as u64;
        if set.is_empty() {
            map.remove(key);
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Background task that periodically removes expired keys.
pub async fn cleanup_loop(backend: MemoryBackend, every_sec: u64) {
    if every_sec == 0 {
        tracing::warn!("cleanup_loop started with interval 0; not running");
        return;
    }

    loop {
        sleep(Duration::from_secs(every_sec)).await;
        backend.purge_expired();
    }
}
