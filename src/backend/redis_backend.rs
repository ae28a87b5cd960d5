use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;

use crate::backend::{Batch, Command, Fields, RecordBackend};
use crate::errors::BackendError;

/// Connection settings for [`RedisBackend::connect`].
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Redis-backed store sharing one auto-reconnecting multiplexed connection.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Open the connection and verify it with `PING`.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, BackendError> {
        let client = Client::open(settings.url())?;
        let manager = ConnectionManager::new(client).await?;
        let backend = Self { manager };

        backend.ping().await?;
        tracing::info!(
            "[Redis] Connected to {}:{}, db={}",
            settings.host,
            settings.port,
            settings.db
        );
        Ok(backend)
    }
}

fn pipeline_for(batch: &Batch) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    for command in batch.commands() {
        match command {
            Command::SetFieldIfAbsent { key, field, value } => {
                pipe.cmd("HSETNX").arg(key).arg(field).arg(value);
            }
            Command::SetFields { key, fields } => {
                let cmd = pipe.cmd("HSET").arg(key);
                for (field, value) in fields {
                    cmd.arg(field).arg(value);
                }
            }
            Command::ScoreMember { key, member, score } => {
                pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
            }
            Command::Expire { key, ttl } => {
                pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs());
            }
        }
    }
    pipe
}

#[async_trait]
impl RecordBackend for RedisBackend {
    async fn execute(&self, batch: Batch) -> Result<Vec<i64>, BackendError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut con = self.manager.clone();
        let replies: Vec<i64> = pipeline_for(&batch).query_async(&mut con).await?;

        if replies.len() != batch.len() {
            return Err(BackendError::ReplyMismatch {
                expected: batch.len(),
                actual: replies.len(),
            });
        }
        Ok(replies)
    }

    async fn fields_many(&self, keys: &[String]) -> Result<Vec<Fields>, BackendError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key);
        }

        let mut con = self.manager.clone();
        let all: Vec<Fields> = pipe.query_async(&mut con).await?;
        Ok(all)
    }

    async fn range_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, BackendError> {
        let mut con = self.manager.clone();
        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut con)
            .await?;
        Ok(members)
    }

    async fn remove_members(&self, key: &str, members: &[String]) -> Result<u64, BackendError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut con = self.manager.clone();
        let removed: u64 = redis::cmd("ZREM")
            .arg(key)
            .arg(members)
            .query_async(&mut con)
            .await?;
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut con = self.manager.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }
}
