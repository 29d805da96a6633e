//! Redis-backed `CacheStore`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tracing::info;

use super::store::{CacheError, CacheStore, ScanPage};

/// Shared store on a Redis instance, reached through a reconnecting
/// connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|err| CacheError::Unavailable(err.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| CacheError::Unavailable(err.to_string()))?;
        info!(
            target = "dishdash::cache::redis",
            "Connected to Redis cache store"
        );
        Ok(Self { conn })
    }
}

fn backend_error(op: &'static str) -> impl FnOnce(RedisError) -> CacheError {
    move |err| CacheError::backend(op, err.to_string())
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(backend_error("get"))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SET EX rejects zero.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(backend_error("set"))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del::<_, u64>(keys).await.map_err(backend_error("delete"))
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: usize,
    ) -> Result<ScanPage, CacheError> {
        let mut conn = self.conn.clone();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(backend_error("scan"))?;
        Ok(ScanPage { keys, next_cursor })
    }

    async fn set_add(&self, set: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        redis::pipe()
            .atomic()
            .sadd(set, member)
            .ignore()
            .expire(set, seconds)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend_error("set_add"))
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.smembers::<_, Vec<String>>(set)
            .await
            .map_err(backend_error("set_members"))
    }
}
