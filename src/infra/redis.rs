//! Redis-backed cache store.
//!
//! All store errors collapse into [`StoreError::Unavailable`]; callers treat
//! the store as best-effort and degrade rather than fail. The connection
//! manager reconnects on its own, so a transient outage surfaces as a few
//! failed commands, not a dead adapter.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::cache::{CacheStore, StoreError};

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(StoreError::unavailable)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(StoreError::unavailable)?;
        info!(target: "scorta::store", "connected to redis");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    // Redis rejects EX 0; clamp sub-second TTLs up to one second.
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value: Option<Vec<u8>> = self
            .conn()
            .get(key)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let () = self
            .conn()
            .set_ex(key, value.as_ref(), ttl_secs(ttl))
            .await
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // SET key value NX EX ttl; nil reply means the key already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut self.conn())
            .await
            .map_err(StoreError::unavailable)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _: u64 = self
            .conn()
            .del(key)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        let result: Result<i64, redis::RedisError> = conn.incr(key, delta).await;
        match result {
            Ok(value) => Ok(value),
            // INCRBY on a non-numeric value is a type error, not an outage.
            Err(err) if err.kind() == redis::ErrorKind::TypeError => {
                Err(StoreError::NotAnInteger {
                    key: key.to_string(),
                })
            }
            Err(err) => Err(StoreError::unavailable(err)),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::unavailable)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}
