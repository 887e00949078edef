//! Queue of event ids waiting to be ingested, per league.
//!
//! Ids gathered from scoreboards stay queued until a run has processed them
//! and its bulk write has committed, so an aborted run is picked up by the
//! next one.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::retry::{retry_with_backoff, RetryPolicy};

#[async_trait]
pub trait PendingIds: Send + Sync {
    async fn push(&self, league: &str, ids: &[String]) -> Result<()>;

    /// Queued ids in insertion order, each id once.
    async fn load(&self, league: &str) -> Result<Vec<String>>;

    /// Drop `ids` from the league's queue, every occurrence.
    async fn remove(&self, league: &str, ids: &[String]) -> Result<()>;
}

/// First occurrence order, duplicates removed.
pub fn dedup_ids(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn queue_key(league: &str) -> String {
    format!("pending_ids:{}", league)
}

/// Redis list per league
#[derive(Clone)]
pub struct RedisPendingIds {
    redis: redis::aio::ConnectionManager,
}

impl RedisPendingIds {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn connect(url: &str, max_attempts: u32) -> Result<Self> {
        let redis = retry_with_backoff(
            &RetryPolicy::connection(max_attempts),
            "Redis connection",
            |_: &redis::RedisError| true,
            || async move {
                let client = redis::Client::open(url)?;
                redis::aio::ConnectionManager::new(client).await
            },
        )
        .await
        .map_err(|failure| {
            anyhow!(
                "Failed to connect to Redis after {} attempts: {}",
                failure.attempts,
                failure.error
            )
        })?;
        info!("Connected to Redis");
        Ok(Self::new(redis))
    }
}

#[async_trait]
impl PendingIds for RedisPendingIds {
    async fn push(&self, league: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.redis.clone();
        let _: () = conn
            .rpush(queue_key(league), ids)
            .await
            .with_context(|| format!("Failed to queue ids for {}", league))?;
        Ok(())
    }

    async fn load(&self, league: &str) -> Result<Vec<String>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .lrange(queue_key(league), 0, -1)
            .await
            .with_context(|| format!("Failed to read queued ids for {}", league))?;
        Ok(dedup_ids(ids))
    }

    async fn remove(&self, league: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let key = queue_key(league);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in ids {
            pipe.lrem(&key, 0, id).ignore();
        }
        let mut conn = self.redis.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to remove queued ids for {}", league))?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryPendingIds {
    inner: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryPendingIds {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingIds for MemoryPendingIds {
    async fn push(&self, league: &str, ids: &[String]) -> Result<()> {
        let mut queues = self.inner.write().await;
        queues
            .entry(league.to_string())
            .or_default()
            .extend(ids.iter().cloned());
        Ok(())
    }

    async fn load(&self, league: &str) -> Result<Vec<String>> {
        let queues = self.inner.read().await;
        Ok(dedup_ids(queues.get(league).cloned().unwrap_or_default()))
    }

    async fn remove(&self, league: &str, ids: &[String]) -> Result<()> {
        let mut queues = self.inner.write().await;
        if let Some(queue) = queues.get_mut(league) {
            queue.retain(|id| !ids.contains(id));
            if queue.is_empty() {
                queues.remove(league);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(dedup_ids(ids(&["3", "1", "3", "2", "1"])), ids(&["3", "1", "2"]));
    }

    #[test]
    fn test_queue_key() {
        assert_eq!(queue_key("college-football"), "pending_ids:college-football");
    }

    #[tokio::test]
    async fn test_memory_queue_per_league() {
        let pending = MemoryPendingIds::new();
        pending.push("nfl", &ids(&["1", "2"])).await.unwrap();
        pending.push("nfl", &ids(&["2", "3"])).await.unwrap();
        pending.push("nba", &ids(&["9"])).await.unwrap();

        assert_eq!(pending.load("nfl").await.unwrap(), ids(&["1", "2", "3"]));

        pending.remove("nfl", &ids(&["1", "2"])).await.unwrap();
        assert_eq!(pending.load("nfl").await.unwrap(), ids(&["3"]));
        pending.remove("nfl", &ids(&["3"])).await.unwrap();
        assert!(pending.load("nfl").await.unwrap().is_empty());
        assert_eq!(pending.load("nba").await.unwrap(), ids(&["9"]));
    }
}
