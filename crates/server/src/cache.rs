//! Redis cache for read-only tracker lookups.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use linear_assistant_core::{Error, Issue, IssueDraft, IssueTracker, Team};

const KEY_PREFIX: &str = "linear-assistant:lookup";

/// Wraps a tracker, caching `list_issues` and `list_teams` results.
///
/// Without a connection every call goes straight to the inner tracker.
/// `create_issue` is never cached.
#[derive(Clone)]
pub struct CachedTracker<T> {
    inner: T,
    conn: Option<ConnectionManager>,
    ttl: Duration,
}

impl<T: IssueTracker> CachedTracker<T> {
    pub fn new(inner: T, conn: Option<ConnectionManager>, ttl: Duration) -> Self {
        Self { inner, conn, ttl }
    }

    pub async fn connect(inner: T, redis_url: &str, ttl: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(inner, Some(conn), ttl))
    }

    async fn read<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    debug!(key, "Lookup cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Lookup cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Lookup cache read failed, querying tracker");
                None
            }
        }
    }

    async fn write<V: Serialize + Sync>(&self, key: &str, value: &V) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize lookup for cache");
                return;
            }
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, json, self.ttl.as_secs().max(1)).await {
            warn!(key, error = %e, "Lookup cache write failed");
        }
    }
}

/// Cache key for a lookup and its arguments.
pub fn cache_key(call: &str, args: &[Option<&str>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(call.as_bytes());
    for arg in args {
        // Distinguish None from "" and keep argument boundaries.
        match arg {
            Some(a) => {
                hasher.update([1u8]);
                hasher.update((a.len() as u64).to_be_bytes());
                hasher.update(a.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    format!("{KEY_PREFIX}:{call}:{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl<T: IssueTracker> IssueTracker for CachedTracker<T> {
    async fn list_issues(
        &self,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Issue>, Error> {
        let key = cache_key("list_issues", &[from_time, to_time]);
        if let Some(issues) = self.read(&key).await {
            return Ok(issues);
        }
        let issues = self.inner.list_issues(from_time, to_time).await?;
        self.write(&key, &issues).await;
        Ok(issues)
    }

    async fn list_teams(&self) -> Result<Vec<Team>, Error> {
        let key = cache_key("list_teams", &[]);
        if let Some(teams) = self.read(&key).await {
            return Ok(teams);
        }
        let teams = self.inner.list_teams().await?;
        self.write(&key, &teams).await;
        Ok(teams)
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error> {
        self.inner.create_issue(draft).await
    }
}
