//! Response cache and per-session chat history.
//!
//! [`CacheService`] is the seam the chat use case depends on. Cached
//! values are arbitrary JSON with a time-to-live; chat history is an
//! append-only log per session whose lifetime is refreshed on every append.
//!
//! [`InMemoryCache`] is the bundled implementation, a pair of bounded
//! `moka` caches with per-entry expiry.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(session_id: &str, role: Role, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Key/value cache with TTLs plus chat history storage.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Returns `true` when a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// The last `limit` messages of a session, oldest first.
    async fn get_chat_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn save_chat_message(&self, session_id: &str, message: ChatMessage) -> Result<()>;

    /// Returns `true` when the session had a history.
    async fn clear_chat_history(&self, session_id: &str) -> Result<bool>;
}

/// A cached value together with its own time-to-live.
#[derive(Clone)]
struct TimedValue {
    value: Value,
    ttl: Duration,
}

/// Expire each value after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, TimedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TimedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TimedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Expire a session log a fixed time after its last append.
struct SinceLastAppend(Duration);

impl Expiry<String, Vec<ChatMessage>> for SinceLastAppend {
    fn expire_after_create(
        &self,
        _key: &String,
        _value: &Vec<ChatMessage>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.0)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        _value: &Vec<ChatMessage>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.0)
    }
}

/// Process-local [`CacheService`] backed by `moka`.
///
/// Expired entries are evicted by moka's housekeeping, and each map holds
/// at most `max_entries` keys.
pub struct InMemoryCache {
    values: Cache<String, TimedValue>,
    sessions: Cache<String, Vec<ChatMessage>>,
}

impl InMemoryCache {
    /// `history_ttl` is how long a session log survives its last append.
    pub fn new(history_ttl: Duration, max_entries: u64) -> Self {
        Self {
            values: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(PerEntryTtl)
                .build(),
            sessions: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(SinceLastAppend(history_ttl))
                .build(),
        }
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).await.map(|timed| timed.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.values
            .insert(key.to_string(), TimedValue { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let live = self.values.contains_key(key);
        self.values.invalidate(key).await;
        Ok(live)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.values.contains_key(key))
    }

    async fn get_chat_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let Some(log) = self.sessions.get(session_id).await else {
            return Ok(Vec::new());
        };
        let skip = log.len().saturating_sub(limit);
        Ok(log[skip..].to_vec())
    }

    async fn save_chat_message(&self, session_id: &str, message: ChatMessage) -> Result<()> {
        self.sessions
            .entry(session_id.to_string())
            .and_upsert_with(|existing| {
                let mut log = existing.map(|e| e.into_value()).unwrap_or_default();
                log.push(message);
                std::future::ready(log)
            })
            .await;
        Ok(())
    }

    async fn clear_chat_history(&self, session_id: &str) -> Result<bool> {
        let had_history = self
            .sessions
            .get(session_id)
            .await
            .is_some_and(|log| !log.is_empty());
        self.sessions.invalidate(session_id).await;
        Ok(had_history)
    }
}
