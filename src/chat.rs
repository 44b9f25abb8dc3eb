//! Conversational question answering on top of [`RetrievalPipeline`].
//!
//! Answers are cached by normalized question text, so repeating a question
//! (in any session, with any casing or surrounding whitespace) skips both
//! retrieval and generation. Every answered turn is appended to the
//! session's history, which is replayed to the generator on later turns.
//!
//! The cache is best effort: a failing [`CacheService`] call is logged and
//! the request carries on as if the cache were empty.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use hybrid_rag_core::chunk::content_hash;

use crate::cache::{CacheService, ChatMessage, Role};
use crate::config::CacheConfig;
use crate::pipeline::RetrievalPipeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub session_id: String,
    /// `"Chunk {chunk_index}"` label per cited chunk, in rank order.
    pub sources: Vec<String>,
    /// `true` when the answer came from the response cache.
    pub cached: bool,
}

#[derive(Serialize, Deserialize)]
struct CachedAnswer {
    answer: String,
    sources: Vec<String>,
}

/// Cache key for a question: `rag:response:` + SHA-256 of the trimmed,
/// lowercased text.
pub fn response_cache_key(message: &str) -> String {
    let normalized = message.trim().to_lowercase();
    format!("rag:response:{}", content_hash(&normalized))
}

pub struct ChatService {
    pipeline: Arc<RetrievalPipeline>,
    cache: Arc<dyn CacheService>,
    top_k: usize,
    response_ttl: Duration,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        pipeline: Arc<RetrievalPipeline>,
        cache: Arc<dyn CacheService>,
        top_k: usize,
        config: &CacheConfig,
    ) -> Self {
        Self {
            pipeline,
            cache,
            top_k,
            response_ttl: Duration::from_secs(config.response_ttl_secs),
            history_limit: config.history_limit,
        }
    }

    /// Answer `message` within `session_id`, starting a new session when
    /// none is given.
    pub async fn ask(&self, message: &str, session_id: Option<String>) -> Result<ChatReply> {
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = response_cache_key(message);

        if let Some(hit) = self.cached_answer(&key).await {
            debug!(session_id = %session_id, "answer served from cache");
            self.record_turn(&session_id, message, &hit.answer).await;
            return Ok(ChatReply {
                answer: hit.answer,
                session_id,
                sources: hit.sources,
                cached: true,
            });
        }

        let history = match self
            .cache
            .get_chat_history(&session_id, self.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, session_id = %session_id, "failed to load chat history");
                Vec::new()
            }
        };

        let (answer, results) = self
            .pipeline
            .generate(message, self.top_k, &history)
            .await?;
        let sources: Vec<String> = results
            .iter()
            .map(|r| format!("Chunk {}", r.chunk.chunk_index))
            .collect();

        let entry = CachedAnswer {
            answer: answer.clone(),
            sources: sources.clone(),
        };
        match serde_json::to_value(&entry) {
            Ok(value) => {
                if let Err(e) = self.cache.set(&key, value, self.response_ttl).await {
                    warn!(error = %e, "failed to cache answer");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize answer for cache"),
        }

        self.record_turn(&session_id, message, &answer).await;

        Ok(ChatReply {
            answer,
            session_id,
            sources,
            cached: false,
        })
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.cache
            .get_chat_history(session_id, self.history_limit)
            .await
    }

    /// Forget a session's history. Returns `false` when there was none.
    pub async fn clear_history(&self, session_id: &str) -> Result<bool> {
        self.cache.clear_chat_history(session_id).await
    }

    async fn cached_answer(&self, key: &str) -> Option<CachedAnswer> {
        let value: Value = match self.cache.get(key).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "response cache lookup failed");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(hit) => Some(hit),
            Err(e) => {
                warn!(error = %e, "ignoring malformed cached answer");
                None
            }
        }
    }

    async fn record_turn(&self, session_id: &str, question: &str, answer: &str) {
        for (role, content) in [(Role::User, question), (Role::Assistant, answer)] {
            let message = ChatMessage::new(session_id, role, content);
            if let Err(e) = self.cache.save_chat_message(session_id, message).await {
                warn!(error = %e, session_id, "failed to save chat message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::generation::Generator;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::Utc;
    use hybrid_rag_core::embedding::EmbeddingProvider;
    use hybrid_rag_core::models::Chunk;
    use hybrid_rag_core::store::memory::InMemoryStore;
    use hybrid_rag_core::store::ChunkStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for NoEmbeddings {
        fn model_name(&self) -> &str {
            "none"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("offline")
        }
    }

    /// Counts calls and reports how much history it received.
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn generate(
            &self,
            _prompt: &str,
            _context: Option<&str>,
            history: &[ChatMessage],
        ) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("answer {} with {} prior messages", n, history.len()))
        }
    }

    /// A cache whose every operation fails.
    struct BrokenCache;

    #[async_trait]
    impl CacheService for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            bail!("down")
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<()> {
            bail!("down")
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            bail!("down")
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            bail!("down")
        }
        async fn get_chat_history(&self, _s: &str, _limit: usize) -> Result<Vec<ChatMessage>> {
            bail!("down")
        }
        async fn save_chat_message(&self, _s: &str, _m: ChatMessage) -> Result<()> {
            bail!("down")
        }
        async fn clear_chat_history(&self, _s: &str) -> Result<bool> {
            bail!("down")
        }
    }

    async fn service(cache: Arc<dyn CacheService>) -> (Arc<CountingGenerator>, ChatService) {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_many(&[Chunk {
                id: "c1".to_string(),
                document_id: "d1".to_string(),
                content: "the capital of france is paris".to_string(),
                chunk_index: 3,
                content_hash: hybrid_rag_core::chunk::content_hash("paris"),
                embedding: None,
                metadata: json!({}),
                created_at: Utc::now(),
            }])
            .await
            .unwrap();
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(RetrievalPipeline::new(
            store,
            Arc::new(NoEmbeddings),
            generator.clone(),
            60,
            100,
        ));
        let service = ChatService::new(pipeline, cache, 5, &CacheConfig::default());
        (generator, service)
    }

    #[test]
    fn test_cache_key_normalizes_case_and_whitespace() {
        let key = response_cache_key("  What is Paris? ");
        assert_eq!(key, response_cache_key("what is paris?"));
        assert!(key.starts_with("rag:response:"));
        assert_eq!(key.len(), "rag:response:".len() + 64);
        assert_ne!(key, response_cache_key("what is lyon?"));
    }

    #[test]
    fn test_cache_key_is_lowercase_hex_sha256() {
        assert_eq!(
            response_cache_key(" ABC "),
            "rag:response:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            response_cache_key("abc"),
            format!("rag:response:{}", content_hash("abc"))
        );
    }

    #[tokio::test]
    async fn test_first_answer_generated_then_cached() {
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(60), 100));
        let (generator, service) = service(cache).await;

        let first = service.ask("capital of France", None).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.sources, vec!["Chunk 3".to_string()]);
        assert!(!first.session_id.is_empty());

        let second = service
            .ask("CAPITAL OF FRANCE ", Some(first.session_id.clone()))
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.answer, first.answer);
        assert_eq!(second.sources, first.sources);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let history = service.history(&first.session_id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_history_is_replayed_to_generator() {
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(60), 100));
        let (_, service) = service(cache).await;

        let first = service.ask("paris", Some("s1".to_string())).await.unwrap();
        assert_eq!(first.session_id, "s1");
        assert!(first.answer.ends_with("with 0 prior messages"));

        let second = service.ask("france", Some("s1".to_string())).await.unwrap();
        assert!(second.answer.ends_with("with 2 prior messages"));

        assert!(service.clear_history("s1").await.unwrap());
        assert!(service.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broken_cache_does_not_fail_requests() {
        let (generator, service) = service(Arc::new(BrokenCache)).await;
        let reply = service.ask("paris", None).await.unwrap();
        assert!(!reply.cached);
        let again = service.ask("paris", None).await.unwrap();
        assert!(!again.cached);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }
}
