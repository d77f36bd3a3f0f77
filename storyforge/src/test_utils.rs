//! Test utilities: an in-memory story store double and helpers for building
//! a test server against wiremock-backed providers.

use crate::config::Config;
use crate::db::{
    errors::{DbError, Result},
    handlers::StoryStore,
    models::stories::{METADATA_NOT_PROVIDED, StoryCreateDBRequest, StoryDBResponse, StoryFilter, StoryWriteOutcome},
};
use crate::providers::{ChatCompletions, ImageGeneration, OpenAiChat, OpenAiImages};
use crate::{AppState, build_router};
use axum_test::TestServer;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Configuration pointed at a mock provider server, with retry delays zeroed
/// so retry paths run instantly.
pub fn create_test_config(provider_base_url: &str) -> Config {
    let mut config = Config::default();
    config.providers.chat_base_url = provider_base_url.parse().expect("provider base URL must parse");
    config.providers.image_base_url = provider_base_url.parse().expect("provider base URL must parse");
    config.providers.retry_delay_ms = 0;
    config.providers.request_timeout_secs = 5;
    // Exercised explicitly by the tests that need the second chat call
    config.generation.illustration_prompt_via_model = false;
    config
}

/// Build application state with live provider clients (pointed wherever the
/// config says) or none at all, plus an optional store double.
pub fn create_test_state(config: Config, with_providers: bool, store: Option<Arc<dyn StoryStore>>) -> AppState {
    let (chat, image) = if with_providers {
        let chat = OpenAiChat::new(&config.providers, "test-key".to_string()).expect("failed to build chat client");
        let image = OpenAiImages::new(&config.providers, "test-key".to_string()).expect("failed to build image client");
        (
            Some(Arc::new(chat) as Arc<dyn ChatCompletions>),
            Some(Arc::new(image) as Arc<dyn ImageGeneration>),
        )
    } else {
        (None, None)
    };

    AppState::builder()
        .config(config)
        .maybe_chat(chat)
        .maybe_image(image)
        .maybe_store(store)
        .build()
}

pub fn create_test_app(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).expect("Failed to create test server")
}

/// OpenAI-style chat completion body with the given assistant text.
pub fn story_completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    })
}

/// In-memory [`StoryStore`] double.
///
/// `reject_extended_columns` simulates a schema without the metadata columns
/// (every write degrades to the base-field fallback); `fail_connections`
/// simulates an unreachable database.
#[derive(Default)]
pub struct InMemoryStoryStore {
    pub(crate) stories: Mutex<Vec<StoryDBResponse>>,
    pub reject_extended_columns: bool,
    pub fail_connections: bool,
}

impl InMemoryStoryStore {
    /// Snapshot of the stored records, oldest first.
    pub fn stored(&self) -> Vec<StoryDBResponse> {
        self.stories.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn create(&self, request: &StoryCreateDBRequest) -> Result<StoryWriteOutcome> {
        if self.fail_connections {
            return Err(DbError::Connection {
                message: "connection refused".to_string(),
            });
        }

        let degraded = self.reject_extended_columns;
        let sentinel = || METADATA_NOT_PROVIDED.to_string();
        let story = StoryDBResponse {
            id: Uuid::new_v4(),
            text: request.text.clone(),
            illustration: request.illustration.clone(),
            main_character: if degraded { sentinel() } else { request.main_character.clone() },
            plot: if degraded { sentinel() } else { request.plot.clone() },
            ending: if degraded { sentinel() } else { request.ending.clone() },
            genre: if degraded { sentinel() } else { request.genre.clone() },
            literature: if degraded { sentinel() } else { request.literature.clone() },
            created_at: Utc::now(),
        };
        self.stories.lock().unwrap().push(story.clone());
        Ok(StoryWriteOutcome { story, degraded })
    }

    async fn list(&self, filter: &StoryFilter) -> Result<Vec<StoryDBResponse>> {
        if self.fail_connections {
            return Err(DbError::Connection {
                message: "connection refused".to_string(),
            });
        }
        let stories = self.stories.lock().unwrap();
        Ok(stories
            .iter()
            .rev()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.stories.lock().unwrap().len() as i64)
    }
}
