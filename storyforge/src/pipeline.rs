//! The generation-and-persistence pipeline.
//!
//! One run per request, strictly ordered: story text (fatal on failure) →
//! illustration (non-fatal, placeholder on failure) → persistence
//! (best-effort, reported in the response) → response shaping. Each stage
//! carries its own bounded retry; the run as a whole is never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_openai::types::chat::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use base64::Engine;
use once_cell::sync::Lazy;

use crate::api::models::stories::{GenerateStoryRequest, GenerateStoryResponse, GenerationMetadata, PersistenceOutcome, UserInputEcho};
use crate::config::{GenerationConfig, OversizeImagePolicy, ProviderConfig};
use crate::db::errors::DbError;
use crate::db::handlers::StoryStore;
use crate::db::models::stories::{METADATA_NOT_PROVIDED, StoryCreateDBRequest};
use crate::errors::{Error, Result};
use crate::providers::chat::{ChatCompletions, completion_text};
use crate::providers::image::{ImageGeneration, ImageGenerationRequest};
use crate::providers::{ProviderError, with_retries};

/// Appended when stored text had to be cut to `max_story_chars`. The stored
/// text including the marker never exceeds the limit.
pub const TRUNCATION_MARKER: &str = "... [text truncated]";

/// Metadata fields are cut to this many characters before storage.
pub const MAX_METADATA_CHARS: usize = 200;

/// Generic prompt used for the single content-policy retry.
const SOFTENED_PROMPT: &str =
    "A gentle, family-friendly storybook illustration of a sunny meadow, soft colors, simple cartoon style.";

/// Token budget for the illustration-prompt chat call.
const ILLUSTRATION_PROMPT_MAX_TOKENS: u32 = 100;

// Persistence warnings surfaced in the response `database` block.
pub const WARN_NO_DATABASE_URL: &str = "NO_DATABASE_URL";
pub const WARN_CONNECTION_FAILED: &str = "CONNECTION_FAILED";
pub const WARN_WRITE_FAILED: &str = "WRITE_FAILED";
pub const WARN_REDUCED_SCHEMA: &str = "REDUCED_SCHEMA";

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100"><rect width="100" height="100" fill="#f0f0f0"/><text x="50" y="55" font-family="Arial" font-size="12" fill="#666" text-anchor="middle">IMG</text></svg>"##;

static PLACEHOLDER_B64: Lazy<String> = Lazy::new(|| base64::engine::general_purpose::STANDARD.encode(PLACEHOLDER_SVG));

/// The deterministic fallback illustration: a tiny base64-encoded SVG,
/// substituted when no real image data is available or the payload is
/// oversized under the placeholder policy.
pub fn placeholder_illustration() -> &'static String {
    &PLACEHOLDER_B64
}

/// Cut text to `max_chars`, appending [`TRUNCATION_MARKER`] inside the bound.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Apply the oversize policy to an encoded illustration payload.
pub fn fit_illustration(b64: &str, max_bytes: usize, policy: OversizeImagePolicy) -> Option<String> {
    if b64.len() <= max_bytes {
        return Some(b64.to_string());
    }
    match policy {
        // Base64 is ASCII, so byte slicing cannot split a character. The
        // result is not guaranteed to decode into a valid image.
        OversizeImagePolicy::Truncate => Some(b64[..max_bytes].to_string()),
        OversizeImagePolicy::Placeholder => Some(placeholder_illustration().clone()),
        OversizeImagePolicy::Omit => None,
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Trim and bound a metadata field; blank input becomes `None`.
fn sanitize_metadata(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_METADATA_CHARS).collect())
}

fn or_sentinel(value: Option<String>) -> String {
    value.unwrap_or_else(|| METADATA_NOT_PROVIDED.to_string())
}

/// Illustration prompt derived from the story's opening, used when the
/// model-derived prompt is disabled or fails.
fn prompt_from_story(story: &str) -> String {
    let lead: String = story.chars().take(100).collect();
    format!("A simple illustration for this story: {lead}... Friendly cartoon style for an educational app.")
}

/// User parameters after trimming and bounding.
struct SanitizedInput {
    main_character: String,
    plot: String,
    ending: String,
    genre: Option<String>,
    literature: Option<String>,
}

impl SanitizedInput {
    fn from_request(request: &GenerateStoryRequest) -> Self {
        Self {
            // The required fields were validated non-blank upstream
            main_character: sanitize_metadata(request.main_character.as_deref()).unwrap_or_default(),
            plot: sanitize_metadata(request.plot.as_deref()).unwrap_or_default(),
            ending: sanitize_metadata(request.ending.as_deref()).unwrap_or_default(),
            genre: sanitize_metadata(request.genre.as_deref()),
            literature: sanitize_metadata(request.literature.as_deref()),
        }
    }

    fn genre_for_prompt(&self) -> &str {
        self.genre.as_deref().unwrap_or("fantasy")
    }

    fn literature_for_prompt(&self) -> &str {
        self.literature.as_deref().unwrap_or("short story")
    }

    fn into_echo(self) -> UserInputEcho {
        UserInputEcho {
            main_character: self.main_character,
            plot: self.plot,
            ending: self.ending,
            genre: or_sentinel(self.genre),
            literature: or_sentinel(self.literature),
        }
    }
}

struct IllustrationOutcome {
    b64: String,
    generated: bool,
}

impl IllustrationOutcome {
    fn placeholder() -> Self {
        Self {
            b64: placeholder_illustration().clone(),
            generated: false,
        }
    }
}

/// One pipeline instance per request; cheap to construct from shared state.
pub struct StoryPipeline {
    chat: Arc<dyn ChatCompletions>,
    image: Option<Arc<dyn ImageGeneration>>,
    store: Option<Arc<dyn StoryStore>>,
    providers: ProviderConfig,
    generation: GenerationConfig,
}

impl StoryPipeline {
    pub fn new(
        chat: Arc<dyn ChatCompletions>,
        image: Option<Arc<dyn ImageGeneration>>,
        store: Option<Arc<dyn StoryStore>>,
        providers: ProviderConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            chat,
            image,
            store,
            providers,
            generation,
        }
    }

    /// Run the whole pipeline for one validated request.
    pub async fn run(&self, request: &GenerateStoryRequest) -> Result<GenerateStoryResponse> {
        let started = Instant::now();
        let input = SanitizedInput::from_request(request);

        let story = self.generate_story_text(&input).await?;
        tracing::info!(chars = story.chars().count(), "story text generated");

        let illustration = self.generate_illustration(&story).await;
        let database = self.persist(&story, &illustration, &input).await;

        let metadata = GenerationMetadata {
            total_time_ms: started.elapsed().as_millis() as u64,
            text_length: story.chars().count(),
            word_count: word_count(&story),
            image_bytes: illustration.b64.len(),
            has_image: illustration.generated,
        };

        Ok(GenerateStoryResponse {
            success: true,
            story,
            illustration: illustration.b64,
            metadata,
            database,
            user_input: input.into_echo(),
        })
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.providers.retry_delay_ms)
    }

    fn build_chat_request(&self, system: &str, user: &str, max_tokens: u32) -> Result<CreateChatCompletionRequest> {
        let build = |err: &dyn std::fmt::Display| Error::Generation {
            message: format!("failed to build chat completion request: {err}"),
        };
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(|e| build(&e))?;
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(|e| build(&e))?;
        CreateChatCompletionRequestArgs::default()
            .model(&self.providers.chat_model)
            .messages(vec![system_message.into(), user_message.into()])
            .max_tokens(max_tokens)
            .temperature(self.generation.temperature)
            .build()
            .map_err(|e| build(&e))
    }

    /// Fatal stage: auth/quota/timeout failures surface with their own kinds,
    /// transient failures are retried, anything left fails the request.
    async fn generate_story_text(&self, input: &SanitizedInput) -> Result<String> {
        let system = format!(
            "You are an educational writing assistant. Write narratives of 150-200 words in {}.",
            self.generation.language
        );
        let user = format!(
            "Write a {} in the {} genre.\nMain character: {}\nPlot: {}\nEnding: {}\nAt most 200 words.",
            input.literature_for_prompt(),
            input.genre_for_prompt(),
            input.main_character,
            input.plot,
            input.ending,
        );

        let request = self.build_chat_request(&system, &user, self.generation.max_tokens)?;
        let response = with_retries(self.providers.max_retries, self.retry_delay(), || self.chat.create(request.clone())).await?;

        let text = completion_text(&response).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::Generation {
                message: "provider returned an empty story".to_string(),
            });
        }
        Ok(text)
    }

    /// Best-effort illustration prompt: a model-derived one when configured,
    /// falling back to the story's opening words. Never fails the request.
    async fn illustration_prompt(&self, story: &str) -> String {
        if self.generation.illustration_prompt_via_model {
            let lead: String = story.chars().take(1000).collect();
            let user = format!("Write a single-sentence illustration prompt for this story:\n{lead}");
            match self.build_chat_request("You write concise prompts for an image generation model.", &user, ILLUSTRATION_PROMPT_MAX_TOKENS) {
                Ok(request) => match self.chat.create(request).await {
                    Ok(response) => {
                        if let Some(prompt) = completion_text(&response) {
                            if !prompt.trim().is_empty() {
                                return prompt;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "illustration prompt call failed, deriving prompt from story text");
                    }
                },
                Err(err) => {
                    tracing::debug!(error = %err, "could not build illustration prompt request");
                }
            }
        }
        prompt_from_story(story)
    }

    /// Non-fatal stage: one softened retry on content-policy rejections,
    /// bounded transient retries otherwise, placeholder on exhaustion.
    async fn generate_illustration(&self, story: &str) -> IllustrationOutcome {
        if !self.generation.illustrations_enabled {
            return IllustrationOutcome::placeholder();
        }
        let Some(image) = self.image.as_ref() else {
            return IllustrationOutcome::placeholder();
        };

        let prompt = self.illustration_prompt(story).await;
        let request = ImageGenerationRequest {
            model: self.providers.image_model.clone(),
            prompt,
            size: self.generation.image_size.to_string(),
            n: 1,
            response_format: "b64_json".to_string(),
        };

        match with_retries(self.providers.max_retries, self.retry_delay(), || image.generate(&request)).await {
            Ok(illustration) => IllustrationOutcome {
                b64: illustration.b64,
                generated: true,
            },
            Err(ProviderError::ContentPolicy { message }) => {
                tracing::warn!(%message, "illustration prompt rejected by content policy, retrying with softened prompt");
                let softened = ImageGenerationRequest {
                    prompt: SOFTENED_PROMPT.to_string(),
                    ..request
                };
                match image.generate(&softened).await {
                    Ok(illustration) => IllustrationOutcome {
                        b64: illustration.b64,
                        generated: true,
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "softened illustration attempt failed, continuing without illustration");
                        IllustrationOutcome::placeholder()
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "illustration generation failed, continuing without illustration");
                IllustrationOutcome::placeholder()
            }
        }
    }

    /// Best-effort stage: size-constrain the payloads, write, and fold any
    /// failure into the persistence outcome instead of the request result.
    async fn persist(&self, story: &str, illustration: &IllustrationOutcome, input: &SanitizedInput) -> PersistenceOutcome {
        let Some(store) = self.store.as_ref() else {
            return PersistenceOutcome {
                saved: false,
                story_id: None,
                warning: Some(WARN_NO_DATABASE_URL.to_string()),
            };
        };

        let request = StoryCreateDBRequest {
            text: truncate_text(story, self.generation.max_story_chars),
            illustration: fit_illustration(
                &illustration.b64,
                self.generation.max_image_bytes,
                self.generation.oversize_image_policy,
            ),
            main_character: input.main_character.clone(),
            plot: input.plot.clone(),
            ending: input.ending.clone(),
            genre: or_sentinel(input.genre.clone()),
            literature: or_sentinel(input.literature.clone()),
        };

        match store.create(&request).await {
            Ok(outcome) => PersistenceOutcome {
                saved: true,
                story_id: Some(outcome.story.id),
                warning: outcome.degraded.then(|| WARN_REDUCED_SCHEMA.to_string()),
            },
            Err(DbError::Connection { message }) => {
                tracing::warn!(%message, "database unreachable, returning story without persisting");
                PersistenceOutcome {
                    saved: false,
                    story_id: None,
                    warning: Some(WARN_CONNECTION_FAILED.to_string()),
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "story write failed");
                PersistenceOutcome {
                    saved: false,
                    story_id: None,
                    warning: Some(WARN_WRITE_FAILED.to_string()),
                }
            }
        }
    }
}
