//! API request/response models for story generation and the library listing.

use crate::db::models::stories::StoryDBResponse;
use crate::types::StoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Parameters for one story generation request.
///
/// `mainCharacter`, `plot` and `ending` are required and validated in the
/// handler (all fields are optional at the serde level so that missing fields
/// produce a 400 with a machine-readable code instead of a deserialization
/// rejection).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateStoryRequest {
    /// The story's main character (required)
    pub main_character: Option<String>,
    /// The story's plot (required)
    pub plot: Option<String>,
    /// How the story ends (required)
    pub ending: Option<String>,
    /// Genre, e.g. "drama" (optional, defaults to fantasy in the prompt)
    pub genre: Option<String>,
    /// Literary form, e.g. "short story" (optional)
    pub literature: Option<String>,
}

/// Generation metadata included in every successful response.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    /// Wall-clock time for the whole pipeline run, in milliseconds
    pub total_time_ms: u64,
    /// Generated story length in characters
    pub text_length: usize,
    /// Generated story length in words
    pub word_count: usize,
    /// Size of the returned illustration payload in bytes (encoded)
    pub image_bytes: usize,
    /// Whether a real illustration was generated (false when the placeholder
    /// was substituted)
    pub has_image: bool,
}

/// Persistence outcome included in every successful response. Persistence is
/// best-effort: `saved: false` plus a warning code, never a failed request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceOutcome {
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Uuid)]
    pub story_id: Option<StoryId>,
    /// Warning code when persistence was skipped, failed, or degraded:
    /// NO_DATABASE_URL, CONNECTION_FAILED, WRITE_FAILED, or REDUCED_SCHEMA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Echo of the (sanitized) user parameters, with sentinel defaults applied.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInputEcho {
    pub main_character: String,
    pub plot: String,
    pub ending: String,
    pub genre: String,
    pub literature: String,
}

/// Response to a successful generation request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateStoryResponse {
    pub success: bool,
    /// The generated story text (untruncated; truncation applies at write time)
    pub story: String,
    /// Base64-encoded illustration, or the placeholder when generation failed
    pub illustration: String,
    pub metadata: GenerationMetadata,
    pub database: PersistenceOutcome,
    pub user_input: UserInputEcho,
}

/// A stored story as returned by the library listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: StoryId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illustration: Option<String>,
    pub main_character: String,
    pub plot: String,
    pub ending: String,
    pub genre: String,
    pub literature: String,
    pub created_at: DateTime<Utc>,
}

impl From<StoryDBResponse> for StoryResponse {
    fn from(story: StoryDBResponse) -> Self {
        Self {
            id: story.id,
            text: story.text,
            illustration: story.illustration,
            main_character: story.main_character,
            plot: story.plot,
            ending: story.ending,
            genre: story.genre,
            literature: story.literature,
            created_at: story.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_missing_fields() {
        let request: GenerateStoryRequest = serde_json::from_str(r#"{"mainCharacter": "Ana"}"#).unwrap();
        assert_eq!(request.main_character.as_deref(), Some("Ana"));
        assert!(request.plot.is_none());
        assert!(request.genre.is_none());
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = GenerateStoryResponse {
            success: true,
            story: "Once".into(),
            illustration: String::new(),
            metadata: GenerationMetadata {
                total_time_ms: 12,
                text_length: 4,
                word_count: 1,
                image_bytes: 0,
                has_image: false,
            },
            database: PersistenceOutcome {
                saved: false,
                story_id: None,
                warning: Some("NO_DATABASE_URL".into()),
            },
            user_input: UserInputEcho {
                main_character: "Ana".into(),
                plot: "not provided".into(),
                ending: "not provided".into(),
                genre: "not provided".into(),
                literature: "not provided".into(),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["metadata"]["totalTimeMs"], 12);
        assert_eq!(json["database"]["warning"], "NO_DATABASE_URL");
        assert_eq!(json["userInput"]["mainCharacter"], "Ana");
        assert!(json["database"].get("storyId").is_none());
    }
}
