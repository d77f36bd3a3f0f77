//! Database request/response models for stories.

use crate::types::StoryId;
use chrono::{DateTime, Utc};

/// Sentinel stored for metadata fields the user did not provide. Display code
/// can rely on these fields never being null.
pub const METADATA_NOT_PROVIDED: &str = "not provided";

/// Request to persist one generated story.
///
/// `text` and `illustration` are the guaranteed base fields; the rest are
/// extended metadata columns that may be absent from older schemas.
#[derive(Debug, Clone)]
pub struct StoryCreateDBRequest {
    pub text: String,
    pub illustration: Option<String>,
    pub main_character: String,
    pub plot: String,
    pub ending: String,
    pub genre: String,
    pub literature: String,
}

/// A stored story as returned by the store.
#[derive(Debug, Clone)]
pub struct StoryDBResponse {
    pub id: StoryId,
    pub text: String,
    pub illustration: Option<String>,
    pub main_character: String,
    pub plot: String,
    pub ending: String,
    pub genre: String,
    pub literature: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a story write, carrying whether the reduced-field fallback path
/// had to be used.
#[derive(Debug, Clone)]
pub struct StoryWriteOutcome {
    pub story: StoryDBResponse,
    /// True when the full write was rejected for missing extended columns and
    /// only the base fields were persisted.
    pub degraded: bool,
}

/// Filter for listing stories
#[derive(Debug, Clone)]
pub struct StoryFilter {
    pub skip: i64,
    pub limit: i64,
}

impl StoryFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}
