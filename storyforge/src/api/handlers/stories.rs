//! HTTP handlers for story generation and the library listing.

use crate::AppState;
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::stories::{GenerateStoryRequest, GenerateStoryResponse, StoryResponse};
use crate::db::models::stories::StoryFilter;
use crate::errors::Error;
use crate::pipeline::StoryPipeline;
use axum::{
    Json,
    extract::{Query, State},
};

/// Presence check for the required fields. Runs before anything touches a
/// provider, so a bad request costs no external calls.
fn validate(request: &GenerateStoryRequest) -> Result<(), Error> {
    let mut missing = Vec::new();
    for (name, value) in [
        ("mainCharacter", &request.main_character),
        ("plot", &request.plot),
        ("ending", &request.ending),
    ] {
        if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
            missing.push(name);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation {
            message: format!("missing required fields: {}", missing.join(", ")),
        })
    }
}

#[utoipa::path(
    post,
    path = "/stories",
    tag = "stories",
    summary = "Generate a story",
    description = "Generates a story and an illustration from the given parameters and stores the result in the library (best-effort)",
    request_body = GenerateStoryRequest,
    responses(
        (status = 200, description = "Story generated; persistence outcome reported in the body", body = GenerateStoryResponse),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Provider rejected the configured credentials"),
        (status = 429, description = "Provider quota exceeded"),
        (status = 500, description = "Server misconfiguration or generation failure"),
        (status = 504, description = "Provider timeout"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn generate_story(
    State(state): State<AppState>,
    Json(request): Json<GenerateStoryRequest>,
) -> Result<Json<GenerateStoryResponse>, Error> {
    validate(&request)?;

    let chat = state.chat.clone().ok_or_else(|| Error::Configuration {
        message: "provider API key is not configured".to_string(),
    })?;

    let pipeline = StoryPipeline::new(
        chat,
        state.image.clone(),
        state.store.clone(),
        state.config.providers.clone(),
        state.config.generation.clone(),
    );
    let response = pipeline.run(&request).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/stories",
    tag = "stories",
    summary = "List stored stories",
    description = "Returns a page of stored stories, newest first",
    params(Pagination),
    responses(
        (status = 200, description = "A page of stories"),
        (status = 500, description = "Database is not configured or unreachable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_stories(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<StoryResponse>>, Error> {
    let store = state.store.clone().ok_or_else(|| Error::Configuration {
        message: "DATABASE_URL is not configured".to_string(),
    })?;

    let (skip, limit) = (pagination.skip(), pagination.limit());
    let stories = store.list(&StoryFilter::new(skip, limit)).await?;
    let total_count = store.count().await?;

    Ok(Json(PaginatedResponse::new(
        stories.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}
