//! OpenAPI document for the story API.

use crate::api::models::stories::{
    GenerateStoryRequest, GenerateStoryResponse, GenerationMetadata, PersistenceOutcome, StoryResponse, UserInputEcho,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "storyforge",
        description = "Illustrated story generation service: generates stories and illustrations from user parameters and keeps them in a browsable library"
    ),
    paths(
        crate::api::handlers::stories::generate_story,
        crate::api::handlers::stories::list_stories,
    ),
    components(schemas(
        GenerateStoryRequest,
        GenerateStoryResponse,
        GenerationMetadata,
        PersistenceOutcome,
        UserInputEcho,
        StoryResponse,
    )),
    tags(
        (name = "stories", description = "Story generation and library listing")
    )
)]
pub struct ApiDoc;
