//! Postgres-backed story store.

use crate::db::{
    errors::{DbError, Result},
    models::stories::{METADATA_NOT_PROVIDED, StoryCreateDBRequest, StoryDBResponse, StoryFilter, StoryWriteOutcome},
};
use crate::types::StoryId;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;

/// Record store seam for stories.
///
/// Persistence failures must stay inside the `Result` here: the pipeline
/// absorbs them into the response rather than failing the request.
#[async_trait::async_trait]
pub trait StoryStore: Send + Sync {
    /// Write one story. Attempts a full write with all metadata columns and
    /// falls back to the base fields (`text`, `illustration`) when the schema
    /// rejects the extended columns.
    async fn create(&self, request: &StoryCreateDBRequest) -> Result<StoryWriteOutcome>;

    /// List stored stories, newest first.
    async fn list(&self, filter: &StoryFilter) -> Result<Vec<StoryDBResponse>>;

    /// Total number of stored stories.
    async fn count(&self) -> Result<i64>;
}

// Full database entity model (extended schema)
#[derive(Debug, Clone, FromRow)]
struct StoryRow {
    id: StoryId,
    text: String,
    illustration: Option<String>,
    main_character: String,
    plot: String,
    ending: String,
    genre: String,
    literature: String,
    created_at: DateTime<Utc>,
}

// Base entity model for schemas without the extended metadata columns
#[derive(Debug, Clone, FromRow)]
struct StoryBaseRow {
    id: StoryId,
    text: String,
    illustration: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<StoryRow> for StoryDBResponse {
    fn from(row: StoryRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            illustration: row.illustration,
            main_character: row.main_character,
            plot: row.plot,
            ending: row.ending,
            genre: row.genre,
            literature: row.literature,
            created_at: row.created_at,
        }
    }
}

impl From<StoryBaseRow> for StoryDBResponse {
    fn from(row: StoryBaseRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            illustration: row.illustration,
            main_character: METADATA_NOT_PROVIDED.to_string(),
            plot: METADATA_NOT_PROVIDED.to_string(),
            ending: METADATA_NOT_PROVIDED.to_string(),
            genre: METADATA_NOT_PROVIDED.to_string(),
            literature: METADATA_NOT_PROVIDED.to_string(),
            created_at: row.created_at,
        }
    }
}

const INSERT_FULL: &str = "INSERT INTO stories (text, illustration, main_character, plot, ending, genre, literature) \
     VALUES ($1, $2, $3, $4, $5, $6, $7) \
     RETURNING id, text, illustration, main_character, plot, ending, genre, literature, created_at";

const INSERT_BASE: &str = "INSERT INTO stories (text, illustration) VALUES ($1, $2) \
     RETURNING id, text, illustration, created_at";

const SELECT_FULL: &str = "SELECT id, text, illustration, main_character, plot, ending, genre, literature, created_at \
     FROM stories ORDER BY created_at DESC LIMIT $1 OFFSET $2";

const SELECT_BASE: &str = "SELECT id, text, illustration, created_at \
     FROM stories ORDER BY created_at DESC LIMIT $1 OFFSET $2";

/// Postgres story store.
#[derive(Clone)]
pub struct Stories {
    pool: PgPool,
}

impl Stories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_full(&self, request: &StoryCreateDBRequest) -> Result<StoryDBResponse> {
        let row = sqlx::query_as::<_, StoryRow>(INSERT_FULL)
            .bind(&request.text)
            .bind(&request.illustration)
            .bind(&request.main_character)
            .bind(&request.plot)
            .bind(&request.ending)
            .bind(&request.genre)
            .bind(&request.literature)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn insert_base(&self, request: &StoryCreateDBRequest) -> Result<StoryDBResponse> {
        let row = sqlx::query_as::<_, StoryBaseRow>(INSERT_BASE)
            .bind(&request.text)
            .bind(&request.illustration)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}

#[async_trait::async_trait]
impl StoryStore for Stories {
    #[instrument(skip(self, request), fields(text_len = request.text.len()), err)]
    async fn create(&self, request: &StoryCreateDBRequest) -> Result<StoryWriteOutcome> {
        match self.insert_full(request).await {
            Ok(story) => Ok(StoryWriteOutcome { story, degraded: false }),
            Err(DbError::UndefinedColumn { column, .. }) => {
                tracing::warn!(?column, "schema lacks extended columns, retrying with base fields");
                let story = self.insert_base(request).await?;
                Ok(StoryWriteOutcome { story, degraded: true })
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&self, filter: &StoryFilter) -> Result<Vec<StoryDBResponse>> {
        let full = sqlx::query_as::<_, StoryRow>(SELECT_FULL)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&self.pool)
            .await;

        match full {
            Ok(rows) => Ok(rows.into_iter().map(Into::into).collect()),
            // Reduced schemas degrade reads the same way they degrade writes,
            // so a record written through the fallback path is still listable.
            Err(sqlx_err) => match DbError::from(sqlx_err) {
                DbError::UndefinedColumn { column, .. } => {
                    tracing::warn!(?column, "schema lacks extended columns, listing base fields only");
                    let rows = sqlx::query_as::<_, StoryBaseRow>(SELECT_BASE)
                        .bind(filter.limit)
                        .bind(filter.skip)
                        .fetch_all(&self.pool)
                        .await?;
                    Ok(rows.into_iter().map(Into::into).collect())
                }
                err => Err(err),
            },
        }
    }

    #[instrument(skip(self), err)]
    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stories").fetch_one(&self.pool).await?;
        Ok(count)
    }
}
