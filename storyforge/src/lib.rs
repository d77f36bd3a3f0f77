//! # storyforge: Illustrated Story Generation Service
//!
//! `storyforge` is the backend of a small educational web application: a
//! `POST` endpoint takes story parameters (main character, plot, ending,
//! genre, literary form), generates a short narrative with a chat-completion
//! service and an illustration with an image-generation service, persists the
//! result in PostgreSQL, and serves a paginated library of stored stories.
//!
//! ## Request Flow
//!
//! A generation request runs through one sequential pipeline
//! ([`pipeline::StoryPipeline`]): validation, story text (fatal on failure,
//! with bounded retries for transient provider errors), illustration
//! (non-fatal; a deterministic placeholder is substituted when generation
//! fails or is disabled), size-constrained persistence (best-effort; the
//! outcome is reported inside the response rather than failing the request),
//! and response shaping. Concurrent requests are independent; the only shared
//! resources are the connection pool and the provider HTTP clients held in
//! [`AppState`].
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is
//! PostgreSQL via `sqlx`, behind the [`db::handlers::StoryStore`] seam so the
//! pipeline treats the store as a plain record store. Both providers speak
//! the OpenAI wire format over `reqwest` with configurable base URLs; chat
//! request/response shapes come from `async-openai`. Configuration is YAML +
//! environment via `figment` (see [`config`]), and the API is documented with
//! `utoipa` (served at `/docs`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use storyforge::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = storyforge::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     storyforge::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::db::handlers::{Stories, StoryStore};
use crate::openapi::ApiDoc;
use crate::providers::{ChatCompletions, ImageGeneration, OpenAiChat, OpenAiImages};
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{StoryId, abbrev_uuid};

/// Application state shared across all request handlers.
///
/// The provider clients and the store are optional: without an API key the
/// generation endpoint refuses requests with a configuration error, and
/// without a database URL persistence is skipped (reported in the response)
/// and the library endpoint refuses requests.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub chat: Option<Arc<dyn ChatCompletions>>,
    pub image: Option<Arc<dyn ImageGeneration>>,
    pub store: Option<Arc<dyn StoryStore>>,
}

/// Get the storyforge database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/stories", post(api::handlers::stories::generate_story))
        .route("/stories", get(api::handlers::stories::list_stories))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Connect the pool and run migrations. Both are best-effort: a missing URL
/// or a failed connection degrades persistence instead of stopping startup.
#[instrument(skip_all)]
async fn setup_database(config: &Config) -> Option<PgPool> {
    let url = config.database.url.as_deref()?;

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_lazy(url)
    {
        Ok(pool) => pool,
        Err(err) => {
            warn!(error = %err, "invalid database URL; stories will not be persisted");
            return None;
        }
    };

    match migrator().run(&pool).await {
        Ok(()) => info!("database migrations applied"),
        Err(err) => {
            warn!(error = %err, "database migrations failed; writes will be attempted against the existing schema");
        }
    }

    Some(pool)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the database (best-effort),
///    runs migrations, and builds the provider clients and router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles requests
///    until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = setup_database(&config).await;
        if pool.is_none() {
            warn!("no database configured; stories will be generated but not persisted");
        }

        let (chat, image) = match &config.providers.api_key {
            Some(api_key) => {
                let chat = OpenAiChat::new(&config.providers, api_key.clone())?;
                let image = OpenAiImages::new(&config.providers, api_key.clone())?;
                (
                    Some(Arc::new(chat) as Arc<dyn ChatCompletions>),
                    Some(Arc::new(image) as Arc<dyn ImageGeneration>),
                )
            }
            None => {
                warn!("no provider API key configured; the generation endpoint will refuse requests");
                (None, None)
            }
        };

        let store = pool.clone().map(|pool| Arc::new(Stories::new(pool)) as Arc<dyn StoryStore>);

        let state = AppState::builder()
            .config(config.clone())
            .maybe_chat(chat)
            .maybe_image(image)
            .maybe_store(store)
            .build();

        let router = build_router(state);

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("storyforge listening on http://{}", bind_addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}
