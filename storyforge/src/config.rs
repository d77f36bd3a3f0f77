//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can
//! be specified via `-f` flag or `STORYFORGE_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `STORYFORGE_`
//!    override YAML values; nested keys use double underscores, e.g.
//!    `STORYFORGE_PROVIDERS__CHAT_MODEL=gpt-4o`
//! 3. **`DATABASE_URL`** - Overrides `database.url` if set
//! 4. **`OPENAI_API_KEY`** - Overrides `providers.api_key` if set
//!
//! Both the database URL and the provider API key are optional at startup:
//! without a database the service still generates stories (persistence is
//! reported as skipped), and without an API key the generation endpoint
//! refuses requests with a configuration error while the library endpoint
//! keeps working.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::errors::Error;
use crate::pipeline::placeholder_illustration;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "STORYFORGE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment
/// variables. All fields have sensible defaults defined in the `Default`
/// implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Generation provider connection settings (credentials, models, retries)
    pub providers: ProviderConfig,
    /// Generation and persistence limits
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database: DatabaseConfig::default(),
            providers: ProviderConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Postgres connection string. Optional: when absent, stories are still
    /// generated but not persisted, and the library endpoint returns a
    /// configuration error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Connection settings for the chat-completion and image-generation services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key shared by both providers. Optional at startup; the generation
    /// endpoint refuses requests until it is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of the chat-completion service
    pub chat_base_url: Url,
    /// Base URL of the image-generation service
    pub image_base_url: Url,
    /// Chat model used for story text and illustration prompts
    pub chat_model: String,
    /// Image model used for illustrations
    pub image_model: String,
    /// Per-request timeout for provider calls, in seconds
    pub request_timeout_secs: u64,
    /// Maximum fixed-delay retries per provider call for transient failures
    pub max_retries: u32,
    /// Fixed delay between retries, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_base_url: Url::parse("https://api.openai.com/v1").expect("default chat base URL is valid"),
            image_base_url: Url::parse("https://api.openai.com/v1").expect("default image base URL is valid"),
            chat_model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Requested illustration resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ImageSize {
    #[serde(rename = "256x256")]
    Small,
    #[serde(rename = "512x512")]
    Medium,
    #[serde(rename = "1024x1024")]
    Large,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageSize::Small => "256x256",
            ImageSize::Medium => "512x512",
            ImageSize::Large => "1024x1024",
        };
        f.write_str(s)
    }
}

/// What to do with an illustration payload that exceeds `max_image_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizeImagePolicy {
    /// Cut the encoded payload at the limit. Best-effort: truncated base64 is
    /// not guaranteed to decode into a valid image.
    Truncate,
    /// Replace the payload with the deterministic placeholder image.
    #[default]
    Placeholder,
    /// Drop the illustration entirely.
    Omit,
}

/// Limits and knobs for the generation-and-persistence pipeline. The former
/// scattered per-variant constants, consolidated.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Language the stories are written in
    pub language: String,
    /// Maximum stored story length in characters; longer text is truncated
    /// with a marker at write time
    pub max_story_chars: usize,
    /// Maximum stored illustration payload size in bytes (encoded)
    pub max_image_bytes: usize,
    /// Requested illustration resolution
    pub image_size: ImageSize,
    /// Token budget for the story completion call
    pub max_tokens: u32,
    /// Sampling temperature for the story completion call
    pub temperature: f32,
    /// Whether illustrations are generated at all; when disabled every story
    /// gets the placeholder
    pub illustrations_enabled: bool,
    /// Derive the illustration prompt with a second chat call instead of from
    /// the story's opening words
    pub illustration_prompt_via_model: bool,
    /// Handling of oversized illustration payloads at persistence time
    pub oversize_image_policy: OversizeImagePolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            max_story_chars: 10_000,
            max_image_bytes: 80 * 1024,
            image_size: ImageSize::Medium,
            max_tokens: 500,
            temperature: 0.7,
            illustrations_enabled: true,
            illustration_prompt_via_model: true,
            oversize_image_policy: OversizeImagePolicy::default(),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // Conventional environment variables take precedence over the file
        // but not over explicit STORYFORGE_ overrides
        if config.database.url.is_none() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                config.database.url = Some(url);
            }
        }
        if config.providers.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                config.providers.api_key = Some(key);
            }
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("STORYFORGE_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::Configuration {
                message: format!(
                    "Config validation: temperature must be between 0.0 and 2.0, got {}",
                    self.generation.temperature
                ),
            });
        }

        if self.generation.max_tokens == 0 {
            return Err(Error::Configuration {
                message: "Config validation: max_tokens must be at least 1".to_string(),
            });
        }

        if self.generation.max_story_chars < 100 {
            return Err(Error::Configuration {
                message: format!(
                    "Config validation: max_story_chars must be at least 100, got {}",
                    self.generation.max_story_chars
                ),
            });
        }

        // The placeholder must itself fit within the limit, or the
        // substitution policy could never satisfy it
        if self.generation.oversize_image_policy == OversizeImagePolicy::Placeholder
            && self.generation.max_image_bytes < placeholder_illustration().len()
        {
            return Err(Error::Configuration {
                message: format!(
                    "Config validation: max_image_bytes ({}) is smaller than the placeholder image ({} bytes)",
                    self.generation.max_image_bytes,
                    placeholder_illustration().len()
                ),
            });
        }

        Ok(())
    }

    /// The socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_for(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 3000);
        assert_eq!(config.generation.max_story_chars, 10_000);
        assert_eq!(config.generation.image_size.to_string(), "512x512");
    }

    #[test]
    fn loads_yaml_with_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
port: 8080
providers:
  chat_model: gpt-4o-mini
generation:
  max_story_chars: 8000
  image_size: 256x256
  oversize_image_policy: omit
"#,
            )?;
            jail.set_env("STORYFORGE_PORT", "9090");
            jail.set_env("STORYFORGE_GENERATION__LANGUAGE", "Portuguese");

            let config = Config::load(&args_for("config.yaml")).expect("config should load");
            assert_eq!(config.port, 9090, "env override wins over file");
            assert_eq!(config.providers.chat_model, "gpt-4o-mini");
            assert_eq!(config.generation.max_story_chars, 8000);
            assert_eq!(config.generation.language, "Portuguese");
            assert_eq!(config.generation.image_size, ImageSize::Small);
            assert_eq!(config.generation.oversize_image_policy, OversizeImagePolicy::Omit);
            Ok(())
        });
    }

    #[test]
    fn honors_conventional_env_vars() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "port: 8080\n")?;
            jail.set_env("DATABASE_URL", "postgres://localhost/stories");
            jail.set_env("OPENAI_API_KEY", "sk-test");

            let config = Config::load(&args_for("config.yaml")).expect("config should load");
            assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/stories"));
            assert_eq!(config.providers.api_key.as_deref(), Some("sk-test"));
            Ok(())
        });
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut config = Config::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_limit_smaller_than_placeholder() {
        let mut config = Config::default();
        config.generation.max_image_bytes = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(&args_for("does-not-exist.yaml")).expect("defaults should apply");
            assert_eq!(config.generation.max_story_chars, 10_000);
            assert_eq!(config.providers.chat_model, "gpt-4o");
            Ok(())
        });
    }
}
