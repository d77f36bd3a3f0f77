//! Image-generation client.
//!
//! Speaks the OpenAI Images API (`/images/generations`) and requests the
//! result as an embedded base64 payload so the pipeline can size-check it
//! before persistence.

use crate::config::ProviderConfig;
use crate::providers::{ProviderError, endpoint_url, from_reqwest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A request to generate one illustration.
#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationRequest {
    /// Model identifier (e.g. `"dall-e-3"`).
    pub model: String,
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Resolution, e.g. `"512x512"`.
    pub size: String,
    /// Number of images to generate.
    pub n: u32,
    /// Output format; always `"b64_json"` here.
    pub response_format: String,
}

/// A generated illustration as an encoded payload.
#[derive(Debug, Clone)]
pub struct GeneratedIllustration {
    /// Base64-encoded image bytes, exactly as returned by the provider.
    pub b64: String,
}

impl GeneratedIllustration {
    /// Size of the encoded payload in bytes (base64 is ASCII, so byte length
    /// equals character length).
    pub fn encoded_len(&self) -> usize {
        self.b64.len()
    }
}

/// Image-generation service seam.
#[async_trait::async_trait]
pub trait ImageGeneration: Send + Sync {
    async fn generate(&self, request: &ImageGenerationRequest) -> Result<GeneratedIllustration, ProviderError>;
}

/// Live client for an OpenAI-compatible `/images/generations` endpoint.
pub struct OpenAiImages {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiImages {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: endpoint_url(&config.image_base_url, "images/generations"),
            api_key,
        })
    }
}

// --- Images API response types ---

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: String,
}

#[async_trait::async_trait]
impl ImageGeneration for OpenAiImages {
    async fn generate(&self, request: &ImageGenerationRequest) -> Result<GeneratedIllustration, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: ImagesResponse = serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
            message: format!("failed to parse image generation response: {e}"),
        })?;

        let image = parsed.data.into_iter().next().ok_or_else(|| ProviderError::InvalidResponse {
            message: "no images in response".to_string(),
        })?;

        Ok(GeneratedIllustration { b64: image.b64_json })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use base64::Engine;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            chat_base_url: base_url.parse().unwrap(),
            image_base_url: base_url.parse().unwrap(),
            ..ProviderConfig::default()
        }
    }

    fn test_request() -> ImageGenerationRequest {
        ImageGenerationRequest {
            model: "dall-e-3".into(),
            prompt: "A simple illustration".into(),
            size: "512x512".into(),
            n: 1,
            response_format: "b64_json".into(),
        }
    }

    #[tokio::test]
    async fn returns_encoded_payload() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("fake image bytes");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(serde_json::json!({"response_format": "b64_json", "size": "512x512"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "created": 1677652288,
                "data": [{"b64_json": encoded}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiImages::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let image = client.generate(&test_request()).await.unwrap();
        assert_eq!(image.b64, encoded);
        assert_eq!(image.encoded_len(), encoded.len());
    }

    #[tokio::test]
    async fn content_policy_rejections_are_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": {
                        "message": "Your request was rejected by our safety system",
                        "code": "content_policy_violation"
                    }
                })),
            )
            .mount(&server)
            .await;

        let client = OpenAiImages::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ContentPolicy { .. }));
    }

    #[tokio::test]
    async fn empty_data_is_an_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "created": 1677652288,
                "data": []
            })))
            .mount(&server)
            .await;

        let client = OpenAiImages::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let err = client.generate(&test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }
}
