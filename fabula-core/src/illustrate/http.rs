//! HTTP illustration client.
//!
//! Wire contract: `POST {endpoint}` with body `{"prompt": …, "sceneId": …}`
//! and optional bearer auth; the service replies `{"url": …}`. Latency and
//! image content are the service's responsibility.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Illustrator;
use crate::error::{FabulaError, Result};
use crate::scene::{ImageRef, SceneId};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpIllustratorConfig {
    /// Full URL of the generation endpoint.
    pub endpoint: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Per-request timeout. Default: 120 s (image generation is slow).
    pub timeout: Duration,
}

impl HttpIllustratorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IllustrationRequest<'a> {
    prompt: &'a str,
    scene_id: String,
}

#[derive(Deserialize)]
struct IllustrationResponse {
    url: String,
}

/// Illustrator backed by a remote generation service.
#[derive(Debug, Clone)]
pub struct HttpIllustrator {
    config: HttpIllustratorConfig,
    client: Client,
}

impl HttpIllustrator {
    pub fn new(config: HttpIllustratorConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Illustrator for HttpIllustrator {
    async fn request(&self, scene: SceneId, text: &str) -> Result<ImageRef> {
        debug!(scene = %scene, "submitting illustration request");

        let body = IllustrationRequest {
            prompt: text,
            scene_id: scene.to_string(),
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(FabulaError::Illustration(format!(
                "service returned {status}: {detail}"
            )));
        }

        let parsed: IllustrationResponse = response.json().await?;
        Ok(ImageRef(parsed.url))
    }
}
