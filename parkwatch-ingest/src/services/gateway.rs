//! Recognition gateway client
//!
//! The plate reader is an opaque network oracle: image in, plate text +
//! bounding box + confidence out, or nothing. It sits behind the
//! `Recognizer` port so the pipeline can be exercised without network access.
//! Gateway failures are per-photo, never globally fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("parkwatch/", env!("CARGO_PKG_VERSION"));

/// Gateway client errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Pixel-space plate location on the (resized) recognition input
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BoundingBox {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

/// One recognized plate
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlateDetection {
    /// Raw recognized text, not yet canonicalized
    pub plate: String,
    /// Match confidence (0.0 to 1.0)
    pub score: f64,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

/// Gateway response body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlateReaderResponse {
    pub results: Vec<PlateDetection>,
}

/// Plate recognition port. One HTTP implementation; tests substitute fakes.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize the most confident plate in a base64-encoded JPEG.
    ///
    /// `Ok(None)` means "no plate detected", which is not an error.
    async fn recognize(&self, image_b64: &str)
        -> Result<Option<PlateDetection>, GatewayError>;
}

/// HTTP recognition gateway client
pub struct HttpRecognizer {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpRecognizer {
    pub fn new(url: String, api_key: String, timeout_secs: u64) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            api_key,
        })
    }

    /// Most confident detection, if any
    fn best_detection(response: PlateReaderResponse) -> Option<PlateDetection> {
        response
            .results
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(
        &self,
        image_b64: &str,
    ) -> Result<Option<PlateDetection>, GatewayError> {
        let params = [("upload", image_b64)];

        let response = self
            .http_client
            .post(&self.url)
            .header("Authorization", format!("Token {}", self.api_key))
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        // The gateway answers 200 or 201 on success
        if status != 200 && status != 201 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status, error_text));
        }

        let body: PlateReaderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let detection = Self::best_detection(body);

        if let Some(ref d) = detection {
            tracing::debug!(score = d.score, "Plate detected");
        } else {
            tracing::debug!("No plate detected");
        }

        Ok(detection)
    }
}
