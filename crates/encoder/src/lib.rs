//! HTTP client for the external embedding service.
//!
//! The encoder is a black box that turns an image payload or a text
//! string into a fixed-length vector. One [`Encoder`] is constructed at
//! process start and passed by reference to every consumer; its vector
//! dimensionality is discovered once via [`Encoder::info`] and threaded
//! through index provisioning, never hard-coded.
//!
//! Retry policy: 429 and 5xx responses and transport errors are retried
//! with exponential backoff; any other 4xx fails immediately. For image
//! payloads a 4xx means the bytes could not be decoded and is classified
//! as a payload error, which callers log and re-attempt next round.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;

use snapvault_shared::{EncoderConfig, Result, SnapvaultError};

/// Capability report from the encoder service, fetched once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderInfo {
    /// Model identifier the service is running.
    pub model: String,
    /// Embedding vector length.
    pub dims: usize,
}

/// Client for the embedding service.
#[derive(Debug, Clone)]
pub struct Encoder {
    client: reqwest::Client,
    endpoint: String,
    max_retries: usize,
}

impl Encoder {
    /// Build a client from configuration.
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(SnapvaultError::config(format!(
                "encoder.endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SnapvaultError::Encode(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            max_retries: config.max_retries.max(1),
        })
    }

    /// Fetch the service's model name and vector dimensionality.
    pub async fn info(&self) -> Result<EncoderInfo> {
        let url = format!("{}/info", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SnapvaultError::Encode(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapvaultError::Encode(format!("{url}: HTTP {status}")));
        }

        let info: EncoderInfo = response
            .json()
            .await
            .map_err(|e| SnapvaultError::Encode(format!("malformed info response: {e}")))?;
        debug!(model = %info.model, dims = info.dims, "encoder capabilities");
        Ok(info)
    }

    /// Embed raw image bytes. A 4xx response means the payload is not a
    /// decodable image and surfaces as [`SnapvaultError::Payload`].
    pub async fn encode_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "modality": "image",
            "input": BASE64.encode(bytes),
        });
        self.embed(body, true).await
    }

    /// Embed a text query.
    pub async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "modality": "text",
            "input": text,
        });
        self.embed(body, false).await
    }

    async fn embed(&self, body: serde_json::Value, reject_is_payload: bool) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.endpoint);
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            let response = self.client.post(&url).json(&body).send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                            SnapvaultError::Encode(format!("malformed embedding response: {e}"))
                        })?;
                        return Ok(parsed.vector);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(SnapvaultError::Encode(format!("{url}: HTTP {status}")));
                        continue;
                    }

                    // Client error: the input itself is the problem.
                    let detail = response.text().await.unwrap_or_default();
                    return Err(if reject_is_payload {
                        SnapvaultError::payload(format!("encoder rejected payload: {detail}"))
                    } else {
                        SnapvaultError::Encode(format!("{url}: HTTP {status}: {detail}"))
                    });
                }
                Err(e) => {
                    last_err = Some(SnapvaultError::Encode(format!("{url}: {e}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| SnapvaultError::Encode("embedding failed after retries".into())))
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(200 * (1 << capped))
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn encoder_for(server: &MockServer) -> Encoder {
        Encoder::new(&EncoderConfig {
            endpoint: server.uri(),
            request_timeout_secs: 5,
            max_retries: 3,
        })
        .expect("build encoder")
    }

    #[test]
    fn non_http_endpoint_is_a_config_error() {
        let err = Encoder::new(&EncoderConfig {
            endpoint: "unix:///tmp/encoder.sock".into(),
            request_timeout_secs: 5,
            max_retries: 3,
        })
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn info_reports_runtime_dims() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "clip-vit-l14",
                "dims": 768
            })))
            .mount(&server)
            .await;

        let info = encoder_for(&server).info().await.expect("info");
        assert_eq!(info.model, "clip-vit-l14");
        assert_eq!(info.dims, 768);
    }

    #[tokio::test]
    async fn encode_image_ships_base64_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "modality": "image",
                "input": BASE64.encode(b"jpeg bytes"),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [0.25, -0.5, 1.0]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vector = encoder_for(&server)
            .encode_image(b"jpeg bytes")
            .await
            .expect("encode");
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn encode_text_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "modality": "text",
                "input": "a red vintage car",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [0.1, 0.2]
            })))
            .mount(&server)
            .await;

        let vector = encoder_for(&server)
            .encode_text("a red vintage car")
            .await
            .expect("encode");
        assert_eq!(vector.len(), 2);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [1.0]
            })))
            .mount(&server)
            .await;

        let vector = encoder_for(&server).encode_text("q").await.expect("encode");
        assert_eq!(vector, vec![1.0]);
    }

    #[tokio::test]
    async fn undecodable_image_fails_fast_as_payload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("cannot identify image data"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = encoder_for(&server)
            .encode_image(b"definitely not a jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapvaultError::Payload { .. }));
        assert!(!err.is_fatal());
    }
}
