//! OpenAI-compatible embeddings client.
//!
//! Sends `POST {base}/embeddings` with a single input and retries rate limits,
//! server errors and dropped connections with exponential backoff.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Embedder, Embedding};
use crate::error::EmbedError;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    base_backoff: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        }
    }

    #[cfg(test)]
    fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    async fn request(&self, text: &str) -> Result<Embedding, EmbedError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: [text],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(EmbedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or(EmbedError::Empty)
    }
}

impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        for attempt in 0..MAX_RETRIES {
            match self.request(text).await {
                Err(e) if e.is_transient() => {
                    let backoff = self.base_backoff * 2u32.pow(attempt);
                    warn!(
                        "Embedding request failed: {} (attempt {}/{}), backing off {:.1}s",
                        e,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
        self.request(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedder(server: &MockServer) -> OpenAiEmbedder {
        OpenAiEmbedder::new(Client::new(), "sk-test", "text-embedding-ada-002", &server.uri())
            .with_backoff(Duration::from_millis(1))
    }

    fn ok_body(embeddings: &[Vec<f32>]) -> serde_json::Value {
        let data: Vec<serde_json::Value> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| serde_json::json!({ "object": "embedding", "index": i, "embedding": e }))
            .collect();
        serde_json::json!({
            "object": "list",
            "data": data,
            "model": "text-embedding-ada-002",
            "usage": { "prompt_tokens": 8, "total_tokens": 8 },
        })
    }

    #[tokio::test]
    async fn posts_model_and_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-ada-002",
                "input": ["Title: Pilot"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(&[vec![0.5, -0.25, 1.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let v = embedder(&server).embed("Title: Pilot").await.unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn empty_data_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(&[])))
            .mount(&server)
            .await;

        let err = embedder(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::Empty));
    }

    #[tokio::test]
    async fn auth_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided.", "type": "invalid_request_error" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = embedder(&server).embed("x").await.unwrap_err();
        match err {
            EmbedError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&server)
            .await;

        let err = embedder(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::Api { status: 503, .. }));
    }
}
