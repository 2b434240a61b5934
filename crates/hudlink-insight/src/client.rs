//! HTTP implementation of the classification/advisory endpoints.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::{InsightClient, InsightError};

const CLASSIFY_PROMPT: &str = "Identify the game or application shown in this screenshot. \
    Reply with its short name only. If you cannot tell, reply exactly: unknown";

const ADVISORY_PROMPT_PREFIX: &str = "Give 3 short, practical tips for a player currently in: ";

const ADVISORY_PROMPT_SUFFIX: &str =
    ". Return STRICTLY a raw JSON array of strings, no markdown, no backticks.";

/// Vision-capable model endpoint reached over HTTPS.
pub struct HttpInsightClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl HttpInsightClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String, InsightError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Request(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InsightError::Malformed(e.to_string()))?;

        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| InsightError::Malformed("empty candidates".to_string()))
    }
}

#[async_trait]
impl InsightClient for HttpInsightClient {
    async fn classify_frame(&self, jpeg: &[u8]) -> Result<String, InsightError> {
        let parts = vec![
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: BASE64.encode(jpeg),
                }),
            },
            Part {
                text: Some(CLASSIFY_PROMPT.to_string()),
                inline_data: None,
            },
        ];
        let text = self.generate(parts).await?;
        Ok(text.trim().to_string())
    }

    async fn advisories_for(&self, label: &str) -> Result<Vec<String>, InsightError> {
        let prompt = format!("{ADVISORY_PROMPT_PREFIX}{label}{ADVISORY_PROMPT_SUFFIX}");
        let parts = vec![Part {
            text: Some(prompt),
            inline_data: None,
        }];
        let text = self.generate(parts).await?;
        parse_advisory_list(&text)
    }
}

/// Parse the advisory reply, tolerating markdown fences around the array.
fn parse_advisory_list(text: &str) -> Result<Vec<String>, InsightError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    serde_json::from_str::<Vec<String>>(cleaned)
        .map_err(|e| InsightError::Malformed(format!("{e}: {cleaned}")))
}
