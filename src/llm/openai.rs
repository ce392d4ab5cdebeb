//! OpenAI API client for chat completions and embeddings
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::pricing::{chat_cost, embedding_cost};
use super::{ChatCompletion, ChatMessage, ChatModel, ChatRequest, Embedder, Embedding};
use crate::error::BrainError;
use crate::models::Usage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: &str,
        embedding_model: String,
        embedding_dimensions: usize,
    ) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            embedding_model,
            embedding_dimensions,
        })
    }

    /// Handle to the shared connection pool
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    fn ensure_key(&self) -> crate::Result<()> {
        if self.api_key.is_empty() {
            return Err(BrainError::LlmError(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> crate::Result<R> {
        self.ensure_key()?;

        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI request to {} failed: {}", path, e);
                BrainError::LlmError(format!("OpenAI request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI error response ({}): {}", status, error_text);
            return Err(BrainError::LlmError(format!(
                "OpenAI returned {}: {}",
                status, error_text
            )));
        }

        response.json::<R>().await.map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            BrainError::LlmError(format!("OpenAI parse error: {}", e))
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> crate::Result<ChatCompletion> {
        let body = CompletionBody {
            model: &request.model,
            temperature: request.temperature,
            messages: &request.messages,
            response_format: request.response_schema.as_ref().map(|schema| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    schema: &schema.schema,
                    strict: true,
                },
            }),
        };

        debug!(model = %request.model, "Calling chat completion");

        let response: CompletionResponse = self.post("/chat/completions", &body).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BrainError::LlmError("Empty completion from OpenAI".to_string()))?;

        let usage = response.usage.unwrap_or_default();
        let cost = chat_cost(&request.model, usage.prompt_tokens, usage.completion_tokens);

        Ok(ChatCompletion {
            content,
            usage: Usage::new(usage.prompt_tokens, usage.completion_tokens, cost),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    async fn embed(&self, text: &str) -> crate::Result<Embedding> {
        let body = EmbeddingBody {
            model: &self.embedding_model,
            input: text,
            dimensions: self.embedding_dimensions,
        };

        let response: EmbeddingResponse = self.post("/embeddings", &body).await?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| {
                BrainError::EmbeddingError("Embedding response is missing data".to_string())
            })?;

        if vector.len() != self.embedding_dimensions {
            return Err(BrainError::DimensionMismatch {
                expected: self.embedding_dimensions,
                actual: vector.len(),
            });
        }

        let total_tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok(Embedding {
            vector,
            usage: Usage::embedding(
                total_tokens,
                embedding_cost(&self.embedding_model, total_tokens),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingBody<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ResponseSchema;

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            ChatMessage::system("Classify the intent"),
            ChatMessage::user("How do I reset the inverter?"),
        ];
        let schema = ResponseSchema {
            name: "intent_classifier".to_string(),
            schema: serde_json::json!({ "type": "object" }),
        };
        let body = CompletionBody {
            model: "gpt-4o-mini",
            temperature: 0.0,
            messages: &messages,
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    schema: &schema.schema,
                    strict: true,
                },
            }),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "How do I reset the inverter?");
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "intent_classifier");
    }

    #[test]
    fn test_plain_request_omits_response_format() {
        let messages = vec![ChatMessage::user("hi")];
        let body = CompletionBody {
            model: "gpt-4o",
            temperature: 0.2,
            messages: &messages,
            response_format: None,
        };

        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("response_format"));
    }

    #[test]
    fn test_completion_response_parsing() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "ok" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiClient::new(
            String::new(),
            "http://localhost:1",
            "text-embedding-3-small".to_string(),
            8,
        )
        .unwrap();

        let err = client.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
