//! Upstream LLM gateway: the [`ChatGateway`] seam and its OpenRouter client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{GatewayError, ServiceError};
use crate::types::{ImageData, MessageRole, ModelInfo};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Free models offered when the upstream catalogue is unavailable.
pub const FALLBACK_MODELS: [&str; 8] = [
    "meta-llama/llama-3.2-3b-instruct:free",
    "meta-llama/llama-3.2-1b-instruct:free",
    "google/gemma-2-9b-it:free",
    "microsoft/phi-3-mini-128k-instruct:free",
    "microsoft/phi-3-medium-128k-instruct:free",
    "huggingfaceh4/zephyr-7b-beta:free",
    "openchat/openchat-7b:free",
    "qwen/qwen-2-7b-instruct:free",
];

/// Models known to accept image input.
pub const MULTIMODAL_MODELS: [&str; 1] = ["google/gemma-2-9b-it:free"];

/// One conversation turn sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Token accounting reported by the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

/// A model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Anything that can turn a conversation into a model reply.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Sends the conversation and returns the first completion choice.
    async fn send(
        &self,
        messages: &[GatewayMessage],
        model: &str,
        image: Option<&ImageData>,
    ) -> Result<Completion, GatewayError>;

    /// Lists free models. Never fails: falls back to [`FALLBACK_MODELS`].
    async fn list_models(&self) -> Vec<ModelInfo>;
}

/// Settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_timeout: Duration,
    pub models_timeout: Duration,
    /// Sent as `X-Title`.
    pub app_name: String,
    /// Sent as `HTTP-Referer`.
    pub referer: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_timeout: Duration::from_secs(120),
            models_timeout: Duration::from_secs(30),
            app_name: "chatbridge".to_string(),
            referer: "http://localhost:8000".to_string(),
        }
    }
}

/// OpenRouter chat-completions client.
pub struct OpenRouterClient {
    client: Client,
    chat_url: Url,
    models_url: Url,
    chat_timeout: Duration,
    models_timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServiceError> {
        let invalid = |what: &str, err: &dyn std::fmt::Display| {
            ServiceError::Internal(format!("invalid gateway {what}: {err}"))
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| invalid("api key", &e))?,
        );
        headers.insert(
            HeaderName::from_static("http-referer"),
            HeaderValue::from_str(&config.referer).map_err(|e| invalid("referer", &e))?,
        );
        headers.insert(
            HeaderName::from_static("x-title"),
            HeaderValue::from_str(&config.app_name).map_err(|e| invalid("app name", &e))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| invalid("client", &e))?;

        let mut base_url = Url::parse(&config.base_url).map_err(|e| invalid("base url", &e))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let chat_url = base_url
            .join("chat/completions")
            .map_err(|e| invalid("base url", &e))?;
        let models_url = base_url.join("models").map_err(|e| invalid("base url", &e))?;

        Ok(Self {
            client,
            chat_url,
            models_url,
            chat_timeout: config.chat_timeout,
            models_timeout: config.models_timeout,
        })
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let response = self
            .client
            .get(self.models_url.clone())
            .timeout(self.models_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: format!("model listing returned {status}"),
            });
        }
        let body: Value = response.json().await?;
        let data = body
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(free_models(data))
    }
}

#[async_trait]
impl ChatGateway for OpenRouterClient {
    async fn send(
        &self,
        messages: &[GatewayMessage],
        model: &str,
        image: Option<&ImageData>,
    ) -> Result<Completion, GatewayError> {
        let mut wire: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        if let Some(image) = image {
            attach_image(&mut wire, image);
        }
        let payload = json!({ "model": model, "messages": wire });

        let response = self
            .client
            .post(self.chat_url.clone())
            .timeout(self.chat_timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionBody = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(GatewayError::EmptyResponse)?;
        let content = choice.message.and_then(|m| m.content).unwrap_or_default();

        Ok(Completion {
            content,
            usage: body.usage,
        })
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                tracing::info!("no free models upstream, using fallback list");
                fallback_models()
            }
            Err(err) => {
                tracing::warn!(error = %err, "model listing failed, using fallback list");
                fallback_models()
            }
        }
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Rewrites the trailing user turn as a text + image part list.
fn attach_image(messages: &mut [Value], image: &ImageData) {
    let Some(last) = messages.last_mut() else {
        return;
    };
    if last.get("role").and_then(Value::as_str) != Some("user") {
        return;
    }
    let text = last
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    *last = json!({
        "role": "user",
        "content": [
            { "type": "text", "text": text },
            {
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.media_type, image.base64_data)
                }
            }
        ]
    });
}

/// A price field may be a decimal string or a number. Missing means paid.
fn price(pricing: Option<&Value>, key: &str) -> f64 {
    match pricing.and_then(|p| p.get(key)) {
        Some(Value::String(s)) if !s.is_empty() => s.parse().unwrap_or(1.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(1.0),
        _ => 1.0,
    }
}

fn supports_images(id: &str, model: &Value) -> bool {
    let architecture = model.get("architecture");
    MULTIMODAL_MODELS.contains(&id)
        || id.to_lowercase().contains("vision")
        || architecture
            .and_then(|a| a.get("modality"))
            .and_then(Value::as_str)
            == Some("multimodal")
        || architecture
            .and_then(|a| a.get("input_modalities"))
            .and_then(Value::as_array)
            .is_some_and(|m| m.iter().any(|v| v.as_str() == Some("image")))
}

/// Keeps free models from an upstream catalogue.
fn free_models(data: &[Value]) -> Vec<ModelInfo> {
    data.iter()
        .filter_map(|model| {
            let id = model.get("id").and_then(Value::as_str).unwrap_or_default();
            let pricing = model.get("pricing");
            let zero_priced = price(pricing, "prompt") == 0.0 && price(pricing, "completion") == 0.0;
            let free = zero_priced || id.contains(":free") || id.contains("/free");
            if !free {
                return None;
            }
            Some(ModelInfo {
                id: id.to_string(),
                name: model
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(id)
                    .to_string(),
                description: model
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                context_length: model.get("context_length").and_then(Value::as_u64),
                supports_images: supports_images(id, model),
                pricing: pricing.cloned(),
            })
        })
        .collect()
}

/// The static model list, named from each id.
pub fn fallback_models() -> Vec<ModelInfo> {
    FALLBACK_MODELS
        .iter()
        .map(|id| ModelInfo {
            id: (*id).to_string(),
            name: display_name(id),
            description: None,
            context_length: None,
            supports_images: MULTIMODAL_MODELS.contains(id),
            pricing: None,
        })
        .collect()
}

/// `"meta-llama/llama-3.2-3b-instruct:free"` → `"Llama 3.2 3B Instruct"`.
fn display_name(id: &str) -> String {
    let tail = id.rsplit('/').next().unwrap_or(id);
    title_case(&tail.replace(":free", "").replace('-', " "))
}

/// Upper-cases the first letter of every run of letters, lower-cases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageData {
        ImageData {
            base64_data: "aGVsbG8=".to_string(),
            media_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn display_names_follow_title_case() {
        assert_eq!(
            display_name("meta-llama/llama-3.2-3b-instruct:free"),
            "Llama 3.2 3B Instruct"
        );
        assert_eq!(display_name("google/gemma-2-9b-it:free"), "Gemma 2 9B It");
        assert_eq!(
            display_name("microsoft/phi-3-mini-128k-instruct:free"),
            "Phi 3 Mini 128K Instruct"
        );
        assert_eq!(title_case("HELLO wORLD"), "Hello World");
    }

    #[test]
    fn fallback_list_marks_multimodal_models() {
        let models = fallback_models();
        assert_eq!(models.len(), FALLBACK_MODELS.len());
        let gemma = models.iter().find(|m| m.id == "google/gemma-2-9b-it:free").unwrap();
        assert!(gemma.supports_images);
        assert_eq!(models.iter().filter(|m| m.supports_images).count(), 1);
    }

    #[test]
    fn free_filter_accepts_zero_price_and_free_suffix() {
        let data = vec![
            json!({"id": "a/zero", "name": "Zero", "pricing": {"prompt": "0", "completion": "0"}}),
            json!({"id": "b/paid", "pricing": {"prompt": "0.000001", "completion": "0.000002"}}),
            json!({"id": "c/tagged:free", "pricing": {"prompt": "0.1", "completion": "0.1"}}),
            json!({"id": "d/no-pricing"}),
            json!({"id": "e/half", "pricing": {"prompt": 0, "completion": "0.5"}}),
        ];
        let ids: Vec<String> = free_models(&data).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["a/zero", "c/tagged:free"]);
    }

    #[test]
    fn free_filter_detects_image_support() {
        let data = vec![
            json!({"id": "x/llava-vision:free"}),
            json!({"id": "x/multi:free", "architecture": {"modality": "multimodal"}}),
            json!({"id": "x/inputs:free", "architecture": {"input_modalities": ["text", "image"]}}),
            json!({"id": "x/text:free", "architecture": {"modality": "text->text"}}),
        ];
        let flags: Vec<bool> = free_models(&data).iter().map(|m| m.supports_images).collect();
        assert_eq!(flags, [true, true, true, false]);
    }

    #[test]
    fn free_filter_copies_metadata() {
        let data = vec![json!({
            "id": "m/one:free",
            "description": "A model",
            "context_length": 8192,
            "pricing": {"prompt": "0", "completion": "0"}
        })];
        let model = &free_models(&data)[0];
        assert_eq!(model.name, "m/one:free");
        assert_eq!(model.description.as_deref(), Some("A model"));
        assert_eq!(model.context_length, Some(8192));
        assert!(model.pricing.is_some());
    }

    #[test]
    fn image_rewrites_trailing_user_message() {
        let mut messages = vec![
            json!({"role": "assistant", "content": "hi"}),
            json!({"role": "user", "content": "what is this?"}),
        ];
        attach_image(&mut messages, &image());

        let parts = messages[1]["content"].as_array().unwrap();
        assert_eq!(parts[0], json!({"type": "text", "text": "what is this?"}));
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/jpeg;base64,aGVsbG8="
        );
        assert_eq!(messages[0]["content"], "hi");
    }

    #[test]
    fn image_ignored_when_last_turn_is_not_user() {
        let mut messages = vec![json!({"role": "assistant", "content": "hi"})];
        attach_image(&mut messages, &image());
        assert_eq!(messages[0]["content"], "hi");

        let mut empty: Vec<Value> = Vec::new();
        attach_image(&mut empty, &image());
        assert!(empty.is_empty());
    }

    #[test]
    fn client_rejects_bad_base_url() {
        let config = GatewayConfig {
            base_url: "not a url".to_string(),
            ..GatewayConfig::default()
        };
        assert!(OpenRouterClient::new(&config).is_err());
    }

    #[test]
    fn client_joins_endpoints_under_base_path() {
        let client = OpenRouterClient::new(&GatewayConfig::default()).unwrap();
        assert_eq!(
            client.chat_url.as_str(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(client.models_url.as_str(), "https://openrouter.ai/api/v1/models");
    }
}
