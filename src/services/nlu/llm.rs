use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::NluAdapter;
use crate::models::{Entity, Intent, IntentName, NluResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Which chat API a [`ChatClient`] talks to.
#[derive(Debug, Clone)]
pub enum ChatBackend {
    Ollama { url: String, model: String },
    Groq { api_key: String, model: String },
}

pub struct ChatClient {
    backend: ChatBackend,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(backend: ChatBackend) -> Self {
        Self {
            backend,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let mut chat_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];
        chat_messages.extend(messages.iter().map(|m| {
            json!({
                "role": m.role,
                "content": m.content,
            })
        }));

        match &self.backend {
            ChatBackend::Ollama { url, model } => {
                let body = json!({
                    "model": model,
                    "messages": chat_messages,
                    "stream": false,
                    "format": "json",
                });

                let data: serde_json::Value = self
                    .client
                    .post(format!("{url}/api/chat"))
                    .json(&body)
                    .send()
                    .await
                    .context("failed to call Ollama API")?
                    .json()
                    .await
                    .context("failed to parse Ollama response")?;

                data["message"]["content"]
                    .as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow::anyhow!("missing content in Ollama response"))
            }
            ChatBackend::Groq { api_key, model } => {
                let body = json!({
                    "model": model,
                    "messages": chat_messages,
                    "temperature": 0.0,
                });

                let resp = self
                    .client
                    .post("https://api.groq.com/openai/v1/chat/completions")
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await
                    .context("failed to call Groq API")?;

                let status = resp.status();
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .context("failed to parse Groq response")?;

                if !status.is_success() {
                    anyhow::bail!("Groq API error ({}): {}", status, data);
                }

                data["choices"][0]["message"]["content"]
                    .as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow::anyhow!("missing content in Groq response"))
            }
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You are the language understanding step of a phone receptionist. Classify the caller's utterance.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "intent": "greeting|appointment_scheduling|business_hours|service_inquiry|pricing|complaint|urgent_request|general_question|contact_request|goodbye",
  "confidence": 0.0,
  "entities": [
    {"type": "PERSON|DATE|TIME|PHONE_NUMBER|EMAIL|SERVICE|LOCATION|ORGANIZATION|MONEY", "text": "exact words from the utterance"}
  ]
}

Rules:
- "confidence" is your probability (0 to 1) that the intent is right
- Copy entity text verbatim from the utterance; use [] when there are none
- Dates and times stay as spoken ("tomorrow", "Monday", "2pm", "afternoon")
"#;

/// NLU backed by a chat-completion model.
pub struct LlmNlu {
    llm: Box<dyn LlmProvider>,
}

impl LlmNlu {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NluAdapter for LlmNlu {
    async fn classify(&self, text: &str) -> anyhow::Result<NluResult> {
        let messages = [ChatMessage {
            role: "user".to_string(),
            content: text.to_string(),
        }];
        let response = self.llm.chat(SYSTEM_PROMPT, &messages).await?;
        let parsed = parse_nlu_response(&response)?;

        Ok(NluResult {
            text: text.to_string(),
            intent: Intent {
                name: parsed.intent,
                confidence: parsed.confidence.clamp(0.0, 1.0),
            },
            entities: parsed.entities.into_iter().map(|e| locate(text, e)).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    intent: IntentName,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    entities: Vec<Entity>,
}

/// Fills in the span when the entity text occurs in the utterance.
fn locate(text: &str, mut entity: Entity) -> Entity {
    if let Some(start) = text.find(&entity.text) {
        entity.span.start = start;
        entity.span.end = start + entity.text.len();
    }
    entity
}

fn parse_nlu_response(response: &str) -> anyhow::Result<ModelOutput> {
    if let Ok(out) = serde_json::from_str::<ModelOutput>(response) {
        return Ok(out);
    }

    // Markdown fences
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(out) = serde_json::from_str::<ModelOutput>(cleaned) {
        return Ok(out);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(out) = serde_json::from_str::<ModelOutput>(&cleaned[start..=end]) {
                return Ok(out);
            }
        }
    }

    anyhow::bail!("model reply is not NLU JSON: {}", truncate(response, 120))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
