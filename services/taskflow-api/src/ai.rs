//! Task decomposition through an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::AiConfig;

const SYSTEM_PROMPT: &str = "You break a task into 3 to 7 concrete subtasks. \
Reply with JSON only: {\"subtasks\":[{\"title\":string,\"description\":string,\"estimated_minutes\":integer}]}";

/// One step of a decomposed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
}

/// AI provider errors
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI provider is not configured")]
    NotConfigured,

    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI provider returned {0}")]
    Status(u16),

    #[error("unusable AI response: {0}")]
    Malformed(String),
}

/// Splits a task into subtasks
#[async_trait]
pub trait TaskDecomposer: Send + Sync {
    async fn decompose(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Vec<Subtask>, AiError>;
}

/// Canned breakdown served when the provider fails
pub fn fallback_breakdown(title: &str) -> Vec<Subtask> {
    vec![
        Subtask {
            title: format!("Plan: {title}"),
            description: "Outline the scope and the steps needed".to_string(),
            estimated_minutes: Some(15),
        },
        Subtask {
            title: format!("Do: {title}"),
            description: "Work through the outlined steps".to_string(),
            estimated_minutes: Some(60),
        },
        Subtask {
            title: format!("Review: {title}"),
            description: "Check the result and wrap up".to_string(),
            estimated_minutes: Some(15),
        },
    ]
}

/// Decomposer backed by a chat completions endpoint
pub struct HttpDecomposer {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl HttpDecomposer {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct SubtaskList {
    subtasks: Vec<Subtask>,
}

#[async_trait]
impl TaskDecomposer for HttpDecomposer {
    #[instrument(skip(self, description))]
    async fn decompose(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Vec<Subtask>, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::NotConfigured)?;

        let prompt = match description {
            Some(d) if !d.is_empty() => format!("Task: {title}\nDetails: {d}"),
            _ => format!("Task: {title}"),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: &prompt,
                    },
                ],
                response_format: ResponseFormat {
                    kind: "json_object",
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::Status(response.status().as_u16()));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::Malformed("empty completion".into()))?;

        let list: SubtaskList =
            serde_json::from_str(&content).map_err(|e| AiError::Malformed(e.to_string()))?;
        if list.subtasks.is_empty() {
            return Err(AiError::Malformed("no subtasks".into()));
        }

        debug!(count = list.subtasks.len(), "Task decomposed");
        Ok(list.subtasks)
    }
}
