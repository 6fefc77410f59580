//! Text classification through a chat-completion backend.
//!
//! The backend is injected ([`ChatBackend`]); this module only builds requests and pulls
//! the verdict out of whatever text the model sends back.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// System prompt plus one `TEXT:`-prefixed user turn, non-streaming.
pub fn build_request(model: &str, system_prompt: &str, text: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage { role: "system".into(), content: system_prompt.to_string() },
            ChatMessage { role: "user".into(), content: format!("TEXT:{text}") },
        ],
        stream: false,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
}

fn object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // flat objects only; models answer with a single level
    RE.get_or_init(|| Regex::new(r"(?s)\{[^{}]*\}").expect("valid object regex"))
}

/// Extract the first JSON object from free-form model output. The verdict may be keyed
/// `label` or `sentiment`; `confidence` may be a number or a numeric string.
pub fn parse_classification(raw: &str) -> Result<Classification> {
    let found = object_pattern()
        .find(raw)
        .ok_or_else(|| anyhow!("no JSON object in model output: {raw:?}"))?;
    let value: Value = serde_json::from_str(found.as_str())
        .with_context(|| format!("parse model verdict {:?}", found.as_str()))?;

    let label = value
        .get("label")
        .or_else(|| value.get("sentiment"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("model verdict has no label: {}", found.as_str()))?;
    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let reason = value.get("reason").and_then(Value::as_str).map(str::to_string);
    Ok(Classification { label, confidence, reason })
}

/// Sends one chat request and returns the assistant's text.
pub trait ChatBackend {
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

impl<F> ChatBackend for F
where
    F: Fn(&ChatRequest) -> Result<String>,
{
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self(request)
    }
}

pub trait Classifier {
    fn classify(&self, text: &str) -> Result<Classification>;
}

/// [`Classifier`] over a chat backend with a fixed model and system prompt.
pub struct ChatClassifier<B> {
    backend: B,
    model: String,
    system_prompt: String,
}

impl<B: ChatBackend> ChatClassifier<B> {
    pub fn new(backend: B, model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self { backend, model: model.into(), system_prompt: system_prompt.into() }
    }
}

impl<B: ChatBackend> Classifier for ChatClassifier<B> {
    fn classify(&self, text: &str) -> Result<Classification> {
        let request = build_request(&self.model, &self.system_prompt, text);
        let raw = self
            .backend
            .complete(&request)
            .with_context(|| format!("chat request to {}", self.model))?;
        let verdict = parse_classification(&raw)?;
        tracing::debug!(label = %verdict.label, confidence = ?verdict.confidence, "classified text");
        Ok(verdict)
    }
}
