use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::config::RendererConfig;
use crate::error::EngineError;
use crate::kernel::pipeline::RenderContext;

/// Turns a decided context into reply text. Has no say over difficulty,
/// strategy or style; it only phrases what was decided.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, context: &RenderContext) -> Result<String, EngineError>;
}

const SYSTEM_PROMPT: &str = "You are a calm, patient learning companion for a young child. \
    Speak in short, simple sentences. Give one instruction at a time. Never mention moods, \
    scores or difficulty levels.";

/// Flatten a context into a single completion prompt.
pub fn compose_prompt(context: &RenderContext) -> String {
    let strategy = &context.strategy;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "System: {}", SYSTEM_PROMPT);
    let _ = writeln!(
        prompt,
        "Rules: at most {} sentence(s). Instruction depth {}/3. Topic: {} at level {}/5.",
        strategy.response_length_limit, strategy.instruction_depth, context.concept, context.difficulty
    );
    if strategy.task_difficulty_modifier < 0 {
        let _ = writeln!(prompt, "Make the next task a little easier than the last one.");
    }
    if !strategy.prompt_addition.is_empty() {
        let _ = writeln!(prompt, "Guidance: {}", strategy.prompt_addition);
    }
    let _ = writeln!(prompt, "Encouragement: {}", context.style.prompt());

    if let Some(summary) = &context.summary {
        let _ = writeln!(prompt, "{}", summary);
    }
    if !context.preferences.is_empty() {
        let likes: Vec<String> = context
            .preferences
            .iter()
            .map(|p| format!("{} ({:?})", p.topic, p.sentiment).to_lowercase())
            .collect();
        let _ = writeln!(prompt, "Child preferences: {}", likes.join(", "));
    }
    for entry in &context.recent {
        let _ = writeln!(prompt, "User: {}\nAssistant: {}", entry.user, entry.reply);
    }

    let _ = write!(prompt, "User: {}\nAssistant:", context.user_input);
    prompt
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: usize,
    temperature: f32,
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Talks to a local llama-server `/completion` endpoint.
#[derive(Clone)]
pub struct LlamaRenderer {
    client: Client,
    base_url: String,
    n_predict: usize,
    temperature: f32,
}

impl LlamaRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms)) // network-level ceiling
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            n_predict: config.n_predict,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Renderer for LlamaRenderer {
    async fn render(&self, context: &RenderContext) -> Result<String, EngineError> {
        let request_body = CompletionRequest {
            prompt: compose_prompt(context),
            stream: false,
            n_predict: self.n_predict,
            temperature: self.temperature,
            stop: vec!["User:".to_string(), "System:".to_string()],
        };

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EngineError::Render(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Render(format!("server status {}", response.status())));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Render(e.to_string()))?;
        Ok(body.content.trim().to_string())
    }
}

/// Offline renderer: fixed phrasing picked from the strategy and style.
/// Used when no language model is reachable.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer;

#[async_trait]
impl Renderer for TemplateRenderer {
    async fn render(&self, context: &RenderContext) -> Result<String, EngineError> {
        let opener = match context.strategy.reassurance_level {
            0 => "Okay.",
            1 => "I am here with you.",
            2 => "You are doing well.",
            _ => "It is okay. You are safe.",
        };
        let step = if context.strategy.task_difficulty_modifier < 0 {
            format!("Let us try an easier {} one.", context.concept)
        } else {
            format!("Let us keep going with {}.", context.concept)
        };
        Ok(format!("{} {}", opener, step))
    }
}
