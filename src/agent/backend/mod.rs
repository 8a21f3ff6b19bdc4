//! Backend abstraction for the Gemini API.
//!
//! This module provides:
//! - [`Backend`] trait covering the four operations the agent needs:
//!   content generation, token counting, cache creation and cache refresh
//! - [`RequestConfig`] — the reusable per-call configuration templates
//! - Wire types shared with the content model
//! - `GeminiClient`, the concrete reqwest implementation

mod types;

pub mod gemini;

pub use gemini::GeminiClient;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Function declaration advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-call request configuration.
///
/// The agent keeps two templates: one embedding the system instruction and
/// tool declarations directly, and one that carries a cached-content name
/// instead. Thinking budget is pinned to zero in both to keep latency and
/// cost deterministic.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub system_instruction: Option<String>,
    pub tools: Vec<ToolDeclaration>,
    pub cached_content: Option<String>,
    pub thinking_budget: u32,
}

/// Response from one backend call.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub content: Option<Content>,
    pub usage: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Function calls requested by the model, in declaration order.
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.content
            .as_ref()
            .map(|content| content.function_calls().into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Everything needed to create a context cache server-side.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub model: String,
    pub display_name: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub ttl: Duration,
}

/// LLM backend trait — the agent's only view of the model API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate the next model turn for the given content sequence.
    async fn generate(
        &self,
        contents: &[Content],
        config: &RequestConfig,
    ) -> Result<GenerateResponse>;

    /// Count tokens in a piece of text with the backend's tokenizer.
    async fn count_tokens(&self, text: &str) -> Result<usize>;

    /// Create a context cache; returns the opaque cache resource name.
    async fn create_cache(&self, request: &CacheRequest) -> Result<String>;

    /// Extend an existing cache's TTL.
    async fn refresh_cache(&self, name: &str, ttl: Duration) -> Result<()>;
}

/// Fake backend for testing.
#[cfg(test)]
pub(crate) struct FakeBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<GenerateResponse>>>,
    create_results: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
    refresh_results: std::sync::Mutex<std::collections::VecDeque<Result<()>>>,
    token_count: usize,
    pub generate_calls: std::sync::atomic::AtomicUsize,
    pub create_calls: std::sync::atomic::AtomicUsize,
    pub seen_configs: std::sync::Mutex<Vec<RequestConfig>>,
    pub seen_contents: std::sync::Mutex<Vec<Vec<Content>>>,
}

#[cfg(test)]
impl FakeBackend {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            create_results: std::sync::Mutex::new(std::collections::VecDeque::new()),
            refresh_results: std::sync::Mutex::new(std::collections::VecDeque::new()),
            token_count: 8,
            generate_calls: std::sync::atomic::AtomicUsize::new(0),
            create_calls: std::sync::atomic::AtomicUsize::new(0),
            seen_configs: std::sync::Mutex::new(Vec::new()),
            seen_contents: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Override the scripted token count for the system instruction.
    pub fn with_token_count(mut self, count: usize) -> Self {
        self.token_count = count;
        self
    }

    pub fn push_text(&self, text: &str) {
        self.push_response(Ok(GenerateResponse {
            content: Some(Content::new("model", vec![Part::text(text)])),
            usage: None,
        }));
    }

    pub fn push_calls(&self, calls: Vec<FunctionCall>) {
        let parts = calls
            .into_iter()
            .map(|call| Part {
                function_call: Some(call),
                ..Part::default()
            })
            .collect();
        self.push_response(Ok(GenerateResponse {
            content: Some(Content::new("model", parts)),
            usage: None,
        }));
    }

    pub fn push_response(&self, response: Result<GenerateResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_create(&self, result: Result<String>) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<()>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }
}

#[cfg(test)]
#[async_trait]
impl Backend for FakeBackend {
    async fn generate(
        &self,
        contents: &[Content],
        config: &RequestConfig,
    ) -> Result<GenerateResponse> {
        use std::sync::atomic::Ordering;

        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_configs.lock().unwrap().push(config.clone());
        self.seen_contents.lock().unwrap().push(contents.to_vec());

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::Error::Backend("no scripted response".to_string())))
    }

    async fn count_tokens(&self, _text: &str) -> Result<usize> {
        Ok(self.token_count)
    }

    async fn create_cache(&self, _request: &CacheRequest) -> Result<String> {
        use std::sync::atomic::Ordering;

        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::Error::Backend("no scripted cache creation".to_string())))
    }

    async fn refresh_cache(&self, _name: &str, _ttl: Duration) -> Result<()> {
        self.refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::Error::Backend("no scripted cache refresh".to_string())))
    }
}
