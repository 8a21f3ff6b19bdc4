//! Agent module — orchestration core.
//!
//! This module contains:
//! - The content model (messages and parts)
//! - The backend trait and Gemini implementation
//! - The cache lifecycle manager
//! - [`Agent`] itself: the tool-calling loop
//!
//! One `generate` call is a full turn: the model is called, any tool
//! invocations it declares are executed in parallel and fed back, and the
//! loop repeats until the model answers without asking for tools.

mod cache;
mod content;

pub mod backend;

pub use backend::{Backend, GeminiClient, RequestConfig};
pub use content::{AssistantMessage, Message, Part, UserMessage, VideoMetadata};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::Error;
use crate::tools::{Tool, ToolRegistry};
use crate::Result;

use backend::{CacheRequest, Content, FunctionCall, Part as WirePart};
use cache::CacheHandle;

/// The orchestration core: turns a conversation history plus a new user
/// message into a final assistant reply, possibly via several backend
/// calls mediated by tool invocations.
pub struct Agent {
    backend: Arc<dyn Backend>,
    registry: ToolRegistry,
    model: String,
    /// Template used while no cache is active: instruction and tool
    /// declarations embedded in every call.
    plain_config: RequestConfig,
    /// Template used while a cache is active: the handle is substituted
    /// per call.
    cached_template: RequestConfig,
    cache_state: watch::Receiver<Option<CacheHandle>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Connect to the Gemini API and construct an agent.
    pub async fn new(config: AgentConfig, tools: Vec<Box<dyn Tool>>) -> Result<Self> {
        let config = config.validated()?;
        let backend: Arc<dyn Backend> =
            Arc::new(GeminiClient::new(&config.api_key, &config.model));
        Self::with_backend(backend, config, tools).await
    }

    /// Construct an agent over an already-connected backend.
    pub async fn with_backend(
        backend: Arc<dyn Backend>,
        config: AgentConfig,
        tools: Vec<Box<dyn Tool>>,
    ) -> Result<Self> {
        let config = config.validated()?;

        let instruction_tokens = backend.count_tokens(&config.system_instruction).await?;
        let registry = ToolRegistry::new(tools)?;
        let declarations = registry.declarations();

        let plain_config = RequestConfig {
            system_instruction: Some(config.system_instruction.clone()),
            tools: declarations.clone(),
            cached_content: None,
            thinking_budget: 0,
        };
        let cached_template = RequestConfig {
            system_instruction: None,
            tools: Vec::new(),
            cached_content: None,
            thinking_budget: 0,
        };

        let (state_tx, cache_state) = watch::channel(None);
        let cancel = CancellationToken::new();

        if instruction_tokens >= config.min_cache_tokens {
            info!(
                "System instruction is {} tokens; starting cache refresher",
                instruction_tokens
            );
            let request = CacheRequest {
                model: config.model.clone(),
                display_name: config.cache_display_name.clone(),
                system_instruction: config.system_instruction.clone(),
                tools: declarations,
                ttl: config.cache_ttl,
            };
            tokio::spawn(cache::run(
                backend.clone(),
                state_tx,
                request,
                cancel.clone(),
            ));
        } else {
            debug!(
                "System instruction is {} tokens (below {}); caching skipped",
                instruction_tokens, config.min_cache_tokens
            );
        }

        Ok(Self {
            backend,
            registry,
            model: config.model,
            plain_config,
            cached_template,
            cache_state,
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    /// Run one full turn and return the final assistant message.
    ///
    /// Tool failures are converted into error payloads and handed back to
    /// the model; only backend failures abort the turn.
    pub async fn generate(
        &self,
        history: &[Message],
        message: &UserMessage,
    ) -> Result<AssistantMessage> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::AgentClosed);
        }

        let mut contents = content::build_contents(history, message);
        let history_len = contents.len();

        // One read per turn: the turn stays internally consistent even if
        // the refresher swaps the handle mid-loop.
        let request_config = match self.cache_state.borrow().clone() {
            Some(handle) => {
                debug!("Using context cache {}", handle);
                RequestConfig {
                    cached_content: Some(handle.to_string()),
                    ..self.cached_template.clone()
                }
            }
            None => self.plain_config.clone(),
        };

        loop {
            let response = self.backend.generate(&contents, &request_config).await?;

            if let Some(ref usage) = response.usage {
                debug!(
                    "Backend call used {} prompt / {} response tokens",
                    usage.prompt_token_count.unwrap_or(0),
                    usage.candidates_token_count.unwrap_or(0)
                );
            }

            let calls = response.function_calls();
            if let Some(content) = response.content {
                contents.push(content);
            }

            if calls.is_empty() {
                break;
            }

            debug!("Model requested {} tool call(s)", calls.len());
            let results = join_all(calls.iter().map(|call| self.dispatch(call))).await;

            // Responses are appended in declaration order, regardless of
            // completion order.
            let parts = calls
                .iter()
                .zip(results)
                .map(|(call, response)| WirePart::function_response(call, response))
                .collect();
            contents.push(Content::new("user", parts));
        }

        content::extract_reply(&self.model, &contents[history_len..])
    }

    /// Resolve and invoke one tool call. Failures become error payloads
    /// for the model rather than aborting the turn.
    async fn dispatch(&self, call: &FunctionCall) -> Map<String, Value> {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!("Model requested unknown tool: {}", call.name);
            return error_payload(Error::UnknownTool(call.name.clone()).to_string());
        };

        match tool.invoke(call.args.clone()).await {
            Ok(result) => result,
            Err(err) => {
                debug!("Tool {} failed: {}", call.name, err);
                error_payload(err.to_string())
            }
        }
    }

    /// Stop the cache refresher and refuse further `generate` calls.
    ///
    /// Idempotent; does not wait for in-flight turns.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn error_payload(message: String) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("error".to_string(), Value::String(message));
    payload
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::tools::DummyTool;

    use super::backend::FakeBackend;
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            api_key: "test-key".to_string(),
            system_instruction: "You are a helpful assistant.".to_string(),
            ..AgentConfig::default()
        }
    }

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: None,
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    async fn agent(backend: Arc<FakeBackend>, tools: Vec<Box<dyn Tool>>) -> Agent {
        Agent::with_backend(backend, config(), tools).await.unwrap()
    }

    #[tokio::test]
    async fn test_generate_without_tool_calls_terminates_after_one_call() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_text("Hello, human!");
        let agent = agent(backend.clone(), vec![]).await;

        let reply = agent
            .generate(&[], &UserMessage::text("Hi there"))
            .await
            .unwrap();

        assert_eq!(reply.parts, vec![Part::text("Hello, human!")]);
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 1);
    }

    /// Weather tool matching the end-to-end scenario: one invocation, one
    /// follow-up call, final text reply.
    struct WeatherTool {
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for WeatherTool {
        fn name(&self) -> &str {
            "get_weather"
        }

        fn description(&self) -> &str {
            "Look up current weather for a location"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            })
        }

        fn response_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "condition": {"type": "string"},
                    "tempC": {"type": "number"}
                },
                "required": ["condition", "tempC"]
            })
        }

        async fn execute(&self, args: Map<String, Value>) -> Result<Map<String, Value>> {
            assert_eq!(args["location"], "Tokyo");
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"condition": "Sunny", "tempC": 22})
                .as_object()
                .unwrap()
                .clone())
        }
    }

    #[tokio::test]
    async fn test_generate_with_one_tool_call_makes_two_backend_calls() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_calls(vec![call("get_weather", json!({"location": "Tokyo"}))]);
        backend.push_text("It's sunny in Tokyo, 22°C.");

        let executions = Arc::new(AtomicUsize::new(0));
        let agent = agent(
            backend.clone(),
            vec![Box::new(WeatherTool {
                executions: executions.clone(),
            })],
        )
        .await;

        let history = vec![Message::User(UserMessage::text(
            "What's the weather in Tokyo?",
        ))];
        let reply = agent
            .generate(&history, &UserMessage::text("What's the weather in Tokyo?"))
            .await
            .unwrap();

        assert_eq!(reply.parts, vec![Part::text("It's sunny in Tokyo, 22°C.")]);
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        // The function response was fed back on the second call.
        let second_call_contents = &backend.seen_contents.lock().unwrap()[1];
        let response_part = &second_call_contents.last().unwrap().parts[0];
        let function_response = response_part.function_response.as_ref().unwrap();
        assert_eq!(function_response.name, "get_weather");
        assert_eq!(function_response.response["condition"], "Sunny");
    }

    /// Tool that waits on a shared barrier before finishing, so the test
    /// only passes when all invocations of a turn run concurrently.
    struct FanOutTool {
        name: String,
        barrier: Arc<tokio::sync::Barrier>,
        delay_ms: u64,
    }

    #[async_trait]
    impl Tool for FanOutTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Fan-out test tool"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn response_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Map<String, Value>> {
            self.barrier.wait().await;
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(json!({"value": self.name}).as_object().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_parallel_fan_out_preserves_declaration_order() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_calls(vec![
            call("alpha", json!({})),
            call("beta", json!({})),
            call("gamma", json!({})),
        ]);
        backend.push_text("All done.");

        // Completion order is skewed against declaration order.
        let barrier = Arc::new(tokio::sync::Barrier::new(3));
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(FanOutTool {
                name: "alpha".to_string(),
                barrier: barrier.clone(),
                delay_ms: 40,
            }),
            Box::new(FanOutTool {
                name: "beta".to_string(),
                barrier: barrier.clone(),
                delay_ms: 20,
            }),
            Box::new(FanOutTool {
                name: "gamma".to_string(),
                barrier,
                delay_ms: 0,
            }),
        ];
        let agent = agent(backend.clone(), tools).await;

        agent
            .generate(&[], &UserMessage::text("fan out"))
            .await
            .unwrap();

        let second_call_contents = &backend.seen_contents.lock().unwrap()[1];
        let names: Vec<String> = second_call_contents
            .last()
            .unwrap()
            .parts
            .iter()
            .map(|part| part.function_response.as_ref().unwrap().name.clone())
            .collect();
        assert_eq!(names, ["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_payload() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_calls(vec![call("imaginary_tool", json!({}))]);
        backend.push_text("Sorry, I can't do that.");
        let agent = agent(backend.clone(), vec![]).await;

        let reply = agent
            .generate(&[], &UserMessage::text("do the thing"))
            .await
            .unwrap();
        assert_eq!(reply.parts.len(), 1);

        let second_call_contents = &backend.seen_contents.lock().unwrap()[1];
        let response = second_call_contents.last().unwrap().parts[0]
            .function_response
            .as_ref()
            .unwrap();
        let error = response.response["error"].as_str().unwrap();
        assert!(error.contains("Unknown tool: imaginary_tool"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_fed_back_without_executing() {
        let backend = Arc::new(FakeBackend::new());
        // Missing the required "location" field.
        backend.push_calls(vec![call("get_weather", json!({}))]);
        backend.push_text("I need a location.");

        let executions = Arc::new(AtomicUsize::new(0));
        let agent = agent(
            backend.clone(),
            vec![Box::new(WeatherTool {
                executions: executions.clone(),
            })],
        )
        .await;

        let reply = agent
            .generate(&[], &UserMessage::text("weather please"))
            .await
            .unwrap();
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(executions.load(Ordering::SeqCst), 0);

        let second_call_contents = &backend.seen_contents.lock().unwrap()[1];
        let response = second_call_contents.last().unwrap().parts[0]
            .function_response
            .as_ref()
            .unwrap();
        assert!(response.response["error"].as_str().unwrap().contains("location"));
    }

    #[tokio::test]
    async fn test_backend_error_aborts_the_turn() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(Err(Error::Backend("503".to_string())));
        let agent = agent(backend, vec![]).await;

        let err = agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test]
    async fn test_empty_model_response_is_rejected() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(Ok(backend::GenerateResponse {
            content: Some(Content::new("model", vec![])),
            usage: None,
        }));
        let agent = agent(backend, vec![]).await;

        let err = agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));
    }

    #[tokio::test]
    async fn test_closed_agent_fails_fast() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_text("never seen");
        let agent = agent(backend.clone(), vec![]).await;

        agent.close();
        agent.close(); // idempotent

        let err = agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AgentClosed));
        assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_construction_fails_on_blank_config() {
        let backend = Arc::new(FakeBackend::new());
        let bad = AgentConfig {
            api_key: "  ".to_string(),
            ..config()
        };

        let err = Agent::with_backend(backend, bad, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_construction_fails_on_broken_tool_schema() {
        struct BrokenTool;

        #[async_trait]
        impl Tool for BrokenTool {
            fn name(&self) -> &str {
                "broken"
            }

            fn description(&self) -> &str {
                "Tool with an invalid schema"
            }

            fn parameters_schema(&self) -> Value {
                json!({"type": "not-a-type"})
            }

            fn response_schema(&self) -> Value {
                json!({"type": "object"})
            }

            async fn execute(&self, _args: Map<String, Value>) -> Result<Map<String, Value>> {
                Ok(Map::new())
            }
        }

        let backend = Arc::new(FakeBackend::new());
        let err = Agent::with_backend(backend, config(), vec![Box::new(BrokenTool)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[tokio::test]
    async fn test_cache_creation_failure_falls_back_to_embedded_config() {
        // Instruction is large enough to cache, but creation is never
        // scripted, so every attempt fails.
        let backend = Arc::new(FakeBackend::new().with_token_count(5000));
        backend.push_text("Still working!");
        let agent = agent(backend.clone(), vec![]).await;

        let reply = agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap();
        assert_eq!(reply.parts.len(), 1);

        let seen = backend.seen_configs.lock().unwrap();
        assert!(seen[0].system_instruction.is_some());
        assert!(seen[0].cached_content.is_none());
    }

    #[tokio::test]
    async fn test_active_cache_is_referenced_by_generate() {
        let backend = Arc::new(FakeBackend::new().with_token_count(5000));
        backend.push_create(Ok("cachedContents/abc".to_string()));
        backend.push_text("Cached and ready.");

        let tools: Vec<Box<dyn Tool>> = vec![Box::new(DummyTool {
            name: "noop".to_string(),
            result: Map::new(),
        })];
        let agent = agent(backend.clone(), tools).await;

        // Wait for the refresher's first tick to publish the handle.
        let mut state = agent.cache_state.clone();
        tokio::time::timeout(
            Duration::from_secs(1),
            state.wait_for(|handle| handle.is_some()),
        )
        .await
        .expect("cache was never published")
        .unwrap();

        agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap();

        let seen = backend.seen_configs.lock().unwrap();
        let config = seen.last().unwrap();
        assert_eq!(config.cached_content.as_deref(), Some("cachedContents/abc"));
        assert!(config.system_instruction.is_none());
        assert!(config.tools.is_empty());
    }

    #[tokio::test]
    async fn test_caching_skipped_for_small_instructions() {
        // Default FakeBackend token count is below the threshold.
        let backend = Arc::new(FakeBackend::new());
        backend.push_text("Hello!");
        let agent = agent(backend.clone(), vec![]).await;

        agent
            .generate(&[], &UserMessage::text("Hi"))
            .await
            .unwrap();

        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
    }
}
