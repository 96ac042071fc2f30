//! SpecialistClient trait and the scripted mock used throughout tests

use async_trait::async_trait;

use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse};

/// A model endpoint the core can converse with
///
/// Implementations must be cheap to clone behind `Arc` and safe to call
/// concurrently; every call carries its own timeout at the transport
/// level.
#[async_trait]
pub trait SpecialistClient: Send + Sync {
    /// One complete request/response round trip
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Model identifier, for logging and telemetry
    fn model(&self) -> &str;
}

/// Scripted client for tests
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{ChatRequest, ChatResponse, LlmError, SpecialistClient, StopReason, ToolCall, TokenUsage};

    /// Replays a scripted sequence of responses and records every request
    ///
    /// Once the script is exhausted, further calls return an empty
    /// end-of-turn response so driving loops terminate naturally.
    pub struct MockSpecialistClient {
        responses: Mutex<VecDeque<ChatResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockSpecialistClient {
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Script entry: plain text, end of turn
        pub fn text(content: &str) -> ChatResponse {
            ChatResponse::text(content)
        }

        /// Script entry: a single tool call
        pub fn tool_call(name: &str, arguments: serde_json::Value) -> ChatResponse {
            ChatResponse {
                content: None,
                tool_calls: vec![ToolCall::new(name, arguments)],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            }
        }

        /// Script entry: several tool calls in one turn
        pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> ChatResponse {
            ChatResponse {
                content: None,
                tool_calls: calls.into_iter().map(|(name, args)| ToolCall::new(name, args)).collect(),
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            }
        }

        /// Requests observed so far
        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SpecialistClient for MockSpecialistClient {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ChatResponse::text(""));
            Ok(response)
        }

        fn model(&self) -> &str {
            "mock"
        }
    }
}
