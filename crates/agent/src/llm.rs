use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadline_core::domain::fields::ConversationData;
use leadline_core::domain::message::ChatMessage;
use leadline_core::errors::AppError;

/// Action the model asked the host to perform instead of replying in text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

/// Structured result of one dispatched function, fed back to the model so it
/// can phrase the outcome conversationally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionOutcome {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionResult {
    pub name: String,
    pub response: FunctionOutcome,
}

/// What one completion produced. The provider may offer several function
/// calls; this adapter surfaces at most one per response, and downstream only
/// the first result of a batch is threaded back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOutcome {
    pub message: String,
    pub function_calls: Vec<FunctionCall>,
}

impl ChatOutcome {
    pub fn text(message: impl Into<String>) -> Self {
        Self { message: message.into(), function_calls: Vec::new() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One turn: capped history plus the collected-field context.
    async fn chat(
        &self,
        history: &[ChatMessage],
        data: &ConversationData,
    ) -> Result<ChatOutcome, AppError>;

    /// Follow-up turn carrying function results; produces the final reply.
    async fn chat_with_function_result(
        &self,
        history: &[ChatMessage],
        function_results: &[FunctionResult],
        data: &ConversationData,
    ) -> Result<ChatOutcome, AppError>;
}
