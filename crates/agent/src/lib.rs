//! Conversation core: the turn orchestrator and the function-dispatch loop.
//!
//! One chat turn flows through here end-to-end:
//! 1. **Orchestration** (`orchestrator`) - resolve/extend the session, persist
//!    the user message, load capped history + collected fields
//! 2. **Model call** (`llm`, `openai`) - function-calling chat completion
//! 3. **Dispatch** (`functions`) - execute the model-requested action against
//!    the store, the slot cache, and the calendar/CRM integrations
//! 4. **Model call again** - feed the function result back for the final
//!    user-facing reply
//!
//! # Key Types
//!
//! - `Orchestrator` - drives one turn (see `orchestrator` module)
//! - `LlmClient` - pluggable chat-completion seam; `OpenAiChatClient` is the
//!   production implementation
//! - `FunctionDispatcher` - never fails a turn; every error folds into a
//!   `FunctionOutcome` the model can react to conversationally
//! - `SlotCache` - per-session cache of offered meeting slots, swept in bulk
//!   by the surrounding service
//!
//! # Safety Principle
//!
//! The model decides WHICH action runs, never whether its side effects are
//! valid: argument shape, email format, slot bounds, and prerequisite fields
//! are all enforced here before anything is written.

pub mod functions;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod slots;

pub use functions::FunctionDispatcher;
pub use llm::{ChatOutcome, FunctionCall, FunctionOutcome, FunctionResult, LlmClient};
pub use openai::OpenAiChatClient;
pub use orchestrator::{Orchestrator, SessionHistory, SessionStart, TurnReply};
pub use slots::SlotCache;
