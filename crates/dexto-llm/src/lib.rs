//! Dexto LLM - Provider-agnostic client contract and conversation model.
//!
//! The loop driver lives in the runtime crate, not here: an
//! [`LlmClient`] is deterministic about turn boundaries and knows nothing
//! about tools beyond their definitions. This crate provides:
//!
//! - The [`LlmClient`] trait (`info`, `stream`, `count_tokens`)
//! - The conversation [`Message`] model with role-specific payloads
//! - [`StreamEvent`] and the [`ResponseAssembler`] that folds a stream
//!   into an assistant turn
//! - Group-aware history trimming ([`trim_to_window`])

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod assemble;
mod client;
mod error;
mod message;
mod window;

pub use assemble::{AssistantTurn, ResponseAssembler};
pub use client::{
    EventStream, LlmCallOptions, LlmClient, LlmRequest, ModelFeatures, ModelInfo, StreamEvent,
    ToolDefinition,
};
pub use error::{LlmError, LlmResult};
pub use message::{Message, MessagePayload, MessageRole, TokenUsage, ToolCall, UserContentPart};
pub use window::trim_to_window;

pub use message::estimate_tokens;
