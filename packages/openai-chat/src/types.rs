//! Transcript and wire types for the chat completions API.
//!
//! A conversation is an ordered, append-only list of [`Turn`]s. An
//! assistant turn either carries final text or a list of pending tool
//! calls; a tool turn answers exactly one pending call and references
//! it by `tool_call_id`.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,

    /// Message text. `None` on assistant turns that only request tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// On tool turns: the id of the pending call this turn answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// On assistant turns: the calls the model wants executed before it
    /// can continue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallPayload>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant turn that requests tool calls instead of answering.
    pub fn assistant_calls(tool_calls: Vec<ToolCallPayload>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls,
        }
    }

    /// A tool turn answering the pending call identified by `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

/// A model-issued tool call as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    /// Opaque, provider-assigned call id.
    pub id: String,

    /// Always "function" for the calls we handle.
    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionPayload,
}

/// The function half of a tool call payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionPayload {
    pub name: String,

    /// Raw JSON text; decoded by the matching tool at dispatch time.
    pub arguments: String,
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model to use (e.g., "gpt-4o", "gpt-4o-mini")
    pub model: String,

    /// The full transcript; resent on every call (no server-side state).
    pub messages: Vec<Turn>,

    /// Tool definitions in OpenAI format, if any are registered.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn message(mut self, turn: Turn) -> Self {
        self.messages.push(turn);
        self
    }

    pub fn messages(mut self, turns: Vec<Turn>) -> Self {
        self.messages = turns;
        self
    }

    /// Attach tool definitions; tool choice defaults to "auto".
    pub fn tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        if !tools.is_empty() {
            self.tool_choice = Some("auto".to_string());
        }
        self.tools = tools;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One assistant reply: either final text or a batch of pending calls.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Final text, when the model finished the turn.
    pub content: Option<String>,

    /// Pending calls, in the order the model emitted them.
    pub tool_calls: Vec<ToolCallPayload>,

    /// Token usage, when the provider reports it.
    pub usage: Option<Usage>,
}

impl AssistantReply {
    /// A reply with no pending calls ends the dispatch loop.
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallPayload>) -> Self {
        Self {
            content: None,
            tool_calls,
            usage: None,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// Raw response envelopes, internal to the client.

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseRaw {
    pub choices: Vec<ChatChoiceRaw>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceRaw {
    pub message: AssistantMessageRaw,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssistantMessageRaw {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
    pub embedding: Vec<f32>,
}
