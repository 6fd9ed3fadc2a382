//! Error types for the OpenAI client and the tool dispatch layer.
//!
//! Transport and provider failures (`OpenAIError`) are fatal to the
//! current session and are never retried. Anything that goes wrong
//! inside a tool handler (`ToolError`) is contained by the dispatch
//! loop and surfaced to the model as an error payload instead.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, OpenAIError>;

/// Errors from the OpenAI client.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request, run failure)
    #[error("API error: {0}")]
    Api(String),

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Embedding cache file error (unreadable or malformed cache)
    #[error("Cache error: {0}")]
    Cache(String),
}

/// Errors raised while registering or invoking tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool with this name is already registered.
    #[error("A tool named '{0}' is already registered")]
    DuplicateName(String),

    /// Failed to decode the model-supplied arguments.
    #[error("Failed to parse arguments: {0}")]
    ArgumentParse(String),

    /// The tool handler itself failed.
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// Failed to serialize the tool output.
    #[error("Failed to serialize output: {0}")]
    OutputSerialize(String),
}

impl ToolError {
    /// The bare message to forward to the model, without the variant prefix.
    ///
    /// The model reads this text verbatim, so a handler message like
    /// "At least one filter must be provided." goes through unchanged.
    pub fn model_message(self) -> String {
        match self {
            Self::ArgumentParse(m) | Self::Execution(m) | Self::OutputSerialize(m) => m,
            other => other.to_string(),
        }
    }
}
