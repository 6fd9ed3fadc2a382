//! SSE adapter for streamed chat completions.
//!
//! Turns the raw `reqwest` byte stream into an ordered sequence of
//! deltas. Handles partial lines, blank separator lines, and the
//! `data: [DONE]` terminator. The stream is finite and not restartable.
//!
//! A streamed turn can carry tool calls instead of text: the provider
//! spreads each call's id, name, and argument text over many events,
//! keyed by a per-call `index`. [`CallAssembler`] stitches those
//! fragments back into complete payloads.

use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::OpenAIError;
use crate::types::{FunctionPayload, ToolCallPayload};

/// One fragment of a streamed assistant reply.
#[derive(Debug, Clone)]
pub struct StreamDelta {
    /// Text added by this event; empty on the terminator and on
    /// tool-call events.
    pub text: String,

    /// Tool-call fragments added by this event.
    pub tool_calls: Vec<ToolCallFragment>,

    /// True once the provider signalled the end of the reply.
    pub done: bool,
}

/// A piece of one streamed tool call. `id` and the function name arrive
/// on the call's first fragment; argument text trickles in across the
/// rest.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallFragment {
    /// Position of the call within the turn's batch.
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Reassembles tool-call fragments into complete payloads, in batch
/// order.
#[derive(Debug, Default)]
pub struct CallAssembler {
    calls: Vec<ToolCallPayload>,
}

impl CallAssembler {
    pub fn absorb(&mut self, fragments: &[ToolCallFragment]) {
        for fragment in fragments {
            while self.calls.len() <= fragment.index {
                self.calls.push(ToolCallPayload {
                    id: String::new(),
                    kind: "function".to_string(),
                    function: FunctionPayload {
                        name: String::new(),
                        arguments: String::new(),
                    },
                });
            }

            let call = &mut self.calls[fragment.index];
            if let Some(id) = &fragment.id {
                call.id = id.clone();
            }
            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name {
                    call.function.name = name.clone();
                }
                if let Some(arguments) = &function.arguments {
                    call.function.arguments.push_str(arguments);
                }
            }
        }
    }

    pub fn finish(self) -> Vec<ToolCallPayload> {
        self.calls
    }
}

#[derive(Debug, Deserialize)]
struct EventRaw {
    choices: Vec<EventChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct EventChoiceRaw {
    delta: EventDeltaRaw,
}

#[derive(Debug, Deserialize)]
struct EventDeltaRaw {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallFragment>,
}

/// Adapter from SSE bytes to [`StreamDelta`] values.
pub struct ChatStream {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: String,
}

impl ChatStream {
    pub(crate) fn new(
        bytes: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            bytes: Box::pin(bytes),
            buffer: String::new(),
        }
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamDelta, OpenAIError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = next_event(&mut this.buffer) {
                return Poll::Ready(Some(event));
            }

            match Pin::new(&mut this.bytes).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => this.buffer.push_str(text),
                    Err(e) => {
                        return Poll::Ready(Some(Err(OpenAIError::Parse(format!(
                            "Invalid UTF-8 in stream: {}",
                            e
                        )))));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(OpenAIError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    // Connection closed; drain whatever is buffered.
                    if this.buffer.trim().is_empty() {
                        return Poll::Ready(None);
                    }
                    if let Some(event) = next_event(&mut this.buffer) {
                        return Poll::Ready(Some(event));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pop the next complete SSE event off the buffer, if one is available.
fn next_event(buffer: &mut String) -> Option<Result<StreamDelta, OpenAIError>> {
    loop {
        let newline = buffer.find('\n')?;
        let line = buffer[..newline].trim().to_string();
        buffer.drain(..=newline);

        // Blank lines separate events; other prefixes (event:, id:,
        // retry:) carry nothing we use.
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(Ok(StreamDelta {
                text: String::new(),
                tool_calls: Vec::new(),
                done: true,
            }));
        }

        match serde_json::from_str::<EventRaw>(data) {
            Ok(event) => {
                let delta = event.choices.into_iter().next().map(|c| c.delta);
                let (text, tool_calls) = match delta {
                    Some(delta) => (delta.content.unwrap_or_default(), delta.tool_calls),
                    None => (String::new(), Vec::new()),
                };
                return Some(Ok(StreamDelta {
                    text,
                    tool_calls,
                    done: false,
                }));
            }
            Err(e) => {
                return Some(Err(OpenAIError::Parse(format!(
                    "Bad stream event: {} (data: {})",
                    e,
                    &data[..data.len().min(200)]
                ))));
            }
        }
    }
}
