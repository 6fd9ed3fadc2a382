//! OpenAI REST client with a tool-dispatching conversation driver.
//!
//! Covers the surface the console labs need: chat completions
//! (blocking and streamed), function/tool calling, assistants/threads
//! with run polling, and embeddings with a flat-file cache for
//! retrieval-augmented prompting.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_chat::{Conversation, OpenAIClient, ToolRegistry};
//!
//! let client = OpenAIClient::from_env()?;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(GetCustomers::new(store))?;
//!
//! let mut conversation = Conversation::new(&client, "gpt-4o-mini")
//!     .with_system("You answer questions about customer revenue.")
//!     .with_tools(registry);
//!
//! let answer = conversation.advance("Who is Orlando Gee?").await?;
//! ```

pub mod assistants;
pub mod conversation;
pub mod error;
pub mod retrieval;
pub mod schema;
pub mod streaming;
pub mod tool;
pub mod types;

pub use assistants::{
    run_to_completion, Assistant, AssistantPage, AssistantSpec, PollPolicy, Run, RunStatus,
    Sleeper, Thread, ThreadsApi, TokioSleeper, ToolOutput,
};
pub use conversation::{ChatApi, Conversation};
pub use error::{OpenAIError, Result, ToolError};
pub use retrieval::{Embedder, EmbeddingIndex, EmbeddingRecord};
pub use streaming::{CallAssembler, ChatStream, FunctionFragment, StreamDelta, ToolCallFragment};
pub use tool::{ErasedTool, Tool, ToolCall, ToolDefinition, ToolRegistry};
pub use types::{AssistantReply, ChatRequest, Role, Turn, Usage};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use tracing::{debug, warn};

/// OpenAI API client.
///
/// Authentication is a static bearer key from the environment. That is
/// deliberate lab simplification; production code should use a managed
/// credential, not a long-lived key.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OpenAIError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Point at a different endpoint (proxy, Azure-style deployment).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One chat completion over the given transcript.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<AssistantReply> {
        let start = std::time::Instant::now();

        let raw: types::ChatResponseRaw = self
            .post_json("chat/completions", request, false)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        let message = raw
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| OpenAIError::Api("No choices in response".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            tool_calls = message.tool_calls.len(),
            "chat completion"
        );

        Ok(AssistantReply {
            content: message.content,
            tool_calls: message.tool_calls,
            usage: raw.usage,
        })
    }

    /// Streamed chat completion. The returned stream yields text deltas
    /// until the provider's done marker.
    pub async fn chat_completion_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let mut body = serde_json::to_value(request)
            .map_err(|e| OpenAIError::Parse(format!("Failed to serialize request: {}", e)))?;
        body["stream"] = serde_json::Value::Bool(true);

        let response = self.post_json("chat/completions", &body, false).await?;
        Ok(ChatStream::new(response.bytes_stream()))
    }

    /// Embed one text. Dimension depends on the model (1536 for
    /// text-embedding-3-small).
    pub async fn create_embedding(&self, input: &str, model: &str) -> Result<Vec<f32>> {
        let request = types::EmbeddingRequest {
            model: model.to_string(),
            input: input.to_string(),
        };

        let raw: types::EmbeddingResponse = self
            .post_json("embeddings", &request, false)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        raw.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| OpenAIError::Api("No embedding in response".into()))
    }

    /// Bind an embeddings model, yielding an [`Embedder`] for index
    /// building and query embedding.
    pub fn embeddings(&self, model: impl Into<String>) -> EmbeddingModel<'_> {
        EmbeddingModel {
            client: self,
            model: model.into(),
        }
    }

    // ---- assistants/threads REST surface ----

    /// One page of the assistant listing; pass the previous page's
    /// `last_id` as `after` to continue.
    pub async fn list_assistants(&self, after: Option<&str>) -> Result<AssistantPage> {
        let mut url = format!("{}/assistants?limit=100", self.base_url);
        if let Some(after) = after {
            url.push_str("&after=");
            url.push_str(after);
        }

        let response = self
            .http_client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| OpenAIError::Network(e.to_string()))?;

        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    pub async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant> {
        self.post_json("assistants", spec, true)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    pub async fn update_assistant(&self, assistant_id: &str, spec: &AssistantSpec) -> Result<Assistant> {
        self.post_json(&format!("assistants/{assistant_id}"), spec, true)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    pub async fn create_thread(&self) -> Result<Thread> {
        self.post_json("threads", &serde_json::json!({}), true)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    // ---- shared HTTP plumbing ----

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        assistants: bool,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http_client
            .post(format!("{}/{}", self.base_url, path))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);
        if assistants {
            request = request.header("OpenAI-Beta", "assistants=v2");
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, path, "request failed");
            OpenAIError::Network(e.to_string())
        })?;

        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "API error");
            return Err(OpenAIError::Api(format!("{}: {}", status, error_text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatApi for OpenAIClient {
    async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply> {
        self.chat_completion(request).await
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<AssistantReply> {
        let mut stream = self.chat_completion_stream(request).await?;
        let mut content = String::new();
        let mut assembler = streaming::CallAssembler::default();

        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if delta.done {
                break;
            }
            if !delta.text.is_empty() {
                on_delta(&delta.text);
                content.push_str(&delta.text);
            }
            assembler.absorb(&delta.tool_calls);
        }

        // A streamed turn that requested tool calls hands them back so
        // the dispatch loop can finish it.
        let tool_calls = assembler.finish();
        if tool_calls.is_empty() {
            Ok(AssistantReply::text(content))
        } else {
            Ok(AssistantReply {
                content: (!content.is_empty()).then_some(content),
                tool_calls,
                usage: None,
            })
        }
    }
}

#[async_trait]
impl ThreadsApi for OpenAIClient {
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
        self.post_json(
            &format!("threads/{thread_id}/messages"),
            &serde_json::json!({ "role": "user", "content": text }),
            true,
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        self.post_json(
            &format!("threads/{thread_id}/runs"),
            &serde_json::json!({ "assistant_id": assistant_id }),
            true,
        )
        .await?
        .json()
        .await
        .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let response = self
            .http_client
            .get(format!("{}/threads/{thread_id}/runs/{run_id}", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| OpenAIError::Network(e.to_string()))?;

        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        self.post_json(
            &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &serde_json::json!({ "tool_outputs": outputs }),
            true,
        )
        .await?
        .json()
        .await
        .map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    async fn latest_assistant_message(&self, thread_id: &str) -> Result<Option<String>> {
        let response = self
            .http_client
            .get(format!(
                "{}/threads/{thread_id}/messages?limit=1&order=desc",
                self.base_url
            ))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| OpenAIError::Network(e.to_string()))?;

        let page: serde_json::Value = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        Ok(page["data"][0]["content"][0]["text"]["value"]
            .as_str()
            .map(str::to_string))
    }
}

/// [`OpenAIClient`] bound to one embeddings model.
pub struct EmbeddingModel<'a> {
    client: &'a OpenAIClient,
    model: String,
}

#[async_trait]
impl Embedder for EmbeddingModel<'_> {
    async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        self.client.create_embedding(input, &self.model).await
    }
}

/// Walk the assistant listing pages until a name match.
pub async fn find_assistant_by_name(
    client: &OpenAIClient,
    name: &str,
) -> Result<Option<Assistant>> {
    let mut after: Option<String> = None;
    loop {
        let page = client.list_assistants(after.as_deref()).await?;
        if let Some(found) = page
            .data
            .into_iter()
            .find(|assistant| assistant.name.as_deref() == Some(name))
        {
            return Ok(Some(found));
        }
        if !page.has_more {
            return Ok(None);
        }
        after = page.last_id;
    }
}

/// Update the assistant with this spec's name if one exists, otherwise
/// create it. Keeps re-runs of a lab from piling up duplicates.
pub async fn create_or_update_assistant(
    client: &OpenAIClient,
    spec: &AssistantSpec,
) -> Result<Assistant> {
    match find_assistant_by_name(client, &spec.name).await? {
        Some(existing) => {
            debug!(assistant_id = %existing.id, name = %spec.name, "updating existing assistant");
            client.update_assistant(&existing.id, spec).await
        }
        None => {
            debug!(name = %spec.name, "creating assistant");
            client.create_assistant(spec).await
        }
    }
}
