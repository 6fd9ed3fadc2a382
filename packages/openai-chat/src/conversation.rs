//! The conversation driver and the tool dispatch loop.
//!
//! [`Conversation`] owns an append-only transcript. `advance` appends
//! the user's turn and invokes the model. When the reply carries
//! pending tool calls, it resolves each call through the registry,
//! appends the tool turns, and re-invokes the model until it produces
//! a finished answer.
//!
//! Everything that goes wrong inside a tool (unknown name, bad
//! arguments, handler failure) is turned into a model-visible error
//! payload; only transport failures end the session.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{OpenAIError, Result};
use crate::tool::{ToolCall, ToolRegistry};
use crate::types::{AssistantReply, ChatRequest, Turn};

/// Transport seam for the conversation driver.
///
/// Implemented by [`crate::OpenAIClient`]; tests substitute a scripted
/// mock.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// One model invocation over the full transcript.
    async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply>;

    /// Streamed variant. Text fragments are surfaced through `on_delta`
    /// in arrival order; the returned reply carries the concatenated
    /// whole (and any pending tool calls).
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<AssistantReply>;
}

/// A chat session: transcript, registered tools, and a transport.
pub struct Conversation<'a> {
    api: &'a dyn ChatApi,
    model: String,
    transcript: Vec<Turn>,
    registry: ToolRegistry,
    temperature: Option<f32>,
    max_rounds: usize,
}

impl<'a> Conversation<'a> {
    pub fn new(api: &'a dyn ChatApi, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            transcript: Vec::new(),
            registry: ToolRegistry::new(),
            temperature: None,
            max_rounds: 10,
        }
    }

    /// Set the system turn. Call before the first `advance`.
    pub fn with_system(mut self, instructions: impl Into<String>) -> Self {
        self.transcript.push(Turn::system(instructions));
        self
    }

    /// Seed an opening assistant message (a greeting the user sees
    /// before typing anything).
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.transcript.push(Turn::assistant(greeting));
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap on model invocations per user turn. A model that keeps
    /// requesting tools past this bound ends the session with an error.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// The transcript so far. Turns are only ever appended.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Append the user's turn, run the dispatch loop, and return the
    /// assistant's finished answer.
    ///
    /// `user_text` must be non-empty; an empty line is the caller's
    /// exit signal and never reaches the driver.
    pub async fn advance(&mut self, user_text: &str) -> Result<String> {
        self.transcript.push(Turn::user(user_text));

        let reply = self.api.complete(&self.request()).await?;
        self.drive_to_answer(reply).await
    }

    /// Streamed variant of [`advance`](Self::advance). Fragments are
    /// handed to `on_delta` as they arrive; the concatenated whole is
    /// appended as a single assistant turn once the stream ends.
    ///
    /// A streamed reply that signals tool calls is finished through the
    /// regular (non-streaming) dispatch loop.
    pub async fn advance_streaming(
        &mut self,
        user_text: &str,
        mut on_delta: impl FnMut(&str) + Send,
    ) -> Result<String> {
        self.transcript.push(Turn::user(user_text));

        let reply = self
            .api
            .complete_stream(&self.request(), &mut on_delta)
            .await?;
        self.drive_to_answer(reply).await
    }

    /// Dispatch loop: resolve pending calls, append tool turns, and
    /// re-invoke the model until it yields a finished answer.
    async fn drive_to_answer(&mut self, mut reply: AssistantReply) -> Result<String> {
        let mut rounds = 1;

        loop {
            if reply.is_final() {
                let answer = reply.content.unwrap_or_default();
                debug!(rounds, answer_len = answer.len(), "assistant turn finished");
                self.transcript.push(Turn::assistant(answer.clone()));
                return Ok(answer);
            }

            info!(
                round = rounds,
                call_count = reply.tool_calls.len(),
                "model requested tool calls"
            );

            // The assistant turn carrying the pending calls, then one
            // tool turn per call, in the order the model emitted them.
            let pending = reply.tool_calls.clone();
            self.transcript.push(Turn::assistant_calls(pending.clone()));

            for payload in &pending {
                let call = ToolCall::from_payload(payload);
                let content = resolve_tool_call(&self.registry, &call).await;
                self.transcript.push(Turn::tool(&payload.id, content));
            }

            rounds += 1;
            if rounds > self.max_rounds {
                warn!(max_rounds = self.max_rounds, "tool dispatch round cap hit");
                return Err(OpenAIError::Api(format!(
                    "tool dispatch exceeded {} rounds",
                    self.max_rounds
                )));
            }

            reply = self.api.complete(&self.request()).await?;
        }
    }

    fn request(&self) -> ChatRequest {
        let mut request =
            ChatRequest::new(&self.model).messages(self.transcript.clone());
        if !self.registry.is_empty() {
            request = request.tools(self.registry.definitions());
        }
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        request
    }
}

/// Resolve one pending call into tool-turn content.
///
/// Unknown names, undecodable arguments, and handler failures all come
/// back as an `{"error": ...}` payload so the model can read the
/// failure and react in natural language. Nothing here ends the
/// session.
pub(crate) async fn resolve_tool_call(registry: &ToolRegistry, call: &ToolCall) -> String {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "model requested an unregistered tool");
        return error_payload(format!("function {} is not supported", call.name));
    };

    info!(tool = %call.name, id = %call.id, arguments = %call.arguments, "executing tool call");

    match tool.call_erased(&call.arguments).await {
        Ok(output) => {
            debug!(tool = %call.name, output_len = output.len(), "tool call succeeded");
            output
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool call failed, reporting to model");
            error_payload(e.model_message())
        }
    }
}

fn error_payload(message: String) -> String {
    serde_json::json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use crate::types::{FunctionPayload, Role, ToolCallPayload};
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn payload(id: &str, name: &str, arguments: &str) -> ToolCallPayload {
        ToolCallPayload {
            id: id.into(),
            kind: "function".into(),
            function: FunctionPayload {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Scripted transport: pops one reply per invocation and records
    /// every request it saw.
    struct ScriptedApi {
        replies: Mutex<VecDeque<AssistantReply>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedApi {
        fn new(replies: Vec<AssistantReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for ScriptedApi {
        async fn complete(&self, request: &ChatRequest) -> Result<AssistantReply> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OpenAIError::Api("script exhausted".into()))
        }

        async fn complete_stream(
            &self,
            request: &ChatRequest,
            on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<AssistantReply> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OpenAIError::Api("script exhausted".into()))?;

            if let Some(text) = &reply.content {
                // Emit in two fragments to exercise concatenation.
                let mid = text.len() / 2;
                let split = (0..=mid)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                if split > 0 {
                    on_delta(&text[..split]);
                }
                on_delta(&text[split..]);
            }
            Ok(reply)
        }
    }

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct CustomerFilter {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        first_name: Option<String>,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Customer {
        id: i64,
        first_name: String,
    }

    struct GetCustomers;

    #[async_trait]
    impl Tool for GetCustomers {
        const NAME: &'static str = "getCustomers";
        type Args = CustomerFilter;
        type Output = Vec<Customer>;
        type Error = std::io::Error;

        fn description(&self) -> &str {
            "Gets a filtered list of customers"
        }

        async fn call(
            &self,
            args: Self::Args,
        ) -> std::result::Result<Self::Output, Self::Error> {
            if args.id.is_none() && args.first_name.is_none() {
                return Err(std::io::Error::other(
                    "At least one filter must be provided.",
                ));
            }
            Ok(vec![Customer {
                id: args.id.unwrap_or(3),
                first_name: "Orlando".into(),
            }])
        }
    }

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct ProductFilter {
        id: i64,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Product {
        id: i64,
        name: String,
    }

    struct GetProducts;

    #[async_trait]
    impl Tool for GetProducts {
        const NAME: &'static str = "getProducts";
        type Args = ProductFilter;
        type Output = Vec<Product>;
        type Error = std::io::Error;

        fn description(&self) -> &str {
            "Gets a filtered list of products"
        }

        async fn call(
            &self,
            args: Self::Args,
        ) -> std::result::Result<Self::Output, Self::Error> {
            Ok(vec![Product {
                id: args.id,
                name: "Road-150".into(),
            }])
        }
    }

    fn sales_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(GetCustomers).unwrap();
        registry.register(GetProducts).unwrap();
        registry
    }

    fn roles(turns: &[Turn]) -> Vec<Role> {
        turns.iter().map(|t| t.role).collect()
    }

    #[tokio::test]
    async fn advance_only_appends() {
        let api = ScriptedApi::new(vec![
            AssistantReply::text("first"),
            AssistantReply::text("second"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_system("be terse");

        conversation.advance("one").await.unwrap();
        let after_first = conversation.transcript().to_vec();

        conversation.advance("two").await.unwrap();
        let after_second = conversation.transcript();

        // The earlier transcript is an untouched prefix of the later one.
        assert_eq!(after_first.len(), 3);
        assert_eq!(after_second.len(), 5);
        for (before, after) in after_first.iter().zip(after_second.iter()) {
            assert_eq!(before.role, after.role);
            assert_eq!(before.content, after.content);
        }
        assert_eq!(
            roles(after_second),
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn batch_of_two_calls_yields_two_ordered_tool_turns() {
        let api = ScriptedApi::new(vec![
            AssistantReply::calls(vec![
                payload("call_a", "getProducts", r#"{"id":7}"#),
                payload("call_b", "getCustomers", r#"{"id":3}"#),
            ]),
            AssistantReply::text("done"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_tools(sales_registry());

        let answer = conversation.advance("revenue?").await.unwrap();
        assert_eq!(answer, "done");

        // user, assistant(calls), tool, tool, assistant
        let transcript = conversation.transcript();
        assert_eq!(
            roles(transcript),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(transcript[3].tool_call_id.as_deref(), Some("call_b"));

        let products: serde_json::Value =
            serde_json::from_str(transcript[2].content.as_deref().unwrap()).unwrap();
        assert_eq!(products[0]["id"], 7);

        // Both tool turns were in place before the second model call.
        let second_request = &api.requests()[1];
        assert_eq!(
            roles(&second_request.messages),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
    }

    #[tokio::test]
    async fn unknown_function_becomes_error_turn() {
        let api = ScriptedApi::new(vec![
            AssistantReply::calls(vec![payload("call_1", "getWeather", "{}")]),
            AssistantReply::text("understood"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_tools(sales_registry());

        let answer = conversation.advance("weather?").await.unwrap();
        assert_eq!(answer, "understood");

        let tool_turn = &conversation.transcript()[2];
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(
            tool_turn.content.as_deref().unwrap(),
            r#"{"error":"function getWeather is not supported"}"#
        );
    }

    #[tokio::test]
    async fn handler_error_is_contained_and_session_continues() {
        // getCustomers with empty arguments: the handler's message comes
        // back verbatim inside the error payload.
        let api = ScriptedApi::new(vec![
            AssistantReply::calls(vec![payload("call_1", "getCustomers", "{}")]),
            AssistantReply::text("please provide a filter"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_tools(sales_registry());

        let answer = conversation.advance("list all customers").await.unwrap();
        assert_eq!(answer, "please provide a filter");

        let tool_turn = &conversation.transcript()[2];
        assert_eq!(
            tool_turn.content.as_deref().unwrap(),
            r#"{"error":"At least one filter must be provided."}"#
        );

        // The loop re-invoked the model with the error in place.
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn bad_arguments_become_error_turn() {
        let api = ScriptedApi::new(vec![
            AssistantReply::calls(vec![payload("call_1", "getProducts", "not json")]),
            AssistantReply::text("ok"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_tools(sales_registry());

        conversation.advance("products?").await.unwrap();

        let content = conversation.transcript()[2].content.clone().unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value["error"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn round_cap_ends_runaway_dispatch() {
        // Model requests the same call forever.
        let replies = (0..5)
            .map(|i| {
                AssistantReply::calls(vec![payload(
                    &format!("call_{i}"),
                    "getProducts",
                    r#"{"id":1}"#,
                )])
            })
            .collect();
        let api = ScriptedApi::new(replies);
        let mut conversation = Conversation::new(&api, "gpt-4o-mini")
            .with_tools(sales_registry())
            .with_max_rounds(3);

        let err = conversation.advance("loop").await.unwrap_err();
        assert!(matches!(err, OpenAIError::Api(_)));
    }

    #[tokio::test]
    async fn streaming_concatenates_and_appends_once() {
        let api = ScriptedApi::new(vec![AssistantReply::text("Hello world")]);
        let mut conversation = Conversation::new(&api, "gpt-4o-mini");

        let mut seen = Vec::new();
        let answer = conversation
            .advance_streaming("hi", |delta| seen.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(answer, "Hello world");
        assert!(seen.len() > 1);
        assert_eq!(seen.concat(), "Hello world");

        // Exactly one assistant turn holds the whole reply.
        let transcript = conversation.transcript();
        assert_eq!(roles(transcript), vec![Role::User, Role::Assistant]);
        assert_eq!(transcript[1].content.as_deref(), Some("Hello world"));
    }

    #[tokio::test]
    async fn streamed_tool_calls_finish_through_dispatch_loop() {
        let api = ScriptedApi::new(vec![
            AssistantReply::calls(vec![payload("call_1", "getProducts", r#"{"id":7}"#)]),
            AssistantReply::text("the product is Road-150"),
        ]);
        let mut conversation =
            Conversation::new(&api, "gpt-4o-mini").with_tools(sales_registry());

        let answer = conversation
            .advance_streaming("what product?", |_| {})
            .await
            .unwrap();
        assert_eq!(answer, "the product is Road-150");
        assert_eq!(
            roles(conversation.transcript()),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn transport_error_is_fatal() {
        let api = ScriptedApi::new(vec![]);
        let mut conversation = Conversation::new(&api, "gpt-4o-mini");
        assert!(conversation.advance("hi").await.is_err());
    }
}
