//! Assistants/threads variant: the transcript lives server-side.
//!
//! The local caller holds only opaque ids (assistant, thread, run) and
//! polls the run status until it leaves the non-terminal set. A
//! `requires_action` status is the cue to resolve the requested tool
//! calls and submit their outputs before the next poll.
//!
//! Everything beyond the raw REST calls is a plain function over
//! [`ThreadsApi`], so the run loop can be tested against a scripted
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conversation::resolve_tool_call;
use crate::error::{OpenAIError, Result};
use crate::tool::{ToolCall, ToolRegistry};
use crate::types::ToolCallPayload;

/// Creation/update payload for an assistant.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub model: String,

    /// Tool definitions in OpenAI format.
    pub tools: Vec<serde_json::Value>,
}

/// A server-side assistant.
#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
}

/// One page of the assistant listing, cursor-paged via `after`.
#[derive(Debug, Deserialize)]
pub struct AssistantPage {
    pub data: Vec<Assistant>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

/// A server-side conversation thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// A run of an assistant over a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
}

/// Remote run status. Everything outside the first four values is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::Queued | Self::InProgress | Self::Cancelling | Self::RequiresAction
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCallPayload>,
}

/// One resolved tool result, matched to its call by id.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// The threads/runs surface the completion loop needs.
///
/// Implemented over HTTP by [`crate::OpenAIClient`]; tests script it.
#[async_trait]
pub trait ThreadsApi: Send + Sync {
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    /// Text of the newest assistant message on the thread, if any.
    async fn latest_assistant_message(&self, thread_id: &str) -> Result<Option<String>>;
}

/// How often and how long to poll a non-terminal run.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,

    /// Cap on `requires_action` rounds per run. A run that keeps
    /// requesting tools past this bound is session-fatal, matching the
    /// local dispatch loop's round cap.
    pub max_action_rounds: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(120),
            max_action_rounds: 10,
        }
    }
}

/// Clock seam so tests poll without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Add a user message, run the assistant, and poll to completion.
///
/// `requires_action` statuses are resolved through `registry` with the
/// same error containment as the local dispatch loop: a failing or
/// unknown tool produces an error output for the model, never a local
/// failure. Runs that end in any terminal status other than
/// `completed`, or that outlast `poll.max_wait`, are session-fatal.
pub async fn run_to_completion(
    api: &dyn ThreadsApi,
    thread_id: &str,
    assistant_id: &str,
    user_text: &str,
    registry: &ToolRegistry,
    poll: &PollPolicy,
    sleeper: &dyn Sleeper,
) -> Result<String> {
    api.add_user_message(thread_id, user_text).await?;
    let mut run = api.create_run(thread_id, assistant_id).await?;
    info!(run_id = %run.id, "run created");

    let mut waited = Duration::ZERO;
    let mut action_rounds = 0;
    loop {
        debug!(run_id = %run.id, status = ?run.status, "run status");
        match run.status {
            RunStatus::Completed => break,
            RunStatus::RequiresAction => {
                action_rounds += 1;
                if action_rounds > poll.max_action_rounds {
                    return Err(OpenAIError::Api(format!(
                        "run {} exceeded {} tool action rounds",
                        run.id, poll.max_action_rounds
                    )));
                }

                let calls = run
                    .required_action
                    .as_ref()
                    .map(|action| action.submit_tool_outputs.tool_calls.clone())
                    .unwrap_or_default();

                let mut outputs = Vec::with_capacity(calls.len());
                for payload in &calls {
                    let call = ToolCall::from_payload(payload);
                    let output = resolve_tool_call(registry, &call).await;
                    outputs.push(ToolOutput {
                        tool_call_id: payload.id.clone(),
                        output,
                    });
                }

                run = api.submit_tool_outputs(thread_id, &run.id, &outputs).await?;
            }
            status if status.is_terminal() => {
                return Err(OpenAIError::Api(format!(
                    "run {} ended with status {:?}",
                    run.id, status
                )));
            }
            _ => {
                if waited >= poll.max_wait {
                    return Err(OpenAIError::Api(format!(
                        "run {} still not terminal after {:?}",
                        run.id, poll.max_wait
                    )));
                }
                sleeper.sleep(poll.interval).await;
                waited += poll.interval;
                run = api.get_run(thread_id, &run.id).await?;
            }
        }
    }

    Ok(api
        .latest_assistant_message(thread_id)
        .await?
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use crate::types::FunctionPayload;
    use schemars::JsonSchema;
    use serde::Deserialize as De;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn call_payload(id: &str, name: &str, arguments: &str) -> ToolCallPayload {
        ToolCallPayload {
            id: id.into(),
            kind: "function".into(),
            function: FunctionPayload {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    fn run(status: RunStatus, calls: Vec<ToolCallPayload>) -> Run {
        Run {
            id: "run_1".into(),
            status,
            required_action: if calls.is_empty() {
                None
            } else {
                Some(RequiredAction {
                    submit_tool_outputs: SubmitToolOutputs { tool_calls: calls },
                })
            },
        }
    }

    /// Scripted threads API: each poll/submit pops the next run state.
    struct ScriptedThreads {
        states: Mutex<VecDeque<Run>>,
        submitted: Mutex<Vec<Vec<ToolOutput>>>,
        messages: Mutex<Vec<String>>,
    }

    impl ScriptedThreads {
        fn new(states: Vec<Run>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                submitted: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
            }
        }

        fn next_state(&self) -> Result<Run> {
            self.states
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OpenAIError::Api("script exhausted".into()))
        }
    }

    #[async_trait]
    impl ThreadsApi for ScriptedThreads {
        async fn add_user_message(&self, _thread_id: &str, text: &str) -> Result<()> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run> {
            self.next_state()
        }

        async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run> {
            self.next_state()
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            _run_id: &str,
            outputs: &[ToolOutput],
        ) -> Result<Run> {
            self.submitted.lock().unwrap().push(outputs.to_vec());
            self.next_state()
        }

        async fn latest_assistant_message(&self, _thread_id: &str) -> Result<Option<String>> {
            Ok(Some("final answer".into()))
        }
    }

    /// Records every sleep instead of sleeping.
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Self {
            Self {
                slept: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[derive(De, JsonSchema)]
    struct LookupArgs {
        id: i64,
    }

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        const NAME: &'static str = "getProducts";
        type Args = LookupArgs;
        type Output = serde_json::Value;
        type Error = std::io::Error;

        fn description(&self) -> &str {
            "Gets a product"
        }

        async fn call(
            &self,
            args: Self::Args,
        ) -> std::result::Result<Self::Output, Self::Error> {
            Ok(serde_json::json!([{ "id": args.id }]))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Lookup).unwrap();
        registry
    }

    fn fast_poll() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(5),
            ..PollPolicy::default()
        }
    }

    #[test]
    fn terminal_set_excludes_active_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
    }

    #[tokio::test]
    async fn polls_until_completed() {
        let api = ScriptedThreads::new(vec![
            run(RunStatus::Queued, vec![]),
            run(RunStatus::InProgress, vec![]),
            run(RunStatus::Completed, vec![]),
        ]);
        let sleeper = RecordingSleeper::new();

        let answer = run_to_completion(
            &api,
            "thread_1",
            "asst_1",
            "hello",
            &ToolRegistry::new(),
            &fast_poll(),
            &sleeper,
        )
        .await
        .unwrap();

        assert_eq!(answer, "final answer");
        // One sleep per non-terminal poll, at the policy interval.
        let slept = sleeper.slept.lock().unwrap().clone();
        assert_eq!(slept, vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn requires_action_submits_outputs_in_call_order() {
        let api = ScriptedThreads::new(vec![
            run(
                RunStatus::RequiresAction,
                vec![
                    call_payload("call_a", "getProducts", r#"{"id":7}"#),
                    call_payload("call_b", "getWeather", "{}"),
                ],
            ),
            run(RunStatus::Completed, vec![]),
        ]);
        let sleeper = RecordingSleeper::new();

        run_to_completion(
            &api,
            "thread_1",
            "asst_1",
            "hello",
            &registry(),
            &fast_poll(),
            &sleeper,
        )
        .await
        .unwrap();

        let submitted = api.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        let outputs = &submitted[0];
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].tool_call_id, "call_a");
        assert_eq!(outputs[1].tool_call_id, "call_b");

        // The known tool resolved; the unknown one became an error
        // payload instead of failing the run locally.
        let first: serde_json::Value = serde_json::from_str(&outputs[0].output).unwrap();
        assert_eq!(first[0]["id"], 7);
        assert_eq!(
            outputs[1].output,
            r#"{"error":"function getWeather is not supported"}"#
        );
    }

    #[tokio::test]
    async fn failed_run_is_fatal() {
        let api = ScriptedThreads::new(vec![run(RunStatus::Failed, vec![])]);
        let sleeper = RecordingSleeper::new();

        let err = run_to_completion(
            &api,
            "thread_1",
            "asst_1",
            "hello",
            &ToolRegistry::new(),
            &fast_poll(),
            &sleeper,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OpenAIError::Api(_)));
    }

    #[tokio::test]
    async fn poll_budget_bounds_a_stuck_run() {
        // Never leaves in_progress; the policy caps the wait.
        let states = std::iter::repeat_with(|| run(RunStatus::InProgress, vec![]))
            .take(10)
            .collect();
        let api = ScriptedThreads::new(states);
        let sleeper = RecordingSleeper::new();
        let poll = PollPolicy {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(3),
            ..PollPolicy::default()
        };

        let err = run_to_completion(
            &api,
            "thread_1",
            "asst_1",
            "hello",
            &ToolRegistry::new(),
            &poll,
            &sleeper,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OpenAIError::Api(_)));
        assert_eq!(sleeper.slept.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn action_round_cap_ends_a_looping_run() {
        // Every submit comes back requires_action again.
        let states = std::iter::repeat_with(|| {
            run(
                RunStatus::RequiresAction,
                vec![call_payload("call_x", "getProducts", r#"{"id":1}"#)],
            )
        })
        .take(10)
        .collect();
        let api = ScriptedThreads::new(states);
        let sleeper = RecordingSleeper::new();
        let poll = PollPolicy {
            max_action_rounds: 2,
            ..fast_poll()
        };

        let err = run_to_completion(
            &api,
            "thread_1",
            "asst_1",
            "hello",
            &registry(),
            &poll,
            &sleeper,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OpenAIError::Api(_)));
        // Outputs were submitted up to the cap, then the run was cut off.
        assert_eq!(api.submitted.lock().unwrap().len(), 2);
    }

    #[test]
    fn run_status_deserializes_from_wire_names() {
        let run: Run = serde_json::from_str(
            r#"{"id":"run_9","status":"requires_action","required_action":{
                "submit_tool_outputs":{"tool_calls":[
                    {"id":"call_1","type":"function","function":{"name":"getCustomers","arguments":"{}"}}
                ]}}}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(
            run.required_action.unwrap().submit_tool_outputs.tool_calls[0]
                .function
                .name,
            "getCustomers"
        );
    }
}
