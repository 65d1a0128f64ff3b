//! The reasoning engine: turns one user message into a sequence of LLM calls
//! and capability invocations, then produces a final user-facing answer.
//!
//! A turn goes through these stages:
//!
//! 1. Build context: a fresh conversation gets a system orientation message
//!    describing the bound video or collection, then the user's message.
//!    Continuations only get the user's message.
//! 2. Ask the LLM. Every call consumes one iteration of the budget.
//! 3. Dispatch the requested tool calls in order, one `tool` message per call,
//!    and go back to 2.
//! 4. On a natural stop, summarize the turn with one isolated LLM call. When the
//!    budget runs out the last LLM content is used as-is.
//!
//! The stop token is checked before every LLM call and before every dispatch.
//! Stopping never interrupts work already in flight.

use crate::agent::{AgentContext, AgentResponse, Capability, CapabilityRegistry};
use crate::config::Prompts;
use crate::error::{MontageError, Result};
use crate::library::{Collection, Video};
use crate::llm::{LlmGateway, LlmResponse};
use crate::session::{ContentBody, ContextMessage, MsgStatus, OutputContent, OutputMessage, Session, ToolCall};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default number of LLM reasoning calls per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Agent name the engine writes its own output entries under.
const ENGINE_AGENT: &str = "assistant";

/// Tool result recorded for calls skipped because the run was stopped.
const SKIPPED_MESSAGE: &str = "Not executed: the run was stopped before this call.";

/// Result of one call to [`ReasoningEngine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More reasoning is needed.
    Continue,
    /// The turn reached a final answer or failed; the output is published.
    Finished,
    /// The stop flag was set; nothing further will run.
    Stopped,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Final answer published with success.
    Completed,
    /// Final answer published, but at least one capability reported an error.
    CompletedWithErrors,
    /// The LLM failed; an error entry was published.
    Failed,
    /// Stopped from outside (caller or capability) before a final answer.
    Stopped,
}

/// Orchestration loop for one turn of a session.
pub struct ReasoningEngine<'a> {
    session: &'a mut Session,
    input: String,
    llm: Arc<dyn LlmGateway>,
    registry: CapabilityRegistry,
    prompts: Prompts,
    max_iterations: usize,
    remaining: usize,
    context_built: bool,
    stop: CancellationToken,
    failed_agents: BTreeSet<String>,
    outcome: Option<RunOutcome>,
}

impl<'a> ReasoningEngine<'a> {
    pub fn new(
        session: &'a mut Session,
        input: impl Into<String>,
        llm: Arc<dyn LlmGateway>,
        registry: CapabilityRegistry,
        prompts: Prompts,
    ) -> Self {
        Self {
            session,
            input: input.into(),
            llm,
            registry,
            prompts,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            remaining: DEFAULT_MAX_ITERATIONS,
            context_built: false,
            stop: CancellationToken::new(),
            failed_agents: BTreeSet::new(),
            outcome: None,
        }
    }

    /// Set the iteration budget (at least one).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self.remaining = self.max_iterations;
        self
    }

    /// Use an externally owned stop token.
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Ask the loop to stop before its next LLM call or dispatch.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Capabilities that reported an error during this turn.
    pub fn failed_agents(&self) -> &BTreeSet<String> {
        &self.failed_agents
    }

    pub fn remaining_iterations(&self) -> usize {
        self.remaining
    }

    /// Run the turn to completion, failure or stop.
    ///
    /// Returns an error only for contract violations: the LLM requested a
    /// capability that is not registered.
    #[instrument(skip(self), fields(session_id = %self.session.session_id))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if self.is_stopped() {
            return Ok(self.finish());
        }
        self.remaining = self.max_iterations;
        self.build_context();

        let output = &mut self.session.output_message;
        output.actions.push("Reasoning the message..".to_string());
        output.push_update();

        let mut iteration = 0;
        loop {
            debug!("Reasoning iteration {} ({} left)", iteration, self.remaining);
            match self.step().await? {
                StepOutcome::Continue => iteration += 1,
                StepOutcome::Finished | StepOutcome::Stopped => break,
            }
        }

        Ok(self.finish())
    }

    /// Run one reasoning iteration: one LLM call and the dispatch of its tool calls.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if self.is_stopped() {
            return Ok(StepOutcome::Stopped);
        }
        if self.remaining == 0 {
            return Ok(StepOutcome::Finished);
        }
        if !self.context_built {
            self.build_context();
        }
        self.remaining -= 1;

        let tools = self.registry.descriptors();
        let response = match self
            .llm
            .chat_completions(self.session.reasoning_context.messages(), &tools, None)
            .await
        {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                self.fail_reasoning(&response.content);
                return Ok(StepOutcome::Finished);
            }
            Err(e) => {
                warn!("Reasoning call failed: {}", e);
                self.fail_reasoning(&e.to_string());
                return Ok(StepOutcome::Finished);
            }
        };

        // A stop that arrived during the call discards the reply.
        if self.is_stopped() {
            info!("Run stopped during the reasoning call, discarding the response");
            return Ok(StepOutcome::Stopped);
        }

        info!(
            "LLM responded: finish={:?}, tool_calls={}, tokens={}",
            response.finish_reason,
            response.tool_calls.len(),
            response.total_tokens
        );

        if !response.tool_calls.is_empty() {
            let capabilities = self.resolve(&response.tool_calls)?;
            self.session.reasoning_context.push(ContextMessage::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            self.dispatch(&response.tool_calls, capabilities).await;

            if self.is_stopped() {
                return Ok(StepOutcome::Stopped);
            }
            if self.remaining == 0 {
                self.respond_directly(&response.content);
                return Ok(StepOutcome::Finished);
            }
            return Ok(StepOutcome::Continue);
        }

        self.session
            .reasoning_context
            .push(ContextMessage::assistant(response.content.clone()));

        if self.remaining == 0 {
            self.respond_directly(&response.content);
            Ok(StepOutcome::Finished)
        } else if response.finish_reason.is_terminal() {
            Ok(self.summarize(&response).await)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    fn build_context(&mut self) {
        if self.context_built {
            return;
        }
        if self.session.reasoning_context.is_empty() {
            let orientation = self.orientation();
            self.session.reasoning_context.push(ContextMessage::system(orientation));
        }
        self.session
            .reasoning_context
            .push(ContextMessage::user(self.input.clone()));
        self.context_built = true;
    }

    /// System message describing what the session is working on.
    fn orientation(&self) -> String {
        let templates = &self.prompts.reasoning;
        let state = &self.session.state;
        let mut template = templates.system.clone();
        let mut vars = HashMap::new();

        if let Some(video) = &state.video {
            insert_collection_vars(&mut vars, state.collection.as_ref(), self.session.collection_id.as_deref());
            insert_video_vars(&mut vars, video);
            template.push_str(&templates.video_context);
        } else if let Some(collection) = &state.collection {
            insert_collection_vars(&mut vars, Some(collection), None);
            vars.insert("videos".to_string(), bullet_list(collection.videos.iter().map(Video::summary_line)));
            vars.insert(
                "images".to_string(),
                bullet_list(collection.images.iter().map(|i| i.summary_line())),
            );
            template.push_str(&templates.collection_context);
        }

        self.prompts.render_with_custom(&template, &vars)
    }

    /// Look up every requested capability before anything is dispatched.
    fn resolve(&self, calls: &[ToolCall]) -> Result<Vec<Arc<dyn Capability>>> {
        calls
            .iter()
            .map(|call| {
                self.registry
                    .get(call.name())
                    .ok_or_else(|| MontageError::UnknownCapability(call.name().to_string()))
            })
            .collect()
    }

    async fn dispatch(&mut self, calls: &[ToolCall], capabilities: Vec<Arc<dyn Capability>>) {
        for (call, capability) in calls.iter().zip(capabilities) {
            let result = if self.is_stopped() {
                info!("Skipping {} ({}): run stopped", call.name(), call.id);
                AgentResponse::error(SKIPPED_MESSAGE)
            } else {
                let response = self.run_agent(capability.as_ref(), call).await;
                if response.is_error() {
                    self.failed_agents.insert(call.name().to_string());
                }
                response
            };
            self.session
                .reasoning_context
                .push(ContextMessage::tool(result.to_string(), call.id.clone()));
        }
    }

    async fn run_agent(&mut self, capability: &dyn Capability, call: &ToolCall) -> AgentResponse {
        let name = call.name();
        info!("Running {} agent", name);
        debug!("Arguments: {:?}", call.tool.arguments);

        let output = &mut self.session.output_message;
        output.actions.push(format!("Running @{} agent", name));
        output.agents.push(name.to_string());
        output.push_update();

        let mut ctx = AgentContext::new(
            &mut self.session.output_message,
            self.session.session_id.clone(),
            self.session.collection_id.clone(),
            self.session.video_id.clone(),
            self.stop.clone(),
        );
        let response = capability.safe_call(call.tool.arguments.clone(), &mut ctx).await;

        info!("Agent {} finished with {:?}: {}", name, response.status, response.message);
        response
    }

    /// Summarize the current turn with an isolated LLM call.
    async fn summarize(&mut self, response: &LlmResponse) -> StepOutcome {
        if self.is_stopped() {
            return StepOutcome::Stopped;
        }
        let idx = self.begin_summary();

        let mut vars = HashMap::new();
        vars.insert("query".to_string(), self.input.clone());
        let instruction = self
            .prompts
            .render_with_custom(&self.prompts.reasoning.summarization, &vars);

        // The instruction lives only in this request, never in the session context.
        let mut messages = self.session.reasoning_context.current_run().to_vec();
        messages.push(ContextMessage::system(instruction));

        let text = match self.llm.chat_completions(&messages, &[], None).await {
            Ok(summary) if summary.is_success() => summary.content,
            Ok(summary) => {
                warn!("Summarization failed, using the raw answer: {}", summary.content);
                response.content.clone()
            }
            Err(e) => {
                warn!("Summarization failed, using the raw answer: {}", e);
                response.content.clone()
            }
        };

        self.complete(idx, text, "Final Cut");
        StepOutcome::Finished
    }

    /// Budget exhausted: the last LLM content is the answer.
    fn respond_directly(&mut self, content: &str) {
        info!("Iteration budget exhausted, responding directly");
        let idx = self.begin_summary();
        self.complete(idx, content.to_string(), "Here is the response");
    }

    fn begin_summary(&mut self) -> usize {
        let output = &mut self.session.output_message;
        let idx = output.push_content(OutputContent::text(ENGINE_AGENT, "Consolidating outcomes..."));
        output.push_update();
        idx
    }

    fn complete(&mut self, idx: usize, text: String, status_message: &str) {
        let (status, outcome) = if self.failed_agents.is_empty() {
            (MsgStatus::Success, RunOutcome::Completed)
        } else {
            (MsgStatus::Error, RunOutcome::CompletedWithErrors)
        };

        let output = &mut self.session.output_message;
        let entry = &mut output.content[idx];
        entry.body = ContentBody::Text { text };
        entry.finish(status, status_message);
        output.status = status;
        self.publish(outcome);
    }

    fn fail_reasoning(&mut self, message: &str) {
        let mut entry = OutputContent::text(ENGINE_AGENT, "Error in reasoning");
        entry.body = ContentBody::Text {
            text: message.to_string(),
        };
        entry.status = MsgStatus::Error;

        let output = &mut self.session.output_message;
        output.push_content(entry);
        output.actions.push("Failed to reason the message".to_string());
        output.status = MsgStatus::Error;
        self.publish(RunOutcome::Failed);
    }

    /// Publish the final output and stop the loop.
    fn publish(&mut self, outcome: RunOutcome) {
        self.session.output_message.publish();
        self.outcome = Some(outcome);
        self.stop.cancel();
        info!("Turn finished: {:?}", outcome);
    }

    /// Make sure the output is published with a coherent status.
    fn finish(&mut self) -> RunOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        let output: &mut OutputMessage = &mut self.session.output_message;
        info!("Run stopped before a final answer");
        output.actions.push("Run stopped".to_string());
        output.status = MsgStatus::Error;
        output.publish();
        self.outcome = Some(RunOutcome::Stopped);
        RunOutcome::Stopped
    }
}

fn insert_collection_vars(vars: &mut HashMap<String, String>, collection: Option<&Collection>, fallback_id: Option<&str>) {
    let (name, id, description) = match collection {
        Some(c) => (c.name.clone(), c.id.clone(), c.description.clone()),
        None => (
            "unknown".to_string(),
            fallback_id.unwrap_or("n/a").to_string(),
            String::new(),
        ),
    };
    vars.insert("collection_name".to_string(), name);
    vars.insert("collection_id".to_string(), id);
    vars.insert("collection_description".to_string(), description);
}

fn insert_video_vars(vars: &mut HashMap<String, String>, video: &Video) {
    vars.insert("video_name".to_string(), video.name.clone());
    vars.insert("video_id".to_string(), video.id.clone());
    vars.insert("video_description".to_string(), video.description.clone());
    vars.insert("video_length".to_string(), format!("{:.0}s", video.length));
}

fn bullet_list(lines: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;
    use crate::llm::testing::ScriptedGateway;
    use crate::llm::FinishReason;
    use crate::session::{Role, SessionState};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    /// Test capability that records its invocations.
    struct Recorder {
        name: &'static str,
        response: AgentResponse,
        calls: Mutex<Vec<Map<String, Value>>>,
        /// Cancelled when the capability runs, to simulate a stop arriving mid-dispatch.
        stop_on_call: Option<CancellationToken>,
    }

    impl Recorder {
        fn new(name: &'static str, response: AgentResponse) -> Arc<Self> {
            Arc::new(Self {
                name,
                response,
                calls: Mutex::new(Vec::new()),
                stop_on_call: None,
            })
        }

        fn stopping(name: &'static str, stop: CancellationToken) -> Arc<Self> {
            Arc::new(Self {
                name,
                response: AgentResponse::success("done", Value::Null),
                calls: Mutex::new(Vec::new()),
                stop_on_call: Some(stop),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Capability for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records invocations"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse> {
            self.calls.lock().unwrap().push(args);
            ctx.output
                .push_content(OutputContent::text(self.name, "working"));
            if let Some(stop) = &self.stop_on_call {
                stop.cancel();
            }
            Ok(self.response.clone())
        }
    }

    fn registry(capabilities: &[Arc<Recorder>]) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for capability in capabilities {
            registry.register(capability.clone()).unwrap();
        }
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, Map::new())
    }

    fn tool_ids(session: &Session) -> Vec<String> {
        session
            .reasoning_context
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.clone())
            .collect()
    }

    async fn run_turn(
        session: &mut Session,
        gateway: Arc<ScriptedGateway>,
        registry: CapabilityRegistry,
        input: &str,
        max_iterations: usize,
    ) -> (RunOutcome, BTreeSet<String>) {
        let mut engine = ReasoningEngine::new(session, input, gateway, registry, Prompts::default())
            .with_max_iterations(max_iterations);
        let outcome = engine.run().await.unwrap();
        (outcome, engine.failed_agents().clone())
    }

    #[tokio::test]
    async fn test_sunset_clip_scenario() {
        let video_generation = Recorder::new(
            "video_generation",
            AgentResponse::success("Video generated", json!({"video_id": "v1"})),
        );
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls(
                "",
                vec![ToolCall::new(
                    "call_1",
                    "video_generation",
                    args(json!({"prompt": "sunset", "duration": 5})),
                )],
            ),
            LlmResponse::text("Your sunset clip is ready."),
            LlmResponse::text("I generated a 5-second sunset clip for you."),
        ]));
        let mut session = Session::new(None, None, None);

        let (outcome, failed) = run_turn(
            &mut session,
            gateway.clone(),
            registry(&[video_generation.clone()]),
            "generate a 5-second clip of a sunset",
            10,
        )
        .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(failed.is_empty());

        let roles: Vec<Role> = session.reasoning_context.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let with_tools: Vec<_> = session
            .reasoning_context
            .messages()
            .iter()
            .filter(|m| !m.tool_calls.is_empty())
            .collect();
        assert_eq!(with_tools.len(), 1);
        assert_eq!(tool_ids(&session), vec!["call_1"]);

        let tool_message: Value = serde_json::from_str(&session.reasoning_context.messages()[3].content).unwrap();
        assert_eq!(tool_message["data"]["video_id"], "v1");

        let recorded = video_generation.calls.lock().unwrap().clone();
        assert_eq!(recorded, vec![args(json!({"prompt": "sunset", "duration": 5}))]);

        let output = &session.output_message;
        assert!(output.is_published());
        assert_eq!(output.status, MsgStatus::Success);
        assert_eq!(output.agents, vec!["video_generation"]);
        assert_eq!(
            output.actions,
            vec!["Reasoning the message..", "Running @video_generation agent"]
        );
        assert_eq!(output.final_text(), Some("I generated a 5-second sunset clip for you."));
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_messages_follow_requested_order() {
        let media = Recorder::new("media_library", AgentResponse::success("ok", Value::Null));
        let image = Recorder::new("image_generation", AgentResponse::success("ok", Value::Null));
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls(
                "Looking things up",
                vec![call("c-3", "image_generation"), call("c-1", "media_library"), call("c-2", "image_generation")],
            ),
            LlmResponse::text("done"),
            LlmResponse::text("summary"),
        ]));
        let mut session = Session::new(None, None, None);

        run_turn(&mut session, gateway, registry(&[media.clone(), image.clone()]), "go", 10).await;

        assert_eq!(tool_ids(&session), vec!["c-3", "c-1", "c-2"]);
        assert!(session.reasoning_context.tool_results_are_correlated());
        assert_eq!(image.call_count(), 2);
        assert_eq!(media.call_count(), 1);
        // The assistant message precedes its tool results
        assert_eq!(session.reasoning_context.messages()[2].tool_calls.len(), 3);
        assert_eq!(session.reasoning_context.messages()[2].content, "Looking things up");
    }

    #[tokio::test]
    async fn test_failed_sibling_call_marks_turn_error() {
        let image = Recorder::new("image_generation", AgentResponse::success("ok", json!({"url": "x"})));
        let audio = Recorder::new("audio_generation", AgentResponse::error("voice service unavailable"));
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls("", vec![call("a", "audio_generation"), call("b", "image_generation")]),
            LlmResponse::text("The image worked, the narration did not."),
            LlmResponse::text("I made the image but the voiceover failed."),
        ]));
        let mut session = Session::new(None, None, None);

        let (outcome, failed) = run_turn(
            &mut session,
            gateway,
            registry(&[image.clone(), audio.clone()]),
            "make a title card with narration",
            10,
        )
        .await;

        assert_eq!(outcome, RunOutcome::CompletedWithErrors);
        assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec!["audio_generation"]);
        // The failure did not prevent the sibling call
        assert_eq!(image.call_count(), 1);
        assert_eq!(tool_ids(&session), vec!["a", "b"]);

        let output = &session.output_message;
        assert!(output.is_published());
        assert_eq!(output.status, MsgStatus::Error);
        assert_eq!(output.final_text(), Some("I made the image but the voiceover failed."));
        let summary = output.content.last().unwrap();
        assert_eq!(summary.status, MsgStatus::Error);
        assert_eq!(summary.status_message, "Final Cut");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_uses_raw_content() {
        let media = Recorder::new("media_library", AgentResponse::success("ok", Value::Null));
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls("Checking the library", vec![call("1", "media_library")]),
            LlmResponse::with_tool_calls("Still checking the library", vec![call("2", "media_library")]),
            LlmResponse::text("never requested"),
        ]));
        let mut session = Session::new(None, None, None);

        let (outcome, _) = run_turn(&mut session, gateway.clone(), registry(&[media.clone()]), "find b-roll", 2).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(media.call_count(), 2);

        let output = &session.output_message;
        assert_eq!(output.final_text(), Some("Still checking the library"));
        assert_eq!(output.content.last().unwrap().status_message, "Here is the response");
        assert_eq!(output.status, MsgStatus::Success);
        assert!(output.is_published());
    }

    #[tokio::test]
    async fn test_summarization_prompt_is_not_persisted() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::text("Happy to help with your edit."),
            LlmResponse::text("Summary for the user."),
        ]));
        let mut session = Session::new(None, None, None);
        session.reasoning_context.push(ContextMessage::system("orientation"));
        session.reasoning_context.push(ContextMessage::user("earlier request"));
        session.reasoning_context.push(ContextMessage::assistant("earlier answer"));
        let before = session.reasoning_context.len();

        run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "hello again", 10).await;

        // One user message and one assistant answer; no summarization instruction.
        assert_eq!(session.reasoning_context.len(), before + 2);
        let systems = session
            .reasoning_context
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(systems, 1);

        // The summary request saw only the current turn plus the instruction.
        let requests = gateway.requests();
        let summary_request = &requests[1];
        assert_eq!(summary_request.messages.len(), 3);
        assert_eq!(summary_request.messages[0].content, "hello again");
        assert_eq!(summary_request.messages[2].role, Role::System);
        assert!(summary_request.messages[2].content.contains("\"hello again\""));
        assert!(summary_request.tool_names.is_empty());
    }

    #[tokio::test]
    async fn test_stop_between_sibling_calls() {
        let stop = CancellationToken::new();
        let first = Recorder::stopping("media_library", stop.clone());
        let second = Recorder::new("image_generation", AgentResponse::success("ok", Value::Null));
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls("", vec![call("1", "media_library"), call("2", "image_generation")]),
            LlmResponse::text("never requested"),
        ]));
        let mut session = Session::new(None, None, None);

        let outcome = {
            let mut engine = ReasoningEngine::new(
                &mut session,
                "cut a teaser",
                gateway.clone(),
                registry(&[first.clone(), second.clone()]),
                Prompts::default(),
            )
            .with_stop_token(stop);
            engine.run().await.unwrap()
        };

        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 0);
        assert_eq!(gateway.call_count(), 1);

        // One tool message per requested call; the skipped one is marked as such.
        assert_eq!(tool_ids(&session), vec!["1", "2"]);
        let skipped: AgentResponse = serde_json::from_str(&session.reasoning_context.last().unwrap().content).unwrap();
        assert_eq!(skipped.status, AgentStatus::Error);
        assert_eq!(skipped.message, SKIPPED_MESSAGE);

        let output = &session.output_message;
        assert!(output.is_published());
        assert_eq!(output.status, MsgStatus::Error);
        assert_eq!(output.agents, vec!["media_library"]);
        assert!(output.content.iter().all(|c| c.status_message != "Final Cut"));
        assert_eq!(output.actions.last().map(String::as_str), Some("Run stopped"));
    }

    #[test]
    fn test_step_after_stop_does_nothing() {
        tokio_test::block_on(async {
            let media = Recorder::new("media_library", AgentResponse::success("ok", Value::Null));
            let gateway = Arc::new(ScriptedGateway::new(vec![LlmResponse::with_tool_calls(
                "",
                vec![call("1", "media_library")],
            )]));
            let mut session = Session::new(None, None, None);

            let mut engine = ReasoningEngine::new(
                &mut session,
                "list my videos",
                gateway.clone(),
                registry(&[media.clone()]),
                Prompts::default(),
            );
            engine.stop();

            assert_eq!(engine.step().await.unwrap(), StepOutcome::Stopped);
            assert_eq!(engine.step().await.unwrap(), StepOutcome::Stopped);
            assert_eq!(engine.run().await.unwrap(), RunOutcome::Stopped);
            assert_eq!(engine.remaining_iterations(), DEFAULT_MAX_ITERATIONS);
            drop(engine);

            assert_eq!(gateway.call_count(), 0);
            assert_eq!(media.call_count(), 0);
            assert!(session.output_message.is_published());
            // No unanswered user message is left behind
            assert!(session.reasoning_context.is_empty());
            assert!(!session.output_message.actions.contains(&"Reasoning the message..".to_string()));
        });
    }

    /// Answers every call with plain text and cancels the run during the first one.
    struct StopDuringCallGateway {
        stop: CancellationToken,
        inner: ScriptedGateway,
    }

    #[async_trait]
    impl LlmGateway for StopDuringCallGateway {
        async fn chat_completions(
            &self,
            messages: &[ContextMessage],
            tools: &[crate::llm::ToolDescriptor],
            response_format: Option<crate::llm::ResponseFormat>,
        ) -> Result<LlmResponse> {
            self.stop.cancel();
            self.inner.chat_completions(messages, tools, response_format).await
        }

        fn model_name(&self) -> &str {
            "stop-during-call"
        }
    }

    #[tokio::test]
    async fn test_stop_during_reasoning_call_skips_summary() {
        let stop = CancellationToken::new();
        let gateway = Arc::new(StopDuringCallGateway {
            stop: stop.clone(),
            inner: ScriptedGateway::new(vec![LlmResponse::text("raw answer"), LlmResponse::text("summary")]),
        });
        let mut session = Session::new(None, None, None);

        let outcome = {
            let mut engine = ReasoningEngine::new(
                &mut session,
                "trim the intro",
                gateway.clone(),
                CapabilityRegistry::new(),
                Prompts::default(),
            )
            .with_stop_token(stop);
            engine.run().await.unwrap()
        };

        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(gateway.inner.call_count(), 1);

        let output = &session.output_message;
        assert!(output.is_published());
        assert_eq!(output.status, MsgStatus::Error);
        assert_eq!(output.final_text(), None);
        assert_eq!(output.actions.last().map(String::as_str), Some("Run stopped"));
        // The discarded reply never reaches the context
        assert_eq!(session.reasoning_context.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_step_after_final_answer_does_nothing() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::text("answer"),
            LlmResponse::text("summary"),
            LlmResponse::text("never requested"),
        ]));
        let mut session = Session::new(None, None, None);

        let mut engine = ReasoningEngine::new(
            &mut session,
            "hi",
            gateway.clone(),
            CapabilityRegistry::new(),
            Prompts::default(),
        );
        assert_eq!(engine.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(engine.step().await.unwrap(), StepOutcome::Stopped);
        drop(engine);

        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_publishes_error() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        gateway.push_error("connection reset");
        let mut session = Session::new(None, None, None);

        let (outcome, _) = run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "hello", 10).await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(gateway.call_count(), 1);

        let output = &session.output_message;
        assert!(output.is_published());
        assert_eq!(output.status, MsgStatus::Error);
        assert_eq!(output.content.len(), 1);
        assert_eq!(output.content[0].status_message, "Error in reasoning");
        assert!(output.content[0].text_body().unwrap().contains("connection reset"));
        assert!(output.actions.contains(&"Failed to reason the message".to_string()));
    }

    #[tokio::test]
    async fn test_unsuccessful_llm_status_is_terminal() {
        let gateway = Arc::new(ScriptedGateway::new(vec![LlmResponse::failure("quota exceeded")]));
        let mut session = Session::new(None, None, None);

        let (outcome, _) = run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "hello", 10).await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(session.output_message.content[0].text_body(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_raw_content() {
        let gateway = Arc::new(ScriptedGateway::new(vec![LlmResponse::text(
            "Here's a three-shot plan for your intro.",
        )]));
        gateway.push_error("summary call timed out");
        let mut session = Session::new(None, None, None);

        let (outcome, _) = run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "plan my intro", 10).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            session.output_message.final_text(),
            Some("Here's a three-shot plan for your intro.")
        );
        assert_eq!(session.output_message.status, MsgStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_capability_is_contract_violation() {
        let media = Recorder::new("media_library", AgentResponse::success("ok", Value::Null));
        let gateway = Arc::new(ScriptedGateway::new(vec![LlmResponse::with_tool_calls(
            "",
            vec![call("1", "media_library"), call("2", "video_editing")],
        )]));
        let mut session = Session::new(None, None, None);

        let result = {
            let mut engine = ReasoningEngine::new(
                &mut session,
                "edit it",
                gateway,
                registry(&[media.clone()]),
                Prompts::default(),
            );
            engine.run().await
        };

        assert!(matches!(result, Err(MontageError::UnknownCapability(name)) if name == "video_editing"));
        // Nothing was dispatched and the context holds no dangling tool calls.
        assert_eq!(media.call_count(), 0);
        assert!(session
            .reasoning_context
            .messages()
            .iter()
            .all(|m| m.tool_calls.is_empty()));
    }

    #[tokio::test]
    async fn test_non_terminal_finish_keeps_reasoning() {
        let mut truncated = LlmResponse::text("partial thought");
        truncated.finish_reason = FinishReason::Length;
        let gateway = Arc::new(ScriptedGateway::new(vec![
            truncated,
            LlmResponse::text("full answer"),
            LlmResponse::text("summary"),
        ]));
        let mut session = Session::new(None, None, None);

        run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "explain", 10).await;

        assert_eq!(gateway.call_count(), 3);
        assert_eq!(session.output_message.final_text(), Some("summary"));
    }

    #[tokio::test]
    async fn test_orientation_describes_bound_video() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::text("answer"),
            LlmResponse::text("summary"),
        ]));
        let mut session = Session::new(None, Some("c1".to_string()), Some("v-sunset".to_string()));
        session.state = SessionState {
            collection: Some(Collection {
                id: "c1".to_string(),
                name: "Travel".to_string(),
                description: String::new(),
                videos: vec![],
                images: vec![],
            }),
            video: Some(Video {
                id: "v-sunset".to_string(),
                name: "Sunset at the pier".to_string(),
                description: "Golden hour".to_string(),
                length: 42.0,
                stream_url: None,
            }),
        };

        run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "summarize this", 10).await;

        let first = &gateway.requests()[0].messages[0];
        assert_eq!(first.role, Role::System);
        assert!(first.content.contains("video_id: v-sunset"));
        assert!(first.content.contains("\"Travel\""));
        assert!(first.content.contains("42s"));
    }

    #[tokio::test]
    async fn test_orientation_lists_collection_videos() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::text("answer"),
            LlmResponse::text("summary"),
        ]));
        let mut session = Session::new(None, Some("c1".to_string()), None);
        session.state.collection = Some(Collection {
            id: "c1".to_string(),
            name: "Travel".to_string(),
            description: "Coast trip".to_string(),
            videos: vec![Video {
                id: "v1".to_string(),
                name: "Harbor".to_string(),
                description: String::new(),
                length: 10.0,
                stream_url: None,
            }],
            images: vec![],
        });

        run_turn(&mut session, gateway.clone(), CapabilityRegistry::new(), "what do I have?", 10).await;

        let orientation = &session.reasoning_context.messages()[0].content;
        assert!(orientation.contains("video_id: v1"));
        assert!(orientation.contains("Coast trip"));
        assert!(orientation.contains("Images in this collection:\nNone"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_dispatch_before_final_answer() {
        let media = Recorder::new("media_library", AgentResponse::success("ok", Value::Null));
        let gateway = Arc::new(ScriptedGateway::new(vec![
            LlmResponse::with_tool_calls("", vec![call("1", "media_library")]),
            LlmResponse::text("answer"),
            LlmResponse::text("summary"),
        ]));
        let mut session = Session::new(None, None, None);
        let mut rx = session.output_message.subscribe();

        run_turn(&mut session, gateway, registry(&[media]), "list videos", 10).await;

        let mut snapshots = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            snapshots.push(snapshot);
        }
        let running = snapshots
            .iter()
            .position(|s| s.actions.iter().any(|a| a == "Running @media_library agent"))
            .unwrap();
        let published = snapshots.iter().position(|s| s.published).unwrap();
        assert!(running < published);
        assert_eq!(snapshots.iter().filter(|s| s.published).count(), 1);
    }
}
