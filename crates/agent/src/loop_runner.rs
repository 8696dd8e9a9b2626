//! The agent tool-use loop.
//!
//! One inbound message drives a bounded cycle of LLM calls and tool
//! dispatches until the model produces a final text answer, the iteration
//! cap is hit, the turn is cancelled, or the provider fails. Sessions are
//! processed serially per (channel, chat); different sessions run in
//! parallel.

use crate::bootstrap::{BootstrapConfig, SessionKind};
use crate::context::ContextBuilder;
use crate::pruning::{apply_pruning, PruningConfig};
use crate::session::SessionStore;
use crate::summary::{split_for_summarization, summarize_multipart};
use crate::token::estimate_outbound_tokens;
use crate::truncation::truncate_tool_result;
use crate::window::evaluate_context_window_guard;
use picoclaw_config::{AgentDefaults, Config};
use picoclaw_core::{
    Error, InboundMessage, Message, OutboundMessage, Provider, ProviderRequest, ToolCall,
    ToolContext, ToolRegistry,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Messages kept out of summarization at the tail of the history.
const SUMMARY_KEEP_RECENT: usize = 6;

/// Summarize when the estimated history tokens pass this share of the window.
const SUMMARIZE_THRESHOLD_RATIO: f64 = 0.75;

/// Or when the history grows past this many messages.
const SUMMARIZE_MIN_MESSAGES: usize = 20;

/// Tools excluded from subagent registries to prevent unbounded recursion.
const SUBAGENT_EXCLUDED_TOOLS: &[&str] = &["spawn", "subagent"];

const MAX_ITERATIONS_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Rebuilds the tool registry from a fresh config on hot reload.
pub type ToolFactory = Box<dyn Fn(&Config) -> ToolRegistry + Send + Sync>;

/// The user bound to the turn in flight, shared with contextual tools so
/// memory operations resolve per-user paths.
#[derive(Clone, Default)]
pub struct CurrentUser(Arc<RwLock<String>>);

impl CurrentUser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: &str) {
        *self.0.write().unwrap() = user_id.to_string();
    }

    pub fn get(&self) -> String {
        self.0.read().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.write().unwrap().clear();
    }
}

enum DriveOutcome {
    Final(String),
    MaxIterations,
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: RwLock<Arc<ToolRegistry>>,
    context: ContextBuilder,
    sessions: SessionStore,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    current_user: CurrentUser,
    tool_factory: Option<ToolFactory>,

    model: RwLock<String>,
    temperature: RwLock<f64>,
    context_window: AtomicUsize,
    max_tool_iterations: AtomicUsize,
    pruning: RwLock<PruningConfig>,

    /// One turn at a time per session; different sessions in parallel.
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        context: ContextBuilder,
        sessions: SessionStore,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        defaults: &AgentDefaults,
    ) -> Self {
        context.set_tool_summaries(tools.summaries());
        context.set_bootstrap_config(BootstrapConfig {
            max_chars: defaults.bootstrap_max_chars,
            total_max_chars: defaults.bootstrap_total_max_chars,
        });
        evaluate_context_window_guard(defaults.max_tokens as usize);

        Self {
            provider,
            tools: RwLock::new(Arc::new(tools)),
            context,
            sessions,
            outbound,
            current_user: CurrentUser::new(),
            tool_factory: None,
            model: RwLock::new(defaults.model.clone()),
            temperature: RwLock::new(defaults.temperature),
            context_window: AtomicUsize::new(defaults.max_tokens as usize),
            max_tool_iterations: AtomicUsize::new(defaults.max_tool_iterations as usize),
            pruning: RwLock::new(PruningConfig::from(&defaults.context_pruning)),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Install the factory used by [`AgentLoop::reload_tools`].
    pub fn with_tool_factory(mut self, factory: ToolFactory) -> Self {
        self.tool_factory = Some(factory);
        self
    }

    /// Share an externally-created user binding (so tools built before the
    /// loop see the same one).
    pub fn with_current_user(mut self, current_user: CurrentUser) -> Self {
        self.current_user = current_user;
        self
    }

    /// The current-user binding, for wiring into contextual tools.
    pub fn current_user(&self) -> CurrentUser {
        self.current_user.clone()
    }

    pub fn model(&self) -> String {
        self.model.read().unwrap().clone()
    }

    pub fn context_builder(&self) -> &ContextBuilder {
        &self.context
    }

    // --- Hot-update hooks (invoked by the reload manager, never mid-turn) ---

    pub fn update_model(&self, model: impl Into<String>) {
        let model = model.into();
        info!(%model, "Model updated");
        *self.model.write().unwrap() = model;
    }

    pub fn update_context_window(&self, tokens: usize) {
        evaluate_context_window_guard(tokens);
        self.context_window.store(tokens, Ordering::Relaxed);
    }

    pub fn update_temperature(&self, temperature: f64) {
        *self.temperature.write().unwrap() = temperature;
    }

    pub fn update_max_tool_iterations(&self, max: usize) {
        self.max_tool_iterations.store(max, Ordering::Relaxed);
    }

    pub fn update_bootstrap_config(&self, config: BootstrapConfig) {
        self.context.set_bootstrap_config(config);
    }

    pub fn update_pruning_config(&self, config: PruningConfig) {
        *self.pruning.write().unwrap() = config;
    }

    pub fn update_additional_memory_dir(&self, dir: Option<PathBuf>) {
        self.context.memory().set_additional_dir(dir);
    }

    /// Swap in a freshly-built tool registry. In-flight dispatches keep the
    /// previous registry alive through their `Arc`.
    pub fn reload_tools(&self, config: &Config) -> Result<(), Error> {
        let Some(factory) = &self.tool_factory else {
            return Err(Error::Internal("no tool factory configured".into()));
        };
        let registry = Arc::new(factory(config));
        self.context.set_tool_summaries(registry.summaries());
        info!(tools = registry.len(), "Tool registry reloaded");
        *self.tools.write().unwrap() = registry;
        Ok(())
    }

    pub fn invalidate_bootstrap_cache(&self) {
        self.context.invalidate_bootstrap_cache();
    }

    pub fn reload_skills_summary(&self) {
        self.context.reload_skills_summary();
    }

    pub fn skills_info(&self) -> (usize, Vec<String>) {
        self.context.skills_info()
    }

    fn tools_snapshot(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.tools.read().unwrap())
    }

    fn turn_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Built-in slash commands, handled without an LLM round trip.
    /// Unknown commands fall through to the model.
    fn handle_slash_command(&self, inbound: &InboundMessage) -> Option<String> {
        match inbound.content.trim() {
            "/help" => Some("Commands: /help, /show model, /show channel".to_string()),
            "/show model" => Some(format!("Current model: {}", self.model())),
            "/show channel" => Some(format!(
                "Channel: {} / Chat ID: {}",
                inbound.channel, inbound.chat_id
            )),
            _ => None,
        }
    }

    fn publish(&self, channel: &str, chat_id: &str, content: &str) {
        let _ = self.outbound.send(OutboundMessage {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        });
    }

    /// Process one inbound message to completion, emitting the final answer
    /// outbound. Returns the final text (possibly suppressed from emission
    /// by message-tool deduplication).
    pub async fn process_message(
        &self,
        inbound: &InboundMessage,
        kind: SessionKind,
        cancel: CancellationToken,
    ) -> Result<String, Error> {
        let session_key = format!("{}:{}", inbound.channel, inbound.chat_id);
        let turn_lock = self.turn_lock(&session_key);
        let _turn = turn_lock.lock().await;

        if let Some(reply) = self.handle_slash_command(inbound) {
            self.publish(&inbound.channel, &inbound.chat_id, &reply);
            return Ok(reply);
        }

        // Bind the user so memory tools resolve per-user paths.
        // Cron/subagent sessions stay on shared memory for isolation.
        let user_id = match kind {
            SessionKind::Main => inbound.sender_id.clone(),
            _ => String::new(),
        };
        self.current_user.set(&user_id);

        let mut history = self.sessions.history(&session_key);
        let mut summary = self.sessions.summary(&session_key);
        let window = self.context_window.load(Ordering::Relaxed);

        // Summarize the older prefix when the history outgrows its budget
        let estimated = estimate_outbound_tokens(&history);
        let over_budget = estimated as f64 > window as f64 * SUMMARIZE_THRESHOLD_RATIO
            || history.len() >= SUMMARIZE_MIN_MESSAGES;
        if over_budget && history.len() > SUMMARY_KEEP_RECENT {
            let (head, tail) = split_for_summarization(&history, SUMMARY_KEEP_RECENT);
            if !head.is_empty() {
                let model = self.model();
                match summarize_multipart(
                    self.provider.as_ref(),
                    &head,
                    summary.as_deref().unwrap_or(""),
                    &model,
                    window,
                )
                .await
                {
                    Ok(new_summary) => {
                        info!(
                            summarized = head.len(),
                            retained = tail.len(),
                            "History summarized"
                        );
                        summary = Some(new_summary);
                        history = tail;
                        self.sessions
                            .replace(&session_key, history.clone(), summary.clone());
                    }
                    Err(e) => {
                        warn!(error = %e, "Summarization failed, keeping full history");
                    }
                }
            }
        }

        let messages = self.context.build_messages(
            kind,
            &history,
            summary.as_deref(),
            &inbound.content,
            &inbound.channel,
            &inbound.chat_id,
            &user_id,
        );
        let pruning = self.pruning.read().unwrap().clone();
        let (mut messages, _stats) = apply_pruning(messages, &pruning);

        let registry = self.tools_snapshot();
        let tool_ctx = ToolContext {
            channel: inbound.channel.clone(),
            chat_id: inbound.chat_id.clone(),
            cancel: cancel.clone(),
        };

        let mut delivered: Vec<String> = Vec::new();
        let mut appended: Vec<Message> = vec![Message::user(&inbound.content)];

        let outcome = self
            .drive(&mut messages, &registry, &tool_ctx, &cancel, &mut delivered, &mut appended)
            .await;

        // The fully-appended prefix of the turn survives even on failure
        self.sessions.append(&session_key, appended);
        self.sessions.save(&session_key);
        self.current_user.clear();

        match outcome {
            Ok(DriveOutcome::Final(text)) => {
                let duplicate = delivered.iter().any(|d| d.trim() == text.trim());
                if duplicate {
                    debug!("Final content already delivered by message tool, suppressing");
                } else if !text.is_empty() {
                    self.publish(&inbound.channel, &inbound.chat_id, &text);
                }
                Ok(text)
            }
            Ok(DriveOutcome::MaxIterations) => {
                self.publish(&inbound.channel, &inbound.chat_id, MAX_ITERATIONS_MESSAGE);
                Ok(MAX_ITERATIONS_MESSAGE.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Run a nested one-shot loop with the subagent registry (spawn tools
    /// excluded) and no session or outbound side effects.
    pub async fn run_subagent(
        &self,
        task: &str,
        cancel: CancellationToken,
    ) -> Result<String, Error> {
        let registry = Arc::new(self.subagent_registry());
        let mut messages =
            self.context
                .build_messages(SessionKind::Subagent, &[], None, task, "", "", "");

        let tool_ctx = ToolContext {
            channel: String::new(),
            chat_id: String::new(),
            cancel: cancel.clone(),
        };

        let mut delivered = Vec::new();
        let mut appended = Vec::new();
        match self
            .drive(&mut messages, &registry, &tool_ctx, &cancel, &mut delivered, &mut appended)
            .await?
        {
            DriveOutcome::Final(text) => Ok(text),
            DriveOutcome::MaxIterations => Ok(MAX_ITERATIONS_MESSAGE.to_string()),
        }
    }

    /// The tool registry subagents get: everything except the spawn tools.
    pub fn subagent_registry(&self) -> ToolRegistry {
        self.tools_snapshot().without(SUBAGENT_EXCLUDED_TOOLS)
    }

    /// The inner LLM ↔ tools cycle. Appends every fully-produced message to
    /// `appended` so the caller can persist exactly what happened, and
    /// records message-tool deliveries in `delivered` for deduplication.
    async fn drive(
        &self,
        messages: &mut Vec<Message>,
        registry: &ToolRegistry,
        tool_ctx: &ToolContext,
        cancel: &CancellationToken,
        delivered: &mut Vec<String>,
        appended: &mut Vec<Message>,
    ) -> Result<DriveOutcome, Error> {
        let definitions = registry.definitions();
        let max_iterations = self.max_tool_iterations.load(Ordering::Relaxed);
        let window = self.context_window.load(Ordering::Relaxed);
        let mut iteration = 0usize;

        loop {
            iteration += 1;
            if iteration > max_iterations {
                warn!(iterations = iteration, "Max tool iterations reached");
                return Ok(DriveOutcome::MaxIterations);
            }

            debug!(iteration, messages = messages.len(), "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model(),
                messages: messages.clone(),
                temperature: *self.temperature.read().unwrap() as f32,
                max_tokens: None,
                tools: definitions.clone(),
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                response = self.provider.complete(request) => response?,
            };

            if response.message.tool_calls.is_empty() {
                let text = response.message.content.clone();
                messages.push(response.message.clone());
                appended.push(response.message);
                return Ok(DriveOutcome::Final(text));
            }

            let tool_calls = response.message.tool_calls.clone();
            debug!(tool_count = tool_calls.len(), "Executing tool calls");
            messages.push(response.message.clone());
            appended.push(response.message);

            for tc in &tool_calls {
                // An in-flight tool result is discarded on cancellation
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                };

                let result = registry.dispatch(&call, tool_ctx).await;
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                if tc.name == "message" && !result.is_error {
                    if let Some(content) = call.arguments.get("content").and_then(|v| v.as_str()) {
                        delivered.push(content.to_string());
                    }
                }

                let truncated = truncate_tool_result(&result.content, window);
                let msg = Message::tool_result(&tc.id, truncated);
                messages.push(msg.clone());
                appended.push(msg);
            }
        }
    }
}
