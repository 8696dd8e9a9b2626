//! The core agent loop and its context machinery.
//!
//! A turn follows a bounded **LLM → tools → LLM** cycle:
//!
//! 1. **Receive** a user message (from any channel)
//! 2. **Assemble context** (identity + bootstrap files + skills catalog +
//!    pruned history)
//! 3. **Send to the LLM** via the configured provider
//! 4. **If tool calls**: dispatch tools, append truncated results, loop back
//! 5. **If text**: emit the final answer outbound
//!
//! The cycle ends on a final text response, the iteration cap, cancellation,
//! or a provider error. Everything that guards the context window — bootstrap
//! truncation, history pruning, tool-result truncation, multi-part
//! summarization — lives in this crate too.

pub mod bootstrap;
pub mod context;
pub mod loop_runner;
pub mod memory;
pub mod pruning;
pub mod session;
pub mod summary;
pub mod token;
pub mod truncation;
pub mod window;

pub use bootstrap::{BootstrapCache, BootstrapConfig, SessionKind};
pub use context::ContextBuilder;
pub use loop_runner::{AgentLoop, CurrentUser, ToolFactory};
pub use memory::MemoryStore;
pub use pruning::{apply_pruning, PruningConfig, PruningMode, PruningStats};
pub use session::SessionStore;
pub use summary::{split_for_summarization, summarize_multipart};
pub use token::{estimate_messages_tokens, estimate_outbound_tokens, estimate_tokens};
pub use truncation::truncate_tool_result;
pub use window::{evaluate_context_window_guard, ContextWindowGuardResult};
