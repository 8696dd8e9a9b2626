//! TTL-based context pruning.
//!
//! Two passes run when the mode is `cache-ttl`: small old tool results are
//! dropped first, then everything before the oldest of the last N assistant
//! messages goes. System messages are never pruned. Messages carry no
//! stored age, so position in the history stands in for it.

use picoclaw_core::{Message, Role};
use std::time::Duration;
use tracing::{debug, info};

/// The pruning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningMode {
    Off,
    CacheTtl,
}

impl PruningMode {
    /// Parse the config spelling; unknown values mean off.
    pub fn parse(s: &str) -> Self {
        match s {
            "cache-ttl" => Self::CacheTtl,
            _ => Self::Off,
        }
    }
}

/// Context pruning settings.
#[derive(Debug, Clone)]
pub struct PruningConfig {
    pub mode: PruningMode,
    pub ttl: Duration,
    /// Recent assistant messages to preserve
    pub keep_last_assistants: usize,
    pub soft_trim_ratio: f64,
    pub hard_clear_ratio: f64,
    /// Tool results below this size are candidates for dropping
    pub min_prunable_tool_chars: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            mode: PruningMode::Off,
            ttl: Duration::from_secs(3600),
            keep_last_assistants: 4,
            soft_trim_ratio: 0.3,
            hard_clear_ratio: 0.5,
            min_prunable_tool_chars: 1000,
        }
    }
}

impl From<&picoclaw_config::ContextPruningConfig> for PruningConfig {
    fn from(cfg: &picoclaw_config::ContextPruningConfig) -> Self {
        Self {
            mode: PruningMode::parse(&cfg.mode),
            ttl: Duration::from_secs(u64::from(cfg.ttl_minutes) * 60),
            keep_last_assistants: cfg.keep_last_assistants,
            soft_trim_ratio: cfg.soft_trim_ratio,
            hard_clear_ratio: cfg.hard_clear_ratio,
            min_prunable_tool_chars: cfg.min_prunable_tool_chars,
        }
    }
}

/// Statistics from a pruning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruningStats {
    pub messages_removed: usize,
    pub tool_results_removed: usize,
    pub chars_saved: usize,
}

/// Number of most-recent tool results exempt from the small-result pass.
const KEEP_RECENT_TOOL_RESULTS: usize = 3;

/// Drop tool results below the size threshold, keeping the most recent few.
fn prune_tool_results(messages: Vec<Message>, config: &PruningConfig) -> (Vec<Message>, PruningStats) {
    let mut stats = PruningStats::default();

    // Indices of the most recent tool results, exempt from pruning
    let mut recent = Vec::new();
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::Tool {
            recent.push(i);
            if recent.len() >= KEEP_RECENT_TOOL_RESULTS {
                break;
            }
        }
    }

    let pruned: Vec<Message> = messages
        .into_iter()
        .enumerate()
        .filter(|(i, msg)| {
            if msg.role == Role::Tool
                && !recent.contains(i)
                && msg.content.len() < config.min_prunable_tool_chars
            {
                stats.tool_results_removed += 1;
                stats.chars_saved += msg.content.len();
                return false;
            }
            true
        })
        .map(|(_, msg)| msg)
        .collect();

    if stats.tool_results_removed > 0 {
        debug!(
            tool_results_removed = stats.tool_results_removed,
            chars_saved = stats.chars_saved,
            min_threshold = config.min_prunable_tool_chars,
            "Tool results pruned"
        );
    }

    (pruned, stats)
}

/// Drop every non-system message before the oldest of the last N assistant
/// messages.
fn prune_by_ttl(messages: Vec<Message>, config: &PruningConfig) -> (Vec<Message>, PruningStats) {
    let mut stats = PruningStats::default();

    if messages.is_empty() {
        return (messages, stats);
    }

    // Index of the oldest assistant message we keep
    let mut min_keep_index = messages.len();
    let mut seen = 0;
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::Assistant {
            min_keep_index = i;
            seen += 1;
            if seen >= config.keep_last_assistants {
                break;
            }
        }
    }

    let pruned: Vec<Message> = messages
        .into_iter()
        .enumerate()
        .filter(|(i, msg)| {
            if msg.role == Role::System || *i >= min_keep_index {
                return true;
            }
            stats.messages_removed += 1;
            stats.chars_saved += msg.content.len();
            false
        })
        .map(|(_, msg)| msg)
        .collect();

    if stats.messages_removed > 0 {
        debug!(
            messages_removed = stats.messages_removed,
            chars_saved = stats.chars_saved,
            remaining_count = pruned.len(),
            "Context pruned by TTL"
        );
    }

    (pruned, stats)
}

/// Apply both pruning passes. A no-op when the mode is off.
pub fn apply_pruning(messages: Vec<Message>, config: &PruningConfig) -> (Vec<Message>, PruningStats) {
    if config.mode == PruningMode::Off {
        return (messages, PruningStats::default());
    }

    let (messages, tool_stats) = prune_tool_results(messages, config);
    let (messages, ttl_stats) = prune_by_ttl(messages, config);

    let total = PruningStats {
        messages_removed: ttl_stats.messages_removed,
        tool_results_removed: tool_stats.tool_results_removed,
        chars_saved: tool_stats.chars_saved + ttl_stats.chars_saved,
    };

    if total.messages_removed > 0 || total.tool_results_removed > 0 {
        info!(
            messages_removed = total.messages_removed,
            tool_results_removed = total.tool_results_removed,
            total_chars_saved = total.chars_saved,
            "Pruning complete"
        );
    }

    (messages, total)
}
