//! Tool result truncation.
//!
//! A single tool result may not consume more than a fixed share of the
//! context window. Truncation prefers a clean cut at a newline near the
//! limit and appends a marker.

use tracing::debug;

/// Maximum fraction of the context window one tool result can consume.
pub const MAX_TOOL_RESULT_CONTEXT_SHARE: f64 = 0.3;

/// Absolute maximum size for any tool result, regardless of window.
pub const HARD_MAX_TOOL_RESULT_CHARS: usize = 400_000;

/// Minimum content preserved when truncating.
pub const MIN_TOOL_RESULT_CHARS: usize = 2_000;

/// How far back from the cap to look for a newline break.
const NEWLINE_SEARCH_WINDOW: usize = 200;

const TRUNCATION_MARKER: &str = "\n[...truncated...]";

/// The per-result byte cap for a given context window (tokens).
pub fn max_tool_result_chars(context_window_tokens: usize) -> usize {
    // 4 bytes/token heuristic
    let max_chars = (context_window_tokens as f64 * MAX_TOOL_RESULT_CONTEXT_SHARE * 4.0) as usize;
    max_chars.clamp(MIN_TOOL_RESULT_CHARS, HARD_MAX_TOOL_RESULT_CHARS)
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncate `text` to `max_chars`, cutting at the last newline within the
/// search window when one exists.
fn truncate_tool_result_text(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }

    let mut cut = floor_boundary(text, max_chars);

    if max_chars > MIN_TOOL_RESULT_CHARS {
        let search_start = floor_boundary(text, max_chars.saturating_sub(NEWLINE_SEARCH_WINDOW));
        if let Some(last_newline) = text[search_start..cut].rfind('\n') {
            cut = search_start + last_newline + 1; // keep the newline
        }
    }

    debug!(
        original_chars = text.len(),
        truncated_chars = cut,
        dropped_chars = text.len() - cut,
        max_limit = max_chars,
        "Tool result truncated"
    );

    format!("{}{TRUNCATION_MARKER}", &text[..cut])
}

/// Truncate a tool result according to the context window size.
pub fn truncate_tool_result(result: &str, context_window_tokens: usize) -> String {
    truncate_tool_result_text(result, max_tool_result_chars(context_window_tokens))
}
