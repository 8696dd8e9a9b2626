//! Context window validation.
//!
//! Misconfigured (tiny) context windows degrade the loop badly enough that
//! they deserve a startup check: warn below the recommended floor, flag as
//! blocked below the hard minimum.

use tracing::{debug, error, warn};

/// Below this, a warning is logged.
pub const CONTEXT_WINDOW_WARN_BELOW: usize = 32_000;

/// Below this, the loop is considered non-functional.
pub const CONTEXT_WINDOW_HARD_MIN: usize = 16_000;

/// The outcome of context window validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindowGuardResult {
    pub context_window: usize,
    pub below_recommended: bool,
    pub blocked: bool,
}

/// Check a context window against the recommended and hard minimums.
pub fn evaluate_context_window_guard(context_window: usize) -> ContextWindowGuardResult {
    let result = ContextWindowGuardResult {
        context_window,
        below_recommended: context_window < CONTEXT_WINDOW_WARN_BELOW,
        blocked: context_window < CONTEXT_WINDOW_HARD_MIN,
    };

    if result.blocked {
        error!(
            context_window,
            hard_minimum = CONTEXT_WINDOW_HARD_MIN,
            "Context window is below the hard minimum; the agent cannot run reliably"
        );
    } else if result.below_recommended {
        warn!(
            context_window,
            recommended_min = CONTEXT_WINDOW_WARN_BELOW,
            "Context window is below the recommended minimum"
        );
    } else {
        debug!(context_window, "Context window validated");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfortable_window_passes() {
        let result = evaluate_context_window_guard(128_000);
        assert!(!result.below_recommended);
        assert!(!result.blocked);
    }

    #[test]
    fn small_window_warns() {
        let result = evaluate_context_window_guard(24_000);
        assert!(result.below_recommended);
        assert!(!result.blocked);
    }

    #[test]
    fn tiny_window_blocks() {
        let result = evaluate_context_window_guard(8_000);
        assert!(result.below_recommended);
        assert!(result.blocked);
    }

    #[test]
    fn boundaries_are_exclusive() {
        assert!(!evaluate_context_window_guard(32_000).below_recommended);
        assert!(!evaluate_context_window_guard(16_000).blocked);
    }
}
