//! Multi-part summarization with adaptive chunking.
//!
//! When a conversation outgrows its budget, the older prefix is condensed
//! into a running summary: the prefix is split into chunks sized off the
//! context window, each chunk is summarized by one LLM request, and chunk
//! summaries are merged by a final request.
//!
//! The split point between summarized prefix and retained tail is the one
//! place that may orphan a tool result (a tool message whose assistant
//! turn was summarized away). [`split_for_summarization`] advances the
//! boundary past any leading tool messages so the retained tail never
//! starts with one.

use picoclaw_core::{Message, Provider, ProviderError, ProviderRequest, Role};
use tracing::{debug, info, warn};

/// Base fraction of the context window per summary chunk.
pub const BASE_CHUNK_RATIO: f64 = 0.40;

/// Minimum fraction of the context window per chunk.
pub const MIN_CHUNK_RATIO: f64 = 0.15;

/// Safety margin for token estimation.
pub const SUMMARY_SAFETY_MARGIN: f64 = 1.2;

/// Minimum tokens reserved for the summary itself.
pub const RESERVE_TOKENS_FLOOR: usize = 20_000;

const CHARS_PER_TOKEN: usize = 4;

/// Chunk ratio from average message length: long messages → small chunks
/// (summarize earlier), short messages → large chunks.
fn adaptive_chunk_ratio(messages: &[Message]) -> f64 {
    if messages.is_empty() {
        return BASE_CHUNK_RATIO;
    }

    let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    let avg = total_chars / messages.len();

    if avg >= 2000 {
        MIN_CHUNK_RATIO
    } else if avg >= 1000 {
        MIN_CHUNK_RATIO + (BASE_CHUNK_RATIO - MIN_CHUNK_RATIO) * 0.5
    } else {
        BASE_CHUNK_RATIO
    }
}

/// Split messages into contiguous chunks that fit the target token count.
/// A single message larger than half the chunk budget is skipped rather
/// than blocking the pipeline.
fn split_messages_for_summary(messages: &[Message], target_tokens: usize) -> Vec<Vec<Message>> {
    let target_chars = target_tokens * CHARS_PER_TOKEN;

    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_chars = 0usize;

    for msg in messages {
        let msg_chars = msg.content.len();

        if msg_chars > target_chars / 2 {
            debug!(
                message_chars = msg_chars,
                target_chars, "Skipping oversized message in summarization"
            );
            continue;
        }

        if current_chars + msg_chars > target_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        current_chars += msg_chars;
        current.push(msg.clone());
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split a history into (to-summarize, to-retain) keeping roughly the last
/// `keep_recent` messages. The boundary advances past tool messages so the
/// retained tail never begins with an orphaned tool result.
pub fn split_for_summarization(history: &[Message], keep_recent: usize) -> (Vec<Message>, Vec<Message>) {
    let mut boundary = history.len().saturating_sub(keep_recent);
    while boundary < history.len() && history[boundary].role == Role::Tool {
        boundary += 1;
    }
    (history[..boundary].to_vec(), history[boundary..].to_vec())
}

/// Summarize `messages` into a single running summary.
///
/// Chunk summaries that fail are skipped; if every chunk fails the existing
/// summary is kept and an error surfaces. A merge failure falls back to
/// concatenating the first two summaries with an explicit note.
pub async fn summarize_multipart(
    provider: &dyn Provider,
    messages: &[Message],
    existing_summary: &str,
    model: &str,
    context_window: usize,
) -> Result<String, ProviderError> {
    if messages.is_empty() {
        return Ok(existing_summary.to_string());
    }

    let chunk_ratio = adaptive_chunk_ratio(messages);
    let mut target_tokens =
        (context_window as f64 * chunk_ratio / SUMMARY_SAFETY_MARGIN) as i64;

    // Leave room for the summary itself on large windows
    let floor = context_window as i64 - RESERVE_TOKENS_FLOOR as i64;
    if target_tokens < floor {
        target_tokens = floor;
    }
    let target_tokens = target_tokens.max(1) as usize;

    info!(
        total_messages = messages.len(),
        context_window,
        chunk_ratio,
        target_per_chunk = target_tokens,
        "Multi-part summarization starting"
    );

    let chunks = split_messages_for_summary(messages, target_tokens);
    debug!(num_chunks = chunks.len(), "Split into chunks");

    let mut summaries = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        match summarize_chunk(provider, chunk, existing_summary, model).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                warn!(chunk = i + 1, error = %e, "Failed to summarize chunk, skipping");
            }
        }
    }

    if summaries.is_empty() {
        return Err(ProviderError::ApiError {
            status_code: 0,
            message: "all chunks failed to summarize".into(),
        });
    }

    if summaries.len() == 1 {
        return Ok(summaries.into_iter().next().unwrap());
    }

    merge_summaries(provider, &summaries, model).await
}

async fn summarize_chunk(
    provider: &dyn Provider,
    messages: &[Message],
    existing_summary: &str,
    model: &str,
) -> Result<String, ProviderError> {
    let mut prompt = String::from(
        "Provide a concise summary of this conversation segment, preserving core context and key points.\n",
    );
    if !existing_summary.is_empty() {
        prompt.push_str(&format!("Existing context: {existing_summary}\n"));
    }
    prompt.push_str("\nCONVERSATION:\n");
    for m in messages {
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        prompt.push_str(&format!("{role}: {}\n", m.content));
    }

    let mut request = ProviderRequest::new(model, vec![Message::user(prompt)]);
    request.max_tokens = Some(1024);
    request.temperature = 0.3;

    let response = provider.complete(request).await?;
    Ok(response.message.content)
}

async fn merge_summaries(
    provider: &dyn Provider,
    summaries: &[String],
    model: &str,
) -> Result<String, ProviderError> {
    let mut prompt = String::from(
        "Merge these conversation summaries into one cohesive summary that preserves the full conversation flow:\n\n",
    );
    for (i, s) in summaries.iter().enumerate() {
        prompt.push_str(&format!("PART {}:\n{s}\n\n", i + 1));
    }

    let mut request = ProviderRequest::new(model, vec![Message::user(prompt)]);
    request.max_tokens = Some(2048);
    request.temperature = 0.3;

    match provider.complete(request).await {
        Ok(response) => Ok(response.message.content),
        Err(e) => {
            warn!(error = %e, "Failed to merge summaries, concatenating instead");
            Ok(format!(
                "{}\n\n[Note: Failed to merge summaries, concatenated instead]\n\n{}",
                summaries[0], summaries[1]
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use picoclaw_core::ProviderResponse;
    use std::sync::Mutex;

    /// Returns scripted responses in order; `Err` entries fail that call.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.is_empty() {
                Ok("default".to_string())
            } else {
                responses.remove(0)
            };
            next.map(|content| ProviderResponse {
                message: Message::assistant(content),
                usage: None,
                model: "scripted".into(),
            })
        }
    }

    fn fail() -> Result<String, ProviderError> {
        Err(ProviderError::Network("scripted failure".into()))
    }

    #[test]
    fn ratio_brackets() {
        let short: Vec<Message> = (0..10).map(|_| Message::user("short")).collect();
        assert_eq!(adaptive_chunk_ratio(&short), BASE_CHUNK_RATIO);

        let medium: Vec<Message> = (0..10).map(|_| Message::user("m".repeat(1500))).collect();
        let expected = MIN_CHUNK_RATIO + (BASE_CHUNK_RATIO - MIN_CHUNK_RATIO) * 0.5;
        assert!((adaptive_chunk_ratio(&medium) - expected).abs() < f64::EPSILON);

        let long: Vec<Message> = (0..10).map(|_| Message::user("l".repeat(3000))).collect();
        assert_eq!(adaptive_chunk_ratio(&long), MIN_CHUNK_RATIO);
    }

    #[test]
    fn splitting_respects_budget() {
        // 10 messages of 400 chars, 250-token chunks → 1000-char budget
        let messages: Vec<Message> = (0..10).map(|_| Message::user("x".repeat(400))).collect();
        let chunks = split_messages_for_summary(&messages, 250);
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            let chars: usize = chunk.iter().map(|m| m.content.len()).sum();
            assert!(chars <= 1000);
        }
    }

    #[test]
    fn oversized_message_skipped_not_blocking() {
        let messages = vec![
            Message::user("a".repeat(100)),
            Message::user("b".repeat(10_000)), // > half the chunk budget
            Message::user("c".repeat(100)),
        ];
        let chunks = split_messages_for_summary(&messages, 250);
        let all: Vec<&Message> = chunks.iter().flatten().collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.content.len() == 100));
    }

    #[test]
    fn split_boundary_skips_tool_messages() {
        let history = vec![
            Message::user("q1"),
            Message::assistant_with_tool_calls("", vec![]),
            Message::tool_result("c1", "r1"),
            Message::tool_result("c2", "r2"),
            Message::assistant("done"),
        ];

        // Naive boundary would land on the first tool result
        let (head, tail) = split_for_summarization(&history, 3);
        assert_eq!(head.len(), 4);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].role, Role::Assistant);
        assert!(tail.first().map(|m| m.role != Role::Tool).unwrap_or(true));
    }

    #[test]
    fn split_keeps_recent_when_no_tools() {
        let history: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let (head, tail) = split_for_summarization(&history, 4);
        assert_eq!(head.len(), 6);
        assert_eq!(tail.len(), 4);
    }

    #[tokio::test]
    async fn empty_messages_keep_existing_summary() {
        let provider = ScriptedProvider::new(vec![]);
        let result = summarize_multipart(&provider, &[], "prior", "m", 128_000)
            .await
            .unwrap();
        assert_eq!(result, "prior");
    }

    #[tokio::test]
    async fn single_chunk_returns_its_summary() {
        let provider = ScriptedProvider::new(vec![Ok("the summary".into())]);
        let messages = vec![Message::user("hello"), Message::assistant("hi")];
        let result = summarize_multipart(&provider, &messages, "", "m", 128_000)
            .await
            .unwrap();
        assert_eq!(result, "the summary");
    }

    #[tokio::test]
    async fn multiple_chunks_are_merged() {
        // Small window forces several chunks, then one merge call
        let provider = ScriptedProvider::new(vec![
            Ok("part one".into()),
            Ok("part two".into()),
            Ok("merged".into()),
        ]);
        let messages: Vec<Message> = (0..40).map(|_| Message::user("x".repeat(900))).collect();
        let result = summarize_multipart(&provider, &messages, "", "m", 16_000)
            .await
            .unwrap();
        assert_eq!(result, "merged");
    }

    #[tokio::test]
    async fn merge_failure_concatenates() {
        let provider = ScriptedProvider::new(vec![
            Ok("part one".into()),
            Ok("part two".into()),
            fail(), // the merge call
        ]);
        let messages: Vec<Message> = (0..40).map(|_| Message::user("x".repeat(900))).collect();
        let result = summarize_multipart(&provider, &messages, "", "m", 16_000)
            .await
            .unwrap();
        assert!(result.contains("part one"));
        assert!(result.contains("part two"));
        assert!(result.contains("Failed to merge"));
    }

    #[tokio::test]
    async fn all_chunks_failing_is_an_error() {
        let provider = ScriptedProvider::new(vec![fail(), fail(), fail(), fail()]);
        let messages: Vec<Message> = (0..40).map(|_| Message::user("x".repeat(900))).collect();
        let result = summarize_multipart(&provider, &messages, "", "m", 16_000).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_chunk_skipped_survivor_used() {
        let provider = ScriptedProvider::new(vec![fail(), Ok("survivor".into())]);
        let messages: Vec<Message> = (0..40).map(|_| Message::user("x".repeat(900))).collect();
        let result = summarize_multipart(&provider, &messages, "", "m", 16_000)
            .await
            .unwrap();
        assert_eq!(result, "survivor");
    }
}
