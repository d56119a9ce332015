//! Prompt assembly for the document chat flow. All text sent to the model is
//! built here, nowhere else.

use crate::models::chat::ChatLogEntry;

/// System prompt for every document chat call.
pub const DOC_CHAT_SYSTEM: &str = "You are an assistant that answers questions about a single \
    uploaded document. Ground every answer in the document text provided. \
    If the document does not contain the answer, say so plainly instead of guessing. \
    Keep answers concise and direct.";

/// Hard cap on document text included per call. Longer documents are
/// truncated from the tail; chat quality degrades gracefully rather than the
/// request failing.
const MAX_DOC_CHARS: usize = 24_000;

/// Number of prior Q/A exchanges carried as conversational context.
const MAX_HISTORY_MESSAGES: usize = 10;

/// Builds the user-turn prompt: document text, recent transcript, question.
pub fn build_chat_prompt(document_text: &str, history: &[ChatLogEntry], question: &str) -> String {
    let mut prompt = String::from("DOCUMENT:\n");
    prompt.push_str(truncate_chars(document_text, MAX_DOC_CHARS));
    prompt.push('\n');

    let recent = if history.len() > MAX_HISTORY_MESSAGES {
        &history[history.len() - MAX_HISTORY_MESSAGES..]
    } else {
        history
    };
    if !recent.is_empty() {
        prompt.push_str("\nCONVERSATION SO FAR:\n");
        for message in recent {
            prompt.push_str(&format!("User: {}\n", message.question));
            prompt.push_str(&format!("Assistant: {}\n", message.answer));
        }
    }

    prompt.push_str(&format!("\nQUESTION:\n{question}\n"));
    prompt
}

/// Truncates on a char boundary; `&s[..n]` would panic mid-codepoint.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(question: &str, answer: &str) -> ChatLogEntry {
        ChatLogEntry {
            id: "m".to_string(),
            user_id: "u".to_string(),
            doc_id: "d".to_string(),
            doc_name: "d.pdf".to_string(),
            doc_type: "pdf".to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            chat_session_id: None,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_prompt_contains_document_and_question() {
        let prompt = build_chat_prompt("the report covers Q3", &[], "what quarter?");
        assert!(prompt.contains("the report covers Q3"));
        assert!(prompt.contains("QUESTION:\nwhat quarter?"));
        assert!(!prompt.contains("CONVERSATION SO FAR"));
    }

    #[test]
    fn test_prompt_includes_recent_history_only() {
        let history: Vec<_> = (0..15).map(|i| message(&format!("q{i}"), "a")).collect();
        let prompt = build_chat_prompt("doc", &history, "next");
        assert!(!prompt.contains("User: q4\n"));
        assert!(prompt.contains("User: q5\n"));
        assert!(prompt.contains("User: q14\n"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 3), "hél");
        assert_eq!(truncate_chars(s, 100), s);
    }
}
