//! Prompt templates for retrieval-augmented answers.
//!
//! History is rendered from explicit roles, one `Human:` / `Assistant:`
//! line per message, oldest first.

use crate::models::{ConversationHistory, ScoredChunk};

/// Instructions placed at the top of every answer prompt.
pub const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Render history as speaker-labelled lines.
pub fn format_history(history: &ConversationHistory) -> String {
    history
        .messages()
        .iter()
        .map(|m| format!("{}: {}", m.role.prompt_label(), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join retrieved chunks, best match first, separated by blank lines.
pub fn format_context(context: &[ScoredChunk]) -> String {
    context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the prompt sent to the language model for one question.
///
/// Layout: instructions, retrieved context, prior turns (if any), then the
/// new question.
pub fn build_answer_prompt(
    context: &[ScoredChunk],
    history: &ConversationHistory,
    question: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(ANSWER_INSTRUCTIONS);
    prompt.push_str("\n\n");
    prompt.push_str(&format_context(context));
    prompt.push_str("\n\n");
    if !history.is_empty() {
        prompt.push_str("Chat History:\n");
        prompt.push_str(&format_history(history));
        prompt.push_str("\n\n");
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push_str("\nHelpful Answer:");
    prompt
}

/// Build the prompt that rewrites a follow-up into a standalone question.
pub fn build_condense_prompt(history: &ConversationHistory, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
question to be a standalone question, in its original language.\n\n\
Chat History:\n{history}\n\
Follow Up Input: {question}\n\
Standalone question:",
        history = format_history(history),
        question = question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_text, ChunkingParams};
    use crate::models::Turn;

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk_text(text, &ChunkingParams::default())
                .unwrap()
                .remove(0),
            distance: 0.1,
        }
    }

    #[test]
    fn history_lines_follow_roles() {
        let history =
            ConversationHistory::from(vec![Turn::new("What is A?", "A is the first letter.")]);
        assert_eq!(
            format_history(&history),
            "Human: What is A?\nAssistant: A is the first letter."
        );
    }

    #[test]
    fn answer_prompt_without_history() {
        let prompt = build_answer_prompt(
            &[scored("alpha fact"), scored("beta fact")],
            &ConversationHistory::new(),
            "What is alpha?",
        );
        assert!(prompt.starts_with(ANSWER_INSTRUCTIONS));
        assert!(prompt.contains("alpha fact\n\nbeta fact"));
        assert!(!prompt.contains("Chat History"));
        assert!(prompt.ends_with("Question: What is alpha?\nHelpful Answer:"));
    }

    #[test]
    fn answer_prompt_includes_prior_turns_in_order() {
        let history = ConversationHistory::from(vec![
            Turn::new("first q", "first a"),
            Turn::new("second q", "second a"),
        ]);
        let prompt = build_answer_prompt(&[scored("ctx")], &history, "third q");
        let first = prompt.find("Human: first q").unwrap();
        let second = prompt.find("Human: second q").unwrap();
        let question = prompt.find("Question: third q").unwrap();
        assert!(first < second && second < question);
        assert!(prompt.contains("Assistant: first a"));
    }

    #[test]
    fn condense_prompt_contains_history_and_follow_up() {
        let history = ConversationHistory::from(vec![Turn::new("Who wrote it?", "Ada.")]);
        let prompt = build_condense_prompt(&history, "When?");
        assert!(prompt.contains("Human: Who wrote it?\nAssistant: Ada."));
        assert!(prompt.contains("Follow Up Input: When?"));
        assert!(prompt.ends_with("Standalone question:"));
    }
}
