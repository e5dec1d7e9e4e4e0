//! The "answer with sources" prompt and the parser for its output.

use serde::Serialize;

use rolerag_core::types::{ContextPassage, Generation};

pub const SOURCES_MARKER: &str = "SOURCES:";

const SYSTEM_PROMPT: &str = "You answer questions about internal company documents. \
Use only the extracted passages provided. If they do not contain the answer, say that you don't know; \
do not make one up. Finish with a line starting with \"SOURCES:\" that lists the Source labels of the \
passages you used, comma separated, or nothing after the colon if you used none.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

pub fn render_context(passages: &[ContextPassage]) -> String {
    passages
        .iter()
        .map(|p| format!("Content: {}\nSource: {}", p.content, p.source))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_messages(question: &str, passages: &[ContextPassage]) -> Vec<ChatMessage> {
    let user = format!(
        "QUESTION: {question}\n=========\n{}\n=========\nFINAL ANSWER:",
        render_context(passages)
    );
    vec![
        ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
        ChatMessage { role: "user", content: user },
    ]
}

/// Split model output into answer and attribution at the last `SOURCES:`
/// marker (case-insensitive). No marker means no attribution.
pub fn parse_generation(output: &str) -> Generation {
    let upper = output.to_ascii_uppercase();
    let (answer, attribution) = match upper.rfind(SOURCES_MARKER) {
        Some(idx) => (&output[..idx], output[idx + SOURCES_MARKER.len()..].trim()),
        None => (output, ""),
    };
    let answer = answer.trim();
    let answer = strip_prefix_ignore_case(answer, "FINAL ANSWER:").unwrap_or(answer).trim();
    Generation { answer: answer.to_string(), attribution: attribution.to_string() }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
