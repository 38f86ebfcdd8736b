use crate::message::Message;
use crate::meta::{format_timestamp, ConversationMeta};

const NO_SUMMARY: &str = "No summary available";
const UNKNOWN_ROLE: &str = "unknown";

/// Render `conversation.md`.
///
/// Pure and deterministic: a header block with topic, creation time, status
/// and summary, a `---` rule, then one `## Role` section per message with the
/// content copied verbatim. Missing roles render as `Unknown`, missing content
/// as an empty body.
pub fn render_transcript(messages: &[Message], meta: &ConversationMeta) -> String {
    let summary = if meta.summary().is_empty() {
        NO_SUMMARY
    } else {
        meta.summary()
    };

    let mut lines: Vec<String> = vec![
        format!("# {}", meta.topic()),
        String::new(),
        format!("**Created:** {}", format_timestamp(&meta.created_at())),
        format!("**Status:** {}", meta.status().as_str()),
        format!("**Summary:** {}", summary),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for message in messages {
        let role = message.role.as_deref().unwrap_or(UNKNOWN_ROLE);
        lines.push(format!("## {}", title_case(role)));
        lines.push(String::new());
        lines.push(message.content.clone().unwrap_or_default());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Uppercase the first letter of every run of letters and lowercase the rest,
/// so `assistant` becomes `Assistant` and `tool_call` becomes `Tool_Call`.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
