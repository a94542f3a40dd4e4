//! Markdown-subset to markup conversion and dialogue rendering
//!
//! Pure, stateless transforms. The grammar is the fixed subset the
//! conversation view understands: links, bold, single-star italics,
//! `<think>` spans, level 2-3 headings, dash lists, and line breaks.

use crate::core::types::{DialogueMessage, Role};
use once_cell::sync::Lazy;
use regex::Regex;

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());

/// Convert the markdown subset to display markup
///
/// Text with no markdown tokens passes through unchanged except for
/// newline -> `<br>` substitution.
pub fn markdown_to_markup(text: &str) -> String {
    // Inline passes first; the think span runs before the star passes so
    // markup inside the span is still converted.
    let text = THINK_RE.replace_all(text, "<i>$1</i>");
    let text = LINK_RE.replace_all(&text, r#"<a href="$2">$1</a>"#);
    let text = BOLD_RE.replace_all(&text, "<b>$1</b>");
    let text = ITALIC_RE.replace_all(&text, "<i>$1</i>");

    // Line passes: headings, grouped list items, then remaining newlines
    let mut out = String::new();
    let mut in_list = false;
    let mut needs_break = false;

    // split('\n') rather than lines(): a trailing newline is still a break
    for line in text.split('\n') {
        if let Some(item) = line.strip_prefix("- ") {
            if !in_list {
                out.push_str("<ul>");
                in_list = true;
            }
            out.push_str("<li>");
            out.push_str(item);
            out.push_str("</li>");
            needs_break = false;
            continue;
        }
        if in_list {
            out.push_str("</ul>");
            in_list = false;
        }

        if let Some(heading) = line.strip_prefix("### ") {
            out.push_str("<h3>");
            out.push_str(heading);
            out.push_str("</h3>");
            needs_break = false;
        } else if let Some(heading) = line.strip_prefix("## ") {
            out.push_str("<h2>");
            out.push_str(heading);
            out.push_str("</h2>");
            needs_break = false;
        } else {
            if needs_break {
                out.push_str("<br>");
            }
            out.push_str(line);
            needs_break = true;
        }
    }
    if in_list {
        out.push_str("</ul>");
    }

    out
}

/// Render one message inside its styled container
pub fn render_message(message: &DialogueMessage) -> String {
    let content = markdown_to_markup(&message.content);
    match message.role {
        Role::Assistant => format!(
            r#"<div style="text-align:left; margin: 5px;"><span style="color:red; font-weight:bold;">Assistant:</span><br>{}</div>"#,
            content
        ),
        Role::User => format!(
            r#"<div style="text-align:right; margin: 5px;"><span style="color:blue; font-weight:bold;">You:</span><br>{}</div>"#,
            content
        ),
        Role::System => format!(
            r#"<div style="text-align:center; margin: 5px; color:gray;">{}</div>"#,
            content
        ),
    }
}

/// Render the whole dialogue in conversation order
pub fn render_dialogue(messages: &[DialogueMessage]) -> String {
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}
