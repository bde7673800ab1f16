//! Transcript Rendering
//!
//! Pure functions from a message list to display output. Assistant replies
//! are Markdown; user input is shown verbatim.

use pulldown_cmark::{html, Event, Options, Parser};

use crate::chat::{ChatMessage, Role};

/// Render messages as HTML bubbles keyed by position
///
/// Each message becomes `<div class="message {role}" data-index="{i}">`.
/// Raw HTML inside assistant Markdown is shown as text, never injected.
pub fn render_html(messages: &[ChatMessage]) -> String {
    let mut out = String::new();

    for (index, message) in messages.iter().enumerate() {
        let streaming = if message.complete { "" } else { " streaming" };
        out.push_str(&format!(
            "<div class=\"message {}{}\" data-index=\"{}\">",
            message.role.as_str(),
            streaming,
            index
        ));

        match message.role {
            Role::Assistant => out.push_str(&markdown_to_html(&message.content)),
            Role::User => {
                out.push_str("<p style=\"white-space: pre-wrap\">");
                out.push_str(&escape_html(&message.content));
                out.push_str("</p>");
            }
        }

        out.push_str("</div>\n");
    }

    out
}

/// Render messages as plain lines for a terminal
pub fn render_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(render_text_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one message for a terminal
pub fn render_text_line(message: &ChatMessage) -> String {
    let speaker = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    let suffix = if message.complete { "" } else { "…" };
    format!("{}: {}{}", speaker, message.content, suffix)
}

/// Markdown with tables, strikethrough, task lists, and fenced code
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
