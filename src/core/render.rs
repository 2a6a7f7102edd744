//! Markdown rendering for flashcard fields.
//!
//! Model output is markdown; Anki note fields want HTML. The conversion runs
//! through `pulldown-cmark` with two sanitization rules applied to the event
//! stream before serialization: raw HTML embedded in the markdown is
//! downgraded to escaped text, and `javascript:` link destinations are
//! neutralized.

use pulldown_cmark::{html, Event, Options, Parser, Tag};

/// Render markdown to sanitized HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(markdown, options).map(sanitize_event);

    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, events);
    out
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        // Raw HTML passes through push_html unescaped, so demote it to text.
        Event::Html(raw) => Event::Text(raw),
        Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: neutralize_script_url(dest_url.into_string()).into(),
            title,
            id,
        }),
        other => other,
    }
}

fn neutralize_script_url(url: String) -> String {
    if url.trim_start().to_ascii_lowercase().starts_with("javascript:") {
        "#".to_string()
    } else {
        url
    }
}
