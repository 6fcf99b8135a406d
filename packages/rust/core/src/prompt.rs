//! Prompt fragments shared by the generating stages.

use papermill_shared::{ScrapedSource, WorkItem};
use papermill_text::truncate_chars;

use crate::labels::language_name;

/// Numbered source excerpts, each cut to `max_chars` characters.
pub(crate) fn render_sources(sources: &[ScrapedSource], max_chars: usize) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            format!(
                "[{}] {} ({})\n{}",
                i + 1,
                source.display_title(),
                source.url,
                truncate_chars(source.text_or_empty(), max_chars).trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Language, style, guidelines and keywords of a work item.
pub(crate) fn brief(item: &WorkItem) -> String {
    let mut out = format!("Language: write in {}.\n", language_name(&item.language));
    if let Some(style) = non_empty(item.style.as_deref()) {
        out.push_str(&format!("Style and tone: {style}\n"));
    }
    if let Some(guidelines) = non_empty(item.guidelines.as_deref()) {
        out.push_str(&format!("Customer guidelines: {guidelines}\n"));
    }
    if !item.keywords.is_empty() {
        out.push_str(&format!(
            "Use these keywords naturally: {}\n",
            item.keywords.join(", ")
        ));
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Strip a Markdown code fence the model may have wrapped its answer in.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
