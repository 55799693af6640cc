//! Summary prompt and post-processing

use std::sync::LazyLock;

use regex::Regex;

pub const SUMMARY_SYSTEM_PROMPT: &str = "As a professional summarizer, create a concise and \
comprehensive summary of the provided text, be it an article, post, conversation, or passage, \
while adhering to these guidelines: Craft a summary that is detailed, thorough, in-depth, and \
complex, while maintaining clarity and conciseness. Incorporate main ideas and essential \
information, eliminating extraneous language and focusing on critical aspects. Rely strictly \
on the provided text, without including external information. Format the summary in paragraph \
form for easy understanding. Write the summary in the language of the provided text.";

const REASONING_END: &str = "</think>";

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*]\s+").unwrap());

/// Drop the reasoning block some models emit before their answer
pub fn strip_reasoning(text: &str) -> String {
    match text.rfind(REASONING_END) {
        Some(idx) => text[idx + REASONING_END.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Render model output as the `<br>`-only markup used for entry bodies.
///
/// Blank lines separate paragraphs; bold spans, headings and bullets are
/// kept in a simplified form.
pub fn render_summary_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    escaped
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(|paragraph| {
            paragraph
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| {
                    let line = HEADING.replace(line, "");
                    let line = BULLET.replace(&line, "• ");
                    BOLD.replace_all(&line, "<b>$1</b>").into_owned()
                })
                .collect::<Vec<_>>()
                .join("<br>")
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("<br><br>")
}
