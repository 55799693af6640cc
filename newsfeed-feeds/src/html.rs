//! HTML body sanitizing
//!
//! Reduces feed markup to plain text plus `<br>` line breaks. Paragraph and
//! break tags become markers before the remaining tags are stripped, so
//! adjacent paragraphs stay separated instead of running together.

use std::sync::LazyLock;

use regex::Regex;

const LINE_MARKER: &str = "\u{1}br\u{1}";
const PARAGRAPH_MARKER: &str = "\u{1}p\u{1}";

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap()
});
static BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").unwrap());
static PARAGRAPH_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p(\s[^>]*)?>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static BREAK_PADDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*<br>[ \t]*").unwrap());
static BREAK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:<br>){3,}").unwrap());
static LEADING_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:<br>)+").unwrap());
static TRAILING_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:<br>)+\s*$").unwrap());

/// Sanitize an HTML fragment down to text and `<br>` markup.
///
/// At most two consecutive `<br>` survive and the result never starts
/// with one.
pub fn sanitize_html(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, "");
    let text = BREAK_TAG.replace_all(&text, LINE_MARKER);
    let text = PARAGRAPH_TAG.replace_all(&text, PARAGRAPH_MARKER);
    let text = ANY_TAG.replace_all(&text, "");

    let text = text
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace("&nbsp;", " ");
    let text = WHITESPACE_RUN.replace_all(&text, " ");

    let text = text
        .replace(LINE_MARKER, "<br>")
        .replace(PARAGRAPH_MARKER, "<br><br>");
    let text = BREAK_PADDING.replace_all(&text, "<br>");

    let text = BREAK_RUN.replace_all(&text, "<br><br>");
    let text = LEADING_BREAKS.replace(&text, "");
    let text = TRAILING_BREAKS.replace(&text, "");

    text.trim().to_string()
}
