//! Inline control tokens (`/think high`, `/v on`) and the wrapper text that
//! has to be ignored when deciding whether a message is only a directive.

use std::sync::LazyLock;

use {regex::Regex, tracing::debug};

use crate::thinking::{ThinkLevel, VerboseLevel, normalize_think_level, normalize_verbose_level};

/// Marker the inbound adapter puts before the message being answered when it
/// batches earlier history into the body.
pub const CURRENT_MESSAGE_MARKER: &str = "[Current message - respond to this]";

// Longest keyword first so `/thinking:high` is never read as `/t` + `hinking`.
static THINK_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:thinking|think|t)\s*:?\s*([a-zA-Z-]+)\b"));
static VERBOSE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:verbose|v)\s*:?\s*([a-zA-Z-]+)\b"));
static BRACKET_LABEL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\s*"));
static SENDER_PREFIX_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[A-Za-z0-9+()\-_. ]+:\s*"));
static NUMERIC_MENTION_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"@[0-9+]{5,}"));
static WHITESPACE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\s+"));

/// Result of scanning a body for one directive kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<L> {
    /// Body with the directive removed and whitespace collapsed.
    pub cleaned: String,
    /// Parsed level, `None` when absent or unrecognized.
    pub level: Option<L>,
    /// Level token as typed.
    pub raw_level: Option<String>,
    pub has_directive: bool,
}

pub fn extract_think_directive(body: &str) -> Directive<ThinkLevel> {
    extract(&THINK_RE, body, normalize_think_level)
}

pub fn extract_verbose_directive(body: &str) -> Directive<VerboseLevel> {
    extract(&VERBOSE_RE, body, normalize_verbose_level)
}

fn extract<L>(
    re: &LazyLock<Result<Regex, regex::Error>>,
    body: &str,
    normalize: fn(&str) -> Option<L>,
) -> Directive<L> {
    let captured = match &**re {
        Ok(re) => re.captures(body),
        Err(_) => None,
    };
    let Some(caps) = captured else {
        return Directive {
            cleaned: body.trim().to_string(),
            level: None,
            raw_level: None,
            has_directive: false,
        };
    };

    let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
    let raw = caps.get(1).map(|m| m.as_str().to_string());
    let mut cleaned = String::with_capacity(body.len());
    cleaned.push_str(&body[..start]);
    cleaned.push_str(&body[end..]);

    Directive {
        cleaned: collapse_whitespace(&cleaned),
        level: raw.as_deref().and_then(normalize),
        raw_level: raw,
        has_directive: true,
    }
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    match &*WHITESPACE_RE {
        Ok(re) => re.replace_all(text, " ").trim().to_string(),
        Err(_) => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

fn remove_all(re: &LazyLock<Result<Regex, regex::Error>>, text: &str, with: &str) -> String {
    match &**re {
        Ok(re) => re.replace_all(text, with).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Drop history wrappers, bracketed labels (timestamps) and `Sender:` line
/// prefixes so only the text the user actually typed remains.
pub fn strip_structural_prefixes(text: &str) -> String {
    let current = text
        .find(CURRENT_MESSAGE_MARKER)
        .map_or(text, |idx| &text[idx + CURRENT_MESSAGE_MARKER.len()..]);
    let without_labels = remove_all(&BRACKET_LABEL_RE, current, "");
    let without_senders = remove_all(&SENDER_PREFIX_RE, &without_labels, "");
    collapse_whitespace(&without_senders)
}

/// Remove mentions of the bot: configured patterns (case-insensitive; invalid
/// ones are skipped), the bot's own number with or without `@`, and generic
/// `@<digits>` mentions.
pub fn strip_mentions(text: &str, self_id: Option<&str>, mention_patterns: &[String]) -> String {
    let mut result = text.to_string();
    for pattern in mention_patterns {
        match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => result = re.replace_all(&result, " ").into_owned(),
            Err(e) => debug!(pattern, error = %e, "ignoring invalid mention pattern"),
        }
    }
    if let Some(id) = self_id.map(str::trim).filter(|id| !id.is_empty()) {
        result = result.replace(&format!("@{id}"), " ").replace(id, " ");
    }
    let result = remove_all(&NUMERIC_MENTION_RE, &result, " ");
    collapse_whitespace(&result)
}

/// Whether nothing but wrapper text remains once structure (and, in groups,
/// mentions) are stripped. Punctuation counts as content.
pub fn is_empty_residue(
    text: &str,
    is_group: bool,
    self_id: Option<&str>,
    mention_patterns: &[String],
) -> bool {
    let stripped = strip_structural_prefixes(text);
    if is_group {
        strip_mentions(&stripped, self_id, mention_patterns).is_empty()
    } else {
        stripped.is_empty()
    }
}
