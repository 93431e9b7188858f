//! Assembly of the agent-facing request text.

use parley_common::MsgContext;

use crate::{
    abort::ABORTED_HINT,
    thinking::{ThinkLevel, normalize_think_level},
};

/// Hint telling the agent how to send media back.
pub const MEDIA_REPLY_HINT: &str = "To send an image back, add a line like: MEDIA:https://example.com/image.jpg (no spaces). Keep caption in the text body.";

/// Already-resolved pieces of one request body.
#[derive(Debug, Clone, Default)]
pub struct BodyParts<'a> {
    pub aborted_hint: bool,
    pub group_intro: Option<String>,
    pub session_intro: Option<String>,
    /// Included only when `include_prefix` is set.
    pub body_prefix: Option<String>,
    pub include_prefix: bool,
    /// Directive-stripped message body.
    pub body: &'a str,
    pub transcript: Option<&'a str>,
    pub media_note: Option<String>,
    pub media_hint: bool,
}

/// Join the parts in request order: aborted hint, group intro, session intro,
/// body prefix + body, transcript, with media annotations in front.
pub fn compose_body(parts: &BodyParts<'_>) -> String {
    let mut text = parts.body.to_string();
    if parts.include_prefix
        && let Some(prefix) = parts.body_prefix.as_deref().filter(|p| !p.is_empty())
    {
        text = format!("{prefix}{text}");
    }
    for intro in [&parts.session_intro, &parts.group_intro] {
        if let Some(intro) = intro.as_deref().filter(|i| !i.is_empty()) {
            text = format!("{intro}\n\n{text}");
        }
    }
    if parts.aborted_hint {
        text = format!("{ABORTED_HINT}\n\n{text}");
    }

    if let Some(transcript) = parts.transcript.filter(|t| !t.is_empty()) {
        let block = format!("Transcript:\n{transcript}");
        text = if text.is_empty() {
            block
        } else {
            format!("{text}\n\n{block}")
        };
    }

    let Some(note) = parts.media_note.as_deref() else {
        return text;
    };
    let mut lines = vec![note];
    if parts.media_hint {
        lines.push(MEDIA_REPLY_HINT);
    }
    if !text.is_empty() {
        lines.push(&text);
    }
    lines.join("\n").trim().to_string()
}

/// First-turn framing for group conversations.
pub fn group_intro(subject: Option<&str>, members: Option<&str>) -> String {
    let subject = subject.map(str::trim).filter(|s| !s.is_empty());
    let members = members.map(str::trim).filter(|m| !m.is_empty());
    let mut intro = match subject {
        Some(subject) => format!("You are replying inside the WhatsApp group \"{subject}\"."),
        None => "You are replying inside a WhatsApp group chat.".to_string(),
    };
    if let Some(members) = members {
        intro.push_str(&format!(" Group members: {members}."));
    }
    intro.push_str(" Address the specific sender noted in the message context.");
    intro
}

/// Single-line annotation describing inbound media, if any.
pub fn media_note(ctx: &MsgContext) -> Option<String> {
    let path = ctx.media_path.as_deref().filter(|p| !p.is_empty())?;
    let mut note = format!("[media attached: {path}");
    if let Some(kind) = ctx.media_type.as_deref().filter(|t| !t.is_empty()) {
        note.push_str(&format!(" ({kind})"));
    }
    if let Some(url) = ctx.media_url.as_deref().filter(|u| !u.is_empty()) {
        note.push_str(&format!(" | {url}"));
    }
    note.push(']');
    Some(note)
}

/// Consume a leading bare think level (`"high what's up"`) from a body.
pub fn take_leading_think_level(body: &str) -> Option<(ThinkLevel, String)> {
    let mut words = body.split_whitespace();
    let level = normalize_think_level(words.next()?)?;
    Some((level, words.collect::<Vec<_>>().join(" ")))
}
