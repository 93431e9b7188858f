//! `{{Placeholder}}` substitution for reply text, prefixes, intros and argv.

use std::{collections::HashMap, sync::LazyLock};

use {parley_common::MsgContext, regex::Regex};

static PLACEHOLDER_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}"));

pub const BODY: &str = "Body";
pub const BODY_STRIPPED: &str = "BodyStripped";
pub const SESSION_ID: &str = "SessionId";
pub const IS_NEW_SESSION: &str = "IsNewSession";

/// Values available to templates. Unknown placeholders render empty.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<&'static str, String>,
}

impl TemplateContext {
    /// Seed from an inbound message.
    pub fn from_message(ctx: &MsgContext) -> Self {
        let mut values = HashMap::new();
        values.insert(BODY, ctx.body.clone());
        values.insert(BODY_STRIPPED, ctx.body.clone());
        values.insert("ChatType", ctx.chat_type.as_str().to_string());
        let optional = [
            ("From", &ctx.from),
            ("To", &ctx.to),
            ("MessageSid", &ctx.message_sid),
            ("SenderName", &ctx.sender_name),
            ("GroupSubject", &ctx.group_subject),
            ("GroupMembers", &ctx.group_members),
            ("MediaPath", &ctx.media_path),
            ("MediaType", &ctx.media_type),
            ("MediaUrl", &ctx.media_url),
            ("Transcript", &ctx.transcript),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                values.insert(key, value.clone());
            }
        }
        Self { values }
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub fn apply_template(template: &str, ctx: &TemplateContext) -> String {
    let Ok(re) = &*PLACEHOLDER_RE else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        ctx.get(&caps[1]).unwrap_or_default().to_string()
    })
    .into_owned()
}

/// Whether `template` references `{{key}}`.
pub fn references(template: &str, key: &str) -> bool {
    let Ok(re) = &*PLACEHOLDER_RE else {
        return false;
    };
    re.captures_iter(template).any(|caps| &caps[1] == key)
}

#[cfg(test)]
mod tests {
    use {super::*, parley_common::ChatType};

    #[test]
    fn substitutes_known_and_blanks_unknown() {
        let msg = MsgContext {
            from: Some("+1555".into()),
            chat_type: ChatType::Group,
            ..MsgContext::new("hello")
        };
        let ctx = TemplateContext::from_message(&msg).with(SESSION_ID, "abc");
        assert_eq!(
            apply_template("{{Body}} from {{ From }} in {{ChatType}} ({{SessionId}}){{Nope}}", &ctx),
            "hello from +1555 in group (abc)"
        );
    }

    #[test]
    fn leaves_non_placeholders() {
        let ctx = TemplateContext::default();
        assert_eq!(apply_template("{single} {{ }}", &ctx), "{single} {{ }}");
    }

    #[test]
    fn detects_references() {
        assert!(references("prefix {{ Body }}", BODY));
        assert!(!references("{{BodyStripped}}", BODY));
    }
}
