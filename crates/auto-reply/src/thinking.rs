use std::fmt;

/// How much reasoning the agent is asked to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkLevel {
    pub const VALID: &'static str = "off, minimal, low, medium, high";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ThinkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether tool output is echoed back to the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerboseLevel {
    Off,
    On,
}

impl VerboseLevel {
    pub const VALID: &'static str = "off, on";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }
}

impl fmt::Display for VerboseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a user-supplied think level (or alias) to a level.
pub fn normalize_think_level(raw: &str) -> Option<ThinkLevel> {
    let key = raw.trim().to_ascii_lowercase();
    let level = match key.as_str() {
        "off" => ThinkLevel::Off,
        "on" | "enable" | "enabled" => ThinkLevel::Low,
        "min" | "minimal" | "think" => ThinkLevel::Minimal,
        "low" | "thinkhard" | "think-hard" | "think_hard" => ThinkLevel::Low,
        "mid" | "med" | "medium" | "thinkharder" | "think-harder" | "harder" => {
            ThinkLevel::Medium
        },
        "high" | "ultra" | "ultrathink" | "think-hard-max" | "max" => ThinkLevel::High,
        _ => return None,
    };
    Some(level)
}

/// Map a user-supplied verbose level (or alias) to a level.
pub fn normalize_verbose_level(raw: &str) -> Option<VerboseLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" | "false" | "no" | "0" => Some(VerboseLevel::Off),
        "on" | "full" | "true" | "yes" | "1" => Some(VerboseLevel::On),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("off", Some(ThinkLevel::Off))]
    #[case("on", Some(ThinkLevel::Low))]
    #[case("Enabled", Some(ThinkLevel::Low))]
    #[case("think", Some(ThinkLevel::Minimal))]
    #[case("min", Some(ThinkLevel::Minimal))]
    #[case("think_hard", Some(ThinkLevel::Low))]
    #[case("HARDER", Some(ThinkLevel::Medium))]
    #[case("med", Some(ThinkLevel::Medium))]
    #[case("ultrathink", Some(ThinkLevel::High))]
    #[case("think-hard-max", Some(ThinkLevel::High))]
    #[case(" max ", Some(ThinkLevel::High))]
    #[case("turbo", None)]
    #[case("", None)]
    fn think_aliases(#[case] raw: &str, #[case] expected: Option<ThinkLevel>) {
        assert_eq!(normalize_think_level(raw), expected);
    }

    #[rstest]
    #[case("off", Some(VerboseLevel::Off))]
    #[case("no", Some(VerboseLevel::Off))]
    #[case("0", Some(VerboseLevel::Off))]
    #[case("full", Some(VerboseLevel::On))]
    #[case("YES", Some(VerboseLevel::On))]
    #[case("loud", None)]
    fn verbose_aliases(#[case] raw: &str, #[case] expected: Option<VerboseLevel>) {
        assert_eq!(normalize_verbose_level(raw), expected);
    }

    #[test]
    fn display_matches_canonical_names() {
        assert_eq!(ThinkLevel::Medium.to_string(), "medium");
        assert_eq!(VerboseLevel::On.to_string(), "on");
    }
}
