//! `MEDIA:` tokens in agent output and the local size cap.

use std::sync::LazyLock;

use {regex::Regex, tracing::debug};

static MEDIA_TOKEN_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"MEDIA:(\S+)"));

fn is_valid_media(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if let Some(rest) = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
    {
        return !rest.is_empty();
    }
    ["/", "./", "../", "~", "file://"]
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

fn is_url(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Pull media references out of raw agent text.
///
/// Valid tokens are removed from their line (and the line dropped when
/// nothing else is left on it). Tokens that are neither URLs nor local paths
/// stay in the text untouched.
pub fn split_media_from_output(raw: &str) -> (String, Vec<String>) {
    let Ok(re) = &*MEDIA_TOKEN_RE else {
        return (raw.trim().to_string(), Vec::new());
    };
    let mut media = Vec::new();
    let mut lines = Vec::new();
    for line in raw.lines() {
        if !re.is_match(line) {
            lines.push(line.to_string());
            continue;
        }
        let kept = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let token = &caps[1];
            if is_valid_media(token) {
                media.push(token.to_string());
                String::new()
            } else {
                caps[0].to_string()
            }
        });
        if !kept.trim().is_empty() {
            lines.push(kept.trim_end().to_string());
        }
    }
    (lines.join("\n").trim().to_string(), media)
}

fn local_path(token: &str) -> String {
    let path = token.strip_prefix("file://").unwrap_or(token);
    parley_config::expand_home(path).to_string_lossy().into_owned()
}

/// Drop local files larger than `max_bytes` (or unreadable). URLs always pass.
pub async fn filter_local_media(candidates: Vec<String>, max_bytes: Option<u64>) -> Vec<String> {
    let Some(max_bytes) = max_bytes else {
        return candidates;
    };
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if is_url(&candidate) {
            kept.push(candidate);
            continue;
        }
        match tokio::fs::metadata(local_path(&candidate)).await {
            Ok(meta) if meta.len() <= max_bytes => kept.push(candidate),
            Ok(meta) => {
                debug!(path = %candidate, size = meta.len(), max_bytes, "dropping oversized media");
            },
            Err(e) => {
                debug!(path = %candidate, error = %e, "dropping unreadable media");
            },
        }
    }
    kept
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn splits_urls_and_paths() {
        let (text, media) =
            split_media_from_output("hi\nMEDIA:https://example.com/a.jpg\nhere: MEDIA:./b.png ok\n");
        assert_eq!(text, "hi\nhere:  ok");
        assert_eq!(media, vec!["https://example.com/a.jpg", "./b.png"]);
    }

    #[test]
    fn invalid_token_stays_in_text() {
        let (text, media) = split_media_from_output("see MEDIA:notapath");
        assert_eq!(text, "see MEDIA:notapath");
        assert!(media.is_empty());
    }

    #[test]
    fn text_without_media_is_trimmed() {
        let (text, media) = split_media_from_output("\n  hello \n");
        assert_eq!(text, "hello");
        assert!(media.is_empty());
    }

    #[rstest]
    #[case("https://x.y/z", true)]
    #[case("HTTP://x.y/z", true)]
    #[case("https://", false)]
    #[case("/tmp/a.jpg", true)]
    #[case("../a.jpg", true)]
    #[case("~/a.jpg", true)]
    #[case("file:///tmp/a.jpg", true)]
    #[case("a.jpg", false)]
    fn validity(#[case] token: &str, #[case] expected: bool) {
        assert_eq!(is_valid_media(token), expected);
    }

    #[tokio::test]
    async fn size_cap_drops_large_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.bin");
        let large = dir.path().join("large.bin");
        std::fs::write(&small, vec![0u8; 10]).unwrap();
        std::fs::write(&large, vec![0u8; 2048]).unwrap();

        let candidates = vec![
            small.display().to_string(),
            format!("file://{}", large.display()),
            dir.path().join("missing.bin").display().to_string(),
            "https://example.com/img.jpg".to_string(),
        ];
        let kept = filter_local_media(candidates, Some(1024)).await;
        assert_eq!(kept, vec![
            small.display().to_string(),
            "https://example.com/img.jpg".to_string(),
        ]);
    }

    #[tokio::test]
    async fn uncapped_keeps_everything() {
        let kept = filter_local_media(vec!["/does/not/exist".into()], None).await;
        assert_eq!(kept, vec!["/does/not/exist"]);
    }
}
