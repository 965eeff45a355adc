/// Marker appended to cut content.
pub const ELLIPSIS: &str = "...";

/// Builds outbound text: optional `@username` prefix, then the body, then a
/// newline and the attribution signature. Length is counted in chars.
#[derive(Debug, Clone)]
pub struct ReplyComposer {
    signature: String,
    max_chars: usize,
}

impl ReplyComposer {
    pub fn new(signature: impl Into<String>, max_chars: usize) -> Self {
        Self {
            signature: signature.into(),
            max_chars,
        }
    }

    pub fn compose(&self, username: Option<&str>, body: &str) -> String {
        compose(username, body, &self.signature, self.max_chars)
    }

    /// Standalone post with trailing tags. The tags are kept when the body is cut.
    pub fn compose_tagged(&self, body: &str, tags: &str) -> String {
        compose_parts(None, body, tags, &self.signature, self.max_chars)
    }
}

/// Over-long content is cut and ends in an ellipsis while the signature stays
/// intact. Only if the signature alone cannot fit is the whole string cut.
pub fn compose(username: Option<&str>, body: &str, signature: &str, max_chars: usize) -> String {
    compose_parts(username, body, "", signature, max_chars)
}

fn compose_parts(
    username: Option<&str>,
    body: &str,
    tags: &str,
    signature: &str,
    max_chars: usize,
) -> String {
    let content = match username {
        Some(name) => format!("@{} {}", name, body),
        None => body.to_string(),
    };
    let tags = tags.trim();
    let suffix = if tags.is_empty() {
        format!("\n{}", signature)
    } else {
        format!(" {}\n{}", tags, signature)
    };
    let full = format!("{}{}", content, suffix);

    if full.chars().count() <= max_chars {
        return full;
    }

    let reserved = suffix.chars().count() + ELLIPSIS.len();
    if reserved < max_chars {
        let kept = take_chars(&content, max_chars - reserved);
        return format!("{}{}{}", kept.trim_end(), ELLIPSIS, suffix);
    }

    // Tags are dropped before the signature is
    if !tags.is_empty() {
        return compose_parts(username, body, "", signature, max_chars);
    }

    let kept = take_chars(&full, max_chars.saturating_sub(ELLIPSIS.len()));
    format!("{}{}", kept, ELLIPSIS)
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
