use once_cell::sync::Lazy;
use regex::Regex;

// A leading `[` line loses everything up to and including its second `]`,
// e.g. `[2024-01-01 12:00:00] [main] INFO ...` or `[12:00:00.123] ] INFO ...`.
static RE_TIMESTAMP_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[[^\]]*\][^\]]*\]").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub tag: String,
    pub tokens: Vec<String>,
}

impl NormalizedLine {
    /// Tokens joined by single spaces; this is the text a representative is
    /// displayed and exported under.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Remove the leading timestamp bracket region. Lines with fewer than two `]`
/// are returned unchanged.
pub fn strip_timestamp(line: &str) -> &str {
    match RE_TIMESTAMP_BRACKET.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// Split a raw log line into its tag and the remaining tokens.
///
/// Returns `None` for blank input, including lines that become empty once the
/// timestamp bracket is stripped.
pub fn normalize_line(raw: &str) -> Option<NormalizedLine> {
    if raw.trim().is_empty() {
        return None;
    }
    let mut words = strip_timestamp(raw).split_whitespace();
    let tag = words.next()?.to_string();
    let tokens = words.map(str::to_string).collect();
    Some(NormalizedLine { tag, tokens })
}
