use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Alternatives, tried left to right at each position:
/// `[YYYY-MM-DDTHH:MM:SS.mmmZ]`, `YYYY-MM-DD`, `HH:MM:SS.mmm` / `HH:MM:SS,mmm`,
/// `HH:MM:SS`. Trailing whitespace after a match is swallowed with it.
const TIMESTAMP_BODY: &str = concat!(
    r"(?:\[[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]{3}Z\]",
    r"|[0-9]{4}-[0-9]{2}-[0-9]{2}",
    r"|[0-9]{2}:[0-9]{2}:[0-9]{2}[.,][0-9]{3}",
    r"|[0-9]{2}:[0-9]{2}:[0-9]{2})[[:space:]]*",
);

static ANYWHERE: Lazy<TimestampPattern> = Lazy::new(|| TimestampPattern::compile(false));
static ANCHORED: Lazy<TimestampPattern> = Lazy::new(|| TimestampPattern::compile(true));

/// Where in a line a timestamp may be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Only a timestamp that begins at the first character
    AnchoredToStart,
    /// Every timestamp on the line
    Anywhere,
}

impl MatchMode {
    pub fn from_anchored(anchored_to_start: bool) -> Self {
        if anchored_to_start {
            MatchMode::AnchoredToStart
        } else {
            MatchMode::Anywhere
        }
    }
}

/// Compiled rule for timestamp-shaped substrings
#[derive(Debug)]
pub struct TimestampPattern {
    mode: MatchMode,
    regex: Regex,
}

impl TimestampPattern {
    fn compile(anchored_to_start: bool) -> Self {
        let source = if anchored_to_start {
            format!("^{}", TIMESTAMP_BODY)
        } else {
            TIMESTAMP_BODY.to_string()
        };
        Self {
            mode: MatchMode::from_anchored(anchored_to_start),
            // The pattern is a constant covered by tests.
            regex: Regex::new(&source).expect("timestamp pattern must compile"),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// The regular expression source, for logging
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Returns the shared pattern for the given mode
pub fn pattern_for(anchored_to_start: bool) -> &'static TimestampPattern {
    if anchored_to_start {
        &ANCHORED
    } else {
        &ANYWHERE
    }
}

/// A line after stripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineResult<'a> {
    pub cleaned_line: Cow<'a, str>,
    pub was_modified: bool,
}

/// Removes every match (or the leading one, in anchored mode) from `line`.
///
/// Borrows the input when nothing changed.
pub fn transform_line<'a>(line: &'a str, pattern: &TimestampPattern) -> LineResult<'a> {
    match pattern.regex.replace_all(line, "") {
        Cow::Owned(cleaned) if cleaned != line => {
            debug!("Line modified:");
            debug!("  Before: '{}'", line);
            debug!("  After:  '{}'", cleaned);
            LineResult {
                cleaned_line: Cow::Owned(cleaned),
                was_modified: true,
            }
        }
        _ => LineResult {
            cleaned_line: Cow::Borrowed(line),
            was_modified: false,
        },
    }
}
