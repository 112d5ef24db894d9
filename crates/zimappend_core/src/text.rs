use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

pub const QUOTE_FENCE: &str = "'''";

/// Text sources for one invocation. Clipboard and stdin are read by the caller.
#[derive(Debug, Clone, Default)]
pub struct TextSources {
    pub literals: Vec<String>,
    pub files: Vec<PathBuf>,
    pub clipboard: Option<String>,
    pub stdin: Option<String>,
    pub quote: bool,
    pub time: bool,
}

/// The assembled text plus whether the caller asked for a write at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub text: String,
    pub requested: bool,
}

pub fn assemble(
    sources: &TextSources,
    now: NaiveDateTime,
    is_todays_journal: bool,
) -> Result<Payload> {
    let mut text = sources.literals.join("\n");

    if sources.time {
        text.insert_str(0, &time_prefix(now, is_todays_journal));
    }

    for path in &sources.files {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if !sources.quote {
            text.push_str(&format!("\n{}:\n", path.display()));
        }
        text.push_str(&content);
    }

    if let Some(clipboard) = sources.clipboard.as_deref() {
        text.push_str(clipboard);
    }
    if let Some(stdin) = sources.stdin.as_deref() {
        text.push_str(stdin);
    }

    if sources.quote && !text.is_empty() {
        text = format!("{QUOTE_FENCE}\n{text}\n{QUOTE_FENCE}");
    }

    let requested = !sources.literals.is_empty() || !text.is_empty();
    Ok(Payload { text, requested })
}

/// Entries on today's journal only need the time of day.
pub fn time_prefix(now: NaiveDateTime, is_todays_journal: bool) -> String {
    if is_todays_journal {
        now.format("%I:%M%P - ").to_string()
    } else {
        now.format("%Y-%m-%d @ %I:%M%P - ").to_string()
    }
}
