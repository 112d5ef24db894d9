//! Editing of page files in the host's plain-text wiki format.
//!
//! Only heading lines are interpreted; the rest of the page is opaque text.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub const CONTENT_TYPE_LINE: &str = "Content-Type: text/x-zim-wiki";
pub const WIKI_FORMAT_LINE: &str = "Wiki-Format: zim 0.4";

const TITLE_LEVEL: usize = 6;
const SECTION_LEVEL: usize = 5;

/// Where inserted text goes within a page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "heading", rename_all = "snake_case")]
pub enum Placement {
    #[default]
    End,
    /// After the title heading and its "Created" line.
    Top,
    /// Before the title heading.
    Early,
    UnderHeading(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spacing {
    #[default]
    WellSpaced,
    Raw,
}

/// Render the skeleton of a new page: metadata block, title heading and "Created" line.
pub fn new_page(title: &str, created: DateTime<FixedOffset>) -> String {
    format!(
        "{CONTENT_TYPE_LINE}\n{WIKI_FORMAT_LINE}\nCreation-Date: {}\n\n{}Created {}\n",
        created.format("%Y-%m-%dT%H:%M:%S%:z"),
        heading(TITLE_LEVEL, title),
        created.format("%A %d %B %Y"),
    )
}

pub fn heading(level: usize, text: &str) -> String {
    let marks = "=".repeat(level);
    format!("{marks} {text} {marks}\n")
}

/// Insert `text` into `existing` at `placement`.
pub fn insert(existing: &str, text: &str, placement: &Placement, spacing: Spacing) -> String {
    let layout = Layout::of(existing);
    match placement {
        Placement::End => splice(existing, existing.len(), text, spacing),
        Placement::Early => splice(existing, layout.offset(layout.body_start), text, spacing),
        Placement::Top => splice(existing, layout.offset(layout.top), text, spacing),
        Placement::UnderHeading(name) => match layout.section_end(name) {
            Some(index) => splice(existing, layout.offset(index), text, spacing),
            None => {
                let mut block = format!("{}{text}", heading(SECTION_LEVEL, name.trim()));
                if spacing == Spacing::Raw && !existing.is_empty() && !existing.ends_with('\n') {
                    block.insert(0, '\n');
                }
                splice(existing, existing.len(), &block, spacing)
            }
        },
    }
}

fn splice(existing: &str, offset: usize, text: &str, spacing: Spacing) -> String {
    let (before, after) = existing.split_at(offset);
    if spacing == Spacing::Raw {
        return format!("{before}{text}{after}");
    }

    let mut out = String::with_capacity(existing.len() + text.len() + 3);
    out.push_str(before);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if text.is_empty() {
        out.push_str(after);
        return out;
    }
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
    if !after.is_empty() && !after.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(after);
    out
}

struct Layout<'a> {
    lines: Vec<&'a str>,
    offsets: Vec<usize>,
    total: usize,
    /// First line after the metadata block.
    body_start: usize,
    /// First line after the title heading (and "Created" line), or `body_start`.
    top: usize,
}

impl<'a> Layout<'a> {
    fn of(content: &'a str) -> Self {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut offsets = Vec::with_capacity(lines.len());
        let mut cursor = 0usize;
        for line in &lines {
            offsets.push(cursor);
            cursor += line.len();
        }

        let body_start = if lines
            .first()
            .is_some_and(|line| line.starts_with("Content-Type:"))
        {
            lines
                .iter()
                .position(|line| line.trim().is_empty())
                .map(|index| index + 1)
                .unwrap_or(lines.len())
        } else {
            0
        };

        let mut top = body_start;
        let title = lines
            .iter()
            .enumerate()
            .skip(body_start)
            .find(|(_, line)| parse_heading(line).is_some_and(|(level, _)| level == TITLE_LEVEL));
        if let Some((index, _)) = title {
            top = index + 1;
            if lines
                .get(top)
                .is_some_and(|line| line.trim_start().starts_with("Created "))
            {
                top += 1;
            }
        }

        Self {
            lines,
            offsets,
            total: content.len(),
            body_start,
            top,
        }
    }

    fn offset(&self, index: usize) -> usize {
        self.offsets.get(index).copied().unwrap_or(self.total)
    }

    /// Line index where the section titled `name` ends.
    fn section_end(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        let (start, level) = self
            .lines
            .iter()
            .enumerate()
            .skip(self.body_start)
            .find_map(|(index, line)| {
                parse_heading(line)
                    .filter(|(_, text)| text.eq_ignore_ascii_case(wanted))
                    .map(|(level, _)| (index, level))
            })?;

        let end = self
            .lines
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, line)| parse_heading(line).is_some_and(|(other, _)| other >= level))
            .map(|(index, _)| index)
            .unwrap_or(self.lines.len());
        Some(end)
    }
}

/// Heading level (number of `=` marks, 2..=6) and text of a heading line.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    let level = trimmed.bytes().take_while(|byte| *byte == b'=').count();
    if !(2..=TITLE_LEVEL).contains(&level) || !trimmed.ends_with('=') {
        return None;
    }
    let text = trimmed[level..].trim_end_matches('=').trim();
    if text.is_empty() {
        return None;
    }
    Some((level, text))
}
