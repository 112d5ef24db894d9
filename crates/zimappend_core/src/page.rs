use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::dispatch::DispatchError;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d.%m.%Y"];

/// A colon-delimited page name, stored without the leading `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct PageName {
    segments: Vec<String>,
}

impl PageName {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let absolute = trimmed.strip_prefix(':').unwrap_or(trimmed);
        if absolute.is_empty() {
            bail!("page name is empty");
        }

        let mut segments = Vec::new();
        for segment in absolute.split(':') {
            let segment = segment.trim();
            if segment.is_empty() {
                bail!("page name `{trimmed}` contains an empty segment");
            }
            if segment.starts_with('.') {
                bail!("page name segment `{segment}` may not start with `.`");
            }
            if segment
                .chars()
                .any(|ch| ch == '/' || ch == '\\' || ch.is_control())
            {
                bail!("page name segment `{segment}` contains a path separator or control character");
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn basename(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The date this page stands for when it lives in the journal namespace.
    pub fn journal_date(&self, namespace: &str) -> Option<NaiveDate> {
        let [ns, year, month, day] = self.segments.as_slice() else {
            return None;
        };
        if ns != namespace || year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return None;
        }
        NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
    }

    /// Path of the child directory (also the attachment folder) under `root`.
    pub fn dir_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.segments {
            path.push(encode_segment(segment));
        }
        path
    }

    /// Path of the page's text file under `root`.
    pub fn text_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        let Some((last, parents)) = self.segments.split_last() else {
            return path;
        };
        for segment in parents {
            path.push(encode_segment(segment));
        }
        path.push(format!("{}.txt", encode_segment(last)));
        path
    }
}

impl fmt::Display for PageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(":"))
    }
}

impl From<PageName> for String {
    fn from(page: PageName) -> Self {
        page.to_string()
    }
}

fn encode_segment(segment: &str) -> String {
    segment.replace(' ', "_")
}

pub fn journal_page(namespace: &str, date: NaiveDate) -> Result<PageName> {
    PageName::parse(&format!(
        "{namespace}:{:04}:{:02}:{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

/// The journal day `now` belongs to; the day starts `hours_past_midnight` after midnight.
pub fn journal_date(now: NaiveDateTime, hours_past_midnight: u32) -> NaiveDate {
    (now - Duration::hours(i64::from(hours_past_midnight))).date()
}

pub fn parse_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        "tomorrow" => return Ok(today + Duration::days(1)),
        _ => {}
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    bail!("unrecognized date `{trimmed}` (expected YYYY-MM-DD)")
}

/// How the caller identified the target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    Explicit(String),
    TodaysJournal,
    JournalOn(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub page: PageName,
    pub is_todays_journal: bool,
}

pub fn resolve_target(
    target: Option<&PageTarget>,
    namespace: &str,
    now: NaiveDateTime,
    hours_past_midnight: u32,
) -> Result<ResolvedTarget> {
    let today = journal_date(now, hours_past_midnight);
    let todays_journal = journal_page(namespace, today)?;

    let page = match target {
        Some(PageTarget::Explicit(name)) => PageName::parse(name)?,
        Some(PageTarget::TodaysJournal) => todays_journal.clone(),
        Some(PageTarget::JournalOn(raw)) => journal_page(namespace, parse_date(raw, today)?)?,
        None => return Err(DispatchError::NoTarget.into()),
    };

    Ok(ResolvedTarget {
        is_todays_journal: page == todays_journal,
        page,
    })
}

/// Title shown in the page heading.
pub fn page_title(page: &PageName, namespace: &str) -> String {
    match page.journal_date(namespace) {
        Some(date) => date.format("%A %d %b %Y").to_string(),
        None => page.basename().replace('_', " "),
    }
}
