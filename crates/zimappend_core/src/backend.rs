use std::fs;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::info;

use crate::content::{Placement, Spacing, insert, new_page};
use crate::host::HostCommand;
use crate::notebook::NotebookInfo;
use crate::page::{PageName, page_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Direct,
    Host,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Host => "host",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    Show,
    Raise,
}

/// Where page writes end up: the page files themselves, or a running host.
pub trait PageBackend {
    fn kind(&self) -> BackendKind;
    fn append_text(&mut self, page: &PageName, text: &str) -> Result<()>;
    fn create_page(&mut self, page: &PageName, text: &str) -> Result<()>;
    fn present(&mut self, page: &PageName, presentation: Presentation) -> Result<()>;
}

/// Edits page files in place; used when no host is running.
#[derive(Debug, Clone)]
pub struct DirectBackend {
    pub notebook: NotebookInfo,
    pub journal_namespace: String,
    pub placement: Placement,
    pub spacing: Spacing,
    pub now: DateTime<FixedOffset>,
    /// Starts the host at a page when presentation is requested.
    pub launcher: Option<HostCommand>,
}

impl PageBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn append_text(&mut self, page: &PageName, text: &str) -> Result<()> {
        let path = page.text_path(&self.notebook.root);
        let existing = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let updated = insert(&existing, text, &self.placement, self.spacing);
        fs::write(&path, updated).with_context(|| format!("failed to write {}", path.display()))?;
        info!(page = %page, path = %path.display(), bytes = text.len(), "appended to page file");
        Ok(())
    }

    fn create_page(&mut self, page: &PageName, text: &str) -> Result<()> {
        let path = page.text_path(&self.notebook.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let skeleton = new_page(&page_title(page, &self.journal_namespace), self.now);
        let content = insert(&skeleton, text, &self.placement, self.spacing);
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        info!(page = %page, path = %path.display(), "created page file");
        Ok(())
    }

    fn present(&mut self, page: &PageName, presentation: Presentation) -> Result<()> {
        match &self.launcher {
            Some(launcher) => launcher.present(&self.notebook, page, presentation),
            None => bail!("cannot show page {page}: no host application is configured"),
        }
    }
}
