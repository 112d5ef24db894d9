use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{BackendKind, PageBackend, Presentation};
use crate::config::HostSection;
use crate::notebook::NotebookInfo;
use crate::page::PageName;
use crate::runtime::normalize_for_display;

/// Hosts before this release take `--gui` to open a window at a page.
const MODERN_HOST: HostVersion = HostVersion {
    major: 0,
    minor: 66,
    patch: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl HostVersion {
    /// Parse the first dotted number in `--version` output, e.g. `zim 0.75.2`.
    pub fn parse(output: &str) -> Option<Self> {
        let token = output
            .split_whitespace()
            .find(|token| token.starts_with(|ch: char| ch.is_ascii_digit()) && token.contains('.'))?;
        let mut parts = token
            .split('.')
            .map(|part| part.trim_end_matches(|ch: char| !ch.is_ascii_digit()));
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|part| part.parse().ok()).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    pub fn is_legacy(&self) -> bool {
        *self < MODERN_HOST
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Disabled,
    NotRunning,
    Running { version: Option<HostVersion> },
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::NotRunning => "not running",
            Self::Running { .. } => "running",
        }
    }
}

pub fn detect_host(section: &HostSection, force_direct: bool) -> HostStatus {
    detect_host_with(section, force_direct, process_running, query_version)
}

fn detect_host_with<R, V>(
    section: &HostSection,
    force_direct: bool,
    running: R,
    version: V,
) -> HostStatus
where
    R: Fn(&str) -> bool,
    V: Fn(&str) -> Option<HostVersion>,
{
    if force_direct || !section.enabled || section.command.trim().is_empty() {
        return HostStatus::Disabled;
    }
    let process_name = section.process_name();
    if !running(&process_name) {
        debug!(process = %process_name, "host is not running");
        return HostStatus::NotRunning;
    }
    let version = version(&section.command);
    debug!(process = %process_name, version = ?version, "host is running");
    HostStatus::Running { version }
}

fn process_running(name: &str) -> bool {
    Command::new("pgrep")
        .arg("-x")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn query_version(command: &str) -> Option<HostVersion> {
    let output = Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    HostVersion::parse(&text)
}

/// The host's command line, with argv templates for each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub append_args: Vec<String>,
    pub create_args: Vec<String>,
    pub present_args: Vec<String>,
    pub legacy: bool,
}

impl HostCommand {
    pub fn from_config(section: &HostSection, version: Option<HostVersion>) -> Self {
        Self {
            program: section.command.clone(),
            append_args: section.append_args.clone(),
            create_args: section.create_args.clone(),
            present_args: section.present_args.clone(),
            legacy: version.is_some_and(|version| version.is_legacy()),
        }
    }

    pub fn present_argv(&self, notebook: &NotebookInfo, page: &PageName) -> Vec<String> {
        let mut args = Vec::with_capacity(self.present_args.len() + 1);
        if self.legacy && !self.present_args.iter().any(|arg| arg == "--gui") {
            args.push("--gui".to_string());
        }
        args.extend(render_args(&self.present_args, notebook, page));
        args
    }

    /// Bring the host to `page` without waiting for it.
    pub fn present(
        &self,
        notebook: &NotebookInfo,
        page: &PageName,
        presentation: Presentation,
    ) -> Result<()> {
        let args = self.present_argv(notebook, page);
        debug!(program = %self.program, ?args, ?presentation, "presenting page");
        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;
        Ok(())
    }

    fn run_with_text(&self, args: &[String], text: &str) -> Result<()> {
        debug!(program = %self.program, ?args, bytes = text.len(), "sending text to host");
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("failed to write to {}", self.program))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Substitute `{notebook}` and `{page}` in an argv template.
pub fn render_args(template: &[String], notebook: &NotebookInfo, page: &PageName) -> Vec<String> {
    let root = normalize_for_display(&notebook.root);
    let page = page.to_string();
    template
        .iter()
        .map(|arg| arg.replace("{notebook}", &root).replace("{page}", &page))
        .collect()
}

/// A running host instance; writes go through its command line.
#[derive(Debug, Clone)]
pub struct HostBackend {
    pub command: HostCommand,
    pub notebook: NotebookInfo,
}

impl PageBackend for HostBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Host
    }

    fn append_text(&mut self, page: &PageName, text: &str) -> Result<()> {
        let args = render_args(&self.command.append_args, &self.notebook, page);
        self.command.run_with_text(&args, text)?;
        info!(page = %page, bytes = text.len(), "host appended text");
        Ok(())
    }

    fn create_page(&mut self, page: &PageName, text: &str) -> Result<()> {
        let args = render_args(&self.command.create_args, &self.notebook, page);
        self.command.run_with_text(&args, text)?;
        info!(page = %page, "host created page from template");
        Ok(())
    }

    fn present(&mut self, page: &PageName, presentation: Presentation) -> Result<()> {
        self.command.present(&self.notebook, page, presentation)
    }
}
