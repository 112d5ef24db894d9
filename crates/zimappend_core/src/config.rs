use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const FALLBACK_NOTEBOOK: &str = "Primary";
pub const DEFAULT_HOURS_PAST_MIDNIGHT: u32 = 4;
pub const DEFAULT_JOURNAL_NAMESPACE: &str = "Journal";
pub const DEFAULT_HOST_COMMAND: &str = "zim";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppendConfig {
    pub default_notebook: Option<String>,
    pub hours_past_midnight: Option<u32>,
    pub journal_namespace: Option<String>,
    pub notebooks_list: Option<PathBuf>,
    pub host: HostSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostSection {
    pub enabled: bool,
    pub command: String,
    pub process_name: Option<String>,
    pub append_args: Vec<String>,
    pub create_args: Vec<String>,
    pub present_args: Vec<String>,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command: DEFAULT_HOST_COMMAND.to_string(),
            process_name: None,
            append_args: quicknote_args("true"),
            create_args: quicknote_args("false"),
            present_args: vec!["{notebook}".to_string(), "{page}".to_string()],
        }
    }
}

fn quicknote_args(append: &str) -> Vec<String> {
    [
        "--plugin",
        "quicknote",
        "--notebook",
        "{notebook}",
        "--page",
        "{page}",
        "--append",
        append,
        "--input",
        "stdin",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

impl HostSection {
    /// Process name used for detection; defaults to the command's file name.
    pub fn process_name(&self) -> String {
        if let Some(name) = self.process_name.as_deref() {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
        Path::new(&self.command)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.command.clone())
    }
}

impl AppendConfig {
    pub fn default_notebook(&self) -> Option<&str> {
        self.default_notebook
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Hours after midnight that still count as the previous day (0..=23).
    pub fn hours_past_midnight(&self) -> u32 {
        self.hours_past_midnight
            .unwrap_or(DEFAULT_HOURS_PAST_MIDNIGHT)
            .min(23)
    }

    pub fn journal_namespace(&self) -> &str {
        self.journal_namespace
            .as_deref()
            .map(|value| value.trim().trim_matches(':'))
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_JOURNAL_NAMESPACE)
    }
}

/// Load and parse an AppendConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<AppendConfig> {
    if !config_path.exists() {
        return Ok(AppendConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: AppendConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# zim-append configuration (written by `zim-append init`)\n\n# Notebook used when --notebook is not given (name, path or file:// URI).\n# default_notebook = \"{FALLBACK_NOTEBOOK}\"\n\n# Entries written before this hour count as the previous day's journal.\nhours_past_midnight = {DEFAULT_HOURS_PAST_MIDNIGHT}\n\njournal_namespace = \"{DEFAULT_JOURNAL_NAMESPACE}\"\n\n# Location of the host's notebook list.\n# notebooks_list = \"~/.config/zim/notebooks.list\"\n\n[host]\nenabled = true\ncommand = \"{DEFAULT_HOST_COMMAND}\"\n# process_name = \"zim\"\n# Placeholders: {{notebook}} (notebook root), {{page}} (page name). Text is sent on stdin.\n# append_args = [\"--plugin\", \"quicknote\", \"--notebook\", \"{{notebook}}\", \"--page\", \"{{page}}\", \"--append\", \"true\", \"--input\", \"stdin\"]\n# create_args = [\"--plugin\", \"quicknote\", \"--notebook\", \"{{notebook}}\", \"--page\", \"{{page}}\", \"--append\", \"false\", \"--input\", \"stdin\"]\n# present_args = [\"{{notebook}}\", \"{{page}}\"]\n"
    )
}
