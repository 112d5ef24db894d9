use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{AppendConfig, load_config, render_default_config};

pub const CONFIG_DIR_NAME: &str = "zimappend";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub config: Option<PathBuf>,
    pub notebooks_list: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub config_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self {
            cwd,
            config_dir: dirs::config_dir(),
            home_dir: dirs::home_dir(),
        })
    }

    fn base_config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .or_else(|| self.home_dir.as_ref().map(|home| home.join(".config")))
            .unwrap_or_else(|| self.cwd.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub config_path: PathBuf,
    pub notebooks_list_path: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub config_source: ValueSource,
    pub notebooks_list_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({})\nnotebooks_list={} ({})",
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.notebooks_list_path),
            self.notebooks_list_source.as_str(),
        )
    }
}

/// Resolved paths plus the configuration loaded from them.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub paths: ResolvedPaths,
    pub config: AppendConfig,
}

pub fn load_runtime(context: &ResolutionContext, overrides: &PathOverrides) -> Result<Runtime> {
    load_runtime_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn load_runtime_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<Runtime>
where
    F: Fn(&str) -> Option<String>,
{
    let home = context.home_dir.as_deref();

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd, home), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("ZIMAPPEND_CONFIG")) {
        (
            absolutize(Path::new(&value), &context.cwd, home),
            ValueSource::Env,
        )
    } else {
        (
            context
                .base_config_dir()
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILENAME),
            ValueSource::Default,
        )
    };
    debug!(path = %config_path.display(), source = config_source.as_str(), "config path");

    let config = load_config(&config_path)?;

    let (notebooks_list_path, notebooks_list_source) =
        if let Some(path) = overrides.notebooks_list.as_deref() {
            (absolutize(path, &context.cwd, home), ValueSource::Flag)
        } else if let Some(value) = non_empty(lookup_env("ZIM_NOTEBOOKS_LIST")) {
            (
                absolutize(Path::new(&value), &context.cwd, home),
                ValueSource::Env,
            )
        } else if let Some(path) = config.notebooks_list.as_deref() {
            (absolutize(path, &context.cwd, home), ValueSource::Config)
        } else {
            (
                context.base_config_dir().join("zim").join("notebooks.list"),
                ValueSource::Default,
            )
        };

    Ok(Runtime {
        paths: ResolvedPaths {
            config_path,
            notebooks_list_path,
            home_dir: context.home_dir.clone(),
            config_source,
            notebooks_list_source,
        },
        config,
    })
}

/// Write the commented default config. Returns `false` when a file exists and `force` is off.
pub fn init_config(paths: &ResolvedPaths, force: bool) -> Result<bool> {
    write_text_file(&paths.config_path, &render_default_config(), force)
}

/// Expand a leading `~` against the home directory.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn absolutize(path: &Path, base: &Path, home: Option<&Path>) -> PathBuf {
    let expanded = expand_tilde(path, home);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
