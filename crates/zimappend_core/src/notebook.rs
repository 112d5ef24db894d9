use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::config::{AppendConfig, FALLBACK_NOTEBOOK};
use crate::page::PageName;
use crate::runtime::{expand_tilde, normalize_for_display};

pub const NOTEBOOK_CONFIG_FILENAME: &str = "notebook.zim";
const NOTEBOOK_ENV: &str = "ZIMAPPEND_NOTEBOOK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotebookInfo {
    pub name: String,
    pub root: PathBuf,
}

impl NotebookInfo {
    /// Describe the notebook at `root`, taking its name from `notebook.zim` when present.
    pub fn from_root(root: PathBuf) -> Self {
        let name = read_notebook_name(&root).unwrap_or_else(|| {
            root.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| normalize_for_display(&root))
        });
        Self { name, root }
    }

    pub fn page_exists(&self, page: &PageName) -> bool {
        page.text_path(&self.root).is_file()
    }

    pub fn has_children(&self, page: &PageName) -> bool {
        page.dir_path(&self.root).is_dir()
    }

    pub fn uri(&self) -> String {
        format!("file://{}", normalize_for_display(&self.root))
    }
}

/// Notebooks known to the host, as read from its notebook list.
#[derive(Debug, Clone, Default)]
pub struct NotebookList {
    pub default: Option<String>,
    pub notebooks: Vec<NotebookInfo>,
}

pub fn load_notebook_list(path: &Path, home: Option<&Path>) -> Result<NotebookList> {
    if !path.exists() {
        debug!(path = %path.display(), "no notebook list");
        return Ok(NotebookList::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_notebook_list(&content, home))
}

/// Parse both list layouts: `[Notebook N]` sections with `uri=`/`name=` keys,
/// and bare URIs under `[NotebookList]`.
pub fn parse_notebook_list(content: &str, home: Option<&Path>) -> NotebookList {
    let mut default = None;
    let mut bare_uris = Vec::new();
    let mut sections: Vec<(Option<String>, Option<String>)> = Vec::new();
    let mut section = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            section = name.trim().to_string();
            if section.starts_with("Notebook ") {
                sections.push((None, None));
            }
            continue;
        }

        if section == "NotebookList" {
            match line.strip_prefix("Default=") {
                Some(value) => default = Some(value.trim().to_string()),
                None => {
                    let uri = strip_entry_number(line);
                    if !uri.is_empty() {
                        bare_uris.push(uri.to_string());
                    }
                }
            }
        } else if section.starts_with("Notebook ") {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() || value == "None" {
                continue;
            }
            if let Some(entry) = sections.last_mut() {
                match key.trim() {
                    "uri" => entry.0 = Some(value.to_string()),
                    "name" => entry.1 = Some(value.to_string()),
                    _ => {}
                }
            }
        }
    }

    let mut notebooks: Vec<NotebookInfo> = Vec::new();
    for (uri, name) in sections {
        let Some(uri) = uri else { continue };
        let root = uri_to_path(&uri, home);
        let info = match name {
            Some(name) => NotebookInfo { name, root },
            None => NotebookInfo::from_root(root),
        };
        notebooks.push(info);
    }
    for uri in bare_uris {
        let root = uri_to_path(&uri, home);
        if notebooks.iter().all(|known| known.root != root) {
            notebooks.push(NotebookInfo::from_root(root));
        }
    }

    NotebookList { default, notebooks }
}

/// Pick the notebook: flag, then `ZIMAPPEND_NOTEBOOK`, then config, then the list default.
pub fn select_notebook(
    flag: Option<&str>,
    config: &AppendConfig,
    list: &NotebookList,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<NotebookInfo> {
    select_notebook_with_lookup(flag, config, list, cwd, home, |key| env::var(key).ok())
}

fn select_notebook_with_lookup<F>(
    flag: Option<&str>,
    config: &AppendConfig,
    list: &NotebookList,
    cwd: &Path,
    home: Option<&Path>,
    lookup_env: F,
) -> Result<NotebookInfo>
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = lookup_env(NOTEBOOK_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let query = flag
        .map(str::to_string)
        .or(from_env)
        .or_else(|| config.default_notebook().map(str::to_string))
        .or_else(|| list.default.clone())
        .unwrap_or_else(|| FALLBACK_NOTEBOOK.to_string());
    debug!(query = %query, "selecting notebook");
    resolve_notebook(&query, list, cwd, home)
}

pub fn resolve_notebook(
    query: &str,
    list: &NotebookList,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<NotebookInfo> {
    let query = query.trim();
    if query.is_empty() {
        bail!("notebook name is empty");
    }

    if looks_like_path(query) {
        let mut path = uri_to_path(query, home);
        if path.is_relative() {
            path = cwd.join(path);
        }
        if path.file_name().is_some_and(|name| name == NOTEBOOK_CONFIG_FILENAME) {
            if let Some(parent) = path.parent() {
                path = parent.to_path_buf();
            }
        }
        if !path.is_dir() {
            bail!("notebook folder does not exist: {}", path.display());
        }
        if let Some(known) = list.notebooks.iter().find(|known| known.root == path) {
            return Ok(known.clone());
        }
        return Ok(NotebookInfo::from_root(path));
    }

    if let Some(found) = list
        .notebooks
        .iter()
        .find(|known| known.name == query)
        .or_else(|| {
            list.notebooks
                .iter()
                .find(|known| known.name.eq_ignore_ascii_case(query))
        })
    {
        return Ok(found.clone());
    }

    if list.notebooks.is_empty() {
        bail!("unknown notebook `{query}` (no notebooks are registered; pass a folder path instead)");
    }
    let known = list
        .notebooks
        .iter()
        .map(|known| known.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("unknown notebook `{query}`; known notebooks: {known}")
}

/// Newer lists number their entries (`1=<uri>`); older ones list bare URIs.
fn strip_entry_number(line: &str) -> &str {
    match line.split_once('=') {
        Some((key, value))
            if !key.trim().is_empty() && key.trim().bytes().all(|byte| byte.is_ascii_digit()) =>
        {
            value.trim()
        }
        _ => line,
    }
}

fn looks_like_path(query: &str) -> bool {
    query.starts_with("file://")
        || query.starts_with('/')
        || query.starts_with('~')
        || query.starts_with('.')
        || query.contains('/')
        || query.contains('\\')
}

fn uri_to_path(uri: &str, home: Option<&Path>) -> PathBuf {
    let raw = match uri.strip_prefix("file://") {
        Some(rest) => percent_decode(rest),
        None => uri.to_string(),
    };
    expand_tilde(Path::new(&raw), home)
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[index + 1]), hex_value(bytes[index + 2])) {
                out.push(high * 16 + low);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn read_notebook_name(root: &Path) -> Option<String> {
    let content = fs::read_to_string(root.join(NOTEBOOK_CONFIG_FILENAME)).ok()?;
    let mut in_notebook = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_notebook = line == "[Notebook]";
            continue;
        }
        if !in_notebook {
            continue;
        }
        if let Some(value) = line.strip_prefix("name=") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::tempdir;

    use super::{
        NotebookInfo, NotebookList, parse_notebook_list, percent_decode, resolve_notebook,
        select_notebook_with_lookup,
    };
    use crate::config::AppendConfig;
    use crate::page::PageName;

    #[test]
    fn parses_sectioned_list() {
        let home = PathBuf::from("/home/someone");
        let list = parse_notebook_list(
            "[NotebookList]\nDefault=~/Notebooks/Notes\n~/Notebooks/Notes\n~/Notebooks/Work\n\n[Notebook 1]\nuri=~/Notebooks/Notes\nname=Notes\ninterwiki=None\nicon=None\n\n[Notebook 2]\nuri=file:///home/someone/Notebooks/Work\nname=Work\n",
            Some(&home),
        );
        assert_eq!(list.default.as_deref(), Some("~/Notebooks/Notes"));
        assert_eq!(
            list.notebooks,
            vec![
                NotebookInfo {
                    name: "Notes".to_string(),
                    root: home.join("Notebooks/Notes"),
                },
                NotebookInfo {
                    name: "Work".to_string(),
                    root: home.join("Notebooks/Work"),
                },
            ]
        );
    }

    #[test]
    fn parses_numbered_list_entries() {
        let home = PathBuf::from("/home/someone");
        let list = parse_notebook_list(
            "[NotebookList]\nDefault=file:///home/someone/Notebooks/Notes\n1=file:///home/someone/Notebooks/Notes\n2=~/Notebooks/Work\n\n[Notebook 1]\nuri=file:///home/someone/Notebooks/Notes\nname=Notes\n",
            Some(&home),
        );
        assert_eq!(
            list.default.as_deref(),
            Some("file:///home/someone/Notebooks/Notes")
        );
        assert_eq!(
            list.notebooks,
            vec![
                NotebookInfo {
                    name: "Notes".to_string(),
                    root: home.join("Notebooks/Notes"),
                },
                NotebookInfo {
                    name: "Work".to_string(),
                    root: home.join("Notebooks/Work"),
                },
            ]
        );
    }

    #[test]
    fn legacy_list_reads_names_from_notebook_config() {
        let temp = tempdir().expect("tempdir");
        let primary = temp.path().join("Primary Notes");
        let other = temp.path().join("other");
        fs::create_dir_all(&primary).expect("mkdir");
        fs::create_dir_all(&other).expect("mkdir");
        fs::write(
            primary.join("notebook.zim"),
            "[Notebook]\nversion=0.4\nname=Primary\nhome=Home\n",
        )
        .expect("write notebook.zim");

        let content = format!(
            "[NotebookList]\nDefault=file://{}\nfile://{}\n{}\n",
            primary.display().to_string().replace(' ', "%20"),
            primary.display().to_string().replace(' ', "%20"),
            other.display()
        );
        let list = parse_notebook_list(&content, None);
        let names: Vec<&str> = list.notebooks.iter().map(|nb| nb.name.as_str()).collect();
        assert_eq!(names, ["Primary", "other"]);
        assert_eq!(list.notebooks[0].root, primary);
    }

    #[test]
    fn resolve_by_name_then_case_insensitive() {
        let list = NotebookList {
            default: None,
            notebooks: vec![NotebookInfo {
                name: "Notes".to_string(),
                root: PathBuf::from("/nb/notes"),
            }],
        };
        let cwd = Path::new("/");
        assert_eq!(
            resolve_notebook("Notes", &list, cwd, None).expect("exact").root,
            PathBuf::from("/nb/notes")
        );
        assert_eq!(
            resolve_notebook("notes", &list, cwd, None).expect("folded").name,
            "Notes"
        );
        let error = resolve_notebook("Missing", &list, cwd, None).expect_err("unknown");
        assert!(error.to_string().contains("known notebooks: Notes"));
    }

    #[test]
    fn resolve_accepts_folder_and_notebook_config_paths() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("nb");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("notebook.zim"), "[Notebook]\nname=Scratch\n").expect("write");

        let list = NotebookList::default();
        let by_dir = resolve_notebook(&root.display().to_string(), &list, temp.path(), None)
            .expect("dir");
        assert_eq!(by_dir.name, "Scratch");

        let by_config =
            resolve_notebook("nb/notebook.zim", &list, temp.path(), None).expect("config path");
        assert_eq!(by_config.root, root);

        let missing = resolve_notebook("./absent", &list, temp.path(), None).expect_err("missing");
        assert!(missing.to_string().contains("notebook folder does not exist"));
    }

    #[test]
    fn selection_prefers_flag_then_config_then_list_default() {
        let temp = tempdir().expect("tempdir");
        let list = NotebookList {
            default: Some("Work".to_string()),
            notebooks: vec![
                NotebookInfo {
                    name: "Notes".to_string(),
                    root: temp.path().join("notes"),
                },
                NotebookInfo {
                    name: "Work".to_string(),
                    root: temp.path().join("work"),
                },
            ],
        };
        let config = AppendConfig {
            default_notebook: Some("Notes".to_string()),
            ..AppendConfig::default()
        };

        let unset = |_: &str| None;
        let chosen = select_notebook_with_lookup(Some("Work"), &config, &list, temp.path(), None, unset)
            .expect("flag");
        assert_eq!(chosen.name, "Work");
        let chosen =
            select_notebook_with_lookup(None, &config, &list, temp.path(), None, unset).expect("config");
        assert_eq!(chosen.name, "Notes");
        let chosen = select_notebook_with_lookup(
            None,
            &AppendConfig::default(),
            &list,
            temp.path(),
            None,
            unset,
        )
        .expect("list default");
        assert_eq!(chosen.name, "Work");
    }

    #[test]
    fn environment_overrides_config_but_not_flag() {
        let temp = tempdir().expect("tempdir");
        let list = NotebookList {
            default: None,
            notebooks: vec![
                NotebookInfo {
                    name: "Notes".to_string(),
                    root: temp.path().join("notes"),
                },
                NotebookInfo {
                    name: "Work".to_string(),
                    root: temp.path().join("work"),
                },
            ],
        };
        let config = AppendConfig {
            default_notebook: Some("Notes".to_string()),
            ..AppendConfig::default()
        };
        let lookup = |key: &str| (key == "ZIMAPPEND_NOTEBOOK").then(|| " Work ".to_string());

        let chosen = select_notebook_with_lookup(None, &config, &list, temp.path(), None, lookup)
            .expect("env");
        assert_eq!(chosen.name, "Work");
        let chosen =
            select_notebook_with_lookup(Some("Notes"), &config, &list, temp.path(), None, lookup)
                .expect("flag");
        assert_eq!(chosen.name, "Notes");

        let blank = |_: &str| Some("  ".to_string());
        let chosen = select_notebook_with_lookup(None, &config, &list, temp.path(), None, blank)
            .expect("blank env");
        assert_eq!(chosen.name, "Notes");
    }

    #[test]
    fn page_checks_use_file_and_directory() {
        let temp = tempdir().expect("tempdir");
        let notebook = NotebookInfo::from_root(temp.path().to_path_buf());
        let page = PageName::parse("Projects").expect("page");
        assert!(!notebook.page_exists(&page));
        assert!(!notebook.has_children(&page));

        fs::create_dir_all(temp.path().join("Projects")).expect("mkdir");
        assert!(notebook.has_children(&page));
        assert!(!notebook.page_exists(&page));

        fs::write(temp.path().join("Projects.txt"), "x").expect("write");
        assert!(notebook.page_exists(&page));
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("/home/a%20b/c%2Fd"), "/home/a b/c/d");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
