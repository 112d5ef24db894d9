use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::notebook::NotebookInfo;
use crate::page::PageName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Copied,
    /// A file with identical content was already attached.
    Unchanged,
    /// Stored under a numbered name because a different file had the same name.
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentOutcome {
    pub source: PathBuf,
    pub stored: PathBuf,
    pub status: AttachmentStatus,
}

/// Attach a file, or a whole directory tree, to `page`.
pub fn attach_path(
    notebook: &NotebookInfo,
    page: &PageName,
    source: &Path,
) -> Result<Vec<AttachmentOutcome>> {
    let target = page.dir_path(&notebook.root);
    if source.is_file() {
        return Ok(vec![copy_attachment(source, &target)?]);
    }
    if !source.is_dir() {
        bail!("attachment not found: {}", source.display());
    }

    let name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("cannot attach {}", source.display()))?;
    let tree_root = target.join(name);
    let mut outcomes = Vec::new();
    for entry in WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
    {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        let dir = match relative.parent() {
            Some(parent) => tree_root.join(parent),
            None => tree_root.clone(),
        };
        outcomes.push(copy_attachment(entry.path(), &dir)?);
    }
    Ok(outcomes)
}

/// Attach every regular file directly inside `dir` to `page`.
pub fn import_directory(
    notebook: &NotebookInfo,
    page: &PageName,
    dir: &Path,
) -> Result<Vec<AttachmentOutcome>> {
    if !dir.is_dir() {
        bail!("attachment directory not found: {}", dir.display());
    }
    let target = page.dir_path(&notebook.root);
    let mut outcomes = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
    {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if entry.file_type().is_file() {
            outcomes.push(copy_attachment(entry.path(), &target)?);
        }
    }
    Ok(outcomes)
}

fn copy_attachment(source: &Path, target_dir: &Path) -> Result<AttachmentOutcome> {
    let name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("cannot attach {}", source.display()))?;
    fs::create_dir_all(target_dir)
        .with_context(|| format!("failed to create {}", target_dir.display()))?;

    let mut stored = target_dir.join(name);
    let mut status = AttachmentStatus::Copied;
    if stored.exists() {
        if file_digest(&stored)? == file_digest(source)? {
            debug!(path = %stored.display(), "attachment already present");
            return Ok(AttachmentOutcome {
                source: source.to_path_buf(),
                stored,
                status: AttachmentStatus::Unchanged,
            });
        }
        stored = free_name(target_dir, Path::new(name));
        status = AttachmentStatus::Renamed;
    }

    fs::copy(source, &stored).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            stored.display()
        )
    })?;
    info!(source = %source.display(), stored = %stored.display(), "attached file");
    Ok(AttachmentOutcome {
        source: source.to_path_buf(),
        stored,
        status,
    })
}

/// First `stem-N.ext` (N >= 2) not present in `dir`.
fn free_name(dir: &Path, name: &Path) -> PathBuf {
    let stem = name
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = name
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 2u32;
    loop {
        let candidate = dir.join(format!("{stem}-{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}
