use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attachments::{AttachmentOutcome, attach_path, import_directory};
use crate::backend::{BackendKind, PageBackend, Presentation};
use crate::content::heading;
use crate::notebook::NotebookInfo;
use crate::page::{PageName, page_title};

#[derive(Debug)]
pub enum DispatchError {
    NoTarget,
    PageExists(String),
    PageMissing(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoTarget => {
                write!(f, "no target page: use --page, --journal or --date")
            }
            DispatchError::PageExists(page) => write!(f, "page already exists: {page}"),
            DispatchError::PageMissing(page) => write!(f, "page does not exist: {page}"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Restricts whether the write may create or extend a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Any,
    CreateOnly,
    ExistingOnly,
}

#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub page: PageName,
    pub journal_namespace: String,
    /// `None` when no text source was given.
    pub text: Option<String>,
    pub mode: WriteMode,
    pub attach: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub presentation: Option<Presentation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    None,
    Appended,
    Created,
    /// The page had child pages but no text; text was appended under a title heading.
    CreatedOverChildren,
}

impl PageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Appended => "appended",
            Self::Created => "created",
            Self::CreatedOverChildren => "created-over-children",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendReport {
    pub notebook: String,
    pub page: PageName,
    pub page_file: PathBuf,
    pub backend: BackendKind,
    pub action: PageAction,
    pub attachments: Vec<AttachmentOutcome>,
    pub presented: bool,
}

impl AppendReport {
    pub fn did_something(&self) -> bool {
        self.action != PageAction::None || !self.attachments.is_empty() || self.presented
    }
}

/// Apply one request: write the text, import attachments, then present the page.
pub fn apply<B: PageBackend + ?Sized>(
    backend: &mut B,
    notebook: &NotebookInfo,
    request: &AppendRequest,
) -> Result<AppendReport> {
    let page = &request.page;
    let mut action = PageAction::None;

    if let Some(text) = request.text.as_deref() {
        let exists = notebook.page_exists(page);
        debug!(page = %page, exists, backend = backend.kind().as_str(), "dispatching text");
        if exists {
            if request.mode == WriteMode::CreateOnly {
                return Err(DispatchError::PageExists(page.to_string()).into());
            }
            backend.append_text(page, text)?;
            action = PageAction::Appended;
        } else {
            if request.mode == WriteMode::ExistingOnly {
                return Err(DispatchError::PageMissing(page.to_string()).into());
            }
            match backend.kind() {
                BackendKind::Direct => {
                    backend.create_page(page, text)?;
                    action = PageAction::Created;
                }
                BackendKind::Host if notebook.has_children(page) => {
                    // Template creation would pick a numbered sibling name next to the child folder.
                    let titled = format!(
                        "{}{text}",
                        heading(6, &page_title(page, &request.journal_namespace))
                    );
                    backend.append_text(page, &titled)?;
                    action = PageAction::CreatedOverChildren;
                }
                BackendKind::Host => {
                    backend.create_page(page, text)?;
                    action = PageAction::Created;
                }
            }
        }
    }

    let mut attachments = Vec::new();
    for dir in &request.directories {
        attachments.extend(import_directory(notebook, page, dir)?);
    }
    for path in &request.attach {
        attachments.extend(attach_path(notebook, page, path)?);
    }

    let mut presented = false;
    if let Some(presentation) = request.presentation {
        backend.present(page, presentation)?;
        presented = true;
    }

    let report = AppendReport {
        notebook: notebook.name.clone(),
        page: page.clone(),
        page_file: page.text_path(&notebook.root),
        backend: backend.kind(),
        action,
        attachments,
        presented,
    };
    if report.did_something() {
        info!(page = %page, action = action.as_str(), "done");
    } else {
        warn!(page = %page, "nothing to do: no text, attachments or --show given");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{AppendRequest, DispatchError, PageAction, WriteMode, apply};
    use crate::backend::{BackendKind, PageBackend, Presentation};
    use crate::notebook::NotebookInfo;
    use crate::page::PageName;

    #[derive(Debug, Default)]
    struct Recorder {
        kind: Option<BackendKind>,
        calls: Vec<String>,
    }

    impl PageBackend for Recorder {
        fn kind(&self) -> BackendKind {
            self.kind.unwrap_or(BackendKind::Host)
        }

        fn append_text(&mut self, page: &PageName, text: &str) -> Result<()> {
            self.calls.push(format!("append {page} {text:?}"));
            Ok(())
        }

        fn create_page(&mut self, page: &PageName, text: &str) -> Result<()> {
            self.calls.push(format!("create {page} {text:?}"));
            Ok(())
        }

        fn present(&mut self, page: &PageName, presentation: Presentation) -> Result<()> {
            self.calls.push(format!("present {page} {presentation:?}"));
            Ok(())
        }
    }

    fn request(page: &str, text: Option<&str>) -> AppendRequest {
        AppendRequest {
            page: PageName::parse(page).expect("page"),
            journal_namespace: "Journal".to_string(),
            text: text.map(str::to_string),
            mode: WriteMode::Any,
            attach: Vec::new(),
            directories: Vec::new(),
            presentation: None,
        }
    }

    fn notebook(root: &std::path::Path) -> NotebookInfo {
        NotebookInfo {
            name: "Test".to_string(),
            root: root.to_path_buf(),
        }
    }

    #[test]
    fn existing_page_is_appended() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("Inbox.txt"), "x").expect("seed");
        let mut backend = Recorder::default();

        let report =
            apply(&mut backend, &notebook(temp.path()), &request("Inbox", Some("hi"))).expect("apply");
        assert_eq!(report.action, PageAction::Appended);
        assert_eq!(backend.calls, ["append Inbox \"hi\""]);
    }

    #[test]
    fn create_only_refuses_existing_page() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("Inbox.txt"), "x").expect("seed");
        let mut backend = Recorder::default();
        let mut req = request("Inbox", Some("hi"));
        req.mode = WriteMode::CreateOnly;

        let error = apply(&mut backend, &notebook(temp.path()), &req).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<DispatchError>(),
            Some(DispatchError::PageExists(page)) if page == "Inbox"
        ));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn existing_only_refuses_missing_page_on_both_backends() {
        let temp = tempdir().expect("tempdir");
        for kind in [BackendKind::Direct, BackendKind::Host] {
            let mut backend = Recorder {
                kind: Some(kind),
                ..Recorder::default()
            };
            let mut req = request("Inbox", Some("hi"));
            req.mode = WriteMode::ExistingOnly;
            let error = apply(&mut backend, &notebook(temp.path()), &req).expect_err("must fail");
            assert_eq!(error.to_string(), "page does not exist: Inbox");
        }
    }

    #[test]
    fn host_uses_template_for_new_page() {
        let temp = tempdir().expect("tempdir");
        let mut backend = Recorder::default();
        let report =
            apply(&mut backend, &notebook(temp.path()), &request("Ideas", Some("one"))).expect("apply");
        assert_eq!(report.action, PageAction::Created);
        assert_eq!(backend.calls, ["create Ideas \"one\""]);
    }

    #[test]
    fn host_page_with_children_gets_title_heading() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("Projects")).expect("mkdir");
        let mut backend = Recorder::default();
        let report = apply(
            &mut backend,
            &notebook(temp.path()),
            &request("Projects", Some("plan")),
        )
        .expect("apply");
        assert_eq!(report.action, PageAction::CreatedOverChildren);
        assert_eq!(
            backend.calls,
            ["append Projects \"====== Projects ======\\nplan\""]
        );
    }

    #[test]
    fn direct_backend_creates_even_with_children() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("Projects")).expect("mkdir");
        let mut backend = Recorder {
            kind: Some(BackendKind::Direct),
            ..Recorder::default()
        };
        let report = apply(
            &mut backend,
            &notebook(temp.path()),
            &request("Projects", Some("plan")),
        )
        .expect("apply");
        assert_eq!(report.action, PageAction::Created);
        assert_eq!(backend.calls, ["create Projects \"plan\""]);
    }

    #[test]
    fn attachments_and_presentation_without_text() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("receipt.png");
        fs::write(&source, "png").expect("write");
        let root = temp.path().join("nb");
        fs::create_dir_all(&root).expect("mkdir");

        let mut backend = Recorder::default();
        let mut req = request("Expenses", None);
        req.attach = vec![source];
        req.presentation = Some(Presentation::Raise);

        let report = apply(&mut backend, &notebook(&root), &req).expect("apply");
        assert_eq!(report.action, PageAction::None);
        assert_eq!(report.attachments.len(), 1);
        assert!(root.join("Expenses/receipt.png").is_file());
        assert!(report.presented);
        assert_eq!(backend.calls, ["present Expenses Raise"]);
    }

    #[test]
    fn nothing_requested_is_not_an_error() {
        let temp = tempdir().expect("tempdir");
        let mut backend = Recorder::default();
        let report =
            apply(&mut backend, &notebook(temp.path()), &request("Inbox", None)).expect("apply");
        assert!(!report.did_something());
        assert!(backend.calls.is_empty());
    }
}
