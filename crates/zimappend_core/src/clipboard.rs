use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Helpers tried in order: primary selection first, then the regular clipboard.
const CLIPBOARD_READERS: &[(&str, &[&str])] = &[
    ("wl-paste", &["--no-newline", "--primary"]),
    ("wl-paste", &["--no-newline"]),
    ("xclip", &["-o", "-selection", "primary"]),
    ("xclip", &["-o", "-selection", "clipboard"]),
    ("xsel", &["--output", "--primary"]),
    ("xsel", &["--output", "--clipboard"]),
    ("pbpaste", &[]),
];

/// Read text from the system clipboard. Returns an empty string when nothing is available.
pub fn read_clipboard() -> String {
    read_first_non_empty(CLIPBOARD_READERS, run_reader)
}

fn read_first_non_empty<F>(readers: &[(&str, &[&str])], mut run: F) -> String
where
    F: FnMut(&str, &[&str]) -> Option<String>,
{
    let mut any_ran = false;
    for (program, args) in readers {
        match run(program, args) {
            Some(text) => {
                any_ran = true;
                if !text.is_empty() {
                    debug!(program, bytes = text.len(), "read clipboard");
                    return text;
                }
            }
            None => continue,
        }
    }
    if !any_ran {
        warn!("no clipboard helper found (tried wl-paste, xclip, xsel, pbpaste)");
    }
    String::new()
}

fn run_reader(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return Some(String::new());
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::read_first_non_empty;

    #[test]
    fn first_non_empty_reader_wins() {
        let readers: &[(&str, &[&str])] = &[("missing", &[]), ("empty", &[]), ("full", &[]), ("later", &[])];
        let mut calls = Vec::new();
        let text = read_first_non_empty(readers, |program, _| {
            calls.push(program.to_string());
            match program {
                "missing" => None,
                "empty" => Some(String::new()),
                other => Some(format!("from {other}")),
            }
        });
        assert_eq!(text, "from full");
        assert_eq!(calls, ["missing", "empty", "full"]);
    }

    #[test]
    fn no_helpers_yield_empty_text() {
        let readers: &[(&str, &[&str])] = &[("a", &[]), ("b", &[])];
        assert_eq!(read_first_non_empty(readers, |_, _| None), "");
    }
}
