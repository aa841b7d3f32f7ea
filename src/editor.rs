use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::{CtxError, Result};

const SCRATCH_FILE: &str = "EDIT_CONTENT.md";
const FALLBACK_EDITOR: &str = "vi";

/// `$VISUAL`, then `$EDITOR`, then `vi`.
pub fn editor_command() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// Open `initial` in the user's editor and return what was saved.
///
/// The scratch file lives in `scratch_dir` and is removed afterwards.
pub fn edit_text(scratch_dir: &Path, initial: &str) -> Result<String> {
    edit_text_with(&editor_command(), scratch_dir, initial)
}

fn edit_text_with(editor: &str, scratch_dir: &Path, initial: &str) -> Result<String> {
    fs::create_dir_all(scratch_dir)?;
    let path = scratch_dir.join(SCRATCH_FILE);
    fs::write(&path, initial)?;

    // Through the shell so editors configured with arguments ("code --wait") work.
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"$1\""))
        .arg("git-ctx-editor")
        .arg(&path)
        .status()
        .map_err(|e| CtxError::Editor(format!("{editor}: {e}")));

    let outcome = match status {
        Ok(status) if status.success() => fs::read_to_string(&path).map_err(CtxError::from),
        Ok(status) => Err(CtxError::Editor(format!("{editor} exited with {status}"))),
        Err(e) => Err(e),
    };
    let _ = fs::remove_file(&path);
    outcome
}

/// Drop the `# <title>` template heading if the user left it in place.
pub fn strip_template(content: &str, title: &str) -> String {
    let heading = format!("# {title}");
    let body = match content.split_once('\n') {
        Some((first, rest)) if first.trim_end() == heading => rest,
        None if content.trim_end() == heading => "",
        _ => content,
    };
    body.trim().to_string()
}
