use std::io::{self, IsTerminal, Read};

use crate::editor;
use crate::error::Result;
use crate::model::Origin;
use crate::output::{self, Format};
use crate::store::dual::DualStore;

const UNTITLED: &str = "Untitled";

/// Where the body of a new memory comes from, in priority order.
fn resolve_content(store: &DualStore, title: &str, message: Option<String>) -> Result<String> {
    if let Some(message) = message {
        return Ok(message.trim().to_string());
    }
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        let mut piped = String::new();
        stdin.lock().read_to_string(&mut piped)?;
        return Ok(piped.trim().to_string());
    }
    let edited = editor::edit_text(store.local().root(), &format!("# {title}\n\n"))?;
    Ok(editor::strip_template(&edited, title))
}

pub fn run(
    store: &DualStore,
    origin: Origin,
    title: Option<String>,
    message: Option<String>,
    tags: Vec<String>,
    format: Format,
) -> Result<()> {
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());
    let content = resolve_content(store, &title, message)?;
    let memory = store.add_memory(origin, &title, &content, &store.author(), tags)?;
    output::print_action("Created", origin, &memory.id, &memory, format)
}
