use crate::editor;
use crate::error::Result;
use crate::output::{self, Format};
use crate::store::dual::{DualStore, MemoryEdit};

/// Apply the given replacements, or open the body in the editor when none
/// were given.
pub fn run(store: &DualStore, id: &str, mut edit: MemoryEdit, format: Format) -> Result<()> {
    if edit.is_empty() {
        let memory = store.find_memory(id)?;
        let edited = editor::edit_text(store.local().root(), &memory.content)?;
        edit.content = Some(edited.trim_end().to_string());
    }
    let memory = store.edit_memory(id, edit)?;
    output::print_action("Updated", memory.origin(), &memory.id, &memory, format)
}
