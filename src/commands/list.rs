use crate::error::Result;
use crate::output::{self, Format};
use crate::store::dual::{DualStore, Scope};

pub fn run(store: &DualStore, scope: Scope, tag: Option<String>, format: Format) -> Result<()> {
    let mut memories = store.list_memories(scope)?;
    if let Some(tag) = tag {
        memories.retain(|m| m.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)));
    }
    output::print_memories(&memories, format)
}
