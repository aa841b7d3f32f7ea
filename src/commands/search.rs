use crate::error::Result;
use crate::output::{self, Format};
use crate::store::dual::{DualStore, Scope};

/// Search memories by title and content within `scope`.
pub fn run(store: &DualStore, scope: Scope, query: &str, format: Format) -> Result<()> {
    let results = store.search_memories(scope, query)?;
    if results.is_empty() && format == Format::Table {
        println!("No results for: {query}");
        return Ok(());
    }
    if format == Format::Table {
        println!("Found {} results for \"{query}\":\n", results.len());
    }
    output::print_memories(&results, format)
}
