use crate::error::Result;
use crate::output::{self, Format};
use crate::store::dual::DualStore;

pub fn run(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let memory = store.find_memory(id)?;
    output::print_memory(&memory, format)
}
