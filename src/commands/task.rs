use colored::Colorize;
use serde_json::json;

use crate::error::Result;
use crate::model::{Origin, Status, Task};
use crate::output::{self, Format};
use crate::store::dual::{DualStore, Scope};

pub fn add(
    store: &DualStore,
    origin: Origin,
    title: &str,
    description: Option<String>,
    format: Format,
) -> Result<()> {
    let task = store.add_task(
        origin,
        title,
        description.as_deref().unwrap_or_default(),
        &store.author(),
    )?;
    output::print_action("Created", origin, &task.id, &task, format)
}

pub fn list(
    store: &DualStore,
    scope: Scope,
    status: Option<Status>,
    query: Option<String>,
    format: Format,
) -> Result<()> {
    let mut tasks = match query {
        Some(query) => store.search_tasks(scope, &query)?,
        None => store.list_tasks(scope)?,
    };
    if let Some(status) = status {
        tasks.retain(|t| t.status == status);
    }
    output::print_tasks(&tasks, &store.status_index()?, format)
}

pub fn show(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let task = store.find_task(id)?;
    let blocked = store.task_is_blocked(&task)?;
    output::print_task(&task, blocked, format)
}

fn report(verb: &str, task: &Task, format: Format) -> Result<()> {
    match format {
        Format::Json => output::print_json(task),
        Format::Table => {
            println!("{}: {}", verb.green(), task.id.bold());
            Ok(())
        }
    }
}

pub fn claim(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let task = store.claim_task(id, &store.author())?;
    report("Claimed", &task, format)
}

pub fn drop(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let task = store.drop_task(id, &store.author())?;
    report("Dropped", &task, format)
}

pub fn done(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let task = store.complete_task(id)?;
    report("Done", &task, format)
}

pub fn comment(store: &DualStore, id: &str, message: &str, format: Format) -> Result<()> {
    let task = store.comment_task(id, &store.author(), message)?;
    report("Comment added to", &task, format)
}

pub fn remove(store: &DualStore, id: &str, format: Format) -> Result<()> {
    let removed = store.remove_task(id)?;
    output::print_removed(&removed, format)
}

pub fn block(store: &DualStore, id: &str, blocker: &str, format: Format) -> Result<()> {
    let (dependent, blocker) = store.block_task(id, blocker)?;
    print_edge("blocked by", &dependent, &blocker, format)
}

pub fn unblock(store: &DualStore, id: &str, blocker: &str, format: Format) -> Result<()> {
    let (dependent, blocker) = store.unblock_task(id, blocker)?;
    print_edge("no longer blocked by", &dependent, &blocker, format)
}

fn print_edge(relation: &str, dependent: &Task, blocker: &Task, format: Format) -> Result<()> {
    match format {
        Format::Json => output::print_json(&json!({
            "task": dependent,
            "blocker": blocker,
        })),
        Format::Table => {
            println!("{} {relation} {}", dependent.id.bold(), blocker.id.bold());
            Ok(())
        }
    }
}
