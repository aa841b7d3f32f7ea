use std::collections::HashMap;

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::error::Result;
use crate::model::{Memory, Origin, Status, Task};
use crate::store::dual::{LockEntry, Removed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

const RULE: &str = "════════════════════════════════════════════════════════════";
const TITLE_WIDTH: usize = 35;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() > max_len {
        let truncated: String = title.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    }
}

pub fn origin_label(origin: Origin) -> ColoredString {
    match origin {
        Origin::Local => "[local]".dimmed(),
        Origin::Shared => "[shared]".cyan(),
    }
}

fn status_label(status: Status, blocked: bool) -> ColoredString {
    let text = if blocked && status != Status::Done {
        format!("[{status}, blocked]")
    } else {
        format!("[{status}]")
    };
    match status {
        _ if blocked && status != Status::Done => text.red(),
        Status::Open => text.normal(),
        Status::Claimed => text.yellow(),
        Status::Done => text.green(),
    }
}

/// One-line confirmation of a mutation, e.g. `Saved (shared): 0a1b...`.
pub fn print_action<T: Serialize + ?Sized>(
    verb: &str,
    origin: Origin,
    id: &str,
    entity: &T,
    format: Format,
) -> Result<()> {
    match format {
        Format::Json => print_json(entity)?,
        Format::Table => println!("{} ({}): {}", verb.green(), origin, id.bold()),
    }
    Ok(())
}

/// Confirm a removal. Unreadable records have no entity to echo, so JSON
/// carries only the id and origin.
pub fn print_removed<T: Serialize>(removed: &Removed<T>, format: Format) -> Result<()> {
    match (&removed.entry, format) {
        (Some(entry), _) => print_action("Deleted", removed.origin(), &removed.id, entry, format),
        (None, Format::Json) => print_json(removed),
        (None, Format::Table) => {
            println!(
                "{} ({}): {}",
                "Deleted unreadable record".yellow(),
                removed.origin(),
                removed.id.bold()
            );
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Memories
// ---------------------------------------------------------------------------

pub fn print_memory(memory: &Memory, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(memory)?,
        Format::Table => {
            println!("{RULE}");
            println!("  {}", memory.title.bold());
            println!(
                "  {} • {} • {}",
                memory.author,
                memory.created_at.format("%Y-%m-%d %H:%M"),
                origin_label(memory.origin())
            );
            if !memory.tags.is_empty() {
                println!("  tags: {}", memory.tags.join(", "));
            }
            println!("{RULE}");
            println!();
            println!("{}", memory.content);
        }
    }
    Ok(())
}

pub fn print_memories(memories: &[Memory], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(memories)?,
        Format::Table => {
            if memories.is_empty() {
                println!("No memories found");
                return Ok(());
            }
            println!("{:18} {:35} {:10} {:16} TAGS", "ID", "TITLE", "TYPE", "AUTHOR");
            println!("{}", "-".repeat(90));
            for memory in memories {
                println!(
                    "{:18} {:35} {:10} {:16} {}",
                    memory.id,
                    truncate_title(&memory.title, TITLE_WIDTH),
                    origin_label(memory.origin()),
                    truncate_title(&memory.author, 16),
                    memory.tags.join(",")
                );
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A task as emitted in JSON, with the derived blocked flag.
#[derive(Serialize)]
struct TaskView<'a> {
    #[serde(flatten)]
    task: &'a Task,
    blocked: bool,
}

pub fn print_task(task: &Task, blocked: bool, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(&TaskView { task, blocked })?,
        Format::Table => {
            println!("{RULE}");
            println!("  {} {}", task.id.bold(), task.title);
            println!(
                "  Status: {} • Type: {} • Created by: {}",
                status_label(task.status, blocked),
                origin_label(task.origin()),
                task.created_by
            );
            println!("{RULE}");
            if !task.description.is_empty() {
                println!();
                println!("{}", task.description);
            }
            if !task.owner.is_empty() {
                println!("\nOwner: {}", task.owner);
            }
            if let Some(done_at) = task.done_at {
                println!("\nDone at: {}", done_at.format("%Y-%m-%d %H:%M"));
            }
            if !task.blocked_by.is_empty() {
                println!("\nBlocked by: {}", task.blocked_by.join(", "));
            }
            if !task.blocks.is_empty() {
                println!("Blocks: {}", task.blocks.join(", "));
            }
            if !task.comments.is_empty() {
                println!("\nComments:");
                for comment in &task.comments {
                    println!(
                        "  [{}] {}: {}",
                        comment.created_at.format("%Y-%m-%d"),
                        comment.author,
                        comment.content
                    );
                }
            }
        }
    }
    Ok(())
}

pub fn print_tasks(tasks: &[Task], statuses: &HashMap<String, Status>, format: Format) -> Result<()> {
    let is_blocked = |task: &Task| task.is_blocked(|id| statuses.get(id).copied());
    match format {
        Format::Json => {
            let views: Vec<TaskView<'_>> = tasks
                .iter()
                .map(|task| TaskView {
                    task,
                    blocked: is_blocked(task),
                })
                .collect();
            print_json(&views)?;
        }
        Format::Table => {
            if tasks.is_empty() {
                println!("No tasks found");
                return Ok(());
            }
            println!("{:23} {:35} {:19} {:10} OWNER", "ID", "TITLE", "STATUS", "TYPE");
            println!("{}", "-".repeat(100));
            for task in tasks {
                let owner = if task.owner.is_empty() { "-" } else { task.owner.as_str() };
                println!(
                    "{:23} {:35} {:19} {:10} {}",
                    task.id,
                    truncate_title(&task.title, TITLE_WIDTH),
                    status_label(task.status, is_blocked(task)),
                    origin_label(task.origin()),
                    owner
                );
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

pub fn print_locks(locks: &[LockEntry], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(locks)?,
        Format::Table => {
            if locks.is_empty() {
                println!("No active locks");
                return Ok(());
            }
            println!("{:40} {:16} {:17} TYPE", "TARGET", "LOCKED BY", "EXPIRES");
            println!("{}", "-".repeat(85));
            for entry in locks {
                println!(
                    "{:40} {:16} {:17} {}",
                    truncate_title(&entry.lock.target, 40),
                    entry.lock.locked_by,
                    entry.lock.expires_at.format("%Y-%m-%d %H:%M"),
                    origin_label(entry.origin())
                );
            }
        }
    }
    Ok(())
}
