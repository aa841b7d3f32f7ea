use colored::Colorize;

use crate::error::Result;
use crate::model::Origin;
use crate::output::{self, Format};
use crate::store::dual::{DualStore, Scope};

pub fn lock(store: &DualStore, origin: Origin, target: &str, format: Format) -> Result<()> {
    let lock = store.acquire_lock(origin, target, &store.author())?;
    match format {
        Format::Json => output::print_json(&lock),
        Format::Table => {
            println!(
                "{} ({origin}): {} until {}",
                "Locked".green(),
                lock.target.bold(),
                lock.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(())
        }
    }
}

/// Release one target, or every lock the current user holds when no target is given.
pub fn unlock(store: &DualStore, target: Option<&str>, format: Format) -> Result<()> {
    let author = store.author();
    let Some(target) = target else {
        let report = store.release_all(&author)?;
        return match format {
            Format::Json => output::print_json(&report),
            Format::Table => {
                for entry in &report.released {
                    println!("{} ({}): {}", "Unlocked".green(), entry.origin(), entry.lock.target);
                }
                for failure in &report.failures {
                    let origin = Origin::from_shared(failure.shared);
                    eprintln!("{} ({origin}): {}: {}", "failed".red(), failure.target, failure.error);
                }
                if report.released.is_empty() && report.failures.is_empty() {
                    println!("No locks to release");
                } else {
                    println!("Released {} lock(s)", report.released.len());
                }
                Ok(())
            }
        };
    };

    let entry = store.release_lock(target, &author)?;
    match format {
        Format::Json => output::print_json(&entry),
        Format::Table => {
            println!("{} ({}): {}", "Unlocked".green(), entry.origin(), entry.lock.target);
            Ok(())
        }
    }
}

pub fn list(store: &DualStore, scope: Scope, include_expired: bool, format: Format) -> Result<()> {
    let locks = store.list_locks(scope, include_expired)?;
    output::print_locks(&locks, format)
}
