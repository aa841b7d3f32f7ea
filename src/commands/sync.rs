use colored::Colorize;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::dual::DualStore;
use crate::store::sync::{PullOutcome, PushOutcome};

fn remote_name<'a>(store: &'a DualStore, remote: Option<&'a str>) -> &'a str {
    remote.unwrap_or(&store.config().remote)
}

pub fn push(store: &DualStore, remote: Option<&str>, format: Format) -> Result<()> {
    let outcome = store.push(remote)?;
    if format == Format::Json {
        return output::print_json(&outcome);
    }
    let remote = remote_name(store, remote);
    match outcome {
        PushOutcome::NothingToPush => println!("Nothing to push: no shared context yet"),
        PushOutcome::Pushed { commit } => {
            println!("{} shared context to {remote} ({})", "Pushed".green(), &commit[..7]);
        }
    }
    Ok(())
}

pub fn pull(store: &DualStore, remote: Option<&str>, format: Format) -> Result<()> {
    let outcome = store.pull(remote)?;
    if format == Format::Json {
        return output::print_json(&outcome);
    }
    let remote = remote_name(store, remote);
    match outcome {
        PullOutcome::NothingToPull => println!("Nothing to pull: {remote} has no shared context"),
        PullOutcome::UpToDate => println!("Already up to date with {remote}"),
        PullOutcome::FastForwarded { commit } => {
            println!("{} shared context from {remote} ({})", "Updated".green(), &commit[..7]);
        }
        PullOutcome::Merged { commit } => {
            println!("{} shared context from {remote} ({})", "Merged".green(), &commit[..7]);
        }
    }
    Ok(())
}
