use clap::{Parser, Subcommand};
use git_ctx::commands;
use git_ctx::model::{Origin, Status};
use git_ctx::output::Format;
use git_ctx::store::dual::{DualStore, MemoryEdit, Scope};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "git-ctx",
    bin_name = "git-ctx",
    version = git_ctx::build_info::long_version(),
    about = "Notes, tasks and locks stored beside your git repository"
)]
struct Cli {
    /// Use shared storage (syncs with push/pull)
    #[arg(long, short, global = true)]
    shared: bool,
    /// Show both local and shared entries
    #[arg(long, short, global = true)]
    all: bool,
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: Format,
    /// Shorthand for --format json
    #[arg(long, global = true, hide = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a memory (body from --message, piped stdin, or the editor)
    Add {
        /// Title words
        words: Vec<String>,
        /// Title (overrides positional words)
        #[arg(long, short)]
        title: Option<String>,
        /// Body text; skips the editor
        #[arg(long, short)]
        message: Option<String>,
        /// Tag (repeatable)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// List memories
    List {
        /// Only memories carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show a memory
    Show { id: String },
    /// Edit a memory; opens the editor when no field is given
    Edit {
        id: String,
        #[arg(long, short)]
        title: Option<String>,
        /// Replace the body
        #[arg(long, short)]
        message: Option<String>,
        /// Replace tags (repeatable)
        #[arg(long)]
        tag: Option<Vec<String>>,
    },
    /// Delete a memory
    #[command(visible_alias = "remove")]
    Rm { id: String },
    /// Search memories by title and content (local and shared unless narrowed)
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        /// Only search local entries
        #[arg(long)]
        local: bool,
    },
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Lock a task id or file path
    Lock { target: String },
    /// Release a lock, or all of your locks when no target is given
    Unlock { target: Option<String> },
    /// List active locks
    #[command(visible_alias = "lock-list")]
    Locks {
        /// Include expired locks
        #[arg(long)]
        expired: bool,
    },
    /// Push shared context to a remote
    Push { remote: Option<String> },
    /// Fetch and integrate shared context from a remote
    Pull { remote: Option<String> },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task
    Add {
        #[arg(required = true)]
        title: Vec<String>,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// List tasks
    List {
        #[arg(long, value_enum)]
        status: Option<Status>,
        /// Only tasks whose title or description contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Show task details
    Show { id: String },
    /// Take ownership of a task
    Claim { id: String },
    /// Release ownership of a task
    Drop { id: String },
    /// Mark a task complete
    Done { id: String },
    /// Comment on a task
    Comment {
        id: String,
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Delete a task
    #[command(visible_alias = "remove")]
    Rm { id: String },
    /// Record that a task waits on another
    Block { id: String, blocker: String },
    /// Remove a dependency between two tasks
    Unblock { id: String, blocker: String },
}

fn run(cli: Cli, format: Format) -> git_ctx::error::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = DualStore::discover(&cwd)?;
    let origin = Origin::from_shared(cli.shared);
    let scope = Scope::from_flags(cli.shared, cli.all);

    match cli.command {
        Commands::Add {
            words,
            title,
            message,
            tag,
        } => {
            let title = title.or_else(|| (!words.is_empty()).then(|| words.join(" ")));
            commands::add::run(&store, origin, title, message, tag, format)
        }
        Commands::List { tag } => commands::list::run(&store, scope, tag, format),
        Commands::Show { id } => commands::show::run(&store, &id, format),
        Commands::Edit {
            id,
            title,
            message,
            tag,
        } => {
            let edit = MemoryEdit {
                title,
                content: message,
                tags: tag,
            };
            commands::edit::run(&store, &id, edit, format)
        }
        Commands::Rm { id } => commands::remove::run(&store, &id, format),
        Commands::Search { query, local } => {
            let scope = search_scope(local, cli.shared, cli.all);
            commands::search::run(&store, scope, &query.join(" "), format)
        }
        Commands::Task(task) => match task {
            TaskCommand::Add { title, description } => {
                commands::task::add(&store, origin, &title.join(" "), description, format)
            }
            TaskCommand::List { status, search } => {
                commands::task::list(&store, scope, status, search, format)
            }
            TaskCommand::Show { id } => commands::task::show(&store, &id, format),
            TaskCommand::Claim { id } => commands::task::claim(&store, &id, format),
            TaskCommand::Drop { id } => commands::task::drop(&store, &id, format),
            TaskCommand::Done { id } => commands::task::done(&store, &id, format),
            TaskCommand::Comment { id, message } => {
                commands::task::comment(&store, &id, &message.join(" "), format)
            }
            TaskCommand::Rm { id } => commands::task::remove(&store, &id, format),
            TaskCommand::Block { id, blocker } => {
                commands::task::block(&store, &id, &blocker, format)
            }
            TaskCommand::Unblock { id, blocker } => {
                commands::task::unblock(&store, &id, &blocker, format)
            }
        },
        Commands::Lock { target } => commands::lock::lock(&store, origin, &target, format),
        Commands::Unlock { target } => commands::lock::unlock(&store, target.as_deref(), format),
        Commands::Locks { expired } => commands::lock::list(&store, scope, expired, format),
        Commands::Push { remote } => commands::sync::push(&store, remote.as_deref(), format),
        Commands::Pull { remote } => commands::sync::pull(&store, remote.as_deref(), format),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json { Format::Json } else { cli.format };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            Format::Table => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}

/// Search defaults to both backends. `--local` narrows it (and beats
/// `--shared`); `--all` overrides both.
fn search_scope(local: bool, shared: bool, all: bool) -> Scope {
    match (all, local, shared) {
        (true, _, _) => Scope::All,
        (false, true, _) => Scope::Local,
        (false, false, true) => Scope::Shared,
        (false, false, false) => Scope::All,
    }
}
