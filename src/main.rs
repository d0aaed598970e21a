//! # DocLedger CLI (`docledger`)
//!
//! ## Usage
//!
//! ```bash
//! docledger --config ./config/docledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docledger init` | Create the SQLite database and run schema migrations |
//! | `docledger index <folders..>` | Index or re-index folders |
//! | `docledger ingest <file>` | Ingest one file (editor save event) |
//! | `docledger search "<query>"` | Keyword search with filters |
//! | `docledger get <id\|path>` | Read a document, optionally at a version |
//! | `docledger versions <path>` | List every version of a path |
//! | `docledger diff <path> <a> <b>` | Line diff between two versions |
//! | `docledger ask "<question>"` | Grounding chunks and citations |
//! | `docledger retention show\|set` | Inspect or change the retention policy |
//! | `docledger purge [--dry-run]` | Enforce the retention policy |
//! | `docledger serve` | Start the HTTP tool server |
//!
//! ## Examples
//!
//! ```bash
//! docledger init
//! docledger index ~/notes --project work
//! docledger search '"named volumes" OR compose' --type md --history
//! docledger diff ~/notes/docker.md 1 2
//! docledger retention set last_n_versions 5 && docledger purge --dry-run
//! ```

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docledger::commands;
use docledger::config;
use docledger::migrate;
use docledger::progress::ProgressMode;
use docledger::server;
use docledger_core::search::{SearchFilters, SortMode};
use docledger_core::LedgerError;

/// DocLedger: a versioned document index with keyword search, grounded
/// retrieval, version diffs and history retention.
#[derive(Parser)]
#[command(name = "docledger", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docledger.toml")]
    config: PathBuf,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Relevance,
    Modified,
}

impl From<SortArg> for SortMode {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Relevance => SortMode::Relevance,
            SortArg::Modified => SortMode::Modified,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index (or re-index) every file under one or more folders.
    ///
    /// Only changed files get a new version. Ctrl-C stops scheduling new
    /// files and lets files already in flight finish.
    Index {
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// Project to register the folders (and stamp new versions) with.
        #[arg(long)]
        project: Option<String>,

        /// Progress on stderr. Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Ingest a single file, e.g. after an editor save.
    Ingest {
        file: PathBuf,

        #[arg(long)]
        project: Option<String>,
    },

    /// Search indexed documents.
    Search {
        /// Terms, "quoted phrases" and OR.
        query: String,

        /// Restrict to file extensions (repeatable).
        #[arg(long = "type")]
        file_types: Vec<String>,

        /// Restrict to folder prefixes (repeatable).
        #[arg(long = "folder")]
        folders: Vec<String>,

        /// Restrict to tags (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Restrict to projects (repeatable).
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Modified on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// Modified on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,

        /// Include superseded versions.
        #[arg(long)]
        history: bool,

        #[arg(long, value_enum, default_value = "relevance")]
        sort: SortArg,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Read a document by id or path.
    Get {
        id: String,

        #[arg(long)]
        version: Option<u32>,
    },

    /// List every version of a path, newest first.
    Versions { path: String },

    /// Line diff between two versions of a path.
    Diff {
        path: String,
        version_a: u32,
        version_b: u32,
    },

    /// Retrieve grounding chunks and citations for a question.
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Inspect or change the history retention policy.
    Retention {
        #[command(subcommand)]
        action: RetentionAction,
    },

    /// Delete historical versions the retention policy no longer keeps.
    Purge {
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// List the latest documents, most recently modified first.
    Notes {
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Delete every version of a path.
    Delete { path: String },

    /// Manage projects.
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage indexed folders.
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Start the HTTP tool server.
    Serve,

    /// Generate shell completions.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum RetentionAction {
    Show,
    /// Set the policy: `all`, `last_n_versions <N>` or `last_n_days <N>`.
    Set { kind: String, value: Option<u32> },
}

#[derive(Subcommand)]
enum ProjectAction {
    List,
    Create {
        id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project no document or folder references.
    Delete { id: String },
}

#[derive(Subcommand)]
enum FolderAction {
    List,
    /// Move a folder to a project; omit --project to unassign it.
    Assign {
        path: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Remove a folder and the documents under it in the same project.
    Remove { path: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<LedgerError>() {
            Some(e) => eprintln!("error[{}]: {}", e.code(), e),
            None => eprintln!("error: {:#}", err),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "docledger", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            folders,
            project,
            progress,
        } => {
            let mode = match progress {
                Some(ProgressArg::Off) => ProgressMode::Off,
                Some(ProgressArg::Human) => ProgressMode::Human,
                Some(ProgressArg::Json) => ProgressMode::Json,
                None => ProgressMode::default_for_tty(),
            };
            commands::run_index(&cfg, &folders, project.as_deref(), mode, json).await?;
        }
        Commands::Ingest { file, project } => {
            commands::run_ingest(&cfg, &file, project.as_deref(), json).await?;
        }
        Commands::Search {
            query,
            file_types,
            folders,
            tags,
            projects,
            from,
            to,
            history,
            sort,
            limit,
            offset,
        } => {
            let filters = SearchFilters {
                file_types,
                folders: folders.iter().map(|f| commands::path_key(f)).collect(),
                tags,
                modified_from: from.as_deref().map(|d| commands::parse_date(d, false)).transpose()?,
                modified_to: to.as_deref().map(|d| commands::parse_date(d, true)).transpose()?,
                project_ids: projects,
            };
            commands::run_search(&cfg, &query, filters, history, sort.into(), limit, offset, json)
                .await?;
        }
        Commands::Get { id, version } => {
            commands::run_get(&cfg, &id, version, json).await?;
        }
        Commands::Versions { path } => {
            commands::run_versions(&cfg, &path, json).await?;
        }
        Commands::Diff {
            path,
            version_a,
            version_b,
        } => {
            commands::run_diff(&cfg, &path, version_a, version_b, json).await?;
        }
        Commands::Ask {
            question,
            top_k,
            project,
        } => {
            commands::run_ask(&cfg, &question, top_k, project.as_deref(), json).await?;
        }
        Commands::Retention { action } => match action {
            RetentionAction::Show => commands::run_retention_show(&cfg, json).await?,
            RetentionAction::Set { kind, value } => {
                commands::run_retention_set(&cfg, &kind, value, json).await?
            }
        },
        Commands::Purge { dry_run } => {
            commands::run_purge(&cfg, dry_run, json).await?;
        }
        Commands::Notes {
            project,
            limit,
            offset,
        } => {
            commands::run_notes(&cfg, project.as_deref(), limit, offset, json).await?;
        }
        Commands::Delete { path } => {
            commands::run_delete(&cfg, &path, json).await?;
        }
        Commands::Projects { action } => match action {
            ProjectAction::List => commands::run_projects_list(&cfg, json).await?,
            ProjectAction::Create {
                id,
                name,
                description,
            } => {
                commands::run_projects_create(&cfg, &id, &name, description.as_deref(), json)
                    .await?
            }
            ProjectAction::Delete { id } => commands::run_projects_delete(&cfg, &id, json).await?,
        },
        Commands::Folders { action } => match action {
            FolderAction::List => commands::run_folders_list(&cfg, json).await?,
            FolderAction::Assign { path, project } => {
                commands::run_folders_assign(&cfg, &path, project.as_deref(), json).await?
            }
            FolderAction::Remove { path } => commands::run_folders_remove(&cfg, &path, json).await?,
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
