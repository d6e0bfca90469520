//! # Papershelf CLI (`shelf`)
//!
//! Finds papers on arXiv, keeps their PDFs in a local downloads folder and
//! indexes their text for search.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the database and the downloads folder |
//! | `shelf arxiv search "<kw>"` | Search arXiv (title match, computer science) |
//! | `shelf arxiv download "<kw>" [--id <id>]...` | Download a result page's PDFs, or only the named ones |
//! | `shelf arxiv add "<kw>" [--id <id>]...` | Download and index a result page, or only the named papers |
//! | `shelf add <pdf>` | Index a local PDF |
//! | `shelf add-folder` | Index every PDF in the downloads folder |
//! | `shelf files list` / `files rm` | Inspect or clean the downloads folder |
//! | `shelf list` | List indexed documents |
//! | `shelf search "<query>"` | Semantic (or keyword) search over indexed text |
//! | `shelf get <id>` / `delete <id>` | Show or remove one document |
//! | `shelf stats` | Summary of the library |
//! | `shelf embed pending` | Backfill missing embeddings |
//!
//! Logs go to stderr (`-v`, `-vv` or `RUST_LOG` raise the level) so stdout
//! stays parseable.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use papershelf::arxiv::{SearchQuery, SortBy, SortOrder};
use papershelf::collection::SqliteCollection;
use papershelf::config::{self, Config};
use papershelf::ingest::CancelFlag;
use papershelf::progress::ProgressMode;
use papershelf::{arxiv_cmd, embed_cmd, get, ingest, library, search, stats};

const DEFAULT_CONFIG: &str = "./config/shelf.toml";

/// Papershelf: a local-first library for academic PDFs.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Papershelf: fetch papers from arXiv, index their text, search it locally",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the default file does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Progress output for bulk commands: off, human, or json.
    ///
    /// Defaults to human when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and the downloads folder. Idempotent.
    Init,

    /// Search and fetch papers from arXiv.
    Arxiv {
        #[command(subcommand)]
        action: ArxivAction,
    },

    /// Index a local PDF.
    Add {
        path: PathBuf,

        /// Title to store instead of the extracted one.
        #[arg(long)]
        title: Option<String>,

        /// Authors to store instead of the extracted ones.
        #[arg(long)]
        authors: Option<String>,
    },

    /// Index every PDF in the downloads folder.
    AddFolder,

    /// Inspect the downloads folder.
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    /// List indexed documents.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Search indexed text: semantic with embeddings, keyword without.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show one document by id.
    Get { id: String },

    /// Delete one document and all of its chunks.
    Delete { id: String },

    /// Show a summary of the library.
    Stats,

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Subcommand)]
enum ArxivAction {
    /// Print one page of results.
    Search(ArxivQueryArgs),
    /// Download the PDFs of one page of results.
    Download(ArxivSelectArgs),
    /// Download and index the papers of one page of results.
    Add(ArxivSelectArgs),
}

#[derive(clap::Args)]
struct ArxivSelectArgs {
    #[command(flatten)]
    query: ArxivQueryArgs,

    /// Only act on this paper (repeatable; the version suffix is optional).
    #[arg(long = "id", value_name = "ARXIV_ID")]
    ids: Vec<String>,
}

#[derive(clap::Args)]
struct ArxivQueryArgs {
    /// Title keyword(s).
    keyword: String,

    /// Drop papers published before this year.
    #[arg(long, default_value_t = 2020)]
    start_year: i32,

    /// relevance, submitted, or updated.
    #[arg(long, default_value = "submitted")]
    sort_by: SortBy,

    /// asc or desc.
    #[arg(long, default_value = "desc")]
    sort_order: SortOrder,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(long, default_value_t = 20)]
    per_page: usize,
}

impl ArxivQueryArgs {
    fn to_query(&self) -> SearchQuery {
        SearchQuery {
            keyword: self.keyword.clone(),
            start_year: self.start_year,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            offset: self.offset,
            per_page: self.per_page,
        }
    }
}

#[derive(Subcommand)]
enum FilesAction {
    /// List PDFs in the downloads folder, newest first.
    List,
    /// Delete a PDF from the downloads folder.
    Rm { name: String },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed records that have no vector for the configured model.
    Pending {
        #[arg(long)]
        limit: Option<usize>,
        /// Only count pending records.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        info!("no config at {}, using defaults", path.display());
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

/// Cancel flag that flips on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, stopping after the current item");
            flag.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Init => {
            let collection = SqliteCollection::from_config(&cfg).await?;
            collection.close().await;
            std::fs::create_dir_all(&cfg.downloads.dir)?;
            println!("Database initialized successfully.");
            println!("  database:  {}", cfg.db.path.display());
            println!("  downloads: {}", cfg.downloads.dir.display());
        }
        Commands::Arxiv { action } => match action {
            ArxivAction::Search(args) => {
                arxiv_cmd::run_arxiv_search(&cfg, &args.to_query()).await?;
            }
            ArxivAction::Download(args) => {
                arxiv_cmd::run_arxiv_download(
                    &cfg,
                    &args.query.to_query(),
                    &args.ids,
                    progress.as_ref(),
                    cancel_on_ctrl_c(),
                )
                .await?;
            }
            ArxivAction::Add(args) => {
                arxiv_cmd::run_arxiv_add(
                    &cfg,
                    &args.query.to_query(),
                    &args.ids,
                    progress.as_ref(),
                    cancel_on_ctrl_c(),
                )
                .await?;
            }
        },
        Commands::Add {
            path,
            title,
            authors,
        } => {
            ingest::run_add(&cfg, &path, title, authors).await?;
        }
        Commands::AddFolder => {
            ingest::run_add_folder(&cfg, progress.as_ref(), cancel_on_ctrl_c()).await?;
        }
        Commands::Files { action } => match action {
            FilesAction::List => library::run_files_list(&cfg)?,
            FilesAction::Rm { name } => library::run_files_rm(&cfg, &name)?,
        },
        Commands::List { limit, offset } => {
            get::run_list(&cfg, limit, offset).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                embed_cmd::run_embed_pending(&cfg, limit, dry_run).await?;
            }
        },
    }

    Ok(())
}
