//! # campus-index CLI (`cidx`)
//!
//! Front end for the campus-index engine: create the storage root, ingest
//! uploads into a scope, run federated searches, delete documents and browse
//! the catalogs.
//!
//! ## Usage
//!
//! ```bash
//! cidx --config ./config/cidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cidx init` | Create the storage root and global catalog directory |
//! | `cidx ingest <file>` | Index an upload into a department, subject or event scope |
//! | `cidx search "<query>"` | Ranked passages across the partitions a scope reaches |
//! | `cidx delete <id>` | Remove a document and tombstone it in the catalogs |
//! | `cidx list documents\|subjects\|events` | Browse the catalogs |
//! | `cidx catalog compact` | Rewrite every catalog log with live records only |
//!
//! Logging goes to stderr and is controlled by `CIDX_LOG` (an `EnvFilter`
//! directive) or `-v`/`-q`.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use campus_index::config::load_config;
use campus_index::{Engine, IngestRequest, PartitionKind, Scope, SearchMode, Uploader};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// campus-index: document indexing and federated retrieval for a college
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cidx.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "cidx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cidx.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage root and the global catalog directory.
    ///
    /// Idempotent; running it on an existing root changes nothing.
    Init,

    /// Index one file (.pdf, .doc, .docx or .txt).
    Ingest {
        file: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Display title. Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,

        /// Event category for event scopes.
        #[arg(long)]
        event_type: Option<String>,

        #[arg(long, default_value = "cli")]
        user_id: String,

        #[arg(long, default_value = "admin")]
        role: String,
    },

    /// Search indexed documents.
    Search {
        query: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Fan-out for department scopes: `all`, `general`, `department` or `subject`.
        #[arg(long, default_value = "all")]
        mode: String,

        /// Maximum number of results. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a document by id.
    Delete {
        id: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Browse the catalogs.
    List {
        #[command(subcommand)]
        what: ListAction,
    },

    /// Catalog maintenance.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// Documents in one scope, or every department and subject document.
    Documents {
        #[command(flatten)]
        scope: ScopeArgs,

        /// List every department and subject document instead.
        #[arg(long)]
        all: bool,
    },
    /// Subjects of a department with their document counts.
    Subjects {
        #[arg(long)]
        department: String,
    },
    /// Events grouped by event type.
    Events {
        /// Only this department's events.
        #[arg(long)]
        department: Option<String>,

        /// College-wide events instead of department events.
        #[arg(long, conflicts_with = "department")]
        college: bool,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Rewrite every catalog log with live records only.
    Compact,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Department,
    Subject,
    CollegeEvent,
    DepartmentEvent,
}

#[derive(Args)]
struct ScopeArgs {
    /// Partition kind the scope addresses.
    #[arg(long, value_enum, default_value = "department")]
    kind: KindArg,

    #[arg(long)]
    department: Option<String>,

    #[arg(long)]
    subject: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Result<Scope> {
        let department = || {
            self.department
                .clone()
                .ok_or_else(|| anyhow!("--department is required for this scope"))
        };
        Ok(match self.kind {
            KindArg::Department => Scope::department(department()?),
            KindArg::Subject => {
                let subject = self
                    .subject
                    .clone()
                    .ok_or_else(|| anyhow!("--subject is required for subject scopes"))?;
                Scope::subject(department()?, subject)
            }
            KindArg::CollegeEvent => Scope::CollegeEvent,
            KindArg::DepartmentEvent => Scope::department_event(department()?),
        })
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("CIDX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = load_config(&cli.config)?;
    let engine = Engine::from_config(cfg)?;

    match cli.command {
        Commands::Init => {
            engine.init()?;
            println!(
                "Initialized storage at {}",
                engine.config().storage.root.display()
            );
        }
        Commands::Ingest {
            file,
            scope,
            title,
            event_type,
            user_id,
            role,
        } => {
            let mut request = IngestRequest::new(file, scope.scope()?, Uploader::new(user_id, role));
            if let Some(title) = title {
                request = request.with_title(title);
            }
            if let Some(event_type) = event_type {
                request = request.with_event_type(event_type);
            }
            let record = engine.ingest(request).await?;
            println!(
                "Ingested \"{}\" as {} ({} passages) into {}",
                record.title, record.document_id, record.chunk_count, record.partition
            );
        }
        Commands::Search {
            query,
            scope,
            mode,
            top_k,
            json,
        } => {
            let mode: SearchMode = mode.parse().map_err(|e: String| anyhow!(e))?;
            let top_k = top_k.unwrap_or(engine.config().retrieval.top_k);
            let results = engine.query(&query, &scope.scope()?, mode, top_k).await?;
            print_results(&results, json)?;
        }
        Commands::Delete { id, scope } => {
            let scope = scope.scope()?;
            if engine.delete(&id, &scope).await? {
                println!("Deleted {}", id);
            } else {
                println!("No document {} found.", id);
            }
        }
        Commands::List { what } => match what {
            ListAction::Documents { scope, all } => {
                let records = if all {
                    engine.list_all_documents()?
                } else {
                    engine.list_documents(&scope.scope()?)?
                };
                if records.is_empty() {
                    println!("No documents.");
                }
                for r in records {
                    println!(
                        "{}  {}  {}  [{}]  {}",
                        r.document_id,
                        r.uploaded_at.format("%Y-%m-%d %H:%M"),
                        r.partition,
                        r.file_type,
                        r.title
                    );
                }
            }
            ListAction::Subjects { department } => {
                let subjects = engine.list_subjects(&department)?;
                if subjects.is_empty() {
                    println!("No subjects.");
                }
                for s in subjects {
                    println!("{} ({} documents)", s.subject, s.document_count);
                }
            }
            ListAction::Events {
                department,
                college,
            } => {
                let kind = if college {
                    PartitionKind::CollegeEvent
                } else {
                    PartitionKind::DepartmentEvent
                };
                let grouped = engine.list_events(kind, department.as_deref())?;
                if grouped.is_empty() {
                    println!("No events.");
                }
                for (event_type, records) in grouped {
                    println!("{}:", event_type);
                    for r in records {
                        println!(
                            "  {}  {}  {}",
                            r.document_id,
                            r.uploaded_at.format("%Y-%m-%d"),
                            r.title
                        );
                    }
                }
            }
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Compact => {
                let catalogs = engine.catalogs().all()?;
                if catalogs.is_empty() {
                    bail!("no catalogs under {}", engine.config().storage.root.display());
                }
                for catalog in catalogs {
                    let live = catalog.compact()?;
                    println!("{}: {} live records", catalog.path().display(), live);
                }
            }
        },
    }

    Ok(())
}

fn print_results(results: &[campus_index::ScoredPassage], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        let location = match (&r.department, &r.subject) {
            (Some(dept), Some(subject)) => format!("{}/{}", dept, subject),
            (Some(dept), None) => dept.clone(),
            _ => r.storage_type.to_string(),
        };
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            r.score.value(),
            location,
            r.title
        );
        println!("    {}", snippet(&r.text, 200));
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
