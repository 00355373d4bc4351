//! RepoDB - a file-based record store backed by Git
//!
//! This is the main entry point for the RepoDB command-line interface.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repodb::db::{CommitOptions, Database, DatabaseConfig, RepoInfo, Repository};
use repodb::storage::{FileRecord, StorageError, StorageResult};

/// RepoDB - every change to a record is a Git commit
#[derive(Debug, Parser)]
#[command(name = "repodb", version, about)]
struct Cli {
    /// Database root directory
    #[arg(short, long, env = "REPODB_ROOT", default_value = ".repodb")]
    root: PathBuf,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List repositories
    List,
    /// Create a repository
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Remove a repository and its history
    Remove { name: String },
    /// Protect a repository from removal
    Protect { name: String },
    /// Allow a protected repository to be removed
    Unprotect { name: String },
    /// Write a file and its metadata
    Put {
        repo: String,
        file: String,
        /// Read content from this path instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Print a file to stdout
    Get { repo: String, file: String },
    /// Remove a file and its metadata
    Rm {
        repo: String,
        file: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Show the commit history of a repository
    Log {
        repo: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let db = Database::open_with_config(DatabaseConfig::new(&cli.root));
    match run(&db, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "repodb=debug",
        _ => "repodb=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(db: &Database, command: Command) -> StorageResult<()> {
    match command {
        Command::List => {
            for repo in db.list_repos() {
                let info = repo.info();
                let flag = if info.protected { " [protected]" } else { "" };
                println!("{}{}\t{}", info.name, flag, info.description);
            }
        }
        Command::Create { name, description } => {
            let repo = db.create_repo(RepoInfo::new(name).description(description))?;
            println!("created {}", repo.dir().display());
        }
        Command::Remove { name } => {
            db.remove_repo(&name)?;
            println!("removed {}", name);
        }
        Command::Protect { name } => db.open_repo(&name)?.protect()?,
        Command::Unprotect { name } => db.open_repo(&name)?.unprotect()?,
        Command::Put {
            repo,
            file,
            from,
            message,
        } => {
            let repo = db.open_repo(&repo)?;
            let record = existing_record(&repo, &file)?;
            let opts = CommitOptions::new(message);

            match from {
                Some(path) => {
                    let content = File::open(&path).map_err(|source| StorageError::Io {
                        op: "open input",
                        path,
                        source,
                    })?;
                    repo.write_file(&record, content, opts.clone())?;
                }
                None => repo.write_file(&record, io::stdin().lock(), opts.clone())?,
            }
            repo.write_meta(&record, opts)?;
        }
        Command::Get { repo, file } => {
            let repo = db.open_repo(&repo)?;
            repo.read_file(&FileRecord::new(file), io::stdout().lock())?;
        }
        Command::Rm {
            repo,
            file,
            message,
        } => {
            let repo = db.open_repo(&repo)?;
            let record = FileRecord::new(file);
            let opts = CommitOptions::new(message);

            repo.remove_file(&record, opts.clone())?;
            match repo.remove_meta(&record, opts) {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }
        Command::Log { repo, limit } => {
            let repo = db.open_repo(&repo)?;
            for commit in repo.history(limit)? {
                println!(
                    "{} {} {}",
                    commit.id.short(),
                    commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    commit.summary()
                );
            }
        }
    }
    Ok(())
}

/// Load the stored metadata for `file`, or start a new record.
fn existing_record(repo: &Repository, file: &str) -> StorageResult<FileRecord> {
    let mut record = FileRecord::new(file);
    match repo.load_meta(&mut record) {
        Ok(()) => {
            record.touch();
            Ok(record)
        }
        Err(e) if e.is_not_found() => Ok(FileRecord::new(file)),
        Err(e) => Err(e),
    }
}
