use std::io::{self, Write};
use std::path::PathBuf;

use bankersbox::config::{self, parse_db_index, Backend, Config};
use bankersbox::shell;
use clap::Parser;

/// Run BankersBox commands against a snapshot file or an in-memory store.
///
/// With a command, runs it and prints the reply. Without one, reads commands
/// from stdin, one per line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot file to load and write through to
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Database index to start in
    #[arg(short, long)]
    db: Option<String>,

    /// Number of databases
    #[arg(long)]
    databases: Option<u32>,

    /// Keep everything in memory even if BANKERSBOX_FILE is set
    #[arg(long, conflicts_with = "file")]
    memory: bool,

    /// Command and arguments, e.g. `lpush queue job-1`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(file) = cli.file {
        config.backend = Backend::File(file);
    }
    if cli.memory {
        config.backend = Backend::Memory;
    }
    if let Some(db) = cli.db {
        config.db = parse_db_index(&db)?;
    }
    if let Some(databases) = cli.databases {
        config.databases = databases;
    }

    let mut store = config::open(&config)?;

    if cli.command.is_empty() {
        let stdin = io::stdin();
        let stdout = io::stdout();
        shell::run(stdin.lock(), stdout.lock(), &mut store)?;
        return Ok(());
    }

    let parts: Vec<&str> = cli.command.iter().map(String::as_str).collect();
    let reply = shell::dispatch(&mut store, &parts)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", reply.render())?;

    Ok(())
}
