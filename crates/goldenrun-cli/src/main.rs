//! goldenrun query CLI.
//!
//! Provides the `goldenrun` binary for reading back call records captured
//! into a SQLite database by a trace session.

use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser, Subcommand};

use goldenrun_storage::traits::RecordStore;
use goldenrun_storage::{RecordRow, SqliteStore, DEFAULT_QUERY_LIMIT};
use goldenrun_trace::config::{DB_PATH_VAR, DEFAULT_DB_PATH};

/// Inspect captured call records.
#[derive(Parser)]
#[command(name = "goldenrun", about = "Inspect captured call records")]
struct Cli {
    /// Path to the record database.
    #[arg(long, env = DB_PATH_VAR, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List modules with stored records, most recently recorded first.
    Modules,

    /// Print the records of a function as JSON lines, newest first.
    Records {
        /// Qualified name, e.g. `Client.fetch`. With `--module`, a prefix.
        qualname: String,

        /// Restrict to one module.
        #[arg(long)]
        module: Option<String>,

        /// Maximum number of records.
        #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
        limit: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Some(Commands::Modules) => run_modules(&cli.db),
        Some(Commands::Records {
            qualname,
            module,
            limit,
        }) => run_records(&cli.db, &qualname, module.as_deref(), limit),
        None => {
            let help = Cli::command().render_help();
            eprintln!("{}", help);
            1
        }
    };
    process::exit(exit_code);
}

fn open(db_path: &Path) -> Option<SqliteStore> {
    tracing::debug!(db = %db_path.display(), "opening record database");
    match SqliteStore::new(db_path) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db_path.display(), e);
            None
        }
    }
}

/// Execute the modules subcommand.
fn run_modules(db_path: &Path) -> i32 {
    let Some(store) = open(db_path) else {
        return 1;
    };
    match store.list_modules() {
        Ok(modules) => {
            for module in modules {
                println!("{}", module);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: failed to list modules: {}", e);
            1
        }
    }
}

/// Execute the records subcommand.
///
/// Rows that fail to decode are reported and skipped; they do not change
/// the exit code.
fn run_records(db_path: &Path, qualname: &str, module: Option<&str>, limit: usize) -> i32 {
    let Some(store) = open(db_path) else {
        return 1;
    };
    let rows = match module {
        Some(module) => store.filter(module, Some(qualname), limit),
        None => store.get_records(qualname, limit),
    };
    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error: failed to query records: {}", e);
            return 1;
        }
    };

    for row in &rows {
        if let Some(line) = render(row) {
            println!("{}", line);
        }
    }
    0
}

fn render(row: &RecordRow) -> Option<String> {
    let record = match row.to_record() {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Skipping record {}: {}", row.id, e);
            return None;
        }
    };
    match serde_json::to_string(&record) {
        Ok(line) => Some(line),
        Err(e) => {
            eprintln!("Skipping record {}: {}", row.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn records_defaults() {
        let cli = Cli::try_parse_from(["goldenrun", "--db", "x.db", "records", "fetch"]).unwrap();
        assert_eq!(cli.db, PathBuf::from("x.db"));
        match cli.command {
            Some(Commands::Records {
                qualname,
                module,
                limit,
            }) => {
                assert_eq!(qualname, "fetch");
                assert_eq!(module, None);
                assert_eq!(limit, DEFAULT_QUERY_LIMIT);
            }
            _ => panic!("expected records command"),
        }
    }

    #[test]
    fn no_command_parses() {
        let cli = Cli::try_parse_from(["goldenrun"]).unwrap();
        assert!(cli.command.is_none());
    }
}
