//! chatexport - incremental export of a chat account into SQLite
//!
//! Re-running `export` against the same database only fetches what is
//! missing: older history that was never reached, and anything new.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chat::{HttpSource, RemoteConfig, SessionCookies, SqliteChatStore, SyncOptions};
use clap::{Parser, Subcommand};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chatexport", version, about = "Export chat history to SQLite")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every thread, resuming from what the database already holds
    Export {
        /// Session cookies as a JSON object, or @path to a file holding one
        #[arg(long)]
        cookies: String,

        /// SQLite database to write to; created if missing
        #[arg(long)]
        db: PathBuf,

        /// API base URL (defaults to remote.json in the config directory)
        #[arg(long)]
        endpoint: Option<String>,

        /// Sync options file (defaults to sync.json in the config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print one line per exported conversation
    Summary {
        /// SQLite database to read
        #[arg(long)]
        db: PathBuf,

        /// Print the summaries as JSON instead
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let result = match cli.command {
        Command::Export {
            cookies,
            db,
            endpoint,
            config,
        } => export(&cookies, &db, endpoint.as_deref(), config.as_deref()),
        Command::Summary { db, json } => summary(&db, json).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run a full export. `Ok(false)` means the run finished with recorded errors.
fn export(
    cookies: &str,
    db: &std::path::Path,
    endpoint: Option<&str>,
    options_path: Option<&std::path::Path>,
) -> Result<bool> {
    let cookies = SessionCookies::from_arg(cookies)?;
    let remote = RemoteConfig::load(endpoint)?;
    let options = SyncOptions::load(options_path)?;

    info!(
        "Exporting to {} from {} ({} cookies, page size {})",
        db.display(),
        remote.base_url,
        cookies.len(),
        options.page_size
    );

    let source = HttpSource::new(&remote.base_url, &cookies)?;
    let store = SqliteChatStore::new(db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;

    let report = chat::sync_account(&source, &store, &options);
    let stats = &report.stats;
    info!(
        "Threads: {} synced, {} failed, {} filtered. Messages: {} first sync, {} backfilled, {} new",
        stats.threads_synced,
        stats.threads_failed,
        stats.threads_filtered,
        stats.messages_first_sync,
        stats.messages_backfilled,
        stats.messages_forward_filled
    );

    Ok(report.is_success())
}

fn summary(db: &std::path::Path, json: bool) -> Result<()> {
    let store = SqliteChatStore::open_read_only(db)
        .with_context(|| format!("Failed to open export {}", db.display()))?;
    let threads = chat::list_threads(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }

    for thread in &threads {
        println!(
            "Conversation with {}: {} messages",
            thread.display_name, thread.stored_messages
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_summary_of_missing_database_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("typo.db");

        assert!(summary(&db, false).is_err());
        assert!(!db.exists());
    }

    #[test]
    fn test_parse_export() {
        let cli = Cli::parse_from([
            "chatexport",
            "export",
            "--cookies",
            "@cookies.json",
            "--db",
            "out.db",
            "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Export {
                cookies,
                db,
                endpoint,
                config,
            } => {
                assert_eq!(cookies, "@cookies.json");
                assert_eq!(db, PathBuf::from("out.db"));
                assert!(endpoint.is_none());
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
