//! sql-mojo CLI
//!
//! Interactive SQL shell over Elasticsearch clusters, local directories and
//! SQLite files.
//!
//! # Usage
//!
//! ```bash
//! sql-mojo http://localhost:9200
//! sql-mojo --type fs ~/Downloads
//! sql-mojo data.db
//! ```

#![deny(unsafe_code)]

mod output;

use anyhow::Context;
use clap::Parser;
use shared::backends::{infer_type_hint, Backend, Registry};
use shared::config::Settings;
use shared::query::parse_statement;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

const PROMPT: &str = "eSQL> ";

/// sql-mojo - query search engines, directories and SQLite files with SQL
#[derive(Parser, Debug)]
#[command(name = "sql-mojo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend type (sqlite, fs, elastic, dummy); detected from the URL when omitted
    #[arg(short = 't', long = "type", env = "SQLMOJO_TYPE")]
    backend_type: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SQLMOJO_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Data source: cluster URL, directory or database file
    #[arg(env = "SQLMOJO_URL")]
    url: String,
}

impl Cli {
    /// The explicit type hint, or one inferred from the URL shape.
    fn type_hint(&self) -> Option<&str> {
        self.backend_type
            .as_deref()
            .or_else(|| infer_type_hint(&self.url))
    }

    fn settings(&self) -> anyhow::Result<Settings> {
        let settings = Settings::from_env()?;
        Ok(match self.timeout {
            Some(secs) => settings.with_request_timeout(Duration::from_secs(secs)),
            None => settings,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    let registry = Registry::builtin();

    let backend = match registry.load(cli.type_hint(), &cli.url, &settings).await {
        Ok(backend) => backend,
        Err(e) => anyhow::bail!("{e}\nAvailable backends: {}", registry.names().join(", ")),
    };

    println!("{}", status_line(backend.as_ref(), &cli.url).await);

    run_shell(backend.as_ref()).await
}

/// Describes the connected backend and the tables it offers.
async fn status_line(backend: &dyn Backend, url: &str) -> String {
    let mut line = format!("{}: {url}", backend.name());
    match backend.list_tables().await {
        Ok(tables) if tables.is_empty() => {}
        Ok(tables) => {
            line.push_str("\nTables: ");
            line.push_str(&tables.join(", "));
        }
        Err(e) => warn!(error = %e, "Failed to list tables"),
    }
    line
}

/// Reads statements from stdin until EOF and prints their results.
async fn run_shell(backend: &dyn Backend) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{PROMPT}");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            println!();
            return Ok(());
        };

        if let Some(rendered) = run_line(backend, &line).await {
            println!("{rendered}");
        }
    }
}

/// Runs one input line. Returns `None` for blank input.
async fn run_line(backend: &dyn Backend, line: &str) -> Option<String> {
    let text = line.trim().trim_end_matches(';').trim();
    if text.is_empty() {
        return None;
    }

    let statement = match parse_statement(text) {
        Ok(statement) => statement,
        Err(e) => return Some(format!("Error: {e}")),
    };
    debug!(%statement, "Parsed statement");

    Some(match backend.execute(&statement).await {
        Ok(outcome) => output::render_outcome(&outcome),
        Err(e) => format!("Error: {e}"),
    })
}
