//! tether - Line annotations that follow the code
//!
//! tether is a language server that attaches notes to ranges of lines and
//! keeps them attached while the file is edited, by re-locating a small
//! context patch instead of trusting line numbers. Notes captured on
//! commits that are no longer part of HEAD's history are hidden.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use tether::list::OutputFormat;

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "tether")]
#[command(about = "Line annotations that follow the code", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to run (default: lsp)
    #[command(subcommand)]
    command: Option<Command>,

    /// Project root (default: nearest directory containing .git)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Path to config file (default: .config/tether/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Subcommands
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the language server over stdio
    Lsp,

    /// List the anchors of a file and where they are now
    List {
        /// Source file whose anchors to list
        file: PathBuf,

        /// Recover against the file as of this revision instead of the working copy
        #[arg(long)]
        at: Option<String>,

        /// Output format: text, json
        #[arg(short, long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tether::init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Lsp) {
        Command::Lsp => tether::lsp::run(cli.root, cli.config).await,
        Command::List { file, at, format } => {
            let format = match format.as_deref() {
                None => OutputFormat::default(),
                Some(name) => OutputFormat::from_str(name).ok_or_else(|| {
                    eyre::eyre!("Unknown format '{name}'. Valid formats: text, json")
                })?,
            };
            tether::list::run(cli.root, cli.config, file, at, format).await
        }
    }
}
