//! kumiki command-line tools.
//!
//! ## Usage
//!
//! ```bash
//! # Load a workspace file and print what it saves back to
//! kumiki roundtrip program.json
//!
//! # Validate a workspace file
//! kumiki check program.json
//!
//! # List the known block types
//! kumiki blocks
//!
//! # Add a block tree to a workspace file
//! kumiki append program.json --block '{"type": "text_print"}' --out program.json
//!
//! # Save one block tree, anonymized and without its stack
//! kumiki save-block program.json if1 --no-ids --no-next
//! ```
//!
//! Workspace files hold the JSON produced by whole-workspace save. Logging goes
//! to stderr (`RUST_LOG` overrides the default `info` level).

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kumiki_core::SaveOptions;

use crate::config::Config;

/// Inspect and rewrite block workspace files.
#[derive(Parser, Debug)]
#[command(name = "kumiki")]
#[command(about = "Load, validate, and rewrite block workspace files")]
struct Args {
    /// Config file (default: ~/.config/kumiki/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a workspace file and print the state it saves back to
    Roundtrip { file: PathBuf },

    /// Load a workspace file and report what it contains
    Check { file: PathBuf },

    /// List registered block types
    Blocks,

    /// Append a block tree to a workspace file
    Append {
        file: PathBuf,

        /// Block state as JSON
        #[arg(long)]
        block: String,

        /// Write the result here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Save a single block tree from a workspace file
    SaveBlock {
        file: PathBuf,

        /// Id of the block to save
        id: String,

        /// Include x/y coordinates
        #[arg(long)]
        coordinates: bool,

        /// Leave out input children
        #[arg(long)]
        no_inputs: bool,

        /// Leave out the next block
        #[arg(long)]
        no_next: bool,

        /// Leave out block ids
        #[arg(long)]
        no_ids: bool,

        /// Save variable references by id only
        #[arg(long)]
        shallow: bool,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let output = match args.command {
        Command::Roundtrip { file } => Some(commands::roundtrip(&config, &file)?),
        Command::Check { file } => Some(commands::check(&config, &file)?),
        Command::Blocks => Some(commands::blocks(&config)?),
        Command::Append { file, block, out } => commands::append(&config, &file, &block, out.as_deref())?,
        Command::SaveBlock {
            file,
            id,
            coordinates,
            no_inputs,
            no_next,
            no_ids,
            shallow,
        } => {
            let options = SaveOptions {
                add_coordinates: coordinates,
                add_input_blocks: !no_inputs,
                add_next_blocks: !no_next,
                do_full_serialization: !shallow,
                save_ids: !no_ids,
            };
            commands::save_block(&config, &file, &id, &options)?
        }
    };
    if let Some(text) = output {
        println!("{text}");
    }
    Ok(())
}
