//! Command-line interface for versus.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use versus_tictactoe::Mark;

/// Versus - two-player tic-tac-toe over a shared match record
#[derive(Parser, Debug)]
#[command(name = "versus")]
#[command(about = "Play tic-tac-toe against a remote opponent", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (optional)
    #[arg(short, long, global = true, default_value = "versus.toml")]
    pub config: PathBuf,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a match and take the X slot
    Create {
        /// Display name; falls back to `player_name` in the config
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Take the O slot of an existing match
    Join {
        /// Match to join
        match_id: String,

        /// Display name; falls back to `player_name` in the config
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print a match
    Show {
        /// Match to print
        match_id: String,
    },

    /// Place a mark
    Move {
        /// Match to play in
        match_id: String,

        /// Cell index, 0-8, row-major from the top left
        index: usize,

        /// Mark to place (X or O)
        #[arg(short, long)]
        mark: Mark,
    },

    /// Clear the board, keeping scores
    ResetBoard {
        /// Match to reset
        match_id: String,
    },

    /// Clear the board and scores, back to waiting
    ResetScores {
        /// Match to reset
        match_id: String,
    },

    /// Play a scripted game between two in-process clients
    Demo,
}
