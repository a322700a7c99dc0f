//! CLI argument definitions for Boardwalk.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Boardwalk - render swimlane diagrams onto collaboration boards.
///
/// `bwk generate` renders a chart plan into a dedicated frame, `bwk validate`
/// reads it back and checks the layout, `bwk cleanup` tears the run down.
#[derive(Parser, Debug)]
#[command(name = "bwk")]
#[command(author, version, about = "A CLI tool for rendering swimlane diagrams onto collaboration boards", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a chart plan onto the board
    ///
    /// Creates a frame sized to the plan, fills it with the lane grid, flow
    /// nodes and connectors, and writes a ledger of everything created.
    /// Requires BWK_TOKEN and BWK_BOARD_ID in the environment.
    Generate {
        /// Path to the chart plan JSON
        plan: PathBuf,

        /// Run identifier (random UUID when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Directory run ledgers are written under
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Read a run back from the board and check it for layout defects
    ///
    /// Writes validation_report.json next to the ledger. Pass --plan to get
    /// ready-to-apply patches in the findings.
    Validate {
        /// Path to the run ledger (JSONL)
        ledger: PathBuf,

        /// Chart plan the run was generated from
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Delete everything a run created (connectors first, frame last)
    Cleanup {
        /// Path to the run ledger (JSONL)
        ledger: PathBuf,

        /// Skip the live item count verification
        #[arg(long)]
        force: bool,
    },

    /// Offline plan operations (no board access)
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

/// Plan subcommands
#[derive(Subcommand, Debug)]
pub enum PlanCommands {
    /// Validate a chart plan against the document rules
    Check {
        /// Path to the chart plan JSON
        plan: PathBuf,
    },

    /// Apply a patch file to a chart plan
    ///
    /// The patch is a JSON array of {op, path, value} operations. The whole
    /// patch is rejected if the result would violate the document rules.
    Patch {
        /// Path to the chart plan JSON
        plan: PathBuf,

        /// Patch file to apply
        #[arg(long)]
        patch: PathBuf,

        /// Rewrite the plan file in place
        #[arg(long, conflicts_with = "out")]
        in_place: bool,

        /// Write the patched plan here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
