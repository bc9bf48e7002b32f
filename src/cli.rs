//! Command-line interface for the guardlift driver.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use guardlift::PassKind;
use guardlift_ir::OpName;

#[derive(Parser, Debug)]
#[command(name = "guardlift")]
#[command(about = "Guard elimination and promotion for graph IR", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the lowering passes over a graph and print the result
    Lower {
        /// Path to the textual graph
        file: PathBuf,

        /// Operator the promotion pass may hoist (repeatable; replaces the default set)
        #[arg(long = "promote", value_name = "DIALECT.NAME", value_parser = parse_op_name)]
        promote: Vec<OpName>,

        /// Pass to run (repeatable, in order; default: guard-raise then promote)
        #[arg(long = "pass", value_enum)]
        passes: Vec<PassArg>,

        /// Skip dead code elimination after each pass
        #[arg(long)]
        no_dce: bool,

        /// Verify the graph after each pass
        #[arg(long)]
        verify: bool,

        /// Maximum fixpoint rounds per pass
        #[arg(long, value_name = "N")]
        max_iterations: Option<usize>,

        /// Write the lowered graph here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse and verify a graph without rewriting it
    Verify {
        /// Path to the textual graph
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassArg {
    GuardRaise,
    Promote,
}

impl From<PassArg> for PassKind {
    fn from(arg: PassArg) -> Self {
        match arg {
            PassArg::GuardRaise => PassKind::GuardRaise,
            PassArg::Promote => PassKind::Promote,
        }
    }
}

fn parse_op_name(text: &str) -> Result<OpName, String> {
    OpName::parse(text).ok_or_else(|| format!("expected `dialect.name`, got `{text}`"))
}
