//! Clap derive structures for the `patchbay` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// patchbay -- watch and drive a signal-routing network
#[derive(Debug, Parser)]
#[command(
    name = "patchbay",
    version,
    about = "Watch and drive a signal-routing network from the command line",
    long_about = "Watch and drive a signal-routing network.\n\n\
        Mirrors devices, signals, links and connections into a local cache\n\
        and reports every change as it happens.\n\n\
        `watch` runs a scenario file against an in-process network.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "PATCHBAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to the config file's choice, then table)
    #[arg(long, short = 'o', env = "PATCHBAY_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario against an in-process network and report cache changes
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Decode, encode and list subscription masks
    #[command(alias = "f")]
    Flags(FlagsArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Scenario file (TOML) describing devices and the steps to run
    pub scenario: PathBuf,

    /// Default scope for discovered devices, e.g. "all" or "device|signals"
    #[arg(long, short = 'a')]
    pub autosubscribe: Option<String>,

    /// Quiet window that ends each settle phase, e.g. "50ms"
    #[arg(long)]
    pub settle: Option<String>,

    /// Skip the final cache summary
    #[arg(long)]
    pub no_summary: bool,
}

// ── Flags ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FlagsArgs {
    #[command(subcommand)]
    pub command: FlagsCommand,
}

#[derive(Debug, Subcommand)]
pub enum FlagsCommand {
    /// List every named mask and its value
    #[command(alias = "ls")]
    List,

    /// Show which flags a mask contains
    Decode {
        /// Mask as decimal or 0x hex, e.g. 0x1F
        mask: String,
    },

    /// Combine flag names into a mask
    Encode {
        /// Flag names, e.g. device inputs links_out
        #[arg(required = true)]
        names: Vec<String>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the effective configuration
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
