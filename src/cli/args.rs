//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::AddressFamily;

/// Generate RouterOS routes for address space outside China
#[derive(Parser, Debug)]
#[command(name = "noncn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output: -d info, -dd debug, -ddd trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Project directory: local config and relative paths (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the RouterOS route script
    Generate {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        route: RouteArgs,

        /// Script destination, "-" for stdout (default: noncn.rsc)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Show the prefix forest after all exclusions
    Tree {
        #[command(flatten)]
        sources: SourceArgs,

        /// Only this address family
        #[arg(short, long, value_enum)]
        family: Option<FamilyArg>,
    },

    /// List active blocks, one CIDR per line
    Leaves {
        #[command(flatten)]
        sources: SourceArgs,

        /// Only this address family
        #[arg(short, long, value_enum)]
        family: Option<FamilyArg>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Input selection shared by all forest-building commands.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Extra ranges to exclude (CIDR, IPv4 or IPv6)
    #[arg(long, value_name = "CIDR", num_args = 1..)]
    pub exclude: Vec<String>,

    /// China address lists to subtract, replacing the configured ones
    #[arg(long = "chn-list", alias = "chn_list", value_name = "FILE", num_args = 1.., value_hint = ValueHint::FilePath)]
    pub chn_list: Option<Vec<PathBuf>>,

    /// IANA IPv4 address-space registry (CSV)
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub registry: Option<PathBuf>,

    /// RIR delegation feed
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub delegation: Option<PathBuf>,

    /// Exclusions broader than existing blocks mark those blocks dead instead of being ignored
    #[arg(long)]
    pub cascade_supersets: bool,
}

/// Route attributes of the emitted script.
#[derive(Args, Debug, Default)]
pub struct RouteArgs {
    /// Next hop for non-China routes, usually the tunnel interface
    #[arg(long = "next", value_name = "INTERFACE OR IP")]
    pub next: Option<String>,

    /// Next hop for IPv6 routes (default: --next)
    #[arg(long = "next6", value_name = "INTERFACE OR IP")]
    pub next6: Option<String>,

    /// Routing table name
    #[arg(long)]
    pub table: Option<String>,

    /// Administrative distance
    #[arg(long)]
    pub distance: Option<u8>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show config paths
    Path,
}

/// Address family selector.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyArg {
    V4,
    V6,
}

impl From<FamilyArg> for AddressFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::V4 => AddressFamily::V4,
            FamilyArg::V6 => AddressFamily::V6,
        }
    }
}

/// Families selected by an optional `--family` flag.
pub fn selected_families(family: Option<FamilyArg>) -> Vec<AddressFamily> {
    match family {
        Some(f) => vec![f.into()],
        None => AddressFamily::ALL.to_vec(),
    }
}
