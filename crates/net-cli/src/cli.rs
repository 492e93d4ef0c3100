//! Command line definition

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "netctl")]
#[command(about = "Clustered network lifecycle management")]
#[command(version)]
#[command(long_about = "
Clustered network lifecycle management

Declares, realises and tears down networks on this cluster member, keeping
the host state consistent with the shared cluster records.

Examples:
  netctl define uplink --type physical --set parent=eth0      # Declare only
  netctl create uplink --type physical --set parent=eth0      # Declare and start
  netctl update uplink --set vlan=10 --set mtu=9000           # Change config
  netctl update uplink --unset mtu                            # Remove a key
  netctl list --format json                                   # All networks
  netctl --dry-run create br0 --type bridge                   # Try without changes
  netctl startup                                              # Start every network
")]
pub struct Cli {
    /// Settings file (TOML); CLUSTERNET_* variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project of the network
    #[arg(short, long, global = true, default_value = "default")]
    pub project: String,

    /// Run against an in-memory copy of the cluster state and host
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Name, type and initial config of a network
#[derive(clap::Args, Debug, Clone)]
pub struct NetworkSpec {
    /// Network name
    pub name: String,

    /// Network type (physical, bridge, macvlan, overlay)
    #[arg(short = 't', long = "type")]
    pub network_type: String,

    /// Config key to set, as KEY=VALUE
    #[arg(short, long = "set", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Declare a network without realising it
    Define(NetworkSpec),

    /// Declare (if needed), validate and start a network on this member
    Create(NetworkSpec),

    /// Start a created network
    Start { name: String },

    /// Stop a network
    Stop { name: String },

    /// Change the config or description of a network
    Update {
        name: String,

        /// Config key to set, as KEY=VALUE
        #[arg(short, long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,

        /// Config key to remove
        #[arg(short, long)]
        unset: Vec<String>,

        #[arg(long)]
        description: Option<String>,

        /// Only change the node-local keys of this member
        #[arg(long)]
        target: Option<String>,
    },

    /// Stop and remove a network
    Delete { name: String },

    /// Rename a network
    Rename { name: String, new_name: String },

    /// List networks
    List {
        /// Networks of every project
        #[arg(short, long)]
        all_projects: bool,
    },

    /// Show one network
    Show { name: String },

    /// Start every network created on this member
    Startup,

    /// Stop every network created on this member
    Shutdown,

    /// List warnings raised by network operations
    Warnings,
}

/// Parse `KEY=VALUE`; the value may be empty.
pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", value))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {:?}", value));
    }
    Ok((key.to_string(), val.to_string()))
}
