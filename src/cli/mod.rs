pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meshwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Node-scoped pod watcher and local address resolver for sidecar acceleration", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Watch pods scheduled on this node")]
    Watch {
        #[arg(long, env = "NODE_NAME", help = "Node to watch (defaults to the host name)")]
        node_name: Option<String>,

        #[arg(long, env = "MESHWATCH_SANDBOX", help = "Watch pods on every node")]
        sandbox: bool,

        #[arg(long, env = "MESHWATCH_IP_LIST_FILE", help = "File of <ip>/<mask> lines local to this node")]
        ip_list_file: Option<PathBuf>,

        #[arg(long, env = "MESHWATCH_RESYNC_SECS", default_value_t = 30, help = "Full resync interval in seconds")]
        resync_secs: u64,
    },
    #[command(about = "Check whether an address belongs to this node")]
    Local {
        #[arg(help = "Address to check")]
        address: String,

        #[arg(long, env = "MESHWATCH_IP_LIST_FILE", help = "File of <ip>/<mask> lines local to this node")]
        ip_list_file: Option<PathBuf>,
    },
    #[command(about = "Print an IPv4 address as a network-order map key")]
    Pack {
        #[arg(help = "Dotted-quad IPv4 address")]
        address: String,
    },
}
