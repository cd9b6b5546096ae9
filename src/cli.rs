use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bridge", version, about = "Lifecycle controller for test harness bridges")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Use a specific config file
    #[arg(short = 'f', long = "file", global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bridge until it is stopped
    Serve {
        /// Address to listen on (overrides [bridge].host)
        #[arg(long, env = "BRIDGE_HOST")]
        host: Option<String>,
        /// Control port (overrides [bridge].port)
        #[arg(long, env = "BRIDGE_PORT")]
        port: Option<u16>,
    },
    /// Print the configuration of a running bridge
    Show {
        /// Control URL, defaults to http://localhost:<port>/bridge
        #[arg(long)]
        url: Option<String>,
    },
    /// Ask a running bridge to stop
    Stop {
        /// Control URL, defaults to http://localhost:<port>/bridge
        #[arg(long)]
        url: Option<String>,
    },
    /// Validate the configuration file
    Validate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
