pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctxmesh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replicated conversation contexts over a simulated server mesh", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run an in-process cluster and read commands from stdin")]
    Shell {
        #[arg(short, long, help = "Cluster configuration file (YAML)")]
        config: Option<PathBuf>,
    },
    #[command(about = "Print the effective configuration")]
    Config {
        #[arg(short, long, help = "Cluster configuration file (YAML)")]
        config: Option<PathBuf>,
    },
}
