pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod router;

pub use config::{ClusterConfig, CommitMode, Routing};
pub use error::{CommandError, MeshError, Result};
pub use router::{Command, CommandRouter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
