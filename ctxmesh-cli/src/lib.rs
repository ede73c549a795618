//! Operator console for a ctxmesh agent
//!
//! Commands:
//! - `ctxmesh-console exec <command...>` - Run one command line
//! - `ctxmesh-console shell` - Interactive command loop
//! - `ctxmesh-console status` - Agent status
//! - `ctxmesh-console metrics` - Prometheus metrics text

pub mod render;
