//! ctxmesh-console - operator console for a ctxmesh agent
//!
//! Commands:
//! - `ctxmesh-console exec <command...>` - Run one command line
//! - `ctxmesh-console shell` - Read command lines until `exit`
//! - `ctxmesh-console status` - Get agent status
//! - `ctxmesh-console metrics` - Dump Prometheus metrics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctxmesh_cli::render::{render_envelope, render_status};
use ctxmesh_common::Envelope;
use ctxmesh_proto::AgentClient;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "ctxmesh-console")]
#[command(about = "Operator console for a ctxmesh agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Agent address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7400", global = true)]
    agent: String,

    /// Print raw JSON envelopes
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command, e.g. `exec query 1 what next?`
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Interactive command loop; `exit` quits
    Shell,
    /// Get agent status
    Status,
    /// Dump agent metrics in Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = AgentClient::connect(cli.agent.as_str())
        .await
        .with_context(|| format!("Failed to connect to agent at {}", cli.agent))?;

    match cli.command {
        Commands::Exec { command } => {
            let envelope = client.execute(&command.join(" ")).await?;
            print_envelope(&envelope, cli.json)?;
            if !envelope.ok {
                std::process::exit(1);
            }
        }
        Commands::Shell => run_shell(&mut client, cli.json).await?,
        Commands::Status => {
            let status = client.status().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", render_status(&status, chrono::Local::now()));
            }
        }
        Commands::Metrics => {
            print!("{}", client.metrics().await?);
        }
    }

    Ok(())
}

async fn run_shell(client: &mut AgentClient, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"ctxmesh> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        let envelope = client
            .execute(line)
            .await
            .context("Lost connection to agent")?;
        print_envelope(&envelope, json)?;
    }

    Ok(())
}

fn print_envelope(envelope: &Envelope, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(envelope)?);
    } else {
        println!("{}", render_envelope(envelope));
    }
    Ok(())
}
