use crate::cli::Commands;
use crate::config::ClusterConfig;
use crate::router::CommandRouter;
use crate::Result;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Shell { config } => handle_shell(config.as_deref()).await,
        Commands::Config { config } => handle_config(config.as_deref()),
    }
}

async fn handle_shell(path: Option<&Path>) -> Result<()> {
    let config = ClusterConfig::load(path)?;
    let router = CommandRouter::new(config)?;
    info!("Reading commands from stdin; type 'exit' to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        let envelope = router.execute(line).await;
        let json = serde_json::to_string(&envelope)?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    debug!("Shell closed");
    Ok(())
}

fn handle_config(path: Option<&Path>) -> Result<()> {
    let config = ClusterConfig::load(path)?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
