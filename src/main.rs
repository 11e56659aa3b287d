use clap::Parser;
use obsidian_mcp_server::{config::Config, observability, McpServer};

/// MCP server fronting the Obsidian Local REST API plugin.
#[derive(Parser, Debug)]
#[command(name = "obsidian-mcp-server", version)]
struct Cli {
    /// Emit logs as newline-delimited JSON instead of human-readable text.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(cli.log_json);

    let config = Config::from_env()?;
    let server = McpServer::build(config)?;
    server.run().await?;

    Ok(())
}
