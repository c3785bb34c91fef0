mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schema_scout::core::config::Settings;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Find the database tables a natural-language question is about", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Data directory (overrides config)")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or reuse the schema index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Force rebuild index")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Rank tables for a natural-language question
    #[command(alias = "s")]
    Search {
        query: String,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "Keyword matching only (no embeddings)")]
        keyword: bool,
        #[arg(long, help = "Print the schema context for the matched tables")]
        context: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List tables in the schema
    Tables {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Schema and index status
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Refetch schema metadata and refresh the index
    #[command(name = "update-schema")]
    UpdateSchema {
        #[arg(long, help = "Metadata export to read (defaults to configured source)")]
        from: Option<PathBuf>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Check the schema for problems
    Validate {
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server over stdio
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show client configuration instructions")]
        install: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let mut settings = Settings::load(&cwd).context("Failed to load settings")?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = if dir.is_relative() { cwd.join(dir) } else { dir };
    }

    init_tracing(&settings.log_level);

    match cli.command {
        Commands::Index {
            status,
            rebuild,
            json,
        } => commands::index::run(&settings, status, rebuild, json),
        Commands::Search {
            query,
            limit,
            keyword,
            context,
            json,
        } => commands::search::run(&settings, &query, limit, keyword, context, json),
        Commands::Tables { json } => commands::tables::run(&settings, json),
        Commands::Status { json } => commands::status::run(&settings, json),
        Commands::UpdateSchema { from, json } => commands::update::run(&settings, from, json),
        Commands::Validate { json } => commands::validate::run(&settings, json),

        // MCP Server
        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions();
                Ok(())
            } else {
                run_mcp_server(settings)
            }
        }
    }
}

/// Logs go to stderr; stdout carries results and the MCP transport
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(feature = "mcp")]
fn run_mcp_server(settings: Settings) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(mcp::run_mcp_server(settings))
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions() {
    use colored::Colorize;

    let project_path = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "/path/to/your/project".to_string());

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "scout".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "schema-scout": {{
      "command": "{}",
      "args": ["mcp"],
      "cwd": "{}"
    }}
  }}
}}"#, binary_path, project_path);
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Rank tables for a natural-language question", "schema_search".green());
    println!("  • {} - List tables in the loaded schema", "schema_tables".green());
    println!("  • {} - Schema and index status", "schema_status".green());
    println!("  • {} - Reload the schema and refresh the index", "schema_reload".green());
}
