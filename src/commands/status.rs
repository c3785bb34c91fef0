use anyhow::Result;
use colored::*;

use schema_scout::core::config::Settings;
use schema_scout::core::status::collect_status;

use super::configured_embedder_id;

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let report = collect_status(&settings.paths(), &configured_embedder_id(settings));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Schema Status".bold());
    println!();

    if report.schema_available {
        println!(
            "  {} Schema: {} tables",
            "✓".green(),
            report
                .schema_tables_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
                .cyan()
        );
    } else {
        println!(
            "  {} Schema not cached. Run {} first.",
            "!".yellow(),
            "scout update-schema".cyan()
        );
    }
    println!(
        "  {} Last updated: {}",
        "→".dimmed(),
        report.last_updated.as_deref().unwrap_or("Never")
    );
    println!("  {} Embedding model: {}", "→".dimmed(), settings.embedding_model);

    println!();
    println!("{}", "Index".bold());
    match &report.index {
        Some(stats) => {
            println!(
                "  {} {} vectors, {} dims, {}",
                "→".dimmed(),
                stats.vector_count,
                stats.dimension,
                stats.embedder
            );
            if let Some(built_at) = &stats.built_at {
                println!("  {} Built: {}", "→".dimmed(), built_at);
            }
        }
        None => println!("  {} Not built", "!".yellow()),
    }
    match report.index_valid {
        Some(true) => println!("  {} Matches cached schema", "✓".green()),
        Some(false) => println!("  {} Stale", "!".yellow()),
        None => {}
    }

    Ok(())
}
