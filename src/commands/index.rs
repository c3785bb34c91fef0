//! Index command - build or inspect the schema index

use anyhow::{Context, Result};
use colored::Colorize;

use schema_scout::core::catalog::CatalogSnapshot;
use schema_scout::core::config::Settings;
use schema_scout::search::{IndexOrigin, IndexStore};

use super::{configured_embedder_id, load_raw_schema, open_engine};

/// Run index command
pub fn run(settings: &Settings, status_only: bool, rebuild: bool, json: bool) -> Result<()> {
    if status_only {
        return show_status(settings, json);
    }

    let store = IndexStore::new(&settings.paths());
    if rebuild {
        store.remove().context("Failed to remove existing index")?;
        if !json {
            println!("{} Removed existing index", "→".dimmed());
        }
    }

    if !json {
        println!("{} Loading schema index...", "→".dimmed());
    }

    let (_, _, report) = open_engine(settings)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "tables": report.tables,
                "origin": report.origin,
                "duration_ms": report.duration_ms,
                "index_file": store.index_file().display().to_string(),
            })
        );
    } else {
        let verb = match report.origin {
            IndexOrigin::Rebuilt => "Indexed",
            IndexOrigin::Reloaded => "Index up to date for",
        };
        println!();
        println!(
            "{} {} {} tables in {:.2}s",
            "✓".green().bold(),
            verb,
            report.tables.to_string().cyan(),
            report.duration_ms as f64 / 1000.0
        );
        println!(
            "  {} Index saved to: {}",
            "→".dimmed(),
            store.index_file().display()
        );
    }

    Ok(())
}

/// Show index status
fn show_status(settings: &Settings, json: bool) -> Result<()> {
    let store = IndexStore::new(&settings.paths());
    let stats = store.stats().context("Failed to read index")?;

    let Some(stats) = stats else {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "exists": false,
                    "error": "Index not found"
                })
            );
        } else {
            println!(
                "{} Index not found. Run {} first.",
                "!".yellow().bold(),
                "scout index".cyan()
            );
        }
        return Ok(());
    };

    let embedder_id = configured_embedder_id(settings);
    let valid = load_raw_schema(settings)
        .ok()
        .map(|(raw, _)| store.is_valid_for(&CatalogSnapshot::build(&raw), &embedder_id));

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "vector_count": stats.vector_count,
                "dimension": stats.dimension,
                "embedder": stats.embedder,
                "built_at": stats.built_at,
                "file_size_bytes": stats.file_size_bytes,
                "valid": valid,
            })
        );
    } else {
        println!("{}", "Index Status".bold());
        println!();
        println!(
            "  {} {} tables indexed",
            "→".dimmed(),
            stats.vector_count.to_string().cyan()
        );
        println!(
            "  {} Embedder: {} ({} dims)",
            "→".dimmed(),
            stats.embedder,
            stats.dimension
        );
        println!(
            "  {} Size: {:.2} KB",
            "→".dimmed(),
            stats.file_size_bytes as f64 / 1024.0
        );
        if let Some(built_at) = &stats.built_at {
            println!("  {} Last built: {}", "→".dimmed(), built_at);
        }
        match valid {
            Some(true) => println!("  {} Matches current schema and model", "✓".green()),
            Some(false) => println!(
                "  {} Stale, will be rebuilt on next load",
                "!".yellow()
            ),
            None => println!("  {} Schema not available", "!".yellow()),
        }
    }

    Ok(())
}
