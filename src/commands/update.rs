//! Update-schema command - refetch metadata and refresh the index

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use schema_scout::core::config::Settings;
use schema_scout::core::schema::validate_schema;
use schema_scout::core::source::{JsonFileSource, SchemaSource, SchemaStore};
use schema_scout::search::RetrievalEngine;

use super::configured_source;

pub fn run(settings: &Settings, from: Option<PathBuf>, json: bool) -> Result<()> {
    let source = match from.map(JsonFileSource::new).or_else(|| configured_source(settings)) {
        Some(source) => source,
        None => bail!("No schema source configured. Pass --from or set SCOUT_SCHEMA_SOURCE"),
    };

    let raw = source
        .fetch()
        .with_context(|| format!("Failed to fetch schema from {}", source.describe()))?;

    let store = SchemaStore::new(&settings.paths());
    store.save(&raw).context("Failed to cache schema")?;

    let engine = RetrievalEngine::new(settings).context("Failed to load embedding model")?;
    let report = engine.reload(&raw).context("Failed to load schema index")?;

    let problems = validate_schema(&raw);
    let errors = problems.iter().filter(|v| !v.is_warning()).count();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "source": source.describe(),
                "tables": report.tables,
                "index": report.origin,
                "schema_errors": errors,
                "schema_warnings": problems.len() - errors,
            })
        );
    } else {
        println!(
            "{} Fetched {} tables from {}",
            "✓".green().bold(),
            report.tables.to_string().cyan(),
            source.describe()
        );
        println!("  {} Index {}", "→".dimmed(), report.origin);
        if errors > 0 {
            println!(
                "  {} {} schema problems, run {} for details",
                "!".yellow(),
                errors,
                "scout validate".cyan()
            );
        }
    }

    Ok(())
}
