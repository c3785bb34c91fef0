use anyhow::Result;
use colored::*;
use serde::Serialize;

use schema_scout::core::config::Settings;
use schema_scout::core::source::SchemaOrigin;

use super::load_raw_schema;

#[derive(Serialize)]
struct TableSummary {
    table_name: String,
    columns: usize,
}

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let (raw, origin) = load_raw_schema(settings)?;

    let tables: Vec<TableSummary> = raw
        .tables()
        .iter()
        .map(|t| TableSummary {
            table_name: t.table_name.clone(),
            columns: t.columns.len(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    let origin = match origin {
        SchemaOrigin::Cache => "cached schema",
        SchemaOrigin::Source => "schema source",
    };
    println!(
        "{} ({} tables, from {})",
        "Tables".bold(),
        tables.len(),
        origin
    );
    println!();
    for t in &tables {
        println!("  {} {}", t.table_name.cyan(), format!("({} columns)", t.columns).dimmed());
    }

    Ok(())
}
