use anyhow::Result;
use colored::*;
use serde::Serialize;

use schema_scout::core::config::Settings;
use schema_scout::core::schema::validate_schema;

use super::load_raw_schema;

#[derive(Serialize)]
struct ValidationResult {
    total_tables: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let (raw, _) = load_raw_schema(settings)?;

    let mut result = ValidationResult {
        total_tables: raw.len(),
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    for v in validate_schema(&raw) {
        if v.is_warning() {
            result.warnings.push(v.to_string());
        } else {
            result.errors.push(v.to_string());
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for e in &result.errors {
            println!("  {} {}", "✗".red(), e);
        }
        for w in &result.warnings {
            println!("  {} {}", "!".yellow(), w);
        }
        if !result.errors.is_empty() || !result.warnings.is_empty() {
            println!();
        }

        let summary = format!(
            "{} tables checked, {} errors, {} warnings",
            result.total_tables,
            result.errors.len(),
            result.warnings.len()
        );
        if result.errors.is_empty() {
            println!("{} {}", "✓".green().bold(), summary);
        } else {
            println!("{} {}", "✗".red().bold(), summary);
        }
    }

    if !result.errors.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
