//! Search command - rank tables for a natural-language question

use anyhow::Result;
use colored::Colorize;

use schema_scout::core::catalog::render_schema_context;
use schema_scout::core::config::Settings;
use schema_scout::search::{SearchMode, SearchOutcome};

use super::open_engine;

/// Run search command
pub fn run(
    settings: &Settings,
    query: &str,
    limit: Option<usize>,
    keyword: bool,
    context: bool,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(settings.top_k);
    let (engine, raw, _) = open_engine(settings)?;

    let outcome = if keyword {
        SearchOutcome {
            mode: SearchMode::Keyword,
            hits: engine.search_keywords(query, limit)?,
        }
    } else {
        engine.search_detailed(query, limit)?
    };

    if outcome.hits.is_empty() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "error": "no relevant tables",
                    "query": query,
                })
            );
        } else {
            eprintln!("{} No relevant tables for: {}", "✗".red(), query.cyan());
        }
        std::process::exit(1);
    }

    let schema_context = context.then(|| {
        render_schema_context(&raw, outcome.hits.iter().map(|h| h.table_name.as_str()))
    });

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "query": query,
                "mode": outcome.mode,
                "tables": outcome.hits,
                "schema_context": schema_context,
            }))?
        );
        return Ok(());
    }

    if outcome.mode == SearchMode::Keyword && !keyword {
        println!(
            "{} Using keyword search (no vector match)",
            "!".yellow()
        );
        println!();
    }

    println!(
        "{} {} tables for: {}",
        "→".dimmed(),
        outcome.hits.len(),
        query.cyan()
    );
    println!();

    for (i, hit) in outcome.hits.iter().enumerate() {
        let score_str = match outcome.mode {
            SearchMode::Vector => format!("{:.2}", hit.similarity_score),
            SearchMode::Keyword => format!("{:.0}", hit.similarity_score),
        };
        let score_colored = match outcome.mode {
            SearchMode::Vector if hit.similarity_score > 0.8 => score_str.green(),
            SearchMode::Vector if hit.similarity_score > 0.6 => score_str.yellow(),
            _ => score_str.dimmed(),
        };

        println!(
            "{}. [{}] {}",
            (i + 1).to_string().bold(),
            score_colored,
            hit.table_name.cyan()
        );

        // Truncate description for display (char-aware for Unicode)
        let display = if hit.description.chars().count() > 120 {
            format!("{}...", hit.description.chars().take(120).collect::<String>())
        } else {
            hit.description.clone()
        };
        println!("   {}", display.dimmed());
        println!();
    }

    if let Some(schema_context) = schema_context {
        println!("{}", "Schema context".bold());
        println!();
        print!("{}", schema_context);
    }

    Ok(())
}
