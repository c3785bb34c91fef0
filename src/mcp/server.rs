//! Schema MCP Server implementation

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use schema_scout::core::config::Settings;
use schema_scout::core::source::{load_schema, SchemaSource, SchemaStore};
use schema_scout::core::status::collect_status;
use schema_scout::search::{ReloadReport, RetrievalEngine, SearchHit, SearchMode};

use crate::commands::configured_source;

const MAX_LIMIT: usize = 100;

/// Parameters for schema_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language question (e.g., "monthly revenue per customer")
    #[schemars(description = "Natural language question about the data")]
    pub query: String,
    /// Maximum number of tables to return
    #[schemars(description = "Maximum number of tables (default: configured top_k)")]
    #[serde(default)]
    pub limit: Option<usize>,
    /// Include the column listing for the matched tables
    #[schemars(description = "Include a schema context block for SQL generation")]
    #[serde(default)]
    pub include_context: bool,
}

/// Parameters for schema_reload tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReloadParams {
    /// Refetch from the schema source instead of using the cached schema
    #[schemars(description = "Refetch from the configured schema source")]
    #[serde(default)]
    pub refetch: bool,
}

/// Search result for JSON output
#[derive(Debug, Serialize)]
struct SearchResultJson {
    query: String,
    mode: SearchMode,
    tables: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_context: Option<String>,
}

/// Schema MCP Service
#[derive(Clone)]
pub struct ScoutService {
    settings: Arc<Settings>,
    engine: Arc<RetrievalEngine>,
    tool_router: ToolRouter<Self>,
}

impl ScoutService {
    pub fn new(settings: Settings, engine: RetrievalEngine) -> Self {
        Self {
            settings: Arc::new(settings),
            engine: Arc::new(engine),
            tool_router: Self::tool_router(),
        }
    }

    /// Load (or refetch) the schema and swap it into the engine
    fn reload_schema(&self, refetch: bool) -> Result<ReloadReport> {
        let store = SchemaStore::new(&self.settings.paths());
        let source = configured_source(&self.settings);

        let raw = if refetch {
            let source = source.context("No schema source configured")?;
            let raw = source
                .fetch()
                .with_context(|| format!("Failed to fetch schema from {}", source.describe()))?;
            store.save(&raw).context("Failed to cache schema")?;
            raw
        } else {
            load_schema(&store, source.as_ref().map(|s| s as &dyn SchemaSource))
                .context("Schema not available")?
                .0
        };

        Ok(self.engine.reload(&raw)?)
    }

    async fn reload_in_background(&self, refetch: bool) -> Result<ReloadReport> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.reload_schema(refetch)).await?
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("JSON serialization failed: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

#[tool_router]
impl ScoutService {
    /// Rank tables relevant to a question
    #[tool(description = "Find the database tables relevant to a natural-language question. Returns table names, similarity scores and column descriptions, best match first.")]
    async fn schema_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        // Clamp limit: at least 1, at most MAX_LIMIT
        let limit = params.limit.unwrap_or(self.settings.top_k).clamp(1, MAX_LIMIT);

        let (outcome, schema_context) = if params.include_context {
            let (outcome, context) = self.engine.search_with_context(&params.query, limit)
                .map_err(|e| McpError::internal_error(format!("Search failed: {}", e), None))?;
            (outcome, Some(context))
        } else {
            let outcome = self.engine.search_detailed(&params.query, limit)
                .map_err(|e| McpError::internal_error(format!("Search failed: {}", e), None))?;
            (outcome, None)
        };

        if outcome.hits.is_empty() {
            return Err(McpError::resource_not_found(
                "No relevant tables found",
                Some(serde_json::json!({ "query": params.query })),
            ));
        }

        to_json(&SearchResultJson {
            query: params.query,
            mode: outcome.mode,
            tables: outcome.hits,
            schema_context,
        })
    }

    /// List loaded tables
    #[tool(description = "List the tables in the loaded schema, in catalog order.")]
    async fn schema_tables(&self) -> Result<CallToolResult, McpError> {
        to_json(&serde_json::json!({
            "state": self.engine.state(),
            "tables": self.engine.table_names(),
        }))
    }

    /// Schema and index status
    #[tool(description = "Get schema cache and index status: table count, last update time, index size and whether it matches the schema.")]
    async fn schema_status(&self) -> Result<CallToolResult, McpError> {
        let report = collect_status(&self.settings.paths(), self.engine.embedder().id());
        to_json(&serde_json::json!({
            "engine_state": self.engine.state(),
            "embedding_model": self.engine.embedder().id(),
            "loaded_tables": self.engine.table_count(),
            "status": report,
        }))
    }

    /// Reload the schema
    #[tool(description = "Reload the schema (optionally refetching it from the source) and rebuild the index if it changed. Searches keep using the previous schema until the reload completes.")]
    async fn schema_reload(
        &self,
        params: Parameters<ReloadParams>,
    ) -> Result<CallToolResult, McpError> {
        let report = self
            .reload_in_background(params.0.refetch)
            .await
            .map_err(|e| McpError::internal_error(format!("Reload failed: {:#}", e), None))?;
        to_json(&report)
    }
}

#[tool_handler]
impl ServerHandler for ScoutService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Schema retrieval MCP Server. Finds the database tables relevant to a natural-language question before SQL generation.".to_string()
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(settings: Settings) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let engine = RetrievalEngine::new(&settings).context("Failed to load embedding model")?;
    let service = ScoutService::new(settings, engine);

    match service.reload_in_background(false).await {
        Ok(report) => info!(tables = report.tables, origin = %report.origin, "schema ready"),
        Err(e) => warn!(error = %format!("{:#}", e), "starting without a schema; call schema_reload once it is available"),
    }

    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
