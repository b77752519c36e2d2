//! Tool trait, tool context and the built-in tools.
//!
//! Every operation an agent can call is a [`Tool`] registered in a
//! [`ToolRegistry`]. The REST server (`POST /tools/{name}`) and the MCP
//! bridge (`tools/call`) dispatch through the same registry, so both
//! surfaces expose identical behavior.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  ToolRegistry                    │
//! │  search · ask_notion · find_page · find_by_path  │
//! │  list_top_level · list_children · read_page      │
//! │  hierarchy_stats · refresh_cache · (custom)      │
//! └──────────────────────┬───────────────────────────┘
//!                        ▼
//!          ToolContext { cache, engine, gateway }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use notion_harness::traits::ToolRegistry;
//!
//! let mut tools = ToolRegistry::with_builtins();
//! // tools.register(Box::new(MyTool::new()));
//! assert_eq!(tools.len(), 9);
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::notion::NotionGateway;
use crate::gateway::SourceGateway;
use crate::hierarchy::HierarchyCache;
use crate::models::DocumentNode;
use crate::render;
use crate::search::{SearchEngine, SearchSettings};

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An operation that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use notion_harness::traits::{Tool, ToolContext};
///
/// pub struct PageCountTool;
///
/// #[async_trait]
/// impl Tool for PageCountTool {
///     fn name(&self) -> &str { "page_count" }
///     fn description(&self) -> &str { "Count cached pages" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let snapshot = ctx.cache().get_all(false).await;
///         Ok(json!({ "pages": snapshot.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the route path.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool ships with the crate. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for the parameters: `type: "object"`, `properties`, and
    /// optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute with parameters already checked by [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Check `params` against a tool's schema and fill in defaults.
///
/// Enforces `required`, the declared `type`, `enum`, and `minimum` /
/// `maximum` for numbers. Absent properties with a `default` receive it.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for req_field in &required {
        if !params_obj.contains_key(*req_field) {
            bail!("missing required parameter: {}", req_field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected_type {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected_type,
                    json_type_name(value)
                );
            }
        }

        if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !enum_values.contains(value) {
                let allowed: Vec<String> = enum_values.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }

        if let Some(n) = value.as_f64() {
            let min = prop_schema.get("minimum").and_then(Value::as_f64);
            let max = prop_schema.get("maximum").and_then(Value::as_f64);
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                bail!(
                    "parameter '{}' must be between {} and {}, got {}",
                    prop_name,
                    min.map_or("-inf".to_string(), |m| m.to_string()),
                    max.map_or("inf".to_string(), |m| m.to_string()),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    let value = params[name].as_str().unwrap_or("").trim();
    if value.is_empty() {
        bail!("{} must not be empty", name);
    }
    Ok(value)
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Shared services handed to every tool invocation.
///
/// Cheap to clone; the cache and engine are shared, so every tool sees the
/// same hierarchy snapshot.
#[derive(Clone)]
pub struct ToolContext {
    config: Arc<Config>,
    gateway: Arc<dyn SourceGateway>,
    cache: Arc<HierarchyCache>,
    engine: Arc<SearchEngine>,
}

impl ToolContext {
    /// Wire a cache and search engine over `gateway`.
    pub fn new(config: Arc<Config>, gateway: Arc<dyn SourceGateway>) -> Self {
        let cache = Arc::new(HierarchyCache::from_config(gateway.clone(), &config));
        let engine = Arc::new(SearchEngine::new(
            cache.clone(),
            gateway.clone(),
            SearchSettings::from_config(&config),
        ));
        Self::from_parts(config, gateway, cache, engine)
    }

    pub fn from_parts(
        config: Arc<Config>,
        gateway: Arc<dyn SourceGateway>,
        cache: Arc<HierarchyCache>,
        engine: Arc<SearchEngine>,
    ) -> Self {
        Self {
            config,
            gateway,
            cache,
            engine,
        }
    }

    /// Context over the live Notion API, token taken from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = NotionGateway::from_env(&config.notion)?;
        Ok(Self::new(Arc::new(config.clone()), Arc::new(gateway)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &dyn SourceGateway {
        self.gateway.as_ref()
    }

    pub fn cache(&self) -> &HierarchyCache {
        &self.cache
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }
}

fn pages_json(pages: &[DocumentNode]) -> Value {
    json!({ "count": pages.len(), "pages": pages })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Ranked search across remote hits, cached metadata and page content.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the Notion workspace by title, path and content"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "max_results": { "type": "integer", "description": "Max results", "minimum": 1, "maximum": 100 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let max_results = params["max_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(ctx.config.search.default_max_results);

        let results = ctx.engine.search(query, max_results).await;
        Ok(json!({ "query": query, "count": results.len(), "results": results }))
    }
}

/// Question answering over the content of the best matching pages.
pub struct AskNotionTool;

#[async_trait]
impl Tool for AskNotionTool {
    fn name(&self) -> &str {
        "ask_notion"
    }

    fn description(&self) -> &str {
        "Ask a question and get relevant information from your entire Notion workspace"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "Natural language question to search for in your Notion workspace"
                },
                "max_content_pages": {
                    "type": "integer",
                    "description": "Maximum number of most relevant pages to include full content from",
                    "default": 5,
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let question = required_str(&params, "question")?;
        let max_pages = params["max_content_pages"].as_u64().unwrap_or(5) as usize;

        let answer = render::ask(&ctx.engine, ctx.gateway(), question, max_pages).await;
        Ok(json!({ "answer": answer }))
    }
}

/// Page lookup by exact or fuzzy title.
pub struct FindPageTool;

#[async_trait]
impl Tool for FindPageTool {
    fn name(&self) -> &str {
        "find_page"
    }

    fn description(&self) -> &str {
        "Find a page by title"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Page title" },
                "exact": { "type": "boolean", "description": "Require an exact title match", "default": true }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let title = required_str(&params, "title")?;
        let exact = params["exact"].as_bool().unwrap_or(true);

        match ctx.cache.find_by_title(title, exact).await {
            Some(page) => Ok(serde_json::to_value(page)?),
            None => bail!("page not found: {}", title),
        }
    }
}

/// Pages under a path prefix such as `["Engineering", "Projects"]`.
pub struct FindByPathTool;

#[async_trait]
impl Tool for FindByPathTool {
    fn name(&self) -> &str {
        "find_by_path"
    }

    fn description(&self) -> &str {
        "Find pages whose hierarchy path starts with the given parts"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Path parts from the workspace root, matched case-insensitively"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let parts = params["path"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<String>>>()
            })
            .unwrap_or_default();

        let Some(parts) = parts else {
            bail!("invalid path: every element must be a string");
        };
        if parts.is_empty() {
            bail!("path must not be empty");
        }

        let pages = ctx.cache.find_by_path(&parts).await;
        Ok(pages_json(&pages))
    }
}

/// Non-archived pages directly under the workspace.
pub struct ListTopLevelTool;

#[async_trait]
impl Tool for ListTopLevelTool {
    fn name(&self) -> &str {
        "list_top_level"
    }

    fn description(&self) -> &str {
        "List top-level pages of the workspace"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let pages = ctx.cache.top_level().await;
        Ok(pages_json(&pages))
    }
}

/// Direct children of one page.
pub struct ListChildrenTool;

#[async_trait]
impl Tool for ListChildrenTool {
    fn name(&self) -> &str {
        "list_children"
    }

    fn description(&self) -> &str {
        "List the direct children of a page"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Parent page id" }
            },
            "required": ["page_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let page_id = required_str(&params, "page_id")?;
        let children = ctx.cache.children(page_id).await;
        if children.is_empty() && ctx.cache.get_by_id(page_id).is_none() {
            bail!("page not found: {}", page_id);
        }
        Ok(pages_json(&children))
    }
}

pub struct HierarchyStatsTool;

#[async_trait]
impl Tool for HierarchyStatsTool {
    fn name(&self) -> &str {
        "hierarchy_stats"
    }

    fn description(&self) -> &str {
        "Summarize the page hierarchy: counts by depth, archived pages, sample paths"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.cache.stats().await)?)
    }
}

pub struct RefreshCacheTool;

#[async_trait]
impl Tool for RefreshCacheTool {
    fn name(&self) -> &str {
        "refresh_cache"
    }

    fn description(&self) -> &str {
        "Rebuild the page hierarchy from the Notion API"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let snapshot = ctx.cache.refresh().await;
        Ok(json!({
            "pages": snapshot.len(),
            "updated_at": snapshot.updated_at(),
        }))
    }
}

/// Full rendered content of one page.
pub struct ReadPageTool;

#[async_trait]
impl Tool for ReadPageTool {
    fn name(&self) -> &str {
        "read_page"
    }

    fn description(&self) -> &str {
        "Read the content of a page as markdown"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Page id" }
            },
            "required": ["page_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let page_id = required_str(&params, "page_id")?;
        let content = render::read_page(ctx.gateway(), &ctx.cache, page_id).await?;
        Ok(json!({ "page_id": page_id, "content": content }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered collection of tools. Lookup is by name; the first match wins.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(AskNotionTool));
        registry.register(Box::new(FindPageTool));
        registry.register(Box::new(FindByPathTool));
        registry.register(Box::new(ListTopLevelTool));
        registry.register(Box::new(ListChildrenTool));
        registry.register(Box::new(HierarchyStatsTool));
        registry.register(Box::new(RefreshCacheTool));
        registry.register(Box::new(ReadPageTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Look up, validate and execute. Unknown names fail with "not found".
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Some(tool) = self.find(name) else {
            bail!("tool not found: {}", name);
        };
        let params = validate_params(&tool.parameters_schema(), &params)?;
        tool.execute(params, ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_required() {
        let schema = SearchTool.parameters_schema();
        let err = validate_params(&schema, &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: query");
    }

    #[test]
    fn validate_checks_types() {
        let schema = SearchTool.parameters_schema();
        let err = validate_params(&schema, &json!({"query": 5})).unwrap_err();
        assert!(err.to_string().contains("must be of type 'string'"));
    }

    #[test]
    fn validate_injects_defaults() {
        let schema = AskNotionTool.parameters_schema();
        let out = validate_params(&schema, &json!({"question": "why?"})).unwrap();
        assert_eq!(out["max_content_pages"], 5);
    }

    #[test]
    fn validate_enforces_bounds() {
        let schema = AskNotionTool.parameters_schema();
        assert!(validate_params(&schema, &json!({"question": "q", "max_content_pages": 10})).is_ok());
        let err = validate_params(&schema, &json!({"question": "q", "max_content_pages": 11}))
            .unwrap_err();
        assert!(err.to_string().contains("must be between 1 and 10"));
        assert!(validate_params(&schema, &json!({"question": "q", "max_content_pages": 0})).is_err());
    }

    #[test]
    fn validate_accepts_null_as_empty_object() {
        let schema = ListTopLevelTool.parameters_schema();
        assert_eq!(validate_params(&schema, &Value::Null).unwrap(), json!({}));
        assert!(validate_params(&schema, &json!([1, 2])).is_err());
    }

    #[test]
    fn builtins_are_unique_and_marked() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 9);
        let mut names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
        assert!(registry.tools().iter().all(|t| t.is_builtin()));
        assert!(registry.find("ask_notion").is_some());
        assert!(registry.find("ask-notion").is_none());
    }
}
