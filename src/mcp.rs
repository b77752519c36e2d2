//! MCP JSON-RPC protocol bridge.
//!
//! Adapts the [`ToolRegistry`] and the hierarchy cache to the MCP protocol
//! through `rmcp`:
//!
//! * **Tools** are exposed via `list_tools` / `call_tool`.
//! * **Resources** `notion://page/{id}` are listed for every top-level page
//!   and rendered to markdown by `read_resource`.
//!
//! The same bridge serves both transports: stdio ([`serve_stdio`]) and
//! streamable HTTP (mounted at `/mcp` by the server module).

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};

use crate::render;
use crate::traits::{ToolContext, ToolRegistry};

const URI_SCHEME: &str = "notion://";

/// Bridges the tool registry and page resources to MCP.
///
/// Each MCP session receives a clone of this struct (everything is
/// behind `Arc`), so all sessions share one cache.
#[derive(Clone)]
pub struct McpBridge {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// `notion://page/{id}` for a page id.
pub fn page_uri(id: &str) -> String {
    format!("{}page/{}", URI_SCHEME, id)
}

/// Extract the page id from a `notion://page/{id}` URI.
pub fn parse_page_uri(uri: &str) -> Result<&str, String> {
    let rest = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| format!("Unsupported URI scheme: {}", uri))?;
    match rest.trim_matches('/').split('/').collect::<Vec<_>>().as_slice() {
        ["page", id] if !id.is_empty() => Ok(*id),
        _ => Err(format!("Invalid Notion URI format: {}", uri)),
    }
}

impl McpBridge {
    pub fn new(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Self {
        Self { ctx, tools }
    }

    /// Convert a registry tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };
        let read_only = tool.name() != "refresh_cache";

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn to_mcp_resource(node: &crate::models::DocumentNode) -> Resource {
        let mut raw = RawResource::new(page_uri(&node.id), format!("Notion Page: {}", node.title));
        raw.description = Some(format!("Notion page: {}", node.title));
        raw.mime_type = Some("text/plain".to_string());
        raw.no_annotation()
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "notion-harness".to_string(),
                title: Some("Notion Harness".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Notion Harness: hierarchy-aware search over a Notion workspace. \
                 Use search to rank pages by title, path and content, ask_notion for an \
                 answer assembled from the best pages, and the find/list tools to navigate \
                 the page tree. Top-level pages are also available as notion://page/{id} resources."
                    .to_string(),
            ),
        }
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let params = crate::traits::validate_params(&tool.parameters_schema(), &params)
            .map_err(|e| McpError::new(ErrorCode::INVALID_PARAMS, e.to_string(), None))?;

        match tool.execute(params, &self.ctx).await {
            Ok(result) => {
                // ask_notion and read_page produce markdown; hand it over unquoted.
                let text = match result.get("answer").or_else(|| result.get("content")) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    _ => serde_json::to_string_pretty(&result).unwrap_or_default(),
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    // ── Resources ────────────────────────────────────────────────────────

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources: Vec<Resource> = self
            .ctx
            .cache()
            .top_level()
            .await
            .iter()
            .map(Self::to_mcp_resource)
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let page_id = parse_page_uri(&request.uri)
            .map_err(|msg| McpError::new(ErrorCode::INVALID_PARAMS, msg, None))?;

        let text = render::read_page(self.ctx.gateway(), self.ctx.cache(), page_id)
            .await
            .map_err(|e| {
                McpError::new(
                    ErrorCode::INTERNAL_ERROR,
                    format!("Error reading Notion page: {:#}", e),
                    None,
                )
            })?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri.clone())],
        })
    }
}

/// Serve the bridge over stdin/stdout until the client disconnects.
pub async fn serve_stdio(bridge: McpBridge) -> anyhow::Result<()> {
    tracing::info!("MCP server on stdio");
    let service = bridge
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "MCP stdio server failed to start"))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_uri_round_trips_through_parser() {
        let uri = page_uri("1234-abcd");
        assert_eq!(uri, "notion://page/1234-abcd");
        assert_eq!(parse_page_uri(&uri), Ok("1234-abcd"));
    }

    #[test]
    fn rejects_foreign_scheme_and_bad_shapes() {
        assert!(parse_page_uri("https://page/abc")
            .unwrap_err()
            .starts_with("Unsupported URI scheme"));
        for bad in ["notion://page/", "notion://db/abc", "notion://page/a/b", "notion://"] {
            assert!(
                parse_page_uri(bad).unwrap_err().starts_with("Invalid Notion URI format"),
                "{bad}"
            );
        }
    }
}
