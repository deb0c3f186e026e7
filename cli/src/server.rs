/*
    spotify-mcp-rs | Spotify playback, search and playlist tools for AI agents.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Model Context Protocol server on stdio, built on rmcp.
//!
//! Each tool forwards its raw arguments to [`ToolHandlers`], which owns
//! validation, so malformed input comes back as a tool error payload
//! rather than a protocol error.

use std::sync::Arc;

use log::info;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, JsonObject, ServerCapabilities, ServerInfo};
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use serde_json::Value;
use spotify_mcp_core::{definitions, ToolHandlers, ToolName};

const INSTRUCTIONS: &str = "Controls the user's Spotify account: playback, search, queue, \
     item info, playlists and devices. Failed calls return an `error` object with a `kind`.";

#[derive(Clone)]
pub struct SpotifyMcpServer {
    handlers: Arc<ToolHandlers>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SpotifyMcpServer {
    pub fn new(handlers: Arc<ToolHandlers>) -> Self {
        Self {
            handlers,
            tool_router: Self::described_router(),
        }
    }

    /// Router whose advertised descriptions and input schemas come from the
    /// core tool definitions.
    fn described_router() -> ToolRouter<Self> {
        let mut router = Self::tool_router();
        for definition in definitions() {
            if let Some(route) = router.map.get_mut(definition.name) {
                route.attr.description = Some(definition.description.into());
                if let Value::Object(schema) = definition.input_schema {
                    route.attr.input_schema = Arc::new(schema);
                }
            }
        }
        router
    }

    async fn dispatch(&self, tool: ToolName, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let response = self.handlers.call(tool, Value::Object(arguments)).await;
        let text = serde_json::to_string_pretty(&response.payload)
            .map_err(|e| McpError::internal_error(format!("Unencodable result: {}", e), None))?;

        let content = vec![Content::text(text)];
        if response.is_error {
            Ok(CallToolResult::error(content))
        } else {
            Ok(CallToolResult::success(content))
        }
    }

    #[tool(name = "SpotifyPlayback", description = "Get, start, pause or skip playback.")]
    async fn playback(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::Playback, args).await
    }

    #[tool(name = "SpotifySearch", description = "Search Spotify for tracks, albums, artists or playlists.")]
    async fn search(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::Search, args).await
    }

    #[tool(name = "SpotifyQueue", description = "Show the queue or add an item to it.")]
    async fn queue(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::Queue, args).await
    }

    #[tool(name = "SpotifyGetInfo", description = "Get details about a track, album, artist or playlist.")]
    async fn item_info(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::GetInfo, args).await
    }

    #[tool(name = "SpotifyPlaylist", description = "List, inspect, create and edit the user's playlists.")]
    async fn playlist(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::Playlist, args).await
    }

    #[tool(name = "SpotifyDevices", description = "List the user's available playback devices.")]
    async fn devices(&self, Parameters(args): Parameters<JsonObject>) -> Result<CallToolResult, McpError> {
        self.dispatch(ToolName::Devices, args).await
    }
}

#[tool_handler]
impl ServerHandler for SpotifyMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "spotify-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}

/// Serves until the client disconnects.
pub async fn run_stdio(handlers: Arc<ToolHandlers>) -> anyhow::Result<()> {
    info!("MCP server listening on stdio");
    let service = SpotifyMcpServer::new(handlers).serve(stdio()).await?;
    let reason = service.waiting().await?;
    info!("MCP server stopped: {:?}", reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spotify_mcp_core::{SpotifyClient, SpotifyConfig};

    /// Real client without a cached token. Only calls that fail validation
    /// or authorization can be exercised without network access.
    fn server() -> (SpotifyMcpServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SpotifyConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            token_cache_path: dir.path().join("token.json"),
        };
        let client = SpotifyClient::connect(&config).unwrap();
        let handlers = Arc::new(ToolHandlers::new(Arc::new(client)));
        (SpotifyMcpServer::new(handlers), dir)
    }

    fn args(value: Value) -> Parameters<JsonObject> {
        match value {
            Value::Object(map) => Parameters(map),
            other => panic!("not an object: {}", other),
        }
    }

    fn payload(result: &CallToolResult) -> Value {
        let value = serde_json::to_value(result).unwrap();
        let text = value["content"][0]["text"].as_str().unwrap().to_string();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_router_advertises_all_tools_with_core_schemas() {
        let (server, _dir) = server();
        let tools = server.tool_router.list_all();

        let mut names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
        names.sort();
        let mut expected: Vec<String> = ToolName::ALL.iter().map(|t| t.as_str().to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);

        let search = tools.iter().find(|t| t.name == "SpotifySearch").unwrap();
        let schema = Value::Object(search.input_schema.as_ref().clone());
        assert_eq!(schema["required"], json!(["query"]));
        assert!(search.description.as_deref().unwrap_or_default().len() > 20);
    }

    #[test]
    fn test_server_info_enables_tools() {
        let (server, _dir) = server();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "spotify-mcp");
    }

    #[tokio::test]
    async fn test_validation_failure_is_tool_error() {
        let (server, _dir) = server();
        let result = server.search(args(json!({ "query": "" }))).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(payload(&result)["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_unknown_argument_is_tool_error() {
        let (server, _dir) = server();
        let result = server
            .playback(args(json!({ "action": "get", "volume": 11 })))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(payload(&result)["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_missing_token_is_authentication_error() {
        let (server, _dir) = server();
        let result = server.devices(Parameters(JsonObject::new())).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(payload(&result)["error"]["kind"], "authentication_error");
    }
}
