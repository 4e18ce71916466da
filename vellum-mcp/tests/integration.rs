//! MCP client integration tests against a wiremock server.

use std::time::Duration;

use vellum_mcp::{McpClient, ProtocolVersion};
use vellum_tool::ToolRegistry;
use vellum_types::McpError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn initialize_response(version: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mock-server", "version": "1.0.0" }
        }
    })
}

async fn mount_initialized_ack(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "method": "notifications/initialized"
        })))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_negotiates_modern_version_and_session() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "method": "initialize",
            "params": { "protocolVersion": "2025-06-18" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "sess-abc123")
                .set_body_json(initialize_response("2025-06-18")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    assert_eq!(client.protocol_version(), ProtocolVersion::V2025_06_18);
    assert_eq!(client.session_id().as_deref(), Some("sess-abc123"));
}

#[tokio::test]
async fn connect_falls_back_to_plain_jsonrpc() {
    let server = MockServer::start().await;
    // The streamable attempts are rejected outright.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "params": { "protocolVersion": "2025-06-18" }
        })))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "params": { "protocolVersion": "2025-03-26" }
        })))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "params": { "protocolVersion": "2024-11-05" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2024-11-05")))
        .mount(&server)
        .await;
    mount_initialized_ack(&server).await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    assert_eq!(client.protocol_version(), ProtocolVersion::V2024_11_05);
    assert!(client.session_id().is_none());
}

#[tokio::test]
async fn server_choosing_older_version_wins_negotiation() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-03-26")))
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    assert_eq!(client.protocol_version(), ProtocolVersion::V2025_03_26);
}

#[tokio::test]
async fn unknown_server_version_exhausts_the_ladder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2099-01-01")))
        .mount(&server)
        .await;

    let err = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap_err();
    assert!(matches!(err, McpError::InvalidProtocolVersion(_)));
}

#[tokio::test]
async fn session_id_is_echoed_and_tools_cached() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "sess-1")
                .set_body_json(initialize_response("2025-06-18")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "sess-1"))
        .and(header("MCP-Protocol-Version", "2025-06-18"))
        .and(body_partial_json(serde_json::json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "tools": [{
                    "name": "memory_store",
                    "description": "Store a note",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "note": { "type": "string" } },
                        "required": ["note"]
                    }
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    let first = client.list_tools().await.unwrap();
    let second = client.list_tools().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].name, "memory_store");
    // expect(1) on the mock verifies the second call was served from cache.
}

#[tokio::test]
async fn call_tool_concatenates_text_and_collects_resources() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-06-18")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({
            "method": "tools/call",
            "params": { "name": "lookup", "arguments": { "q": "rust" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "content": [
                    { "type": "text", "text": "Rust is a systems language." },
                    { "type": "resource", "resource": { "uri": "https://doc.rust-lang.org", "mimeType": "text/html" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    let output = client
        .call_tool("lookup", serde_json::json!({"q": "rust"}))
        .await
        .unwrap();
    assert_eq!(output.text, "Rust is a systems language.");
    assert_eq!(output.resources[0].uri, "https://doc.rust-lang.org");
}

#[tokio::test]
async fn sse_post_responses_are_parsed() {
    let sse_body = "event: message\n\
data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[{\"name\":\"t\",\"inputSchema\":{\"type\":\"object\"}}]}}\n\n";

    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-06-18")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "tools/list" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "t");
}

#[tokio::test]
async fn close_deletes_the_session() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "sess-del")
                .set_body_json(initialize_response("2025-06-18")),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "sess-del"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    client.close().await.unwrap();
    // Idempotent: a second close is a no-op.
    client.close().await.unwrap();
}

#[tokio::test]
async fn rpc_errors_map_to_taxonomy() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-06-18")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "tools/call" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": { "code": -32001, "message": "no such tool: missing" }
        })))
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap();
    let err = client
        .call_tool("missing", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ToolNotFound(_)));
}

#[tokio::test]
async fn bridged_tools_merge_with_local_precedence() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-06-18")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "tools": [
                    { "name": "get_weather", "inputSchema": { "type": "object" } },
                    { "name": "remote_only", "inputSchema": { "type": "object" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = std::sync::Arc::new(
        McpClient::connect(format!("{}/mcp", server.uri())).await.unwrap(),
    );
    let mut registry = ToolRegistry::new();
    registry
        .register(vellum_tool::Tool::from_fn(
            "get_weather",
            "Local weather tool",
            vellum_tool::ParameterSchema::empty_object(),
            |_| Ok(serde_json::json!({"local": true})),
        ))
        .unwrap();

    let source = vellum_mcp::McpToolSource::new(client);
    let added = source.merge_into(&mut registry).await.unwrap();
    assert_eq!(added, vec!["remote_only".to_string()]);
    // The local tool survived the collision.
    assert_eq!(registry.get("get_weather").unwrap().description, "Local weather tool");
    assert!(registry.get("remote_only").is_some());
}

#[tokio::test]
async fn cache_ttl_zero_always_refetches() {
    let server = MockServer::start().await;
    mount_initialized_ack(&server).await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response("2025-06-18")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": { "tools": [] }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = McpClient::connect(format!("{}/mcp", server.uri()))
        .await
        .unwrap()
        .cache_ttl(Duration::ZERO);
    client.list_tools().await.unwrap();
    client.list_tools().await.unwrap();
}
