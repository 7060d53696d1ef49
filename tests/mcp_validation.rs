//! MCP server validation tests.
//!
//! Tests JSON-RPC 2.0 protocol compliance, resource reads, tool execution,
//! and error handling against an in-memory Anki.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anki_mcp::anki::{AnkiBackend, CardAnswer, CardRecord, DueKey, NewNote};
use anki_mcp::deck::DeckPath;
use anki_mcp::guard::GuardedBackend;
use anki_mcp::{Config, Error, McpServer, Result};
use serde_json::{json, Value};

#[derive(Default)]
struct MemoryAnki {
    decks: Mutex<Vec<String>>,
    cards: Vec<CardRecord>,
    due: Vec<i64>,
    rejected: Vec<i64>,
    notes: Mutex<Vec<NewNote>>,
    race_on_create: bool,
    offline: bool,
}

impl MemoryAnki {
    fn with_due_cards() -> Self {
        let card = |id, question: &str, due| CardRecord {
            card_id: id,
            question: question.into(),
            answer: format!("<div>answer {}</div>", id),
            due: DueKey::Known(due),
        };
        Self {
            cards: vec![
                card(101, "<style>.card{}</style>Third", 300.0),
                card(102, "First&nbsp;one", 100.0),
                card(103, "Second<br>card", 200.0),
            ],
            due: vec![101, 102, 103],
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl AnkiBackend for MemoryAnki {
    async fn version(&self) -> Result<u32> {
        if self.offline {
            return Err(Error::Backend("collection is not available".into()));
        }
        Ok(6)
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        Ok(self.decks.lock().unwrap().clone())
    }

    async fn create_deck(&self, name: &str) -> Result<Option<i64>> {
        self.decks.lock().unwrap().push(name.to_string());
        if self.race_on_create {
            return Err(Error::Backend(format!("deck '{}' already exists", name)));
        }
        Ok(Some(77))
    }

    async fn clone_deck_config(&self, _name: &str, _source_id: i64) -> Result<Option<i64>> {
        Err(Error::Decode("<html>502 Bad Gateway</html>".into()))
    }

    async fn set_deck_config(&self, _decks: &[String], _config_id: i64) -> Result<()> {
        Ok(())
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        match query {
            "is:due" => Ok(self.due.clone()),
            "deck:current" => Ok(self.cards.iter().map(|c| c.card_id).collect()),
            "nid:500" => Ok(vec![501]),
            "is:broken" => Err(Error::Decode("plugin banner".into())),
            "is:" => Err(Error::Backend("invalid search".into())),
            _ => Ok(Vec::new()),
        }
    }

    async fn cards_info(&self, card_ids: &[i64]) -> Result<Vec<CardRecord>> {
        Ok(self
            .cards
            .iter()
            .filter(|c| card_ids.contains(&c.card_id))
            .cloned()
            .collect())
    }

    async fn add_note(&self, note: &NewNote) -> Result<Option<i64>> {
        self.notes.lock().unwrap().push(note.clone());
        Ok(Some(500))
    }

    async fn answer_cards(&self, answers: &[CardAnswer]) -> Result<Vec<bool>> {
        Ok(answers
            .iter()
            .map(|a| !self.rejected.contains(&a.card_id))
            .collect())
    }
}

fn server_with(anki: MemoryAnki) -> McpServer {
    McpServer::new(Arc::new(GuardedBackend::new(anki)), Config::default())
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string()
}

fn initialize_request() -> String {
    request(
        1,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "0.1.0" }
        }),
    )
}

async fn initialized(anki: MemoryAnki) -> McpServer {
    let server = server_with(anki);
    let response = server.handle_message(&initialize_request()).await.unwrap();
    assert!(response.error.is_none());
    server
}

async fn call(server: &McpServer, method: &str, params: Value) -> Value {
    let response = server
        .handle_message(&request(2, method, params))
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

// ============================================================================
// Protocol Compliance Tests
// ============================================================================

#[tokio::test]
async fn test_initialize_handshake() {
    let server = server_with(MemoryAnki::default());
    let response = server.handle_message(&initialize_request()).await.unwrap();
    let response = serde_json::to_value(response).unwrap();

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "anki-mcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["resources"].is_object());
}

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let server = server_with(MemoryAnki::default());
    let response = call(&server, "tools/list", Value::Null).await;
    assert_eq!(response["error"]["message"], "server not initialized");
}

#[tokio::test]
async fn test_invalid_json_is_a_parse_error() {
    let server = server_with(MemoryAnki::default());
    let response = server.handle_message("{not json").await.unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, -32700);
}

#[tokio::test]
async fn test_unknown_method() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "prompts/list", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server_with(MemoryAnki::default());
    let note = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string();
    assert!(server.handle_message(&note).await.is_none());
}

// ============================================================================
// Resource Tests
// ============================================================================

#[tokio::test]
async fn test_list_resources() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "resources/list", json!({})).await;

    let resources = response["result"]["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 3);
    for resource in resources {
        assert!(resource["uri"].as_str().unwrap().starts_with("anki://search/"));
        assert_eq!(resource["mimeType"], "application/json");
        assert!(resource["name"].is_string());
        assert!(resource["description"].is_string());
    }
}

#[tokio::test]
async fn test_read_due_cards_resource() {
    let server = initialized(MemoryAnki::with_due_cards()).await;
    let response = call(
        &server,
        "resources/read",
        json!({ "uri": "anki://search/isdue" }),
    )
    .await;

    let contents = &response["result"]["contents"][0];
    assert_eq!(contents["uri"], "anki://search/isdue");
    assert_eq!(contents["mimeType"], "application/json");

    let cards: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(
        cards,
        json!([
            { "cardId": 102, "question": "First one", "answer": "answer 102", "due": 100.0 },
            { "cardId": 103, "question": "Second\ncard", "answer": "answer 103", "due": 200.0 },
            { "cardId": 101, "question": "Third", "answer": "answer 101", "due": 300.0 }
        ])
    );
}

#[tokio::test]
async fn test_read_resource_without_filter() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "resources/read", json!({ "uri": "anki://search/" })).await;
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn test_read_resource_with_noisy_backend() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(
        &server,
        "resources/read",
        json!({ "uri": "anki://search/isbroken" }),
    )
    .await;
    assert_eq!(response["result"]["contents"][0]["text"], "[]");
}

#[tokio::test]
async fn test_read_resource_backend_error_propagates() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "resources/read", json!({ "uri": "anki://search/is" })).await;
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("invalid search"));
}

// ============================================================================
// Tool Tests
// ============================================================================

#[tokio::test]
async fn test_list_tools() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "tools/list", json!({})).await;

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["add_card", "get_due_cards", "get_new_cards", "update_cards"]
    );
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
        assert!(tool["inputSchema"]["required"].is_array());
    }
}

#[tokio::test]
async fn test_get_due_cards_truncates_sorted_queue() {
    let server = initialized(MemoryAnki::with_due_cards()).await;
    let response = call(
        &server,
        "tools/call",
        json!({ "name": "get_due_cards", "arguments": { "num": 2 } }),
    )
    .await;

    assert_eq!(response["result"]["isError"], false);
    let cards: Value = serde_json::from_str(tool_text(&response)).unwrap();
    let ids: Vec<i64> = cards
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["cardId"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![102, 103]);
}

#[tokio::test]
async fn test_add_card_creates_todays_deck() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(
        &server,
        "tools/call",
        json!({ "name": "add_card", "arguments": { "front": "Q", "back": "A" } }),
    )
    .await;

    let deck = DeckPath::today("00_Inbox");
    assert_eq!(
        tool_text(&response),
        format!("Created card with id 501 in deck {}", deck)
    );

    let segments: Vec<&str> = deck.as_str().split("::").collect();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[0], "00_Inbox");
    assert_eq!(segments[1].len(), 4);
    assert_eq!(segments[2].len(), 2);
    assert_eq!(segments[3].len(), 2);
}

#[tokio::test]
async fn test_add_card_survives_creation_race() {
    let anki = MemoryAnki {
        race_on_create: true,
        ..MemoryAnki::default()
    };
    let server = initialized(anki).await;
    let response = call(
        &server,
        "tools/call",
        json!({ "name": "add_card", "arguments": { "front": "Q", "back": "A" } }),
    )
    .await;
    assert!(response["error"].is_null());
    assert!(tool_text(&response).starts_with("Created card with id 501"));
}

#[tokio::test]
async fn test_update_cards_partial_failure() {
    let anki = MemoryAnki {
        rejected: vec![2],
        ..MemoryAnki::default()
    };
    let server = initialized(anki).await;
    let response = call(
        &server,
        "tools/call",
        json!({
            "name": "update_cards",
            "arguments": { "answers": [{ "cardId": 1, "ease": 2 }, { "cardId": 2, "ease": 9 }] }
        }),
    )
    .await;

    assert_eq!(response["error"]["message"], "failed to update cards: 2");
}

#[tokio::test]
async fn test_tool_call_without_arguments() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(&server, "tools/call", json!({ "name": "get_new_cards" })).await;
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("get_new_cards"));
}

#[tokio::test]
async fn test_unknown_tool() {
    let server = initialized(MemoryAnki::default()).await;
    let response = call(
        &server,
        "tools/call",
        json!({ "name": "nonexistent_tool", "arguments": {} }),
    )
    .await;
    assert_eq!(response["error"]["code"], -32601);
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("nonexistent_tool"));
}

// ============================================================================
// Transport Tests
// ============================================================================

#[tokio::test]
async fn test_stdio_loop_writes_only_envelopes() {
    let server = server_with(MemoryAnki::with_due_cards());
    let input = [
        initialize_request(),
        String::new(),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
        request(2, "ping", json!({})),
        request(3, "shutdown", json!({})),
        request(4, "ping", json!({})),
    ]
    .join("\n");

    let mut output = Vec::new();
    server
        .run(Cursor::new(input), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3, "responses: {:?}", lines);
    for line in &lines {
        assert!(line.starts_with("{\"jsonrpc\""));
    }
    let last: Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(last["id"], 3);
}

// ============================================================================
// Startup diagnostics
// ============================================================================

#[tokio::test]
async fn test_backend_reachable_at_startup() {
    let server = server_with(MemoryAnki::default());
    assert!(server.probe_backend().await);
}

#[tokio::test]
async fn test_unreachable_backend_does_not_block_serving() {
    let server = server_with(MemoryAnki {
        offline: true,
        ..MemoryAnki::default()
    });
    assert!(!server.probe_backend().await);

    let response = server.handle_message(&initialize_request()).await.unwrap();
    assert!(response.error.is_none());
}
