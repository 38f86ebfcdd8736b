use nidhogg_mcp::{run, ConversationServer};
use nidhogg_store::{load_meta, ConversationStatus, CHUNKS_FILE, META_FILE, TRANSCRIPT_FILE};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tokio::io::BufReader;

fn newline_frames(messages: &[Value]) -> String {
    messages
        .iter()
        .map(|m| format!("{}\n", m))
        .collect::<String>()
}

fn parse_newline_responses(output: &[u8]) -> Vec<Value> {
    String::from_utf8(output.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn run_session(server: &ConversationServer, input: &str) -> Vec<u8> {
    run_session_bytes(server, input.as_bytes()).await
}

async fn run_session_bytes(server: &ConversationServer, input: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    run(server, BufReader::new(input), &mut output).await.unwrap();
    output
}

/// Split output that mixes both framings into `(header_framed, body)` pairs.
fn parse_mixed_responses(output: &[u8]) -> Vec<(bool, Value)> {
    let mut text = std::str::from_utf8(output).unwrap();
    let mut responses = Vec::new();
    while !text.is_empty() {
        if let Some(rest) = text.strip_prefix("Content-Length: ") {
            let (length, rest) = rest.split_once("\r\n\r\n").unwrap();
            let length: usize = length.parse().unwrap();
            responses.push((true, serde_json::from_str(&rest[..length]).unwrap()));
            text = &rest[length..];
        } else {
            let (line, rest) = text.split_once('\n').unwrap();
            responses.push((false, serde_json::from_str(line).unwrap()));
            text = rest;
        }
    }
    responses
}

const PING: &str = "{\"jsonrpc\":\"2.0\",\"id\":\"after\",\"method\":\"ping\"}\n";

fn assert_parse_error_then_ping(responses: &[(bool, Value)], header_framed: bool) {
    assert_eq!(responses.len(), 2, "{:?}", responses);

    let (framed, error) = &responses[0];
    assert_eq!(*framed, header_framed);
    assert_eq!(error["id"], Value::Null);
    assert_eq!(error["error"]["code"], -32700);

    let (framed, ping) = &responses[1];
    assert!(!framed);
    assert_eq!(ping["id"], "after");
    assert_eq!(ping["result"], json!({}));
}

#[tokio::test]
async fn full_session_saves_conversation() {
    let base = tempdir().unwrap();
    let server = ConversationServer::new(base.path().to_path_buf());

    let input = newline_frames(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2024-11-05",
                          "clientInfo": {"name": "test-client", "version": "1.0"}}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
            "name": "save_conversation",
            "arguments": {
                "title": "API Design Review",
                "messages": [
                    {"role": "user", "content": "Should we use REST or GraphQL?"},
                    {"role": "assistant", "content": "REST for simplicity."}
                ]
            }
        }}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "shutdown"}),
        // Never reached: the loop stops after shutdown.
        json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}),
    ]);

    let responses = parse_newline_responses(&run_session(&server, &input).await);
    let ids: Vec<&Value> = responses.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, vec![&json!(1), &json!(2), &json!(3), &json!(4)]);

    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "nidhogg-mcp");
    assert_eq!(responses[1]["result"]["tools"][0]["name"], "save_conversation");

    let call = &responses[2]["result"];
    assert_eq!(call["isError"], false);
    let path = call["structuredContent"]["conversation_path"].as_str().unwrap();
    assert_eq!(
        call["content"][0]["text"],
        format!("Successfully saved conversation to: {}", path)
    );

    let dir = Path::new(path);
    assert!(dir.starts_with(base.path()));
    let dir_name = dir.file_name().unwrap().to_str().unwrap();
    assert!(dir_name.starts_with("api-design-review-"));

    let transcript = fs::read_to_string(dir.join(TRANSCRIPT_FILE)).unwrap();
    assert!(transcript.starts_with("# API Design Review\n"));
    assert!(transcript.contains("\n## User\n\nShould we use REST or GraphQL?\n"));
    assert!(transcript.contains("\n## Assistant\n\nREST for simplicity.\n"));

    let meta: Value = serde_json::from_str(&fs::read_to_string(dir.join(META_FILE)).unwrap()).unwrap();
    assert_eq!(meta["conversation_id"], dir_name);
    assert_eq!(meta["status"], "active");
    assert_eq!(meta["summary"], "");
    assert_eq!(meta["tags"], json!([]));
    assert_eq!(fs::metadata(dir.join(CHUNKS_FILE)).unwrap().len(), 0);

    let loaded = load_meta(dir).unwrap();
    assert_eq!(loaded.status(), ConversationStatus::Active);

    assert_eq!(responses[3]["result"], Value::Null);
}

#[tokio::test]
async fn content_length_framing_is_answered_in_kind() {
    let base = tempdir().unwrap();
    let server = ConversationServer::new(base.path().to_path_buf());

    let body = json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string();
    let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);

    let output = String::from_utf8(run_session(&server, &input).await).unwrap();
    let expected_body = r#"{"jsonrpc":"2.0","id":7,"result":{}}"#;
    assert_eq!(
        output,
        format!("Content-Length: {}\r\n\r\n{}", expected_body.len(), expected_body)
    );
}

#[tokio::test]
async fn errors_are_reported_without_ending_the_session() {
    let base = tempdir().unwrap();
    let server = ConversationServer::new(base.path().to_path_buf());

    let mut input = String::from("{not json\n");
    input.push_str(&newline_frames(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {
            "name": "save_conversation",
            "arguments": {"title": "T", "messages": []}
        }}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
            "name": "save_conversation",
            "arguments": {"title": "T", "messages": [{"role": "user", "content": "x"}],
                          "out_dir": base.path().join("custom").to_str().unwrap()}
        }}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "unknown/method"}),
    ]));

    let responses = parse_newline_responses(&run_session(&server, &input).await);
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["error"]["code"], -32700);

    assert_eq!(responses[1]["result"]["isError"], true);
    assert_eq!(
        responses[1]["result"]["content"][0]["text"],
        "Error saving conversation: Messages array cannot be empty"
    );

    assert_eq!(responses[2]["result"]["isError"], false);
    assert_eq!(fs::read_dir(base.path().join("custom")).unwrap().count(), 1);

    assert_eq!(responses[3]["error"]["code"], -32601);
}

#[tokio::test]
async fn exit_stops_without_response() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let input = newline_frames(&[
        json!({"jsonrpc": "2.0", "method": "exit"}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    ]);
    assert!(run_session(&server, &input).await.is_empty());
}

#[tokio::test]
async fn bad_content_length_is_answered_and_session_continues() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let input = format!("Content-Length: lots\r\n\r\n{}", PING);
    let output = run_session(&server, &input).await;
    assert_parse_error_then_ping(&parse_mixed_responses(&output), true);
}

#[tokio::test]
async fn header_block_without_length_is_answered() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let input = format!("Content-Type: application/json\r\n\r\n{}", PING);
    let output = run_session(&server, &input).await;
    assert_parse_error_then_ping(&parse_mixed_responses(&output), true);
}

#[tokio::test]
async fn invalid_utf8_body_is_a_parse_error() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let mut input = b"Content-Length: 3\r\n\r\n\xff\xfe\xfd".to_vec();
    input.extend_from_slice(PING.as_bytes());
    let output = run_session_bytes(&server, &input).await;
    assert_parse_error_then_ping(&parse_mixed_responses(&output), true);
}

#[tokio::test]
async fn invalid_utf8_line_is_a_parse_error() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let mut input = b"\xff\xfe\n".to_vec();
    input.extend_from_slice(PING.as_bytes());
    let output = run_session_bytes(&server, &input).await;
    assert_parse_error_then_ping(&parse_mixed_responses(&output), false);
}

#[tokio::test]
async fn oversized_content_length_is_rejected_without_panicking() {
    let server = ConversationServer::new(Path::new("unused").to_path_buf());
    let input = "Content-Length: 18446744073709551615\r\n\r\n{}";
    let responses = parse_mixed_responses(&run_session(&server, input).await);

    assert_eq!(responses.len(), 1);
    let (framed, error) = &responses[0];
    assert!(framed);
    assert_eq!(error["error"]["code"], -32700);
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("exceeds the"));
}
