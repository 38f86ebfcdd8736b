use crate::commands::save_conversation::SaveConversationCommand;
use crate::rpc::{read_message, send_response, Framing, ReadMessageError};
use log::{debug, error, info, warn};
use nidhogg_core::rpc_types::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST};
use nidhogg_core::{CallToolResult, JsonRpcError, Request, Response, ServerInfo, Tool};
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, BufWriter};
use tokio::signal;

pub const SERVER_NAME: &str = "nidhogg-mcp";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SAVE_CONVERSATION_TOOL: &str = "save_conversation";

/// MCP server exposing the `save_conversation` tool.
#[derive(Debug, Clone)]
pub struct ConversationServer {
    save_command: SaveConversationCommand,
}

impl ConversationServer {
    /// `default_out_dir` is used when a call carries no `out_dir`.
    pub fn new(default_out_dir: PathBuf) -> Self {
        Self::with_command(SaveConversationCommand::new(default_out_dir))
    }

    pub fn with_command(save_command: SaveConversationCommand) -> Self {
        Self { save_command }
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        vec![Tool {
            name: SAVE_CONVERSATION_TOOL.to_string(),
            description: "Save a conversation to the three-file system (conversation.md, meta.json, chunks.jsonl)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Title/topic of the conversation"
                    },
                    "messages": {
                        "type": "array",
                        "description": "Array of conversation messages",
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": {"type": "string", "description": "Message role (user, assistant, system)"},
                                "content": {"type": "string", "description": "Message content"}
                            },
                            "required": ["role", "content"]
                        }
                    },
                    "out_dir": {
                        "type": "string",
                        "description": "Output directory for conversations",
                        "default": nidhogg_core::DEFAULT_OUT_DIR
                    },
                    "summary": {
                        "type": "string",
                        "description": "Optional summary of the conversation"
                    },
                    "tags": {
                        "type": "array",
                        "description": "Optional tags for categorization",
                        "items": {"type": "string"}
                    }
                },
                "required": ["title", "messages"]
            }),
        }]
    }

    /// Run one tool. Tool-level failures come back as `is_error` results.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> CallToolResult {
        if name != SAVE_CONVERSATION_TOOL {
            warn!("Unknown tool requested: {}", name);
            return CallToolResult::error(format!("Unknown tool: {}", name));
        }

        match self.save_command.execute(arguments).await {
            Ok(outcome) => {
                let text = format!(
                    "Successfully saved conversation to: {}",
                    outcome.conversation_path.display()
                );
                let result = CallToolResult::text(text);
                match serde_json::to_value(&outcome) {
                    Ok(structured) => result.with_structured_content(structured),
                    Err(e) => {
                        warn!("Could not serialize save outcome: {}", e);
                        result
                    }
                }
            }
            Err(e) => {
                error!("save_conversation failed: {}", e);
                CallToolResult::error(format!("Error saving conversation: {}", e))
            }
        }
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: Request) -> Option<Response> {
        if request.is_notification() {
            debug!("Notification received: {}", request.method);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!("Handling request method: {} (ID: {})", request.method, id);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result(request.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools() })),
            "tools/call" => self.handle_tool_call(request.params, "arguments").await,
            // Older hosts use this method with `args` in place of `arguments`.
            "mcp/tool/execute" => self.handle_tool_call(request.params, "args").await,
            "shutdown" => Ok(Value::Null),
            other => {
                warn!("Method not found: {}", other);
                Err(JsonRpcError::method_not_found(other))
            }
        };

        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(error) => Response::failure(id, error),
        })
    }

    fn initialize_result(&self, params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        if let Some(client) = params.and_then(|p| p.get("clientInfo")) {
            info!("Initialize from client {}", client);
        }
        json!({
            "protocolVersion": protocol_version,
            "capabilities": { "tools": {} },
            "serverInfo": self.server_info(),
        })
    }

    async fn handle_tool_call(
        &self,
        params: Option<Value>,
        arguments_key: &str,
    ) -> Result<Value, JsonRpcError> {
        let params = params.unwrap_or_default();
        let name = params["name"].as_str().ok_or_else(|| {
            JsonRpcError::new(INVALID_PARAMS, "Missing or invalid 'name' in tool call params")
        })?;
        let arguments = params.get(arguments_key).cloned().unwrap_or(json!({}));

        debug!("Executing tool: {} with arguments: {}", name, arguments);
        let result = self.call_tool(name, &arguments).await;
        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Failed to encode result: {}", e)))
    }
}

/// Serve requests from `reader` until EOF, `exit` or `shutdown`.
///
/// Malformed frames are answered with a parse error; only I/O failures end
/// the session early.
pub async fn run<R, W>(
    server: &ConversationServer,
    mut reader: R,
    mut writer: W,
) -> Result<(), ReadMessageError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("{} ready. Waiting for messages...", SERVER_NAME);

    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("Stdin closed (EOF). Exiting.");
                break;
            }
            // Only header blocks can be malformed, so answer in header framing.
            Err(e) if e.is_malformed_frame() => {
                error!("Malformed message frame: {}", e);
                let response = Response::failure(Value::Null, JsonRpcError::parse_error(&e));
                send_response(&response, &mut writer, Framing::ContentLength).await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!("Received message: {}", message.body);
        let framing = message.framing;

        let value: Value = match serde_json::from_str(&message.body) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON-RPC message: {}", e);
                let response = Response::failure(Value::Null, JsonRpcError::parse_error(e));
                send_response(&response, &mut writer, framing).await?;
                continue;
            }
        };

        let request: Request = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                if value.get("method").is_none() && value.get("id").is_some() {
                    debug!("Ignoring client response: {}", value);
                    continue;
                }
                error!("Invalid JSON-RPC request: {}", e);
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                let error = JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e));
                send_response(&Response::failure(id, error), &mut writer, framing).await?;
                continue;
            }
        };

        match request.method.as_str() {
            "exit" => {
                info!("Received exit notification. Exiting immediately.");
                break;
            }
            "shutdown" => {
                info!("Received shutdown request. Will exit after responding.");
                if let Some(response) = server.handle_request(request).await {
                    send_response(&response, &mut writer, framing).await?;
                }
                break;
            }
            _ => {
                if let Some(response) = server.handle_request(request).await {
                    send_response(&response, &mut writer, framing).await?;
                }
            }
        }
    }

    info!("{} shutting down.", SERVER_NAME);
    Ok(())
}

/// Serve over the process's stdin/stdout until the session ends or Ctrl+C.
pub async fn run_stdio(server: &ConversationServer) -> Result<(), ReadMessageError> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C signal. Shutting down {}...", SERVER_NAME);
            Ok(())
        }
        result = run(server, reader, writer) => result,
    }
}
