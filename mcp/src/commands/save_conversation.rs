//! `save_conversation`: validate tool arguments, derive the id and metadata,
//! and hand the write to the conversation store.

use chrono::{Local, Utc};
use log::{debug, info};
use nidhogg_store::{
    generate_conversation_id, ConversationMeta, ConversationStatus, ConversationStore, Message,
    StoreError,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Save task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn invalid(message: impl Into<String>) -> CommandError {
    CommandError::Validation(message.into())
}

/// Validated arguments of one save call.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub title: String,
    pub messages: Vec<Message>,
    pub out_dir: Option<PathBuf>,
    pub summary: String,
    pub tags: Vec<String>,
}

impl SaveRequest {
    /// Check the raw tool arguments. Failures carry the text shown to the client.
    pub fn from_arguments(arguments: &Value) -> Result<Self, CommandError> {
        let title = arguments
            .get("title")
            .ok_or_else(|| invalid("Missing required argument: title"))?;
        let messages = arguments
            .get("messages")
            .ok_or_else(|| invalid("Missing required argument: messages"))?;

        if is_empty_value(messages) {
            return Err(invalid("Messages array cannot be empty"));
        }

        let title = title
            .as_str()
            .ok_or_else(|| invalid("Title must be a string"))?
            .trim()
            .to_string();
        if title.is_empty() {
            return Err(invalid("Title cannot be empty"));
        }

        let messages = messages
            .as_array()
            .ok_or_else(|| invalid("Messages must be an array"))?
            .iter()
            .enumerate()
            .map(|(i, message)| parse_message(i, message))
            .collect::<Result<Vec<_>, _>>()?;

        let summary = match arguments.get("summary") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(invalid("Summary must be a string")),
        };

        let tags = match arguments.get("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|tag| tag.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("Tags must be an array of strings"))?,
            Some(_) => return Err(invalid("Tags must be an array of strings")),
        };

        let out_dir = match arguments.get("out_dir") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(PathBuf::from(s)),
            Some(_) => return Err(invalid("out_dir must be a string")),
        };

        Ok(Self {
            title,
            messages,
            out_dir,
            summary,
            tags,
        })
    }
}

// Null, false, zero and empty containers all count as "no messages".
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn parse_message(index: usize, value: &Value) -> Result<Message, CommandError> {
    let object: &Map<String, Value> = value
        .as_object()
        .ok_or_else(|| invalid(format!("Message {} must be an object", index)))?;

    let (Some(role), Some(content)) = (object.get("role"), object.get("content")) else {
        return Err(invalid(format!(
            "Message {} missing required fields: role, content",
            index
        )));
    };

    match (role.as_str(), content.as_str()) {
        (Some(role), Some(content)) => Ok(Message::new(role, content)),
        _ => Err(invalid(format!(
            "Message {} fields role and content must be strings",
            index
        ))),
    }
}

/// What a successful save produced.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub conversation_path: PathBuf,
    pub conversation_id: String,
    pub meta: ConversationMeta,
}

#[derive(Debug, Clone)]
pub struct SaveConversationCommand {
    store: ConversationStore,
    default_out_dir: PathBuf,
}

impl SaveConversationCommand {
    pub fn new(default_out_dir: PathBuf) -> Self {
        Self::with_store(ConversationStore::new(), default_out_dir)
    }

    pub fn with_store(store: ConversationStore, default_out_dir: PathBuf) -> Self {
        Self {
            store,
            default_out_dir,
        }
    }

    pub fn default_out_dir(&self) -> &PathBuf {
        &self.default_out_dir
    }

    /// Validate raw tool arguments and save.
    pub async fn execute(&self, arguments: &Value) -> Result<SaveOutcome, CommandError> {
        let request = SaveRequest::from_arguments(arguments)?;
        self.save(request).await
    }

    /// Save an already validated request. The file writes run on the blocking pool.
    pub async fn save(&self, request: SaveRequest) -> Result<SaveOutcome, CommandError> {
        let now = Utc::now();
        let conversation_id = generate_conversation_id(&request.title, &now.with_timezone(&Local));

        let meta = ConversationMeta::builder(conversation_id.clone(), request.title)
            .summary(request.summary)
            .tags(request.tags)
            .status(ConversationStatus::Active)
            .created_at(now)
            .build()?;

        let base_dir = request
            .out_dir
            .unwrap_or_else(|| self.default_out_dir.clone());
        debug!(
            "Saving conversation {} under {}",
            conversation_id,
            base_dir.display()
        );

        let store = self.store.clone();
        let messages = request.messages;
        let outcome = tokio::task::spawn_blocking(move || -> Result<SaveOutcome, StoreError> {
            let conversation_path = store.write(&base_dir, &conversation_id, &messages, &meta)?;
            Ok(SaveOutcome {
                conversation_path,
                conversation_id,
                meta,
            })
        })
        .await??;

        info!("Conversation saved to {}", outcome.conversation_path.display());
        Ok(outcome)
    }
}
