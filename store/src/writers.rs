// Component writers for the three files of a conversation directory.
//
// Every writer has the same shape so the coordinator can run them as an ordered
// list. Each one creates the conversation directory if needed and replaces its
// own file outright.

use crate::errors::StoreResult;
use crate::message::Message;
use crate::meta::ConversationMeta;
use crate::transcript::render_transcript;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TRANSCRIPT_FILE: &str = "conversation.md";
pub const META_FILE: &str = "meta.json";
pub const CHUNKS_FILE: &str = "chunks.jsonl";

/// Signature shared by all component writers:
/// `(base_dir, conversation_id, messages, meta)`.
pub type WriteFn = fn(&Path, &str, &[Message], &ConversationMeta) -> StoreResult<()>;

/// One named step of a conversation write.
#[derive(Clone, Copy)]
pub struct ComponentWriter {
    pub name: &'static str,
    pub write: WriteFn,
}

impl ComponentWriter {
    pub const fn new(name: &'static str, write: WriteFn) -> Self {
        Self { name, write }
    }
}

impl std::fmt::Debug for ComponentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentWriter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Transcript, then metadata, then append-log.
pub fn default_writers() -> Vec<ComponentWriter> {
    vec![
        ComponentWriter::new(TRANSCRIPT_FILE, write_transcript),
        ComponentWriter::new(META_FILE, write_meta),
        ComponentWriter::new(CHUNKS_FILE, write_chunks),
    ]
}

fn ensure_conversation_dir(base_dir: &Path, conversation_id: &str) -> StoreResult<PathBuf> {
    let conversation_dir = base_dir.join(conversation_id);
    fs::create_dir_all(&conversation_dir)?;
    Ok(conversation_dir)
}

pub fn write_transcript(
    base_dir: &Path,
    conversation_id: &str,
    messages: &[Message],
    meta: &ConversationMeta,
) -> StoreResult<()> {
    let path = ensure_conversation_dir(base_dir, conversation_id)?.join(TRANSCRIPT_FILE);
    let markdown = render_transcript(messages, meta);
    fs::write(&path, markdown)?;
    debug!("Wrote transcript {}", path.display());
    Ok(())
}

pub fn write_meta(
    base_dir: &Path,
    conversation_id: &str,
    _messages: &[Message],
    meta: &ConversationMeta,
) -> StoreResult<()> {
    let path = ensure_conversation_dir(base_dir, conversation_id)?.join(META_FILE);
    let json = meta.to_pretty_json()?;
    fs::write(&path, json)?;
    debug!("Wrote metadata {}", path.display());
    Ok(())
}

/// Creates (or truncates) the append-log. It stays empty until chunk records exist.
pub fn write_chunks(
    base_dir: &Path,
    conversation_id: &str,
    _messages: &[Message],
    _meta: &ConversationMeta,
) -> StoreResult<()> {
    let path = ensure_conversation_dir(base_dir, conversation_id)?.join(CHUNKS_FILE);
    fs::File::create(&path)?;
    debug!("Initialized append-log {}", path.display());
    Ok(())
}
