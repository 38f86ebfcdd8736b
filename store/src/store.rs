use crate::errors::{StoreError, StoreResult};
use crate::message::Message;
use crate::meta::ConversationMeta;
use crate::writers::{default_writers, ComponentWriter, META_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// ConversationStore writes a conversation directory by running its component
/// writers in order against `{base_dir}/{conversation_id}`.
///
/// The write is not transactional. When a later writer fails the earlier files
/// stay on disk and the error is returned as is; the directory should be treated
/// as unreliable until a later write succeeds. Writing the same id again replaces
/// all files (last write wins).
#[derive(Debug, Clone)]
pub struct ConversationStore {
    writers: Vec<ComponentWriter>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Store with the standard transcript, metadata and append-log writers.
    pub fn new() -> Self {
        Self {
            writers: default_writers(),
        }
    }

    /// Store running a custom ordered writer list.
    pub fn with_writers(writers: Vec<ComponentWriter>) -> Self {
        Self { writers }
    }

    /// Write all files for one conversation and return its directory.
    pub fn write(
        &self,
        base_dir: &Path,
        conversation_id: &str,
        messages: &[Message],
        meta: &ConversationMeta,
    ) -> StoreResult<PathBuf> {
        validate_conversation_id(conversation_id)?;
        if meta.conversation_id() != conversation_id {
            return Err(StoreError::Validation(format!(
                "meta.conversation_id '{}' does not match '{}'",
                meta.conversation_id(),
                conversation_id
            )));
        }

        fs::create_dir_all(base_dir)?;

        for writer in &self.writers {
            debug!("Running {} writer for {}", writer.name, conversation_id);
            if let Err(e) = (writer.write)(base_dir, conversation_id, messages, meta) {
                warn!(
                    "{} writer failed for {}; directory may hold a partial file set: {}",
                    writer.name, conversation_id, e
                );
                return Err(e);
            }
        }

        let conversation_dir = base_dir.join(conversation_id);
        info!(
            "Saved conversation {} ({} messages) to {}",
            conversation_id,
            messages.len(),
            conversation_dir.display()
        );
        Ok(conversation_dir)
    }
}

/// An id must be a single, non-empty path component.
pub fn validate_conversation_id(conversation_id: &str) -> StoreResult<()> {
    if conversation_id.is_empty()
        || conversation_id.contains('/')
        || conversation_id.contains('\\')
        || conversation_id == "."
        || conversation_id == ".."
    {
        return Err(StoreError::InvalidIdentifier(conversation_id.to_string()));
    }
    Ok(())
}

/// Read `meta.json` back from a conversation directory.
pub fn load_meta(conversation_dir: &Path) -> StoreResult<ConversationMeta> {
    let json = fs::read_to_string(conversation_dir.join(META_FILE))?;
    ConversationMeta::from_json_str(&json)
}
