// The nidhogg-store crate persists conversations as self-describing directories:
//
//   {base_dir}/{conversation_id}/conversation.md   human-readable transcript
//   {base_dir}/{conversation_id}/meta.json         authoritative structured record
//   {base_dir}/{conversation_id}/chunks.jsonl      append-log, empty until indexing lands

pub mod errors;
pub mod identifier;
pub mod message;
pub mod meta;
pub mod transcript;
pub mod writers;
mod store;

pub use errors::{StoreError, StoreResult};
pub use identifier::generate_conversation_id;
pub use message::Message;
pub use meta::{ConversationMeta, ConversationMetaBuilder, ConversationStatus, Decision};
pub use store::{load_meta, validate_conversation_id, ConversationStore};
pub use transcript::render_transcript;
pub use writers::{ComponentWriter, CHUNKS_FILE, META_FILE, TRANSCRIPT_FILE};
