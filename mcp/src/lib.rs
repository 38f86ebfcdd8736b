// The nidhogg-mcp crate exposes conversation saving over MCP:
// - stdio message framing
// - the save_conversation command
// - the conversation server loop

pub mod commands;
pub mod rpc;
pub mod servers;

pub use commands::save_conversation::{
    CommandError, SaveConversationCommand, SaveOutcome, SaveRequest,
};
pub use servers::conversation::{run, run_stdio, ConversationServer};
