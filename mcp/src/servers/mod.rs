pub mod conversation;

pub use conversation::ConversationServer;
