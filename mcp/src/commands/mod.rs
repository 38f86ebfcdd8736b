pub mod save_conversation;
