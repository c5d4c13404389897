pub mod commands;
pub mod config;

pub use commands::{run_watch, run_watch_lines, ConversationInput, PushInput, WatchOptions};
pub use config::CliConfig;
