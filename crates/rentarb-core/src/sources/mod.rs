//! Conversation sources: the remote HTTP store, a snapshot file, and an in-memory fake.

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileConversationSource;
pub use http::HttpConversationSource;
pub use memory::MemoryConversationSource;
