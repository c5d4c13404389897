//! Push-event plumbing: an in-process bus implementing [`PushChannel`], a reader
//! for newline-delimited JSON events, and a reconnecting Unix-socket client.
//!
//! [`PushChannel`]: crate::collaborators::PushChannel

pub mod push_bus;
pub mod socket_client;

pub use push_bus::{read_push_lines, PushBus};
pub use socket_client::PushSocketClient;
