//! Application-wide constants
//!
//! Centralized location for file names and the default timing windows
//! used by the badge engine.

/// Window after a fetch is issued during which non-forced refreshes are skipped
pub const DEBOUNCE_MS: u64 = 10_000;

/// Window after a counted read adjustment during which non-forced refreshes are skipped
pub const SUPPRESSION_MS: u64 = 15_000;

/// Delay before the forced refresh that follows a `messages-read` event without a count
pub const READ_RETRY_MS: u64 = 3_000;

/// Background poll interval (forced refresh regardless of state)
pub const POLL_MS: u64 = 60_000;

/// How often a watching process re-reads the override file for edits made elsewhere
pub const OVERRIDE_RELOAD_MS: u64 = 2_000;

// Files inside the data directory
pub const CONFIG_FILE: &str = "config.json";
pub const OVERRIDES_FILE: &str = "manual_overrides.json";

/// Fallback data directory when the platform data dir is unavailable
pub const FALLBACK_DATA_DIR: &str = "rentarb_data";

/// Socket name for the local push-event stream
pub const PUSH_SOCKET_NAME: &str = "rentarb-push.sock";

/// Path segment appended to the endpoint to list conversations
pub const CONVERSATIONS_PATH: &str = "conversations";

// Environment variables
pub const ENV_ENDPOINT: &str = "RENTARB_ENDPOINT";
pub const ENV_LOG_FILE: &str = "RENTARB_LOG_FILE";
