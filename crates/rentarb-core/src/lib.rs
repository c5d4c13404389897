pub mod bus;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod events;
pub mod models;
pub mod reconcile;
pub mod runtime;
pub mod sources;
pub mod store;
pub mod streaming;
pub mod tracing_setup;

pub use config::{BadgeTimings, CoreConfig};
pub use models::{BadgeState, SessionPhase};
pub use reconcile::ReconciliationEngine;
pub use runtime::{BadgeCommand, BadgeHandle, BadgeRuntime};
