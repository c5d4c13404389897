pub mod override_store;

pub use override_store::{overrides_path, OverrideStore, OverrideStoreError};
