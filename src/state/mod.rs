//! State management for the provisioning engine.
//!
//! This module provides persistent storage for what previous runs
//! provisioned: remote identifiers, declaration fingerprints, recorded
//! outputs, and run history.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{ResourceState, RunHistoryEntry, RunState, STATE_VERSION};
