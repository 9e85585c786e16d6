//! Addon store, registry and instance handshakes.
//!
//! Addons are named factories keyed by `(type, name)`. The store is
//! the one piece of cross-thread shared state in the runtime: writes
//! happen only during registration and unregistration phases
//! serialized on the app thread, reads happen from any thread and are
//! safe because the store is append-only while graphs run.
//!
//! Instance creation is an asynchronous cross-thread handshake driven
//! by an [`AddonContext`]: the factory call is posted onto the runloop
//! of the flow target (the thread that will own the instance), and the
//! completion is posted back the same way.

mod manager;
mod store;

pub use manager::{
    create_instance_async, destroy_instance_async, AddonContext, AddonContextFlow, AddonRegistry,
};
pub use store::AddonStore;

use plexus_extension::AddonType;
use plexus_types::ErrorCode;
use thiserror::Error;

/// Errors from the addon layer.
#[derive(Debug, Error)]
pub enum AddonError {
    /// No factory is registered under `(addon_type, name)`.
    #[error("addon not found: {addon_type}:{name}")]
    NotFound { addon_type: AddonType, name: String },

    /// A different factory is already registered under the key.
    /// Re-registering the identical factory is accepted and ignored.
    #[error("addon already registered: {addon_type}:{name}")]
    Duplicate { addon_type: AddonType, name: String },

    /// The flow target's runloop is gone; the handshake cannot start.
    #[error("addon flow target unavailable: {0}")]
    FlowTargetGone(String),
}

impl ErrorCode for AddonError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "ADDON_NOT_FOUND",
            Self::Duplicate { .. } => "ADDON_DUPLICATE",
            Self::FlowTargetGone(_) => "ADDON_FLOW_TARGET_GONE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
