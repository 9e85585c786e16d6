//! Plexus runtime - the concurrency and messaging substrate.
//!
//! An [`App`] hosts one [`Engine`] per running graph; each engine owns
//! one [`ExtensionThread`] per extension group. Extensions exchange
//! commands, data and media frames across the engines' routing fabric.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       App (app thread)                      │
//! │  - addon registry                - StartGraph / StopGraph   │
//! │  - engine table                  - CloseApp                 │
//! └─────────────────────────────────────────────────────────────┘
//!                │ spawn per graph
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Engine (engine thread)                    │
//! │  - connection table (routing)    - client path table        │
//! │  - extension-thread records      - timeout sweep            │
//! └─────────────────────────────────────────────────────────────┘
//!                │ spawn per extension group
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            ExtensionThread (one per group)                  │
//! │  - extension store               - lifecycle state machine  │
//! │  - per-extension path tables     - pending message queue    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every long-lived object has exactly one home thread. All
//! inter-thread communication is a task posted to the target's
//! [`Runloop`]; the only shared mutable state is the addon store
//! (read-mostly behind a lock), environment-proxy reference counts
//! (atomics) and the runloop queues themselves.
//!
//! # Modules
//!
//! - [`runloop`]: FIFO task queue + blocking run
//! - [`affinity`]: belonging-thread tags and the fatal check
//! - [`path_table`]: per-extension registry of outstanding commands
//! - [`env`]: environment handles and thread-safe proxies
//! - [`addon`]: addon store, registry and instance handshakes
//! - [`extension_thread`]: the extension thread state machine
//! - [`engine`]: per-graph routing and thread management
//! - [`app`]: top-level host and client surface
//! - [`builtin`]: stock addons (echo)

pub mod addon;
pub mod affinity;
pub mod app;
pub mod builtin;
pub mod engine;
pub mod env;
pub mod extension_thread;
pub mod group;
pub mod path_table;
pub mod runloop;

mod error;

pub use addon::{AddonContext, AddonContextFlow, AddonError, AddonRegistry, AddonStore};
pub use affinity::ThreadAffinity;
pub use app::{App, AppBuilder, AppClient, AppConfig, RemoteForwarder};
pub use engine::{Engine, EngineHandle};
pub use env::EnvProxy;
pub use error::RuntimeError;
pub use extension_thread::{ExtensionSpec, ExtensionThread, ThreadState};
pub use group::ExtensionGroup;
pub use path_table::PathTable;
pub use runloop::{Runloop, RunloopHandle};
