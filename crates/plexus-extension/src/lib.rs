//! Plexus extension SDK.
//!
//! Extensions are the user-written dataflow nodes of a Plexus graph.
//! This crate is the surface an extension author sees:
//!
//! - [`Extension`]: lifecycle and message callbacks
//! - [`ExtensionEnv`]: the capability handle passed into every callback
//! - [`Addon`]: the named factory that manufactures extension instances
//!
//! # Threading model
//!
//! Every extension lives on exactly one extension thread, together with
//! the rest of its extension group. All callbacks run serially on that
//! thread; an extension never needs interior locking for its own state.
//! Blocking inside a callback stalls every extension in the group —
//! long work belongs on a helper thread that posts a continuation back
//! through an environment proxy.
//!
//! # Lifecycle
//!
//! ```text
//! on_configure ─▶ configure_done ─▶ on_init ─▶ init_done
//!              ─▶ on_start ─▶ start_done ─▶ (running)
//!              ─▶ on_stop  ─▶ stop_done  ─▶ on_deinit ─▶ deinit_done
//! ```
//!
//! Each `*_done` call on the environment is the extension's only way to
//! advance; a stage may complete later than the callback that entered
//! it (send a command during `on_start`, call `on_start_done` from the
//! result handler).
//!
//! # Example
//!
//! ```
//! use plexus_extension::{Extension, ExtensionEnv};
//! use plexus_msg::{Cmd, CmdResult};
//! use plexus_types::StatusCode;
//!
//! struct Greeter;
//!
//! impl Extension for Greeter {
//!     fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
//!         let result = match cmd.name() {
//!             "hello_world" => {
//!                 CmdResult::from_cmd(&cmd, StatusCode::Ok).with_detail("hello world, too")
//!             }
//!             _ => CmdResult::from_cmd(&cmd, StatusCode::Error).with_detail("unknown command"),
//!         };
//!         let _ = env.return_result(result);
//!     }
//! }
//! ```

mod addon;
mod error;
mod extension;
mod proxy;

pub mod testing;

pub use addon::{Addon, AddonType, CreateInstanceDone, DestroyInstanceDone};
pub use error::ExtensionError;
pub use extension::{Extension, ExtensionEnv, ResultHandler};
pub use proxy::{EnvProxyHandle, EnvTask};
