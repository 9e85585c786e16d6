//! Plexus messages - the envelopes extensions exchange.
//!
//! Four message kinds cross the routing fabric:
//!
//! | Kind | Carries | Result |
//! |------|---------|--------|
//! | [`Cmd`] | name + property map | exactly one [`CmdResult`] |
//! | [`Data`] | opaque byte buffer | none |
//! | [`AudioFrame`] | PCM buffer + format metadata | none |
//! | [`VideoFrame`] | pixel buffer + format metadata | none |
//!
//! Commands subsume the runtime's control verbs ([`CmdKind`]):
//! `StartGraph`, `StopGraph`, `CloseApp`, `TriggerLifeCycle`, `Timer`
//! and `Timeout` are commands with a reserved kind rather than separate
//! envelope shapes, which keeps routing uniform.
//!
//! # Ownership
//!
//! Messages are plain owned values. Sending a message moves it into the
//! fabric; a sender that needs to keep looking at a message clones it
//! first. Cloning produces an independent property map with identical
//! routing, so a receiver's mutations are never observed by the sender.
//!
//! # Modules
//!
//! - [`graph`]: the JSON graph description accepted by `StartGraph`
//! - [`codec`]: the wire-codec seam (interfaced only; backends live
//!   outside the core)

pub mod codec;
pub mod graph;

mod cmd;
mod cmd_result;
mod data;
mod frame;
mod msg;

pub use cmd::{Cmd, CmdKind};
pub use cmd_result::CmdResult;
pub use data::Data;
pub use frame::{AudioFrame, PixelFormat, VideoFrame};
pub use msg::{Msg, MsgType};

/// Property key under which a command result carries its human-readable
/// detail string.
pub const DETAIL_KEY: &str = "detail";

/// Property key naming the gated stage in a `TriggerLifeCycle` command.
pub const STAGE_KEY: &str = "stage";
