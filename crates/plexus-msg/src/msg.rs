//! The unified message envelope.

use crate::{AudioFrame, Cmd, CmdKind, CmdResult, Data, VideoFrame};
use plexus_types::Loc;
use serde::{Deserialize, Serialize};

/// The message taxonomy as it appears on the wire.
///
/// Control verbs are commands under the hood (see
/// [`CmdKind`](crate::CmdKind)) but keep distinct wire types so a peer
/// can route them without inspecting the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Cmd,
    CmdResult,
    Data,
    AudioFrame,
    VideoFrame,
    CloseApp,
    StopGraph,
    StartGraph,
    TriggerLifeCycle,
    Timer,
    Timeout,
}

/// Any message traveling the routing fabric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    Cmd(Cmd),
    CmdResult(CmdResult),
    Data(Data),
    AudioFrame(AudioFrame),
    VideoFrame(VideoFrame),
}

impl Msg {
    /// The wire type of this message.
    #[must_use]
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Cmd(cmd) => match cmd.kind() {
                CmdKind::Custom => MsgType::Cmd,
                CmdKind::StartGraph { .. } => MsgType::StartGraph,
                CmdKind::StopGraph => MsgType::StopGraph,
                CmdKind::CloseApp => MsgType::CloseApp,
                CmdKind::TriggerLifeCycle => MsgType::TriggerLifeCycle,
                CmdKind::Timer { .. } => MsgType::Timer,
                CmdKind::Timeout { .. } => MsgType::Timeout,
            },
            Self::CmdResult(_) => MsgType::CmdResult,
            Self::Data(_) => MsgType::Data,
            Self::AudioFrame(_) => MsgType::AudioFrame,
            Self::VideoFrame(_) => MsgType::VideoFrame,
        }
    }

    /// The message name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Cmd(m) => m.name(),
            Self::CmdResult(m) => m.name(),
            Self::Data(m) => m.name(),
            Self::AudioFrame(m) => m.name(),
            Self::VideoFrame(m) => m.name(),
        }
    }

    /// Source location.
    #[must_use]
    pub fn src(&self) -> &Loc {
        match self {
            Self::Cmd(m) => m.src(),
            Self::CmdResult(m) => m.src(),
            Self::Data(m) => m.src(),
            Self::AudioFrame(m) => m.src(),
            Self::VideoFrame(m) => m.src(),
        }
    }

    /// Overwrites the source location.
    pub fn set_src(&mut self, src: Loc) {
        match self {
            Self::Cmd(m) => m.set_src(src),
            Self::CmdResult(m) => m.set_src(src),
            Self::Data(m) => m.set_src(src),
            Self::AudioFrame(m) => m.set_src(src),
            Self::VideoFrame(m) => m.set_src(src),
        }
    }

    /// Destination locations.
    #[must_use]
    pub fn dests(&self) -> &[Loc] {
        match self {
            Self::Cmd(m) => m.dests(),
            Self::CmdResult(m) => m.dests(),
            Self::Data(m) => m.dests(),
            Self::AudioFrame(m) => m.dests(),
            Self::VideoFrame(m) => m.dests(),
        }
    }

    /// Replaces the destinations with a single location.
    pub fn set_dest(&mut self, dest: Loc) {
        match self {
            Self::Cmd(m) => m.set_dest(dest),
            Self::CmdResult(m) => m.set_dest(dest),
            Self::Data(m) => m.set_dest(dest),
            Self::AudioFrame(m) => m.set_dest(dest),
            Self::VideoFrame(m) => m.set_dest(dest),
        }
    }

    /// Returns `true` for command messages (of any kind).
    #[must_use]
    pub fn is_cmd(&self) -> bool {
        matches!(self, Self::Cmd(_))
    }
}

impl From<Cmd> for Msg {
    fn from(cmd: Cmd) -> Self {
        Self::Cmd(cmd)
    }
}

impl From<CmdResult> for Msg {
    fn from(result: CmdResult) -> Self {
        Self::CmdResult(result)
    }
}

impl From<Data> for Msg {
    fn from(data: Data) -> Self {
        Self::Data(data)
    }
}

impl From<AudioFrame> for Msg {
    fn from(frame: AudioFrame) -> Self {
        Self::AudioFrame(frame)
    }
}

impl From<VideoFrame> for Msg {
    fn from(frame: VideoFrame) -> Self {
        Self::VideoFrame(frame)
    }
}
