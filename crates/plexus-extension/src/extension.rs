//! The Extension trait and its environment.

use crate::ExtensionError;
use plexus_msg::{AudioFrame, Cmd, CmdResult, Data, VideoFrame};
use plexus_types::{LogLevel, Stage, StatusCode};

/// Callback invoked on the sending extension's thread when the result
/// of an outstanding command arrives (or is cancelled at close-down
/// with a `Closed` status).
pub type ResultHandler = Box<dyn FnOnce(&mut dyn ExtensionEnv, CmdResult) + Send>;

/// The capability handle an extension uses to interact with the
/// runtime.
///
/// A fresh `ExtensionEnv` is lent to the extension for the duration of
/// each callback; it is only valid on the extension's home thread.
/// Logging is the one thread-free operation — it forwards straight to
/// `tracing`.
pub trait ExtensionEnv {
    /// The extension's own name (unique within its group).
    fn extension_name(&self) -> &str;

    /// Emits a log line attributed to this extension.
    fn log(&self, level: LogLevel, message: &str);

    /// Sends a command into the routing fabric.
    ///
    /// The runtime stamps the source location. Destinations left empty
    /// are resolved against the graph's connection list. When
    /// `on_result` is given it is registered in the extension's path
    /// table and invoked exactly once on this thread — with the real
    /// result, a synthesized `Timeout`, or a `Closed` cancellation at
    /// stop.
    fn send_cmd(&mut self, cmd: Cmd, on_result: Option<ResultHandler>)
        -> Result<(), ExtensionError>;

    /// Sends a data message. Data has no result.
    fn send_data(&mut self, data: Data) -> Result<(), ExtensionError>;

    /// Sends an audio frame. Frames have no result.
    fn send_audio_frame(&mut self, frame: AudioFrame) -> Result<(), ExtensionError>;

    /// Sends a video frame. Frames have no result.
    fn send_video_frame(&mut self, frame: VideoFrame) -> Result<(), ExtensionError>;

    /// Returns a result for a command this extension received. The
    /// result is delivered on the original sender's home thread.
    fn return_result(&mut self, result: CmdResult) -> Result<(), ExtensionError>;

    /// Acknowledges `on_configure`.
    fn on_configure_done(&mut self);

    /// Acknowledges `on_init`.
    fn on_init_done(&mut self);

    /// Acknowledges `on_start`. Messages queued before the start
    /// transition are flushed after this call.
    fn on_start_done(&mut self);

    /// Acknowledges `on_stop`. Outstanding path-table entries are
    /// cancelled with `Closed` results after this call.
    fn on_stop_done(&mut self);

    /// Acknowledges `on_deinit`. Teardown proceeds once every
    /// environment proxy for this extension has been released.
    fn on_deinit_done(&mut self);

    /// Reports a failed lifecycle stage. The extension does not
    /// advance; configure/init failures keep it out of the running
    /// graph.
    fn on_stage_error(&mut self, stage: Stage, error: ExtensionError);

    /// Mints a thread-safe proxy for this environment, for handing to
    /// helper threads. See [`EnvProxyHandle`](crate::EnvProxyHandle).
    fn create_proxy(&mut self) -> crate::EnvProxyHandle;
}

/// A user-written dataflow node.
///
/// All callbacks run serially on the extension's home thread. Default
/// lifecycle implementations acknowledge immediately; the default
/// `on_cmd` answers with a `NotSupported` error result so an unhandled
/// command never strands its sender.
#[allow(unused_variables)]
pub trait Extension: Send {
    /// First lifecycle stage, before properties are trusted.
    fn on_configure(&mut self, env: &mut dyn ExtensionEnv) {
        env.on_configure_done();
    }

    /// Second stage: acquire resources.
    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        env.on_init_done();
    }

    /// The extension is about to go live. May be gated on an external
    /// trigger (see the graph's `manual_trigger_life_cycle` property).
    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        env.on_start_done();
    }

    /// The extension is being taken out of service. May be gated on an
    /// external trigger.
    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        env.on_stop_done();
    }

    /// Last stage before the instance is returned to its addon.
    fn on_deinit(&mut self, env: &mut dyn ExtensionEnv) {
        env.on_deinit_done();
    }

    /// Handles an inbound command. Exactly one result must eventually
    /// be returned for it (possibly from a later callback).
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let detail = format!("operation not supported: {}", cmd.name());
        let result = CmdResult::from_cmd(&cmd, StatusCode::Error).with_detail(detail);
        if let Err(err) = env.return_result(result) {
            tracing::warn!(
                extension = env.extension_name(),
                error = %err,
                "failed to return default error result"
            );
        }
    }

    /// Handles an inbound data message.
    fn on_data(&mut self, env: &mut dyn ExtensionEnv, data: Data) {}

    /// Handles an inbound audio frame.
    fn on_audio_frame(&mut self, env: &mut dyn ExtensionEnv, frame: AudioFrame) {}

    /// Handles an inbound video frame.
    fn on_video_frame(&mut self, env: &mut dyn ExtensionEnv, frame: VideoFrame) {}
}
