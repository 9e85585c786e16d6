//! The extension-attached environment handle.

use super::{ExtensionThread, LifecycleEvent};
use crate::engine::EngineHandle;
use crate::env::EnvAttachTo;
use crate::path_table::PathTable;
use crate::runloop::RunloopHandle;
use plexus_extension::{
    EnvProxyHandle, EnvTask, ExtensionEnv, ExtensionError, ResultHandler,
};
use plexus_msg::{AudioFrame, Cmd, CmdResult, Data, Msg, VideoFrame};
use plexus_types::{LogLevel, Loc, Stage};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// The environment lent to an extension for the duration of one
/// callback on its home thread.
///
/// Sends funnel through the engine's router; lifecycle
/// acknowledgements are collected and processed by the thread after
/// the callback returns, which keeps callbacks non-reentrant.
pub struct ExtEnv<'a> {
    name: &'a str,
    engine: &'a EngineHandle,
    thread: &'a RunloopHandle<ExtensionThread>,
    path_table: &'a mut PathTable,
    env_refs: &'a Arc<AtomicUsize>,
    events: &'a mut Vec<LifecycleEvent>,
}

impl<'a> ExtEnv<'a> {
    pub(crate) fn new(
        name: &'a str,
        engine: &'a EngineHandle,
        thread: &'a RunloopHandle<ExtensionThread>,
        path_table: &'a mut PathTable,
        env_refs: &'a Arc<AtomicUsize>,
        events: &'a mut Vec<LifecycleEvent>,
    ) -> Self {
        Self {
            name,
            engine,
            thread,
            path_table,
            env_refs,
            events,
        }
    }

    fn own_loc(&self) -> Loc {
        Loc::extension(self.engine.app_uri.clone(), self.engine.graph_id, self.name)
    }

    fn post(&self, msg: Msg) -> Result<(), ExtensionError> {
        self.engine.post_msg(msg).map_err(|_| ExtensionError::Closed)
    }
}

impl ExtensionEnv for ExtEnv<'_> {
    fn extension_name(&self) -> &str {
        self.name
    }

    fn log(&self, level: LogLevel, message: &str) {
        // Logging is thread-free; everything else on the env asserts
        // its home thread by construction.
        match level {
            LogLevel::Verbose => {
                tracing::trace!(extension = self.name, attached = EnvAttachTo::Extension.as_str(), severity = %level, "{message}");
            }
            LogLevel::Debug => {
                tracing::debug!(extension = self.name, attached = EnvAttachTo::Extension.as_str(), severity = %level, "{message}");
            }
            LogLevel::Info | LogLevel::Mandatory => {
                tracing::info!(extension = self.name, attached = EnvAttachTo::Extension.as_str(), severity = %level, "{message}");
            }
            LogLevel::Warn => {
                tracing::warn!(extension = self.name, attached = EnvAttachTo::Extension.as_str(), severity = %level, "{message}");
            }
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(extension = self.name, attached = EnvAttachTo::Extension.as_str(), severity = %level, "{message}");
            }
        }
    }

    fn send_cmd(
        &mut self,
        mut cmd: Cmd,
        on_result: Option<ResultHandler>,
    ) -> Result<(), ExtensionError> {
        cmd.set_src(self.own_loc());
        if let Some(handler) = on_result {
            let cmd_name = cmd.name().to_string();
            self.path_table.register(cmd.id(), cmd_name, handler);
        }
        self.post(Msg::Cmd(cmd))
    }

    fn send_data(&mut self, mut data: Data) -> Result<(), ExtensionError> {
        data.set_src(self.own_loc());
        self.post(Msg::Data(data))
    }

    fn send_audio_frame(&mut self, mut frame: AudioFrame) -> Result<(), ExtensionError> {
        frame.set_src(self.own_loc());
        self.post(Msg::AudioFrame(frame))
    }

    fn send_video_frame(&mut self, mut frame: VideoFrame) -> Result<(), ExtensionError> {
        frame.set_src(self.own_loc());
        self.post(Msg::VideoFrame(frame))
    }

    fn return_result(&mut self, mut result: CmdResult) -> Result<(), ExtensionError> {
        result.set_src(self.own_loc());
        self.post(Msg::CmdResult(result))
    }

    fn on_configure_done(&mut self) {
        self.events.push(LifecycleEvent::StageDone(Stage::Configure));
    }

    fn on_init_done(&mut self) {
        self.events.push(LifecycleEvent::StageDone(Stage::Init));
    }

    fn on_start_done(&mut self) {
        self.events.push(LifecycleEvent::StageDone(Stage::Start));
    }

    fn on_stop_done(&mut self) {
        self.events.push(LifecycleEvent::StageDone(Stage::Stop));
    }

    fn on_deinit_done(&mut self) {
        self.events.push(LifecycleEvent::StageDone(Stage::Deinit));
    }

    fn on_stage_error(&mut self, stage: Stage, error: ExtensionError) {
        self.events.push(LifecycleEvent::StageError(stage, error));
    }

    fn create_proxy(&mut self) -> EnvProxyHandle {
        let post_thread = self.thread.clone();
        let post_name = self.name.to_string();
        let release_thread = self.thread.clone();
        let release_name = self.name.to_string();

        EnvProxyHandle::new(
            move |task: EnvTask| {
                let name = post_name.clone();
                post_thread
                    .post_task_tail(move |t: &mut ExtensionThread| t.run_env_task(&name, task))
                    .map_err(|_| ExtensionError::Closed)
            },
            move || {
                let name = release_name.clone();
                let _ = release_thread
                    .post_task_tail(move |t: &mut ExtensionThread| t.maybe_finish_deinit(&name));
            },
            Arc::clone(self.env_refs),
        )
    }
}
