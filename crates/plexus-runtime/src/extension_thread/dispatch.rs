//! Inbound message dispatch at the extension-thread boundary.
//!
//! The engine posts one task per message; each task lands here. The
//! routing contract:
//!
//! - `Cmd`: dispatched to the destination extension's `on_cmd` if it
//!   exists in the store, else answered with a `RouteFailed` result.
//! - `CmdResult`: resolved against the destination extension's path
//!   table; the stored handler runs once and the entry is removed.
//! - `Data` / frames: dispatched to the typed handler; no result.
//!
//! Messages that arrive while the thread is still creating extensions
//! are held in the thread-level pending list; messages that arrive for
//! an extension that has not finished init are held per-extension.
//! Both queues flush FIFO. Results are exempt from queueing — they
//! answer the extension's own sends and must reach it at any stage.

use super::{ExtensionThread, HostStage, ThreadState};
use crate::engine::Engine;
use plexus_msg::{Cmd, CmdKind, CmdResult, Msg};
use plexus_types::{Loc, StatusCode};
use tracing::{debug, warn};

impl ExtensionThread {
    /// Entry point for every message the engine forwards to this
    /// thread. Exactly one destination is set by the engine before
    /// posting.
    pub(crate) fn dispatch_msg(&mut self, msg: Msg) {
        match self.state() {
            ThreadState::Init | ThreadState::CreatingExtensions => {
                self.pending_msg(msg);
            }
            ThreadState::Normal => self.route_to_extension(msg),
            ThreadState::PrepareToClose | ThreadState::Closed => {
                // A close may be parked on a gated stop stage; the
                // trigger that releases it must still get through.
                if let Msg::Cmd(cmd) = msg {
                    if matches!(cmd.kind(), CmdKind::TriggerLifeCycle) {
                        self.handle_trigger(cmd);
                        return;
                    }
                    self.cancel_held_msg(Msg::Cmd(cmd));
                    return;
                }
                if let Msg::CmdResult(result) = msg {
                    // Results still answer the extensions' own sends
                    // during stop.
                    self.dispatch_result(result);
                    return;
                }
                self.cancel_held_msg(msg);
            }
        }
    }

    fn pending_msg(&mut self, msg: Msg) {
        debug!(
            name = msg.name(),
            "message held; extensions still being created"
        );
        self.pending_msgs_received_in_init_stage.push_back(msg);
    }

    fn route_to_extension(&mut self, msg: Msg) {
        match msg {
            Msg::Cmd(cmd) => self.dispatch_cmd(cmd),
            Msg::CmdResult(result) => self.dispatch_result(result),
            Msg::Data(data) => {
                self.dispatch_flow(Msg::Data(data), |extension, env, m| {
                    if let Msg::Data(data) = m {
                        extension.on_data(env, data);
                    }
                });
            }
            Msg::AudioFrame(frame) => {
                self.dispatch_flow(Msg::AudioFrame(frame), |extension, env, m| {
                    if let Msg::AudioFrame(frame) = m {
                        extension.on_audio_frame(env, frame);
                    }
                });
            }
            Msg::VideoFrame(frame) => {
                self.dispatch_flow(Msg::VideoFrame(frame), |extension, env, m| {
                    if let Msg::VideoFrame(frame) = m {
                        extension.on_video_frame(env, frame);
                    }
                });
            }
        }
    }

    fn dispatch_cmd(&mut self, cmd: Cmd) {
        if matches!(cmd.kind(), CmdKind::TriggerLifeCycle) {
            self.handle_trigger(cmd);
            return;
        }

        let Some(dest_name) = dest_extension(cmd.dests()) else {
            warn!(name = cmd.name(), "command without extension destination; dropping");
            return;
        };

        let stage = self.store.get(&dest_name).map(|host| host.stage);
        let Some(stage) = stage else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail(format!("extension {dest_name} not found in graph"));
            self.post_result_to_engine(result);
            return;
        };

        if stage == HostStage::Failed {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail(format!("extension {dest_name} failed to initialize"));
            self.post_result_to_engine(result);
            return;
        }

        if pre_init(stage) {
            if let Some(host) = self.store.get_mut(&dest_name) {
                host.pending.push_back(Msg::Cmd(cmd));
            }
            return;
        }

        self.with_extension_env(&dest_name, move |extension, env| {
            extension.on_cmd(env, cmd);
        });
    }

    fn dispatch_result(&mut self, result: CmdResult) {
        let Some(dest_name) = dest_extension(result.dests()) else {
            warn!(name = result.name(), "result without extension destination; dropping");
            return;
        };

        let Some(host) = self.store.get_mut(&dest_name) else {
            warn!(
                extension = %dest_name,
                name = result.name(),
                "result for unknown extension; dropping"
            );
            return;
        };

        let Some(in_path) = host.path_table.resolve(result.original_cmd_id()) else {
            warn!(
                extension = %dest_name,
                cmd_id = %result.original_cmd_id(),
                "no path entry for result; dropping"
            );
            return;
        };

        self.with_extension_env(&dest_name, move |_extension, env| {
            (in_path.handler)(env, result);
        });
    }

    fn dispatch_flow<F>(&mut self, msg: Msg, deliver: F)
    where
        F: FnOnce(&mut dyn plexus_extension::Extension, &mut dyn plexus_extension::ExtensionEnv, Msg)
            + Send
            + 'static,
    {
        let Some(dest_name) = dest_extension(msg.dests()) else {
            warn!(name = msg.name(), "flow message without extension destination; dropping");
            return;
        };

        let Some(host) = self.store.get_mut(&dest_name) else {
            // Flow messages carry no result; a miss is logged only.
            warn!(
                extension = %dest_name,
                name = msg.name(),
                "flow message for unknown extension; dropping"
            );
            return;
        };

        if host.stage == HostStage::Failed {
            warn!(extension = %dest_name, "flow message for failed extension; dropping");
            return;
        }

        if pre_init(host.stage) {
            host.pending.push_back(msg);
            return;
        }

        self.with_extension_env(&dest_name, move |extension, env| {
            deliver(extension, env, msg);
        });
    }

    /// Cancels a message that can no longer be delivered: commands get
    /// a `Closed` result, everything else is dropped with a note.
    pub(crate) fn cancel_held_msg(&mut self, msg: Msg) {
        match msg {
            Msg::Cmd(cmd) => {
                let result = CmdResult::from_cmd(&cmd, StatusCode::Closed)
                    .with_detail("extension thread is closing");
                self.post_result_to_engine(result);
            }
            other => {
                debug!(name = other.name(), "undeliverable message dropped at close");
            }
        }
    }

    /// All outbound traffic funnels through the engine's router.
    pub(crate) fn post_result_to_engine(&self, result: CmdResult) {
        let engine = self.engine_handle();
        if engine
            .post_task(move |e: &mut Engine| e.route_msg(Msg::CmdResult(result)))
            .is_err()
        {
            warn!("engine runloop gone; result dropped");
        }
    }

    /// The routing location of one of this thread's extensions.
    pub(crate) fn extension_loc(&self, name: &str) -> Loc {
        let engine = self.engine_handle();
        Loc::extension(engine.app_uri.clone(), engine.graph_id, name)
    }
}

fn dest_extension(dests: &[Loc]) -> Option<String> {
    dests.first().and_then(|loc| loc.extension.clone())
}

/// Stages during which inbound traffic is parked per-extension.
fn pre_init(stage: HostStage) -> bool {
    matches!(
        stage,
        HostStage::Created | HostStage::Configuring | HostStage::Initing
    )
}
