//! Per-extension lifecycle driving.
//!
//! Stage sequence, acknowledged through the environment:
//!
//! ```text
//! on_configure → configure_done → on_init → init_done
//!             → on_start → start_done → (running)
//!             → on_stop  → stop_done  → on_deinit → deinit_done
//! ```
//!
//! Callbacks may acknowledge later than the callback that entered the
//! stage, so acknowledgements are collected as [`LifecycleEvent`]s from
//! whichever callback produced them and processed once that callback
//! returns. Start and stop may additionally be gated on external
//! `TriggerLifeCycle` commands; a gated stage fires only when both the
//! lifecycle has reached it and the trigger has been seen.

use super::{ExtEnv, ExtensionHost, ExtensionThread, HostStage};
use plexus_extension::{EnvTask, Extension, ExtensionError};
use plexus_msg::{Cmd, CmdResult};
use plexus_types::{Stage, StatusCode};
use std::sync::atomic::Ordering;
use tracing::{debug, error, warn};

/// Acknowledgement produced by an extension callback through its env.
pub(crate) enum LifecycleEvent {
    StageDone(Stage),
    StageError(Stage, ExtensionError),
}

impl ExtensionThread {
    /// Lends the extension its environment for one callback, then
    /// processes whatever lifecycle acknowledgements the callback
    /// produced.
    pub(crate) fn with_extension_env<F>(&mut self, name: &str, f: F)
    where
        F: FnOnce(&mut dyn Extension, &mut ExtEnv<'_>),
    {
        let engine = self.engine_handle();
        let thread_handle = self.self_handle();

        let mut events = Vec::new();
        {
            let Some(host) = self.store.get_mut(name) else {
                warn!(extension = name, "callback for unknown extension; dropping");
                return;
            };
            let ExtensionHost {
                name: host_name,
                extension,
                path_table,
                env_refs,
                ..
            } = host;
            let Some(extension) = extension.as_mut() else {
                warn!(extension = name, "callback after instance was taken; dropping");
                return;
            };
            let mut env = ExtEnv::new(
                host_name,
                &engine,
                &thread_handle,
                path_table,
                env_refs,
                &mut events,
            );
            f(&mut **extension, &mut env);
        }
        self.process_lifecycle_events(name, events);
    }

    /// Runs a proxied task with the extension's environment.
    pub(crate) fn run_env_task(&mut self, name: &str, task: EnvTask) {
        self.with_extension_env(name, |_extension, env| task(env));
    }

    fn process_lifecycle_events(&mut self, name: &str, events: Vec<LifecycleEvent>) {
        for event in events {
            match event {
                LifecycleEvent::StageDone(Stage::Configure) => self.on_extension_configure_done(name),
                LifecycleEvent::StageDone(Stage::Init) => self.on_extension_init_done(name),
                LifecycleEvent::StageDone(Stage::Start) => self.on_extension_start_done(name),
                LifecycleEvent::StageDone(Stage::Stop) => self.on_extension_stop_done(name),
                LifecycleEvent::StageDone(Stage::Deinit) => self.on_extension_deinit_done(name),
                LifecycleEvent::StageError(stage, err) => self.on_extension_stage_error(name, stage, err),
            }
        }
    }

    /// Entry point of an extension's lifecycle: load its metadata
    /// (properties from the graph node) and invoke `on_configure`.
    pub(crate) fn begin_configure(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        debug_assert_eq!(host.stage, HostStage::Created);
        host.stage = HostStage::Configuring;
        self.with_extension_env(name, |extension, env| extension.on_configure(env));
    }

    fn on_extension_configure_done(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage != HostStage::Configuring {
            warn!(extension = name, stage = ?host.stage, "stray configure_done");
            return;
        }
        if host.stop_requested {
            // Close raced configure; it never entered init, so no
            // deinit is owed.
            host.stage = HostStage::Deinited;
            self.check_all_extensions_deinited();
            return;
        }
        host.stage = HostStage::Initing;
        host.entered_init = true;
        self.with_extension_env(name, |extension, env| extension.on_init(env));
    }

    fn on_extension_init_done(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage != HostStage::Initing {
            warn!(extension = name, stage = ?host.stage, "stray init_done");
            return;
        }
        if host.stop_requested {
            self.begin_deinit(name);
            return;
        }
        if host.manual_start && host.start_trigger.is_none() {
            debug!(extension = name, "start gated on manual trigger");
            host.stage = HostStage::WaitingStartTrigger;
            // The extension is reachable while it waits; flush what
            // queued up during configure/init so it can answer for
            // itself.
            self.flush_host_pending(name);
            return;
        }
        self.begin_start(name);
    }

    pub(crate) fn begin_start(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        host.stage = HostStage::Starting;
        self.with_extension_env(name, |extension, env| extension.on_start(env));
    }

    fn on_extension_start_done(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage != HostStage::Starting {
            warn!(extension = name, stage = ?host.stage, "stray start_done");
            return;
        }
        host.stage = HostStage::Running;
        if let Some(trigger) = host.start_trigger.take() {
            let result = CmdResult::from_cmd(&trigger, StatusCode::Ok)
                .with_detail(format!("stage start completed for {name}"));
            self.post_result_to_engine(result);
        }
        self.flush_host_pending(name);

        // A close may have raced the start.
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stop_requested {
            host.stop_requested = false;
            self.request_stop(name);
        }
    }

    /// Asks one extension to leave service, honoring where it is in
    /// its lifecycle.
    pub(crate) fn request_stop(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        match host.stage {
            HostStage::Created => {
                // Never configured; nothing to unwind.
                host.stage = HostStage::Deinited;
                self.check_all_extensions_deinited();
            }
            HostStage::Configuring | HostStage::Initing | HostStage::Starting => {
                // Mid-stage; the pending acknowledgement diverts into
                // teardown.
                host.stop_requested = true;
            }
            HostStage::WaitingStartTrigger => {
                if let Some(trigger) = host.start_trigger.take() {
                    let result = CmdResult::from_cmd(&trigger, StatusCode::Closed)
                        .with_detail("extension is stopping");
                    self.post_result_to_engine(result);
                }
                self.begin_deinit(name);
            }
            HostStage::Running => {
                if host.manual_stop && host.stop_trigger.is_none() {
                    debug!(extension = name, "stop gated on manual trigger");
                    host.stage = HostStage::WaitingStopTrigger;
                    return;
                }
                self.begin_stop(name);
            }
            HostStage::Failed => {
                if host.entered_init {
                    self.begin_deinit(name);
                } else {
                    host.stage = HostStage::Deinited;
                    self.check_all_extensions_deinited();
                }
            }
            HostStage::WaitingStopTrigger
            | HostStage::Stopping
            | HostStage::Deiniting
            | HostStage::WaitingProxyRelease
            | HostStage::Deinited => {}
        }
    }

    pub(crate) fn begin_stop(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        host.stage = HostStage::Stopping;
        self.with_extension_env(name, |extension, env| extension.on_stop(env));
    }

    fn on_extension_stop_done(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage != HostStage::Stopping {
            warn!(extension = name, stage = ?host.stage, "stray stop_done");
            return;
        }

        // Outstanding commands never vanish silently: cancel each with
        // a Closed result before deinit.
        let cancelled = host.path_table.cancel_all();
        if let Some(trigger) = host.stop_trigger.take() {
            let result = CmdResult::from_cmd(&trigger, StatusCode::Ok)
                .with_detail(format!("stage stop completed for {name}"));
            self.post_result_to_engine(result);
        }
        for (cmd_id, in_path) in cancelled {
            let own_loc = self.extension_loc(name);
            self.with_extension_env(name, move |_extension, env| {
                let result = CmdResult::synthesized(
                    in_path.cmd_name,
                    cmd_id,
                    own_loc,
                    StatusCode::Closed,
                );
                (in_path.handler)(env, result);
            });
        }

        self.begin_deinit(name);
    }

    pub(crate) fn begin_deinit(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        host.stage = HostStage::Deiniting;
        self.with_extension_env(name, |extension, env| extension.on_deinit(env));
    }

    fn on_extension_deinit_done(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage != HostStage::Deiniting {
            warn!(extension = name, stage = ?host.stage, "stray deinit_done");
            return;
        }
        if host.env_refs.load(Ordering::SeqCst) > 1 {
            // Asynchronous callers still hold proxies; teardown waits
            // until the count returns to its initial 1. Proxy drops
            // nudge `maybe_finish_deinit`.
            debug!(
                extension = name,
                holders = host.env_refs.load(Ordering::SeqCst),
                "deinit deferred until proxies release"
            );
            host.stage = HostStage::WaitingProxyRelease;
            return;
        }
        host.stage = HostStage::Deinited;
        self.check_all_extensions_deinited();
    }

    /// Nudge from a dropping env proxy: finish a deferred deinit once
    /// the holder count is back to 1.
    pub(crate) fn maybe_finish_deinit(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        if host.stage == HostStage::WaitingProxyRelease
            && host.env_refs.load(Ordering::SeqCst) <= 1
        {
            host.stage = HostStage::Deinited;
            self.check_all_extensions_deinited();
        }
    }

    fn on_extension_stage_error(&mut self, name: &str, stage: Stage, err: ExtensionError) {
        error!(extension = name, %stage, error = %err, "lifecycle stage failed");
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        // The offending extension never advances past init.
        host.stage = HostStage::Failed;
    }

    /// Releases queued messages once the extension becomes reachable
    /// (start_done, or entry into a manual-start wait).
    pub(crate) fn flush_host_pending(&mut self, name: &str) {
        let Some(host) = self.store.get_mut(name) else {
            return;
        };
        let pending = std::mem::take(&mut host.pending);
        for msg in pending {
            self.dispatch_msg(msg);
        }
    }

    /// Handles a `TriggerLifeCycle` command addressed to one
    /// extension.
    pub(crate) fn handle_trigger(&mut self, cmd: Cmd) {
        let Some(dest_name) = cmd
            .dests()
            .first()
            .and_then(|loc| loc.extension.clone())
        else {
            warn!("trigger command without extension destination; dropping");
            return;
        };

        let Some(stage) = cmd.trigger_stage() else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail("unrecognized life cycle stage");
            self.post_result_to_engine(result);
            return;
        };

        if !self.store.contains_key(&dest_name) {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail(format!("extension {dest_name} not found in graph"));
            self.post_result_to_engine(result);
            return;
        }
        let Some(host) = self.store.get_mut(&dest_name) else {
            return;
        };

        match stage {
            Stage::Start => {
                if !host.manual_start {
                    let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                        .with_detail("stage start is not manually triggered");
                    self.post_result_to_engine(result);
                    return;
                }
                if host.start_trigger.is_some() {
                    let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                        .with_detail("duplicate start trigger");
                    self.post_result_to_engine(result);
                    return;
                }
                match host.stage {
                    HostStage::Created | HostStage::Configuring | HostStage::Initing => {
                        // Arrived early; fires when init completes.
                        host.start_trigger = Some(cmd);
                    }
                    HostStage::WaitingStartTrigger => {
                        host.start_trigger = Some(cmd);
                        self.begin_start(&dest_name);
                    }
                    _ => {
                        let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                            .with_detail("extension already started");
                        self.post_result_to_engine(result);
                    }
                }
            }
            Stage::Stop => {
                if !host.manual_stop {
                    let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                        .with_detail("stage stop is not manually triggered");
                    self.post_result_to_engine(result);
                    return;
                }
                if host.stop_trigger.is_some() {
                    let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                        .with_detail("duplicate stop trigger");
                    self.post_result_to_engine(result);
                    return;
                }
                match host.stage {
                    HostStage::WaitingStopTrigger => {
                        host.stop_trigger = Some(cmd);
                        self.begin_stop(&dest_name);
                    }
                    HostStage::Stopping
                    | HostStage::Deiniting
                    | HostStage::WaitingProxyRelease
                    | HostStage::Deinited => {
                        let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                            .with_detail("extension already stopping");
                        self.post_result_to_engine(result);
                    }
                    _ => {
                        // Arrived before the runtime reached the stop
                        // stage; fires when it does.
                        host.stop_trigger = Some(cmd);
                    }
                }
            }
            other => {
                let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                    .with_detail(format!("stage {other} cannot be triggered"));
                self.post_result_to_engine(result);
            }
        }
    }
}
