//! Engines.
//!
//! One engine runs one graph. It owns the graph's extension threads,
//! the connection table that routes messages between extensions, and
//! the outstanding-command tracker for external (client) commands,
//! including the timeout sweep that synthesizes `Timeout` results.
//!
//! The engine's home thread is an OS thread spawned per graph; every
//! entry point below runs as a task on its runloop.
//!
//! # Engine ↔ extension-thread protocol
//!
//! | Task | Direction | Purpose |
//! |------|-----------|---------|
//! | `on_extensions_created` | thread → engine | resolve routing, then start lifecycles |
//! | `on_extension_create_failed` | thread → engine | fail the graph start, close |
//! | `on_extension_thread_closed` | thread → engine | join the OS thread |
//! | `dispatch_msg` | engine → thread | deliver one routed message |
//! | `start_life_cycle_of_all_extensions` | engine → thread | enter Normal |

use crate::addon::AddonStore;
use crate::affinity::{integrity_violation, ThreadAffinity};
use crate::app::{App, AppHandle};
use crate::extension_thread::{ExtensionSpec, ExtensionThread};
use crate::runloop::{Runloop, RunloopHandle};
use crate::RuntimeError;
use plexus_msg::graph::{ConnectionDest, GraphDescription};
use plexus_msg::{Cmd, CmdKind, CmdResult, Msg};
use plexus_types::{CmdId, GraphId, Loc, StatusCode};
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tunables an engine inherits from its app.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window after which an outstanding client command is answered
    /// with a synthesized `Timeout` result.
    pub cmd_timeout: Duration,
    /// Idle interval of the timeout sweep.
    pub tick_interval: Duration,
}

/// Cloneable posting handle to an engine, carrying the routing
/// identity extension environments stamp onto outgoing messages.
#[derive(Clone)]
pub struct EngineHandle {
    runloop: RunloopHandle<Engine>,
    pub graph_id: GraphId,
    pub app_uri: String,
}

impl EngineHandle {
    /// Posts a task onto the engine's runloop.
    pub fn post_task(
        &self,
        task: impl FnOnce(&mut Engine) + Send + 'static,
    ) -> Result<(), RuntimeError> {
        self.runloop.post_task_tail(task)
    }

    /// Hands a message to the engine's router.
    pub fn post_msg(&self, msg: Msg) -> Result<(), RuntimeError> {
        self.post_task(move |engine: &mut Engine| engine.route_msg(msg))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FlowKind {
    Cmd,
    Data,
    AudioFrame,
    VideoFrame,
}

struct ThreadRecord {
    group: String,
    handle: RunloopHandle<ExtensionThread>,
    join: Option<JoinHandle<()>>,
    closed: bool,
    extensions: Vec<String>,
}

struct ClientPath {
    cmd_name: String,
    reply: Sender<CmdResult>,
    deadline: Instant,
}

/// Result collector for a command fanned out to several destinations:
/// the sender still sees exactly one ultimate result (first non-Ok
/// wins, else the last Ok).
struct PathGroup {
    remaining: usize,
    merged: Option<CmdResult>,
}

/// The per-graph runtime object. Owned by its engine thread.
pub struct Engine {
    graph_id: GraphId,
    app_uri: String,
    affinity: ThreadAffinity,
    app: AppHandle,
    addon_store: Arc<AddonStore>,
    config: EngineConfig,
    threads: Vec<ThreadRecord>,
    ext_index: HashMap<String, usize>,
    connections: HashMap<(String, FlowKind, String), Vec<ConnectionDest>>,
    client_paths: HashMap<CmdId, ClientPath>,
    path_groups: HashMap<CmdId, PathGroup>,
    pending_established: usize,
    start_reported: bool,
    is_close_triggered: bool,
    self_handle: Option<RunloopHandle<Engine>>,
}

impl Engine {
    /// Spawns the engine thread for one graph and blocks until its
    /// runloop accepts posts. The extension threads are spawned from
    /// the engine thread before it starts serving tasks.
    pub fn spawn(
        app: AppHandle,
        graph_id: GraphId,
        graph: GraphDescription,
        addon_store: Arc<AddonStore>,
        config: EngineConfig,
    ) -> std::io::Result<(EngineHandle, JoinHandle<()>)> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name(format!("engine-{graph_id}"))
            .spawn(move || {
                Engine::main(app, graph_id, graph, addon_store, config, ready_tx);
            })?;

        match ready_rx.recv() {
            Ok(handle) => Ok((handle, join)),
            Err(_) => integrity_violation("engine thread died before signalling ready"),
        }
    }

    fn main(
        app: AppHandle,
        graph_id: GraphId,
        graph: GraphDescription,
        addon_store: Arc<AddonStore>,
        config: EngineConfig,
        ready_tx: Sender<EngineHandle>,
    ) {
        info!(%graph_id, "engine thread started");

        let app_uri = app.uri.clone();
        let mut engine = Engine {
            graph_id,
            app_uri: app_uri.clone(),
            affinity: ThreadAffinity::new(),
            app,
            addon_store,
            config,
            threads: Vec::new(),
            ext_index: HashMap::new(),
            connections: HashMap::new(),
            client_paths: HashMap::new(),
            path_groups: HashMap::new(),
            pending_established: 0,
            start_reported: false,
            is_close_triggered: false,
            self_handle: None,
        };
        engine.affinity.latch_to_current();

        let runloop = Runloop::new();
        let self_handle = runloop.handle();
        engine.self_handle = Some(self_handle.clone());
        let handle = EngineHandle {
            runloop: self_handle,
            graph_id,
            app_uri,
        };

        engine.build_connection_table(&graph);
        engine.spawn_extension_threads(&graph, &handle);

        if ready_tx.send(handle).is_err() {
            warn!(%graph_id, "app gone before engine became ready");
            return;
        }

        if engine.pending_established == 0 {
            // A graph with no local nodes is established immediately.
            engine.report_established();
        }

        let tick = engine.config.tick_interval;
        runloop.run_with_tick(&mut engine, tick, |e| e.sweep_timeouts());
        info!(%graph_id, "engine thread exited");
    }

    fn build_connection_table(&mut self, graph: &GraphDescription) {
        for conn in &graph.connections {
            if conn.app.as_deref().is_some_and(|uri| uri != self.app_uri) {
                // Rules whose source lives in another app are that
                // app's business.
                continue;
            }
            let src = conn.extension.clone();
            let flows = [
                (FlowKind::Cmd, &conn.cmd),
                (FlowKind::Data, &conn.data),
                (FlowKind::AudioFrame, &conn.audio_frame),
                (FlowKind::VideoFrame, &conn.video_frame),
            ];
            for (kind, rules) in flows {
                for rule in rules {
                    self.connections
                        .insert((src.clone(), kind, rule.name.clone()), rule.dest.clone());
                }
            }
        }
    }

    fn spawn_extension_threads(&mut self, graph: &GraphDescription, handle: &EngineHandle) {
        for (group, nodes) in graph.nodes_by_group() {
            let specs: Vec<ExtensionSpec> = nodes
                .iter()
                .filter(|node| node.app.as_deref().is_none_or(|uri| uri == self.app_uri))
                .map(|node| ExtensionSpec::from_node(node))
                .collect();
            if specs.is_empty() {
                continue;
            }

            let thread = ExtensionThread::new(
                handle.clone(),
                group.clone(),
                specs,
                Arc::clone(&self.addon_store),
            );
            match thread.start() {
                Ok((thread_handle, join)) => {
                    self.threads.push(ThreadRecord {
                        group,
                        handle: thread_handle,
                        join: Some(join),
                        closed: false,
                        extensions: Vec::new(),
                    });
                    self.pending_established += 1;
                }
                Err(err) => {
                    error!(group = %group, %err, "failed to spawn extension thread");
                }
            }
        }
    }

    fn self_handle(&self) -> RunloopHandle<Engine> {
        match &self.self_handle {
            Some(handle) => handle.clone(),
            None => integrity_violation("engine used before its runloop existed"),
        }
    }

    /// An extension thread finished creating its instances: index them
    /// for routing and let the thread start lifecycles.
    pub(crate) fn on_extensions_created(&mut self, group: String, extensions: Vec<String>) {
        self.affinity.assert_on_owner("on_extensions_created");
        let Some(idx) = self.threads.iter().position(|t| t.group == group) else {
            warn!(group = %group, "extensions created for unknown thread");
            return;
        };
        for name in &extensions {
            if self.ext_index.insert(name.clone(), idx).is_some() {
                warn!(extension = %name, "extension name collides across groups");
            }
        }
        self.threads[idx].extensions = extensions;

        let _ = self.threads[idx]
            .handle
            .post_task_tail(|t: &mut ExtensionThread| t.start_life_cycle_of_all_extensions());

        self.pending_established -= 1;
        if self.pending_established == 0 {
            self.report_established();
        }
    }

    fn report_established(&mut self) {
        if self.start_reported {
            return;
        }
        self.start_reported = true;
        info!(graph_id = %self.graph_id, "graph established");
        let graph_id = self.graph_id;
        let _ = self
            .app
            .post_task(move |app: &mut App| app.on_graph_established(graph_id));
    }

    /// An extension thread could not create all of its instances: the
    /// graph start fails and the engine closes.
    pub(crate) fn on_extension_create_failed(
        &mut self,
        group: String,
        failures: Vec<(String, String)>,
    ) {
        self.affinity.assert_on_owner("on_extension_create_failed");
        let detail = failures
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        error!(group = %group, detail = %detail, "graph start failed");

        if !self.start_reported {
            self.start_reported = true;
            let graph_id = self.graph_id;
            let report = detail.clone();
            let _ = self
                .app
                .post_task(move |app: &mut App| app.on_graph_failed(graph_id, report));
        }
        self.close();
    }

    /// Registers an external command: its result (or a synthesized
    /// timeout) lands on `reply`.
    pub(crate) fn submit_client_cmd(&mut self, cmd: Cmd, reply: Sender<CmdResult>) {
        self.affinity.assert_on_owner("submit_client_cmd");
        // Lifecycle triggers stay deliverable while closing: a close
        // may be waiting on exactly such a trigger to release a gated
        // stop stage.
        let is_trigger = matches!(cmd.kind(), CmdKind::TriggerLifeCycle);
        if self.is_close_triggered && !is_trigger {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Closed).with_detail("engine closing");
            let _ = reply.send(result);
            return;
        }
        self.client_paths.insert(
            cmd.id(),
            ClientPath {
                cmd_name: cmd.name().to_string(),
                reply,
                deadline: Instant::now() + self.config.cmd_timeout,
            },
        );
        self.route_msg(Msg::Cmd(cmd));
    }

    /// The router: every message entering the fabric passes through
    /// here on the engine thread.
    pub(crate) fn route_msg(&mut self, msg: Msg) {
        self.affinity.assert_on_owner("route_msg");
        match msg {
            Msg::CmdResult(result) => self.handle_result(result),
            Msg::Cmd(cmd) => self.route_cmd(cmd),
            flow => self.route_flow(flow),
        }
    }

    fn route_cmd(&mut self, cmd: Cmd) {
        let dests = if cmd.dests().is_empty() {
            match cmd.kind() {
                CmdKind::Custom => self.resolve_dests(
                    cmd.src().extension_name().unwrap_or_default(),
                    FlowKind::Cmd,
                    cmd.name(),
                ),
                _ => Vec::new(),
            }
        } else {
            cmd.dests().to_vec()
        };

        if dests.is_empty() {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail(format!("no destination for command {}", cmd.name()));
            self.handle_result(result);
            return;
        }

        if dests.len() > 1 {
            self.path_groups.insert(
                cmd.id(),
                PathGroup {
                    remaining: dests.len(),
                    merged: None,
                },
            );
        }

        for dest in dests {
            let mut clone = cmd.clone();
            clone.set_dest(dest.clone());
            self.forward_one(Msg::Cmd(clone), &dest);
        }
    }

    fn route_flow(&mut self, msg: Msg) {
        let kind = match &msg {
            Msg::Data(_) => FlowKind::Data,
            Msg::AudioFrame(_) => FlowKind::AudioFrame,
            Msg::VideoFrame(_) => FlowKind::VideoFrame,
            _ => return,
        };
        let dests = if msg.dests().is_empty() {
            self.resolve_dests(
                msg.src().extension_name().unwrap_or_default(),
                kind,
                msg.name(),
            )
        } else {
            msg.dests().to_vec()
        };

        if dests.is_empty() {
            warn!(name = msg.name(), "no destination for flow message; dropped");
            return;
        }

        for dest in dests {
            let mut clone = msg.clone();
            clone.set_dest(dest.clone());
            self.forward_one(clone, &dest);
        }
    }

    fn resolve_dests(&self, src_ext: &str, kind: FlowKind, name: &str) -> Vec<Loc> {
        let Some(rule_dests) =
            self.connections
                .get(&(src_ext.to_string(), kind, name.to_string()))
        else {
            return Vec::new();
        };
        rule_dests
            .iter()
            .map(|dest| match dest.app.as_deref() {
                None => Loc::extension(self.app_uri.clone(), self.graph_id, &dest.extension),
                Some(uri) if uri == self.app_uri => {
                    Loc::extension(self.app_uri.clone(), self.graph_id, &dest.extension)
                }
                Some(uri) => Loc {
                    app_uri: Some(uri.to_string()),
                    graph_id: None,
                    extension: Some(dest.extension.clone()),
                },
            })
            .collect()
    }

    fn forward_one(&mut self, msg: Msg, dest: &Loc) {
        // Cross-app: hand to the app's wire seam.
        if dest.app_uri.as_deref().is_some_and(|uri| uri != self.app_uri) {
            let _ = self
                .app
                .post_task(move |app: &mut App| app.forward_remote(msg));
            return;
        }
        // Cross-graph within this app: the app routes between engines.
        if dest.graph_id.is_some_and(|g| g != self.graph_id) {
            let _ = self.app.post_task(move |app: &mut App| app.deliver(msg));
            return;
        }

        let Some(ext) = dest.extension.as_deref() else {
            self.reject_undeliverable(msg, "destination names no extension");
            return;
        };
        let idx = self.ext_index.get(ext).copied();
        let Some(idx) = idx else {
            self.reject_undeliverable(msg, "extension not found in graph");
            return;
        };
        if self.threads[idx]
            .handle
            .post_task_tail(move |t: &mut ExtensionThread| t.dispatch_msg(msg))
            .is_err()
        {
            warn!(extension = ext, "extension thread gone; message dropped");
        }
    }

    fn reject_undeliverable(&mut self, msg: Msg, reason: &str) {
        match msg {
            Msg::Cmd(cmd) => {
                debug!(name = cmd.name(), reason, "command undeliverable");
                let result =
                    CmdResult::from_cmd(&cmd, StatusCode::RouteFailed).with_detail(reason);
                self.handle_result(result);
            }
            other => {
                warn!(name = other.name(), reason, "message undeliverable; dropped");
            }
        }
    }

    /// Result delivery, including fan-out merging: a grouped command's
    /// sender sees exactly one ultimate result.
    fn handle_result(&mut self, result: CmdResult) {
        let id = result.original_cmd_id();
        if let Some(group) = self.path_groups.get_mut(&id) {
            group.remaining -= 1;
            let replace = match &group.merged {
                None => true,
                Some(held) => held.is_ok() && !result.is_ok(),
            };
            if replace {
                group.merged = Some(result);
            }
            if group.remaining > 0 {
                return;
            }
            let Some(group) = self.path_groups.remove(&id) else {
                return;
            };
            let Some(merged) = group.merged else {
                return;
            };
            self.deliver_result(merged);
            return;
        }
        self.deliver_result(result);
    }

    fn deliver_result(&mut self, result: CmdResult) {
        let Some(dest) = result.dests().first().cloned() else {
            warn!(name = result.name(), "result without destination; dropped");
            return;
        };

        if dest.app_uri.as_deref().is_some_and(|uri| uri != self.app_uri) {
            let msg = Msg::CmdResult(result);
            let _ = self
                .app
                .post_task(move |app: &mut App| app.forward_remote(msg));
            return;
        }
        if dest.graph_id.is_some_and(|g| g != self.graph_id) {
            let msg = Msg::CmdResult(result);
            let _ = self.app.post_task(move |app: &mut App| app.deliver(msg));
            return;
        }

        if let Some(ext) = dest.extension.as_deref() {
            let Some(&idx) = self.ext_index.get(ext) else {
                warn!(extension = ext, "result for unknown extension; dropped");
                return;
            };
            let msg = Msg::CmdResult(result);
            let _ = self.threads[idx]
                .handle
                .post_task_tail(move |t: &mut ExtensionThread| t.dispatch_msg(msg));
            return;
        }

        // No extension in the destination: an external client.
        match self.client_paths.remove(&result.original_cmd_id()) {
            Some(path) => {
                let _ = path.reply.send(result);
            }
            None => {
                debug!(
                    cmd_id = %result.original_cmd_id(),
                    "result for unknown client path (late or already timed out)"
                );
            }
        }
    }

    /// Idle-tick sweep: outstanding client commands past their
    /// deadline get a synthesized `Timeout` result.
    pub(crate) fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<CmdId> = self
            .client_paths
            .iter()
            .filter(|(_, path)| path.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            let Some(path) = self.client_paths.remove(&id) else {
                continue;
            };
            warn!(cmd = %path.cmd_name, %id, "client command timed out");
            let result =
                CmdResult::synthesized(path.cmd_name, id, Loc::empty(), StatusCode::Timeout)
                    .with_detail("no result within the configured window");
            let _ = path.reply.send(result);
        }
    }

    /// Closes the graph: every extension thread is asked to close; the
    /// engine finishes once they have all reported back and been
    /// joined.
    pub(crate) fn close(&mut self) {
        self.affinity.assert_on_owner("engine close");
        if self.is_close_triggered {
            return;
        }
        self.is_close_triggered = true;
        info!(graph_id = %self.graph_id, "engine closing");

        if self.threads.is_empty() {
            self.finish_close();
            return;
        }
        for record in &self.threads {
            if !record.closed {
                let _ = ExtensionThread::close(&record.handle);
            }
        }
    }

    /// An extension thread has left its runloop: join the OS thread so
    /// nothing leaks.
    pub(crate) fn on_extension_thread_closed(&mut self, group: String) {
        self.affinity.assert_on_owner("on_extension_thread_closed");
        let Some(record) = self.threads.iter_mut().find(|t| t.group == group) else {
            warn!(group = %group, "closed notification for unknown thread");
            return;
        };
        if let Some(join) = record.join.take() {
            if join.join().is_err() {
                error!(group = %record.group, "extension thread panicked");
            }
        }
        record.closed = true;
        debug!(group = %record.group, "extension thread joined");

        if self.is_close_triggered && self.threads.iter().all(|t| t.closed) {
            self.finish_close();
        }
    }

    fn finish_close(&mut self) {
        // Whoever is still waiting hears Closed rather than nothing.
        for (id, path) in self.client_paths.drain() {
            let result = CmdResult::synthesized(path.cmd_name, id, Loc::empty(), StatusCode::Closed)
                .with_detail("engine closed");
            let _ = path.reply.send(result);
        }

        info!(graph_id = %self.graph_id, "engine closed");
        let graph_id = self.graph_id;
        let _ = self
            .app
            .post_task(move |app: &mut App| app.on_engine_closed(graph_id));
        let _ = self.self_handle().stop();
    }
}
