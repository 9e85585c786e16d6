//! The app: top-level host.
//!
//! An app owns the addon registry, the main runloop and one engine per
//! running graph. Its client surface ([`AppClient`]) is how external
//! code (tests, embedders, bridges) submits commands and drives
//! graph lifecycles:
//!
//! ```text
//! AppClient ──StartGraph──▶ App ──spawn──▶ Engine ──spawn──▶ ExtensionThread
//!           ──Cmd────────▶ App ──────────▶ Engine (client path table)
//!           ──StopGraph──▶ App ──close───▶ Engine
//!           ──CloseApp───▶ App (closes engines, quiesces addon store)
//! ```
//!
//! Cross-app traffic terminates at the [`RemoteForwarder`] seam: the
//! embedder installs a forwarder together with its transport and
//! codec; without one, cross-app commands come back `RouteFailed`.

use crate::addon::AddonRegistry;
use crate::affinity::{integrity_violation, ThreadAffinity};
use crate::engine::{Engine, EngineConfig, EngineHandle};
use crate::runloop::{Runloop, RunloopHandle};
use crate::RuntimeError;
use plexus_msg::codec::CodecError;
use plexus_msg::graph::GraphDescription;
use plexus_msg::{Cmd, CmdKind, CmdResult, Msg};
use plexus_types::{GraphId, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// App configuration. Field units are milliseconds so the struct maps
/// one-to-one onto a property file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// This app's uri, stamped onto every local routing location.
    pub uri: String,
    /// Window for outstanding client commands before a `Timeout`
    /// result is synthesized.
    pub cmd_timeout_ms: u64,
    /// Idle interval of each engine's timeout sweep.
    pub engine_tick_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            uri: "plexus://app".into(),
            cmd_timeout_ms: 3_000,
            engine_tick_ms: 50,
        }
    }
}

impl AppConfig {
    fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    fn engine_tick(&self) -> Duration {
        Duration::from_millis(self.engine_tick_ms)
    }
}

/// Outbound seam for cross-app traffic. Implementations pair a
/// transport with a [`MsgCodec`](plexus_msg::codec::MsgCodec); the
/// core never encodes anything itself.
pub trait RemoteForwarder: Send {
    /// Ships a message toward the app named in its destination.
    fn forward(&mut self, msg: Msg) -> Result<(), CodecError>;
}

/// Cloneable posting handle to the app thread.
#[derive(Clone)]
pub struct AppHandle {
    pub(crate) runloop: RunloopHandle<App>,
    pub uri: String,
}

impl AppHandle {
    /// Posts a task onto the app's runloop.
    pub fn post_task(
        &self,
        task: impl FnOnce(&mut App) + Send + 'static,
    ) -> Result<(), RuntimeError> {
        self.runloop.post_task_tail(task)
    }
}

struct EngineRecord {
    handle: EngineHandle,
    join: Option<JoinHandle<()>>,
}

struct PendingGraphOp {
    cmd: Cmd,
    reply: Sender<CmdResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppState {
    Normal,
    Closing,
    Closed,
}

/// The top-level host. Owned by the app thread after
/// [`spawn`](App::spawn).
pub struct App {
    config: AppConfig,
    affinity: ThreadAffinity,
    registry: AddonRegistry,
    engines: HashMap<GraphId, EngineRecord>,
    pending_starts: HashMap<GraphId, PendingGraphOp>,
    pending_stops: HashMap<GraphId, PendingGraphOp>,
    close_reply: Option<PendingGraphOp>,
    remote: Option<Box<dyn RemoteForwarder>>,
    state: AppState,
    self_handle: Option<RunloopHandle<App>>,
}

/// Builder for an [`App`].
pub struct AppBuilder {
    config: AppConfig,
    registry: AddonRegistry,
    remote: Option<Box<dyn RemoteForwarder>>,
}

impl AppBuilder {
    /// Starts from default configuration and an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            registry: AddonRegistry::new(),
            remote: None,
        }
    }

    /// Sets the app uri.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Sets the outstanding-command timeout window.
    #[must_use]
    pub fn cmd_timeout(mut self, timeout: Duration) -> Self {
        self.config.cmd_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the cross-app forwarder.
    #[must_use]
    pub fn remote_forwarder(mut self, forwarder: Box<dyn RemoteForwarder>) -> Self {
        self.remote = Some(forwarder);
        self
    }

    /// The registry to populate with addons before building.
    #[must_use]
    pub fn registry(&self) -> &AddonRegistry {
        &self.registry
    }

    /// Assembles the app.
    #[must_use]
    pub fn build(self) -> App {
        App {
            config: self.config,
            affinity: ThreadAffinity::new(),
            registry: self.registry,
            engines: HashMap::new(),
            pending_starts: HashMap::new(),
            pending_stops: HashMap::new(),
            close_reply: None,
            remote: self.remote,
            state: AppState::Normal,
            self_handle: None,
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Starts building an app.
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Spawns the app thread and returns the client surface once the
    /// runloop accepts posts.
    pub fn spawn(self) -> std::io::Result<AppClient> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let uri = self.config.uri.clone();
        let default_timeout = self.config.cmd_timeout();
        let join = std::thread::Builder::new()
            .name("plexus-app".into())
            .spawn(move || self.main(ready_tx))?;

        match ready_rx.recv() {
            Ok(handle) => Ok(AppClient {
                handle: AppHandle {
                    runloop: handle,
                    uri: uri.clone(),
                },
                uri,
                default_timeout,
                join: Some(join),
            }),
            Err(_) => integrity_violation("app thread died before signalling ready"),
        }
    }

    fn main(mut self, ready_tx: Sender<RunloopHandle<App>>) {
        info!(uri = %self.config.uri, "app started");
        self.affinity.latch_to_current();

        let runloop = Runloop::new();
        let handle = runloop.handle();
        self.self_handle = Some(handle.clone());

        if ready_tx.send(handle).is_err() {
            warn!("client gone before app became ready");
            return;
        }

        runloop.run(&mut self);
        info!(uri = %self.config.uri, "app exited");
    }

    fn self_handle(&self) -> RunloopHandle<App> {
        match &self.self_handle {
            Some(handle) => handle.clone(),
            None => integrity_violation("app used before its runloop existed"),
        }
    }

    fn app_handle(&self) -> AppHandle {
        AppHandle {
            runloop: self.self_handle(),
            uri: self.config.uri.clone(),
        }
    }

    /// Entry for every client command.
    pub(crate) fn handle_client_cmd(&mut self, cmd: Cmd, reply: Sender<CmdResult>) {
        self.affinity.assert_on_owner("handle_client_cmd");
        match cmd.kind() {
            CmdKind::StartGraph { .. } => self.handle_start_graph(cmd, reply),
            CmdKind::StopGraph => self.handle_stop_graph(cmd, reply),
            CmdKind::CloseApp => self.handle_close_app(cmd, reply),
            CmdKind::Custom | CmdKind::TriggerLifeCycle => {
                self.forward_client_cmd(cmd, reply);
            }
            CmdKind::Timer { .. } | CmdKind::Timeout { .. } => {
                let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                    .with_detail("timer commands are not accepted from clients");
                let _ = reply.send(result);
            }
        }
    }

    fn handle_start_graph(&mut self, mut cmd: Cmd, reply: Sender<CmdResult>) {
        if self.state != AppState::Normal {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Closed).with_detail("app closing");
            let _ = reply.send(result);
            return;
        }
        let Some(graph) = cmd.take_graph() else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail("start_graph carried no graph description");
            let _ = reply.send(result);
            return;
        };
        if let Err(err) = graph.validate() {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail(format!("invalid graph: {err}"));
            let _ = reply.send(result);
            return;
        }

        let graph_id = GraphId::new();
        let engine_config = EngineConfig {
            cmd_timeout: self.config.cmd_timeout(),
            tick_interval: self.config.engine_tick(),
        };
        match Engine::spawn(
            self.app_handle(),
            graph_id,
            graph,
            self.registry.store(),
            engine_config,
        ) {
            Ok((handle, join)) => {
                info!(%graph_id, "graph starting");
                self.engines.insert(
                    graph_id,
                    EngineRecord {
                        handle,
                        join: Some(join),
                    },
                );
                self.pending_starts.insert(graph_id, PendingGraphOp { cmd, reply });
            }
            Err(err) => {
                let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                    .with_detail(format!("failed to spawn engine: {err}"));
                let _ = reply.send(result);
            }
        }
    }

    fn handle_stop_graph(&mut self, cmd: Cmd, reply: Sender<CmdResult>) {
        let Some(graph_id) = cmd.dests().first().and_then(|loc| loc.graph_id) else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail("stop_graph names no graph");
            let _ = reply.send(result);
            return;
        };
        let Some(record) = self.engines.get(&graph_id) else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Error)
                .with_detail(format!("no such graph: {graph_id}"));
            let _ = reply.send(result);
            return;
        };

        if record
            .handle
            .post_task(|engine: &mut Engine| engine.close())
            .is_err()
        {
            // The engine left its runloop but its closed report has
            // not landed yet; treat the stop as already satisfied.
            let result = CmdResult::from_cmd(&cmd, StatusCode::Ok)
                .with_detail("graph already closing");
            let _ = reply.send(result);
            return;
        }
        self.pending_stops.insert(graph_id, PendingGraphOp { cmd, reply });
    }

    fn handle_close_app(&mut self, cmd: Cmd, reply: Sender<CmdResult>) {
        if self.state != AppState::Normal {
            let result = CmdResult::from_cmd(&cmd, StatusCode::Closed)
                .with_detail("app already closing");
            let _ = reply.send(result);
            return;
        }
        info!("app closing");
        self.state = AppState::Closing;
        self.close_reply = Some(PendingGraphOp { cmd, reply });

        if self.engines.is_empty() {
            self.finish_close();
            return;
        }
        for record in self.engines.values() {
            let _ = record.handle.post_task(|engine: &mut Engine| engine.close());
        }
    }

    fn forward_client_cmd(&mut self, cmd: Cmd, reply: Sender<CmdResult>) {
        let Some(graph_id) = cmd.dests().first().and_then(|loc| loc.graph_id) else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail("command names no graph");
            let _ = reply.send(result);
            return;
        };
        let Some(record) = self.engines.get(&graph_id) else {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail(format!("no such graph: {graph_id}"));
            let _ = reply.send(result);
            return;
        };
        let _ = record
            .handle
            .post_task(move |engine: &mut Engine| engine.submit_client_cmd(cmd, reply));
    }

    /// Routes a message between this app's engines.
    pub(crate) fn deliver(&mut self, msg: Msg) {
        self.affinity.assert_on_owner("app deliver");
        let Some(graph_id) = msg.dests().first().and_then(|loc| loc.graph_id) else {
            warn!(name = msg.name(), "message without graph destination; dropped");
            return;
        };
        let Some(record) = self.engines.get(&graph_id) else {
            warn!(%graph_id, name = msg.name(), "message for unknown graph; dropped");
            return;
        };
        let _ = record.handle.post_msg(msg);
    }

    /// Ships a message toward another app, or fails it back into the
    /// fabric when no transport is installed.
    pub(crate) fn forward_remote(&mut self, msg: Msg) {
        self.affinity.assert_on_owner("app forward_remote");
        if let Some(forwarder) = self.remote.as_mut() {
            if let Err(err) = forwarder.forward(msg) {
                warn!(%err, "remote forward failed");
            }
            return;
        }

        warn!(name = msg.name(), "no remote transport; message undeliverable");
        if let Msg::Cmd(cmd) = msg {
            let result = CmdResult::from_cmd(&cmd, StatusCode::RouteFailed)
                .with_detail("no remote transport installed");
            if result.dests().first().and_then(|loc| loc.graph_id).is_some() {
                self.deliver(Msg::CmdResult(result));
            }
        }
    }

    /// Engine callback: the graph's threads are all up and indexed.
    pub(crate) fn on_graph_established(&mut self, graph_id: GraphId) {
        self.affinity.assert_on_owner("on_graph_established");
        let Some(pending) = self.pending_starts.remove(&graph_id) else {
            debug!(%graph_id, "established report without pending start");
            return;
        };
        let result = CmdResult::from_cmd(&pending.cmd, StatusCode::Ok)
            .with_property("graph_id", Value::String(graph_id.uuid().to_string()));
        let _ = pending.reply.send(result);
    }

    /// Engine callback: the graph could not be built.
    pub(crate) fn on_graph_failed(&mut self, graph_id: GraphId, detail: String) {
        self.affinity.assert_on_owner("on_graph_failed");
        let Some(pending) = self.pending_starts.remove(&graph_id) else {
            return;
        };
        let result = CmdResult::from_cmd(&pending.cmd, StatusCode::Error).with_detail(detail);
        let _ = pending.reply.send(result);
    }

    /// Engine callback: the engine left its runloop; join it and
    /// settle whatever graph operations were waiting on it.
    pub(crate) fn on_engine_closed(&mut self, graph_id: GraphId) {
        self.affinity.assert_on_owner("on_engine_closed");
        let Some(mut record) = self.engines.remove(&graph_id) else {
            warn!(%graph_id, "closed report for unknown engine");
            return;
        };
        if let Some(join) = record.join.take() {
            if join.join().is_err() {
                warn!(%graph_id, "engine thread panicked");
            }
        }
        info!(%graph_id, "engine joined");

        if let Some(pending) = self.pending_stops.remove(&graph_id) {
            let result = CmdResult::from_cmd(&pending.cmd, StatusCode::Ok);
            let _ = pending.reply.send(result);
        }
        if let Some(pending) = self.pending_starts.remove(&graph_id) {
            // The graph went down before it ever came up (stop raced
            // start).
            let result = CmdResult::from_cmd(&pending.cmd, StatusCode::Closed)
                .with_detail("engine closed during graph start");
            let _ = pending.reply.send(result);
        }

        if self.state == AppState::Closing && self.engines.is_empty() {
            self.finish_close();
        }
    }

    fn finish_close(&mut self) {
        // No factory outlives the app.
        self.registry.unregister_all_and_cleanup_after_app_close(|| {});
        self.state = AppState::Closed;

        if let Some(pending) = self.close_reply.take() {
            let result = CmdResult::from_cmd(&pending.cmd, StatusCode::Ok);
            let _ = pending.reply.send(result);
        }
        info!("app closed");
        let _ = self.self_handle().stop();
    }
}

/// The client surface of a spawned app.
///
/// Commands are submitted from the caller's thread; results come back
/// on a channel, so the caller chooses its own blocking discipline
/// (the harness timeout of the test scenarios lives here, in
/// `recv_timeout`).
pub struct AppClient {
    handle: AppHandle,
    uri: String,
    default_timeout: Duration,
    join: Option<JoinHandle<()>>,
}

impl AppClient {
    /// This app's uri.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// A posting handle for embedders that need raw access.
    #[must_use]
    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    /// Submits a command; the result arrives on the returned channel.
    pub fn submit_cmd(&self, cmd: Cmd) -> Result<Receiver<CmdResult>, RuntimeError> {
        let (tx, rx) = mpsc::channel();
        self.handle
            .post_task(move |app: &mut App| app.handle_client_cmd(cmd, tx))?;
        Ok(rx)
    }

    /// Submits a command and blocks for its result.
    pub fn call(&self, cmd: Cmd, timeout: Duration) -> Result<CmdResult, RuntimeError> {
        let rx = self.submit_cmd(cmd)?;
        rx.recv_timeout(timeout)
            .map_err(|_| RuntimeError::Timeout(timeout))
    }

    /// Starts a graph and returns its id.
    pub fn start_graph(&self, graph: GraphDescription) -> Result<GraphId, RuntimeError> {
        let result = self.call(Cmd::start_graph(graph), self.default_timeout)?;
        if !result.is_ok() {
            warn!(detail = result.detail().unwrap_or(""), "graph start failed");
            return Err(RuntimeError::Closed);
        }
        result
            .property("graph_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(GraphId)
            .ok_or(RuntimeError::Closed)
    }

    /// Stops a graph.
    pub fn stop_graph(&self, graph_id: GraphId) -> Result<CmdResult, RuntimeError> {
        let cmd = Cmd::stop_graph().with_dest(plexus_types::Loc::graph(self.uri.clone(), graph_id));
        self.call(cmd, self.default_timeout)
    }

    /// Closes the app and joins its thread.
    pub fn close(&mut self) -> Result<CmdResult, RuntimeError> {
        let result = self.call(Cmd::close_app(), self.default_timeout)?;
        self.wait();
        Ok(result)
    }

    /// Joins the app thread if it is still running.
    pub fn wait(&mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("app thread panicked");
            }
        }
    }
}
