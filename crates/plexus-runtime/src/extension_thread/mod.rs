//! Extension threads.
//!
//! An extension thread is an OS thread plus a runloop that executes all
//! code for one extension group's extensions, serially. It drives the
//! lifecycle state machine of every extension it owns and routes the
//! messages addressed to them.
//!
//! # Thread states
//!
//! ```text
//! Init ──(start task)──▶ CreatingExtensions
//! CreatingExtensions ──(all instances created)──▶ Normal
//! Normal ──(close)──▶ PrepareToClose ──(runloop drained)──▶ Closed
//! ```
//!
//! # Startup choreography
//!
//! 1. The engine thread assembles the `ExtensionThread` object in
//!    `Init` (affinity unset) and calls [`start`](ExtensionThread::start).
//! 2. `start` spawns the OS thread and blocks on the runloop-ready
//!    event.
//! 3. The OS thread latches ownership of the thread object, the group
//!    and the runloop; posts the start task to itself; signals ready;
//!    enters the runloop.
//! 4. The engine resumes, holding a posting handle that stays valid for
//!    the thread's whole life.
//!
//! # Close choreography
//!
//! [`close`](ExtensionThread::close) may be called from any thread; it
//! posts an idempotent trigger task. Depending on state the thread
//! skips lifecycle entirely (`Init`), waits for in-flight instance
//! creation to land (`CreatingExtensions`), or walks every extension
//! through stop and deinit (`Normal`). After the group is torn down the
//! runloop stops; on exit the thread reports closed to the engine,
//! which joins the OS thread.

mod dispatch;
mod ext_env;
mod lifecycle;

pub use ext_env::ExtEnv;
pub(crate) use lifecycle::LifecycleEvent;

use crate::addon::{self, AddonContext, AddonContextFlow, AddonStore};
use crate::affinity::{integrity_violation, ThreadAffinity};
use crate::engine::{Engine, EngineHandle};
use crate::group::ExtensionGroup;
use crate::path_table::PathTable;
use crate::runloop::{Runloop, RunloopHandle};
use crate::RuntimeError;
use plexus_extension::{AddonType, Extension};
use plexus_msg::graph::GraphNode;
use plexus_msg::{Cmd, Msg};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicUsize;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use plexus_types::Stage;
use tracing::{debug, error, info, warn};

/// Extension thread states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadState {
    Init,
    CreatingExtensions,
    Normal,
    PrepareToClose,
    Closed,
}

/// What one graph node asks this thread to instantiate.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    /// Instance name, unique within the graph.
    pub name: String,
    /// Addon manufacturing the instance.
    pub addon: String,
    /// Property map handed to the extension.
    pub properties: Map<String, Value>,
    /// Start is gated on an external trigger.
    pub manual_start: bool,
    /// Stop is gated on an external trigger.
    pub manual_stop: bool,
}

impl ExtensionSpec {
    /// Builds a spec from a graph node, splitting the runtime's
    /// reserved property namespace out of the extension's map.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let stages = node.manual_trigger_stages();
        Self {
            name: node.name.clone(),
            addon: node.addon.clone(),
            properties: node.property.clone().unwrap_or_default(),
            manual_start: stages.contains(&Stage::Start),
            manual_stop: stages.contains(&Stage::Stop),
        }
    }
}

/// Per-extension lifecycle position, as the host tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostStage {
    Created,
    Configuring,
    Initing,
    /// Init complete; start gated on a manual trigger.
    WaitingStartTrigger,
    Starting,
    Running,
    /// Stop requested; gated on a manual trigger.
    WaitingStopTrigger,
    Stopping,
    Deiniting,
    /// Deinit acknowledged; waiting for env proxies to release.
    WaitingProxyRelease,
    Deinited,
    /// Configure or init failed; the extension never went live.
    Failed,
}

/// Everything the thread owns about one extension instance.
pub(crate) struct ExtensionHost {
    pub(crate) name: String,
    pub(crate) addon_name: String,
    pub(crate) extension: Option<Box<dyn Extension>>,
    pub(crate) path_table: PathTable,
    pub(crate) properties: Map<String, Value>,
    pub(crate) stage: HostStage,
    pub(crate) manual_start: bool,
    pub(crate) manual_stop: bool,
    pub(crate) start_trigger: Option<Cmd>,
    pub(crate) stop_trigger: Option<Cmd>,
    pub(crate) stop_requested: bool,
    pub(crate) entered_init: bool,
    /// Messages that arrived before this extension finished init.
    pub(crate) pending: VecDeque<Msg>,
    /// Env-proxy holder count; starts at 1 (the extension itself).
    pub(crate) env_refs: Arc<AtomicUsize>,
}

impl ExtensionHost {
    fn new(spec: &ExtensionSpec, extension: Box<dyn Extension>) -> Self {
        Self {
            name: spec.name.clone(),
            addon_name: spec.addon.clone(),
            extension: Some(extension),
            path_table: PathTable::new(),
            properties: spec.properties.clone(),
            stage: HostStage::Created,
            manual_start: spec.manual_start,
            manual_stop: spec.manual_stop,
            start_trigger: None,
            stop_trigger: None,
            stop_requested: false,
            entered_init: false,
            pending: VecDeque::new(),
            env_refs: Arc::new(AtomicUsize::new(1)),
        }
    }
}

struct CreatingState {
    remaining: usize,
    created: Vec<(String, Box<dyn Extension>)>,
    failed: Vec<(String, String)>,
}

/// The extension thread object. Built on the engine thread, owned by
/// its OS thread from [`start`](Self::start) onward.
pub struct ExtensionThread {
    state: ThreadState,
    is_close_triggered: bool,
    create_done: bool,
    affinity: ThreadAffinity,
    engine: EngineHandle,
    group: ExtensionGroup,
    addon_store: Arc<AddonStore>,
    specs: Vec<ExtensionSpec>,
    spec_by_name: HashMap<String, ExtensionSpec>,
    pub(crate) store: HashMap<String, ExtensionHost>,
    order: Vec<String>,
    pending_msgs_received_in_init_stage: VecDeque<Msg>,
    self_handle: Option<RunloopHandle<ExtensionThread>>,
    creating: Option<CreatingState>,
    destroying_remaining: usize,
}

impl ExtensionThread {
    /// Assembles a thread object in `Init`, attached to its engine and
    /// group. Runs on the engine thread; affinity stays unset until
    /// the OS thread takes over.
    #[must_use]
    pub fn new(
        engine: EngineHandle,
        group_name: impl Into<String>,
        specs: Vec<ExtensionSpec>,
        addon_store: Arc<AddonStore>,
    ) -> Self {
        Self {
            state: ThreadState::Init,
            is_close_triggered: false,
            create_done: false,
            affinity: ThreadAffinity::new(),
            engine,
            group: ExtensionGroup::new(group_name),
            addon_store,
            specs,
            spec_by_name: HashMap::new(),
            store: HashMap::new(),
            order: Vec::new(),
            pending_msgs_received_in_init_stage: VecDeque::new(),
            self_handle: None,
            creating: None,
            destroying_remaining: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// The group name this thread runs.
    #[must_use]
    pub fn group_name(&self) -> &str {
        self.group.name()
    }

    /// Spawns the OS thread and blocks until its runloop is ready to
    /// accept posts. Returns the posting handle (fixed for the
    /// thread's lifetime) and the join handle the engine keeps for
    /// close-down.
    pub fn start(self) -> std::io::Result<(RunloopHandle<ExtensionThread>, JoinHandle<()>)> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_name = format!("ext-{}", self.group.name());
        let join = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.main(ready_tx))?;

        // The runloop is created inside the new thread; waiting on the
        // ready event here means the engine never needs a lock to
        // touch the handle afterwards.
        match ready_rx.recv() {
            Ok(handle) => Ok((handle, join)),
            Err(_) => integrity_violation("extension thread died before signalling ready"),
        }
    }

    /// Requests close. Callable from any thread; the actual work runs
    /// as a task on the extension thread and is idempotent.
    pub fn close(handle: &RunloopHandle<ExtensionThread>) -> Result<(), RuntimeError> {
        handle.post_task_tail(|t: &mut ExtensionThread| t.on_triggering_close())
    }

    /// Thread main: inherit ownership, build the runloop, announce
    /// readiness, run, report closed.
    fn main(mut self, ready_tx: mpsc::Sender<RunloopHandle<ExtensionThread>>) {
        debug!(group = self.group.name(), "extension thread started");

        self.affinity.latch_to_current();
        self.group.latch_to_current_thread();

        let runloop = Runloop::new();
        let handle = runloop.handle();
        self.self_handle = Some(handle.clone());

        if handle
            .post_task_tail(|t: &mut ExtensionThread| t.handle_start_task())
            .is_err()
        {
            integrity_violation("posting start task to a fresh runloop failed");
        }

        if ready_tx.send(handle).is_err() {
            // The engine vanished between spawn and ready; nothing to
            // serve.
            warn!(group = self.group.name(), "engine gone before thread became ready");
            return;
        }

        runloop.run(&mut self);

        let group_name = self.group.name().to_string();
        debug!(group = %group_name, "notifying engine that we are closed");
        self.set_state(ThreadState::Closed);
        self.notify_engine_closed();
        debug!(group = %group_name, "extension thread exited");
    }

    /// Forward-only state transitions; anything else is an integrity
    /// violation.
    pub(crate) fn set_state(&mut self, next: ThreadState) {
        if next < self.state {
            integrity_violation("extension thread state moved backwards");
        }
        debug!(group = self.group.name(), from = ?self.state, to = ?next, "thread state");
        self.state = next;
    }

    pub(crate) fn self_handle(&self) -> RunloopHandle<ExtensionThread> {
        match &self.self_handle {
            Some(handle) => handle.clone(),
            None => integrity_violation("extension thread used before its runloop existed"),
        }
    }

    pub(crate) fn engine_handle(&self) -> EngineHandle {
        self.engine.clone()
    }

    /// First task on the fresh runloop: create every requested
    /// extension instance through the addon store.
    fn handle_start_task(&mut self) {
        self.affinity.assert_on_owner("extension thread start task");
        self.set_state(ThreadState::CreatingExtensions);

        let specs = std::mem::take(&mut self.specs);
        self.creating = Some(CreatingState {
            remaining: specs.len(),
            created: Vec::new(),
            failed: Vec::new(),
        });

        if specs.is_empty() {
            self.add_all_created_extensions();
            return;
        }

        for spec in specs {
            let ctx = AddonContext {
                addon_type: AddonType::Extension,
                addon_name: spec.addon.clone(),
                instance_name: spec.name.clone(),
                flow: AddonContextFlow::ExtensionThreadCreateExtension {
                    thread: self.self_handle(),
                },
            };
            let name = spec.name.clone();
            self.spec_by_name.insert(spec.name.clone(), spec);
            if let Err(err) = addon::create_instance_async(&self.addon_store, ctx) {
                self.on_create_instance_failed(name, err.to_string());
            }
        }
    }

    /// An addon delivered one instance.
    pub(crate) fn on_create_instance_done(&mut self, name: String, instance: Box<dyn Extension>) {
        self.affinity.assert_on_owner("on_create_instance_done");
        let Some(creating) = self.creating.as_mut() else {
            warn!(extension = %name, "instance created outside the creating phase; dropping");
            return;
        };
        creating.created.push((name, instance));
        creating.remaining -= 1;
        if creating.remaining == 0 {
            self.add_all_created_extensions();
        }
    }

    /// An addon (or the store lookup) failed for one instance.
    pub(crate) fn on_create_instance_failed(&mut self, name: String, reason: String) {
        self.affinity.assert_on_owner("on_create_instance_failed");
        let Some(creating) = self.creating.as_mut() else {
            warn!(extension = %name, reason = %reason, "late creation failure; dropping");
            return;
        };
        creating.failed.push((name, reason));
        creating.remaining -= 1;
        if creating.remaining == 0 {
            self.add_all_created_extensions();
        }
    }

    /// Every requested instance has reported back. Index the created
    /// ones, latch their path tables to this thread, tell the engine —
    /// or, if a close raced in while we were creating, head straight
    /// into teardown without ever entering `Normal`.
    fn add_all_created_extensions(&mut self) {
        let Some(creating) = self.creating.take() else {
            integrity_violation("add_all_created_extensions without a creating phase");
        };

        for (name, instance) in creating.created {
            let Some(spec) = self.spec_by_name.remove(&name) else {
                warn!(extension = %name, "created instance has no spec; dropping");
                continue;
            };
            let host = ExtensionHost::new(&spec, instance);
            host.path_table.latch_to_current_thread();
            self.order.push(name.clone());
            self.store.insert(name, host);
        }
        self.create_done = true;

        self.log_graph_resources();

        if !creating.failed.is_empty() {
            for (name, reason) in &creating.failed {
                error!(extension = %name, reason = %reason, "extension instance creation failed");
            }
            let group = self.group.name().to_string();
            let failures = creating.failed;
            let _ = self.engine.post_task(move |e: &mut Engine| {
                e.on_extension_create_failed(group, failures);
            });
            // The engine will drive a close; if one already raced in,
            // tear down now rather than waiting for a second trigger.
            if self.is_close_triggered {
                self.stop_life_cycle_of_all_extensions();
            }
            return;
        }

        if self.is_close_triggered {
            // A close raced the creation; the instances exist now, so
            // they can be torn down properly instead of leaking.
            self.stop_life_cycle_of_all_extensions();
            return;
        }

        let group = self.group.name().to_string();
        let extensions = self.order.clone();
        let _ = self.engine.post_task(move |e: &mut Engine| {
            e.on_extensions_created(group, extensions);
        });
    }

    /// Structured startup record: which extensions ended up on which
    /// thread of which graph.
    fn log_graph_resources(&self) {
        info!(
            target: "plexus::graph_resources",
            app_uri = %self.engine.app_uri,
            graph_id = %self.engine.graph_id,
            group = self.group.name(),
            thread = ?std::thread::current().id(),
            extensions = ?self.order,
            "graph resources"
        );
    }

    /// Engine callback after routing is resolved: enter `Normal` and
    /// start every extension's lifecycle. A no-op when close was
    /// triggered meanwhile.
    pub(crate) fn start_life_cycle_of_all_extensions(&mut self) {
        self.affinity.assert_on_owner("start life cycle task");
        if self.is_close_triggered {
            return;
        }
        self.set_state(ThreadState::Normal);

        for name in self.order.clone() {
            self.begin_configure(&name);
        }

        // Messages that arrived while we were still creating now get
        // their normal routing (which may park them per-extension
        // until start).
        let held = std::mem::take(&mut self.pending_msgs_received_in_init_stage);
        for msg in held {
            self.dispatch_msg(msg);
        }
    }

    /// The close trigger task. Idempotent; behavior depends on state.
    pub(crate) fn on_triggering_close(&mut self) {
        self.affinity.assert_on_owner("on_triggering_close");
        if self.is_close_triggered {
            return;
        }
        self.is_close_triggered = true;
        debug!(group = self.group.name(), state = ?self.state, "close triggered");

        match self.state {
            ThreadState::Init => {
                // No extensions yet: skip lifecycle entirely and tear
                // the group down.
                self.finish_group_teardown();
            }
            ThreadState::CreatingExtensions => {
                if self.create_done {
                    self.stop_life_cycle_of_all_extensions();
                }
                // Otherwise wait: the create-done path re-enters the
                // close flow once the instances exist.
            }
            ThreadState::Normal => {
                self.stop_life_cycle_of_all_extensions();
            }
            ThreadState::PrepareToClose | ThreadState::Closed => {
                integrity_violation("close triggered in a closing state");
            }
        }
    }

    /// Walks every extension into stop/deinit. Held messages are
    /// cancelled: commands get `Closed` results, the rest is dropped.
    pub(crate) fn stop_life_cycle_of_all_extensions(&mut self) {
        self.set_state(ThreadState::PrepareToClose);

        let held = std::mem::take(&mut self.pending_msgs_received_in_init_stage);
        for msg in held {
            self.cancel_held_msg(msg);
        }
        for name in self.order.clone() {
            if let Some(host) = self.store.get_mut(&name) {
                let pending = std::mem::take(&mut host.pending);
                for msg in pending {
                    self.cancel_held_msg(msg);
                }
            }
            self.request_stop(&name);
        }

        self.check_all_extensions_deinited();
    }

    /// Every host is deinited: return each instance to its addon.
    pub(crate) fn check_all_extensions_deinited(&mut self) {
        if self.state != ThreadState::PrepareToClose {
            return;
        }
        if self
            .store
            .values()
            .any(|host| host.stage != HostStage::Deinited)
        {
            return;
        }
        if self.destroying_remaining > 0 {
            return;
        }

        let names = self.order.clone();
        if names.is_empty() {
            self.finish_group_teardown();
            return;
        }

        let self_handle = self.self_handle();
        self.destroying_remaining = 0;
        for name in names {
            let Some(host) = self.store.get_mut(&name) else {
                continue;
            };
            let Some(instance) = host.extension.take() else {
                continue;
            };
            let addon_name = host.addon_name.clone();
            let ctx = AddonContext {
                addon_type: AddonType::Extension,
                addon_name,
                instance_name: name.clone(),
                flow: AddonContextFlow::ExtensionThreadDestroyExtension {
                    thread: self_handle.clone(),
                },
            };
            self.destroying_remaining += 1;
            if let Err(err) = addon::destroy_instance_async(&self.addon_store, ctx, instance) {
                warn!(extension = %name, %err, "addon gone at destroy; instance dropped");
                self.destroying_remaining -= 1;
            }
        }

        if self.destroying_remaining == 0 {
            self.finish_group_teardown();
        }
    }

    /// An addon finished disposing of one instance.
    pub(crate) fn on_destroy_instance_done(&mut self, name: String) {
        self.affinity.assert_on_owner("on_destroy_instance_done");
        debug!(extension = %name, "instance destroyed");
        self.destroying_remaining = self.destroying_remaining.saturating_sub(1);
        if self.destroying_remaining == 0 {
            self.finish_group_teardown();
        }
    }

    /// Group deinit: drop the extension hosts and stop the runloop.
    /// The `Closed` transition happens after `run` returns.
    fn finish_group_teardown(&mut self) {
        debug!(group = self.group.name(), "group teardown complete");
        self.store.clear();
        self.order.clear();
        if let Some(handle) = &self.self_handle {
            let _ = handle.stop();
        }
    }

    /// Posted to the engine after the runloop has exited, so the
    /// engine can join the OS thread.
    fn notify_engine_closed(&self) {
        let group = self.group.name().to_string();
        if self
            .engine
            .post_task(move |e: &mut Engine| e.on_extension_thread_closed(group))
            .is_err()
        {
            warn!(
                group = self.group.name(),
                "engine runloop gone before thread-closed notification"
            );
        }
    }
}
