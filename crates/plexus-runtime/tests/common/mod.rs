//! Shared fixtures for the end-to-end scenarios.

#![allow(dead_code)]

use plexus_extension::{
    Addon, AddonType, CreateInstanceDone, DestroyInstanceDone, Extension, ExtensionEnv,
};
use plexus_msg::graph::GraphDescription;
use plexus_msg::{Cmd, CmdResult};
use plexus_runtime::{AddonRegistry, App, AppBuilder, AppClient};
use plexus_types::{GraphId, Loc, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

/// Default harness timeout; generous enough for loaded CI machines.
pub const HARNESS_TIMEOUT: Duration = Duration::from_secs(3);

static TRACING: Once = Once::new();

/// Installs a fmt subscriber once per test binary. `PLEXUS_TEST_LOG`
/// selects the filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = std::env::var("PLEXUS_TEST_LOG").unwrap_or_else(|_| "warn".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Shared journal of lifecycle and message callbacks.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn journal_entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal poisoned").clone()
}

/// Counters every test addon shares: instances created vs destroyed.
#[derive(Default)]
pub struct InstanceCounters {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
}

/// Extension used by the hello scenarios: `hello_world` answers Ok
/// with the expected detail, anything else answers Error.
pub struct HelloExtension {
    pub journal: Journal,
}

impl Extension for HelloExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        self.journal
            .lock()
            .expect("journal poisoned")
            .push(format!("on_cmd:{}", cmd.name()));
        let result = match cmd.name() {
            "hello_world" => {
                CmdResult::from_cmd(&cmd, StatusCode::Ok).with_detail("hello world, too")
            }
            _ => CmdResult::from_cmd(&cmd, StatusCode::Error).with_detail("unknown command"),
        };
        env.return_result(result).expect("reply failed");
    }
}

/// Journaling extension with immediate lifecycle acknowledgements.
pub struct JournalingExtension {
    pub journal: Journal,
    pub name_hint: String,
}

impl Extension for JournalingExtension {
    fn on_configure(&mut self, env: &mut dyn ExtensionEnv) {
        self.note("on_configure");
        env.on_configure_done();
    }

    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        self.note("on_init");
        env.on_init_done();
    }

    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        self.note("on_start");
        env.on_start_done();
    }

    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        self.note("on_stop");
        env.on_stop_done();
    }

    fn on_deinit(&mut self, env: &mut dyn ExtensionEnv) {
        self.note("on_deinit");
        env.on_deinit_done();
    }

    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        self.note(&format!("on_cmd:{}", cmd.name()));
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}

impl JournalingExtension {
    fn note(&self, what: &str) {
        self.journal
            .lock()
            .expect("journal poisoned")
            .push(format!("{}:{}", self.name_hint, what));
    }
}

/// Factory wiring a closure to instances, with shared counters.
pub struct TestAddon<F> {
    pub make: F,
    pub counters: Arc<InstanceCounters>,
    /// Artificial delay before the instance is delivered, to widen
    /// race windows deliberately.
    pub create_delay: Duration,
}

impl<F> Addon for TestAddon<F>
where
    F: Fn(&str) -> Box<dyn Extension> + Send + Sync,
{
    fn on_create_instance(&self, instance_name: &str, done: CreateInstanceDone) {
        if !self.create_delay.is_zero() {
            std::thread::sleep(self.create_delay);
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        done.done((self.make)(instance_name));
    }

    fn on_destroy_instance(&self, instance: Box<dyn Extension>, done: DestroyInstanceDone) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        drop(instance);
        done.done();
    }
}

/// Registers a closure-backed addon and returns its counters.
pub fn register_test_addon<F>(
    registry: &AddonRegistry,
    name: &str,
    make: F,
) -> Arc<InstanceCounters>
where
    F: Fn(&str) -> Box<dyn Extension> + Send + Sync + 'static,
{
    register_test_addon_with_delay(registry, name, Duration::ZERO, make)
}

pub fn register_test_addon_with_delay<F>(
    registry: &AddonRegistry,
    name: &str,
    create_delay: Duration,
    make: F,
) -> Arc<InstanceCounters>
where
    F: Fn(&str) -> Box<dyn Extension> + Send + Sync + 'static,
{
    let counters = Arc::new(InstanceCounters::default());
    let addon = TestAddon {
        make,
        counters: Arc::clone(&counters),
        create_delay,
    };
    registry
        .register_blocking(AddonType::Extension, name, Arc::new(addon))
        .expect("addon registration failed");
    counters
}

/// One extension, one group.
pub fn single_node_graph(name: &str, addon: &str) -> GraphDescription {
    GraphDescription::from_json(&format!(
        r#"{{
            "nodes": [
                {{ "type": "extension", "name": "{name}", "addon": "{addon}",
                   "extension_group": "default" }}
            ]
        }}"#
    ))
    .expect("graph json")
}

/// Spawns an app from a builder-configuring closure.
pub fn spawn_app(configure: impl FnOnce(AppBuilder) -> AppBuilder) -> AppClient {
    init_tracing();
    let builder = configure(App::builder().uri("plexus://localhost:8001"));
    builder.build().spawn().expect("app spawn failed")
}

/// Sends a command to one extension and waits for its result.
pub fn call_extension(
    client: &AppClient,
    graph: GraphId,
    extension: &str,
    cmd: Cmd,
) -> CmdResult {
    let dest = Loc::extension(client.uri(), graph, extension);
    client
        .call(cmd.with_dest(dest), HARNESS_TIMEOUT)
        .expect("call failed")
}

/// Property helper: numeric `data` field.
pub fn data_of(result: &CmdResult) -> i64 {
    result
        .property("data")
        .and_then(Value::as_i64)
        .expect("missing data property")
}

pub fn data_value(n: i64) -> Value {
    json!(n)
}
