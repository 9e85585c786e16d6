//! Lifecycle ordering, pending-message flushing and teardown
//! accounting.

mod common;

use common::*;
use plexus_extension::{Extension, ExtensionEnv};
use plexus_msg::Cmd;
use plexus_types::StatusCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// The full stage sequence runs in order and every instance that was
/// created is returned to its addon.
#[test]
fn lifecycle_runs_in_order_and_nothing_leaks() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "journaling", move |name| {
            Box::new(JournalingExtension {
                journal: j.clone(),
                name_hint: name.to_string(),
            })
        });
        builder
    });
    let graph = client
        .start_graph(single_node_graph("worker", "journaling"))
        .unwrap();

    let result = call_extension(&client, graph, "worker", Cmd::new("ping"));
    assert_eq!(result.status(), StatusCode::Ok);

    client.stop_graph(graph).unwrap();

    let entries = journal_entries(&journal);
    let order: Vec<&str> = entries
        .iter()
        .filter(|e| e.starts_with("worker:on_") && !e.contains("on_cmd"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        order,
        vec![
            "worker:on_configure",
            "worker:on_init",
            "worker:on_start",
            "worker:on_stop",
            "worker:on_deinit",
        ]
    );
    client.close().unwrap();
}

/// Commands that arrive before the extension reaches start are held
/// and flushed in order afterwards; none are lost.
///
/// The pre-start window is held open deterministically: the extension
/// defers `init_done` until a command to a slow peer comes back, so
/// client commands submitted meanwhile land squarely in the pending
/// queue.
#[test]
fn pre_start_commands_are_flushed_in_order() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "deferred", move |name| {
            Box::new(DeferredInitExtension {
                inner: JournalingExtension {
                    journal: j.clone(),
                    name_hint: name.to_string(),
                },
            })
        });
        register_test_addon(builder.registry(), "slow_peer", |_name| {
            Box::new(SlowPeerExtension {
                reply_delay: Duration::from_millis(250),
            })
        });
        builder
    });

    let graph = client
        .start_graph(
            plexus_msg::graph::GraphDescription::from_json(
                r#"{
                    "nodes": [
                        { "type": "extension", "name": "peer", "addon": "slow_peer", "extension_group": "default" },
                        { "type": "extension", "name": "sleepy", "addon": "deferred", "extension_group": "default" }
                    ],
                    "connections": [
                        { "extension": "sleepy",
                          "cmd": [ { "name": "warmup", "dest": [ { "extension": "peer" } ] } ] }
                    ]
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    // Fired while the extension is still waiting out its init; they
    // queue and flush after start_done.
    let rx1 = client
        .submit_cmd(
            Cmd::new("first").with_dest(plexus_types::Loc::extension(client.uri(), graph, "sleepy")),
        )
        .unwrap();
    let rx2 = client
        .submit_cmd(
            Cmd::new("second").with_dest(plexus_types::Loc::extension(client.uri(), graph, "sleepy")),
        )
        .unwrap();

    assert!(rx1.recv_timeout(HARNESS_TIMEOUT).unwrap().is_ok());
    assert!(rx2.recv_timeout(HARNESS_TIMEOUT).unwrap().is_ok());

    let entries = journal_entries(&journal);
    let interesting: Vec<&str> = entries
        .iter()
        .filter(|e| e.contains("on_cmd") || e.ends_with("on_start"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        interesting,
        vec![
            "sleepy:on_start",
            "sleepy:on_cmd:first",
            "sleepy:on_cmd:second",
        ]
    );

    client.close().unwrap();
}

/// Defers `init_done` until its `warmup` command is answered.
struct DeferredInitExtension {
    inner: JournalingExtension,
}

impl Extension for DeferredInitExtension {
    fn on_configure(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_configure(env);
    }

    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        env.send_cmd(
            Cmd::new("warmup"),
            Some(Box::new(|env, _result| env.on_init_done())),
        )
        .expect("warmup send failed");
    }

    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_start(env);
    }

    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_stop(env);
    }

    fn on_deinit(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_deinit(env);
    }

    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        self.inner.on_cmd(env, cmd);
    }
}

/// Answers after a fixed delay, from its own thread.
struct SlowPeerExtension {
    reply_delay: Duration,
}

impl Extension for SlowPeerExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        std::thread::sleep(self.reply_delay);
        env.return_result(plexus_msg::CmdResult::from_cmd(&cmd, plexus_types::StatusCode::Ok))
            .expect("reply failed");
    }
}

/// Instance accounting: stop returns every instance to its addon.
#[test]
fn created_instances_are_destroyed_on_stop() {
    let journal = new_journal();
    let j = journal.clone();
    let mut counters_handle = None;
    let mut client = spawn_app(|builder| {
        let counters = register_test_addon(builder.registry(), "journaling", move |name| {
            Box::new(JournalingExtension {
                journal: j.clone(),
                name_hint: name.to_string(),
            })
        });
        counters_handle = Some(counters);
        builder
    });
    let counters = counters_handle.expect("counters");

    let graph = client
        .start_graph(
            plexus_msg::graph::GraphDescription::from_json(
                r#"{
                    "nodes": [
                        { "type": "extension", "name": "a", "addon": "journaling", "extension_group": "g1" },
                        { "type": "extension", "name": "b", "addon": "journaling", "extension_group": "g1" },
                        { "type": "extension", "name": "c", "addon": "journaling", "extension_group": "g2" }
                    ]
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    client.stop_graph(graph).unwrap();

    assert_eq!(counters.created.load(Ordering::SeqCst), 3);
    assert_eq!(counters.destroyed.load(Ordering::SeqCst), 3);
    client.close().unwrap();
}

/// A helper thread holding an env proxy delays deinit until it
/// releases; teardown then completes normally.
#[test]
fn deinit_waits_for_env_proxy_release() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "proxying", move |name| {
            Box::new(ProxyingExtension {
                inner: JournalingExtension {
                    journal: j.clone(),
                    name_hint: name.to_string(),
                },
            })
        });
        builder
    });

    let graph = client
        .start_graph(single_node_graph("holder", "proxying"))
        .unwrap();

    // Give the helper thread time to grab its proxy.
    std::thread::sleep(Duration::from_millis(50));
    let result = client.stop_graph(graph).unwrap();
    assert_eq!(result.status(), StatusCode::Ok);

    let entries = journal_entries(&journal);
    assert!(entries.contains(&"holder:on_deinit".to_string()));
    assert!(entries.contains(&"holder:proxy_notify".to_string()));
    client.close().unwrap();
}

/// Hands an env proxy to a helper thread during `on_start`; the helper
/// posts one notification and releases after a pause that overlaps
/// teardown.
struct ProxyingExtension {
    inner: JournalingExtension,
}

impl Extension for ProxyingExtension {
    fn on_configure(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_configure(env);
    }

    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_init(env);
    }

    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        let proxy = env.create_proxy();
        let journal = self.inner.journal.clone();
        let hint = self.inner.name_hint.clone();
        std::thread::spawn(move || {
            let j = journal.clone();
            let h = hint.clone();
            proxy.notify_async(Box::new(move |_env| {
                j.lock().expect("journal poisoned").push(format!("{h}:proxy_notify"));
            }));
            // Keep the proxy alive across the stop to force a deferred
            // deinit.
            std::thread::sleep(Duration::from_millis(200));
            drop(proxy);
        });
        self.inner.on_start(env);
    }

    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_stop(env);
    }

    fn on_deinit(&mut self, env: &mut dyn ExtensionEnv) {
        self.inner.on_deinit(env);
    }
}
