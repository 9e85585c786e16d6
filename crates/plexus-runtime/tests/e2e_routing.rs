//! Routing scenarios: multi-hop command chains across engines,
//! connection-table resolution, timeouts and the cross-app seam.

mod common;

use common::*;
use parking_lot::Mutex;
use plexus_extension::{Extension, ExtensionEnv};
use plexus_msg::graph::GraphDescription;
use plexus_msg::{Cmd, CmdResult, Data, Msg};
use plexus_runtime::{RemoteForwarder, RuntimeError};
use plexus_types::{GraphId, Loc, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Doubles `data`, forwards a `square` command to the extension named
/// in its properties (possibly in another graph), and answers the
/// original sender with the squared value.
struct DoublerExtension;

impl Extension for DoublerExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let doubled = cmd.property("data").and_then(Value::as_i64).unwrap_or(0) * 2;
        let target_graph = cmd
            .property("target_graph")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(GraphId)
            .expect("target_graph property");
        let target_ext = cmd
            .property("target_ext")
            .and_then(Value::as_str)
            .expect("target_ext property")
            .to_string();

        let sub = Cmd::new("square")
            .with_property("data", Value::from(doubled))
            .with_dest(Loc {
                app_uri: None,
                graph_id: Some(target_graph),
                extension: Some(target_ext),
            });

        let handler = move |env: &mut dyn ExtensionEnv, sub_result: CmdResult| {
            let squared = sub_result.property("data").cloned().unwrap_or(Value::Null);
            let result =
                CmdResult::from_cmd(&cmd, sub_result.status()).with_property("data", squared);
            env.return_result(result).expect("reply failed");
        };
        env.send_cmd(sub, Some(Box::new(handler))).expect("forward failed");
    }
}

/// Squares `data`.
struct SquarerExtension;

impl Extension for SquarerExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let n = cmd.property("data").and_then(Value::as_i64).unwrap_or(0);
        let result =
            CmdResult::from_cmd(&cmd, StatusCode::Ok).with_property("data", Value::from(n * n));
        env.return_result(result).expect("reply failed");
    }
}

/// A `process` command traverses client → doubler (graph 1) →
/// squarer (graph 2) and the result travels the whole way back:
/// (3 · 2)² = 36.
#[test]
fn command_chain_across_engines() {
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "doubler", |_| Box::new(DoublerExtension));
        register_test_addon(builder.registry(), "squarer", |_| Box::new(SquarerExtension));
        builder
    });

    let g1 = client.start_graph(single_node_graph("doubler", "doubler")).unwrap();
    let g2 = client.start_graph(single_node_graph("squarer", "squarer")).unwrap();

    let cmd = Cmd::new("process")
        .with_property("data", Value::from(3))
        .with_property("target_graph", Value::String(g2.uuid().to_string()))
        .with_property("target_ext", Value::String("squarer".into()));
    let result = call_extension(&client, g1, "doubler", cmd);

    assert_eq!(result.status(), StatusCode::Ok);
    assert_eq!(data_of(&result), 36);
    client.close().unwrap();
}

/// Connection-table routing: a command sent without destinations
/// resolves against the graph's connection list.
#[test]
fn connections_resolve_destless_sends() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "relay", |_| Box::new(RelayExtension));
        register_test_addon(builder.registry(), "journaling", move |name| {
            Box::new(JournalingExtension {
                journal: j.clone(),
                name_hint: name.to_string(),
            })
        });
        builder
    });

    let graph = client
        .start_graph(
            GraphDescription::from_json(
                r#"{
                    "nodes": [
                        { "type": "extension", "name": "relay", "addon": "relay", "extension_group": "g1" },
                        { "type": "extension", "name": "sink", "addon": "journaling", "extension_group": "g2" }
                    ],
                    "connections": [
                        { "extension": "relay",
                          "cmd":  [ { "name": "forward", "dest": [ { "extension": "sink" } ] } ],
                          "data": [ { "name": "payload", "dest": [ { "extension": "sink" } ] } ] }
                    ]
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    // The relay forwards the command and a data message by name alone.
    let result = call_extension(&client, graph, "relay", Cmd::new("kick"));
    assert_eq!(result.status(), StatusCode::Ok);

    // Wait for the sink to see both.
    let deadline = std::time::Instant::now() + HARNESS_TIMEOUT;
    loop {
        let entries = journal_entries(&journal);
        let got_cmd = entries.contains(&"sink:on_cmd:forward".to_string());
        if got_cmd {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "sink never saw traffic: {entries:?}");
        std::thread::sleep(Duration::from_millis(10));
    }

    client.close().unwrap();
}

/// On `kick`, emits a destless `forward` command and a destless
/// `payload` data message; both route via connections.
struct RelayExtension;

impl Extension for RelayExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        env.send_cmd(Cmd::new("forward"), None).expect("send failed");
        env.send_data(Data::new("payload").with_buf(vec![1, 2, 3]))
            .expect("send failed");
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}

/// S3 at the harness: the extension dawdles past the tester's window
/// and the tester reports the timeout itself.
#[test]
fn harness_timeout_on_slow_extension() {
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "molasses", |_| {
            Box::new(SleepyExtension {
                delay: Duration::from_millis(1_000),
            })
        });
        builder
    });

    let graph = client.start_graph(single_node_graph("slow", "molasses")).unwrap();

    let dest = Loc::extension(client.uri(), graph, "slow");
    let err = client
        .call(Cmd::new("work").with_dest(dest), Duration::from_millis(500))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Timeout(_)));

    client.close().unwrap();
}

struct SleepyExtension {
    delay: Duration,
}

impl Extension for SleepyExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        std::thread::sleep(self.delay);
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}

/// The engine's outstanding-command tracker synthesizes a Timeout
/// result when an extension simply never answers.
#[test]
fn engine_synthesizes_timeout_for_silent_extension() {
    let mut client = spawn_app(|builder| {
        let builder = builder.cmd_timeout(Duration::from_millis(300));
        register_test_addon(builder.registry(), "mute", |_| Box::new(MuteExtension));
        builder
    });

    let graph = client.start_graph(single_node_graph("mute", "mute")).unwrap();

    let dest = Loc::extension(client.uri(), graph, "mute");
    let result = client
        .call(Cmd::new("speak").with_dest(dest), HARNESS_TIMEOUT)
        .unwrap();
    assert_eq!(result.status(), StatusCode::Timeout);

    client.close().unwrap();
}

/// Swallows commands without answering. Only the engine's sweep
/// rescues the sender.
struct MuteExtension;

impl Extension for MuteExtension {
    fn on_cmd(&mut self, _env: &mut dyn ExtensionEnv, _cmd: Cmd) {}
}

/// Captures everything shipped toward other apps.
struct FakeForwarder {
    captured: Arc<Mutex<Vec<Msg>>>,
}

impl RemoteForwarder for FakeForwarder {
    fn forward(&mut self, msg: Msg) -> Result<(), plexus_msg::codec::CodecError> {
        self.captured.lock().push(msg);
        Ok(())
    }
}

/// Cross-app destinations reach the wire seam with their routing
/// intact; the codec/transport beyond it is not the core's business.
#[test]
fn cross_app_traffic_reaches_the_forwarder_seam() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut client = {
        let captured = Arc::clone(&captured);
        spawn_app(move |builder| {
            register_test_addon(builder.registry(), "relay", |_| Box::new(FarRelayExtension));
            builder.remote_forwarder(Box::new(FakeForwarder { captured }))
        })
    };

    let graph = client
        .start_graph(
            GraphDescription::from_json(
                r#"{
                    "nodes": [
                        { "type": "extension", "name": "relay", "addon": "relay", "extension_group": "g" }
                    ],
                    "connections": [
                        { "extension": "relay",
                          "cmd": [ { "name": "process",
                                     "dest": [ { "app": "plexus://far:8088", "extension": "remote" } ] } ] }
                    ]
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    let result = call_extension(&client, graph, "relay", Cmd::new("kick"));
    assert_eq!(result.status(), StatusCode::Ok);

    let deadline = std::time::Instant::now() + HARNESS_TIMEOUT;
    loop {
        {
            let msgs = captured.lock();
            if let Some(Msg::Cmd(cmd)) = msgs.first() {
                assert_eq!(cmd.name(), "process");
                assert_eq!(
                    cmd.dests().first().and_then(|l| l.app_uri.as_deref()),
                    Some("plexus://far:8088")
                );
                break;
            }
        }
        assert!(std::time::Instant::now() < deadline, "forwarder never saw the command");
        std::thread::sleep(Duration::from_millis(10));
    }

    client.close().unwrap();
}

/// Without a transport, a cross-app command comes back RouteFailed to
/// its sender: still exactly one result.
#[test]
fn cross_app_without_transport_is_route_failed() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "relay", move |_| {
            Box::new(StatusRecordingRelay { journal: j.clone() })
        });
        builder
    });

    let graph = client
        .start_graph(
            GraphDescription::from_json(
                r#"{
                    "nodes": [
                        { "type": "extension", "name": "relay", "addon": "relay", "extension_group": "g" }
                    ],
                    "connections": [
                        { "extension": "relay",
                          "cmd": [ { "name": "process",
                                     "dest": [ { "app": "plexus://far:8088", "extension": "remote" } ] } ] }
                    ]
                }"#,
            )
            .unwrap(),
        )
        .unwrap();

    let result = call_extension(&client, graph, "relay", Cmd::new("kick"));
    assert_eq!(result.status(), StatusCode::Ok);

    let deadline = std::time::Instant::now() + HARNESS_TIMEOUT;
    loop {
        let entries = journal_entries(&journal);
        if entries.contains(&"result:route_failed".to_string()) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "sender never saw the failure: {entries:?}");
        std::thread::sleep(Duration::from_millis(10));
    }

    client.close().unwrap();
}

/// On `kick`, fires a `process` command toward the far app without
/// waiting for a result.
struct FarRelayExtension;

impl Extension for FarRelayExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        env.send_cmd(Cmd::new("process"), None).expect("send failed");
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}

/// Like [`FarRelayExtension`] but records the status of the far
/// command's result.
struct StatusRecordingRelay {
    journal: Journal,
}

impl Extension for StatusRecordingRelay {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let journal = self.journal.clone();
        let handler = move |_env: &mut dyn ExtensionEnv, result: CmdResult| {
            journal
                .lock()
                .expect("journal poisoned")
                .push(format!("result:{}", result.status()));
        };
        env.send_cmd(Cmd::new("process"), Some(Box::new(handler)))
            .expect("send failed");
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}
