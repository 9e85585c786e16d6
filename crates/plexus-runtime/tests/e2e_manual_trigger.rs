//! Manual lifecycle triggers: start and stop gated on external
//! TRIGGER_LIFE_CYCLE commands.

mod common;

use common::*;
use plexus_extension::{Extension, ExtensionEnv};
use plexus_msg::graph::{GraphDescription, GraphNode};
use plexus_msg::{Cmd, CmdResult};
use plexus_types::{Loc, Stage, StatusCode};
use std::time::Duration;

/// Answers `test` with Error until its own `on_start` has run.
struct GatedExtension {
    journal: Journal,
    started: bool,
}

impl Extension for GatedExtension {
    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        self.started = true;
        self.journal
            .lock()
            .expect("journal poisoned")
            .push("on_start".into());
        env.on_start_done();
    }

    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        self.journal
            .lock()
            .expect("journal poisoned")
            .push("on_stop".into());
        env.on_stop_done();
    }

    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let result = if self.started {
            CmdResult::from_cmd(&cmd, StatusCode::Ok).with_detail("started")
        } else {
            CmdResult::from_cmd(&cmd, StatusCode::Error).with_detail("not started")
        };
        env.return_result(result).expect("reply failed");
    }
}

fn gated_graph() -> GraphDescription {
    let graph = GraphDescription {
        nodes: vec![GraphNode::extension("gated", "gated", "default")
            .with_manual_trigger(&[Stage::Start, Stage::Stop])],
        connections: Vec::new(),
    };
    graph.validate().expect("graph invalid");
    graph
}

/// Before the start trigger the extension answers for itself; after
/// the trigger (whose result arrives only once start completed) the
/// same command succeeds.
#[test]
fn start_is_gated_on_trigger() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "gated", move |_name| {
            Box::new(GatedExtension {
                journal: j.clone(),
                started: false,
            })
        });
        builder
    });

    let graph = client.start_graph(gated_graph()).unwrap();

    // Reachable but not started: the extension rejects traffic itself.
    let result = call_extension(&client, graph, "gated", Cmd::new("test"));
    assert_eq!(result.status(), StatusCode::Error);
    assert_eq!(result.detail(), Some("not started"));
    assert!(journal_entries(&journal).is_empty());

    // Release the gate. The trigger's result only comes back after
    // start_done.
    let trigger = Cmd::trigger_life_cycle(Stage::Start)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let result = client.call(trigger, HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Ok);
    assert!(journal_entries(&journal).contains(&"on_start".to_string()));

    let result = call_extension(&client, graph, "gated", Cmd::new("test"));
    assert_eq!(result.status(), StatusCode::Ok);
    assert_eq!(result.detail(), Some("started"));

    // Release the stop gate so close-down is orderly.
    let trigger = Cmd::trigger_life_cycle(Stage::Stop)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let _ = client.submit_cmd(trigger).unwrap();
    client.close().unwrap();
}

/// Stop stays deferred until a matching trigger arrives; the graph's
/// close then completes.
#[test]
fn stop_is_gated_on_trigger() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "gated", move |_name| {
            Box::new(GatedExtension {
                journal: j.clone(),
                started: false,
            })
        });
        builder
    });

    let graph = client.start_graph(gated_graph()).unwrap();

    let trigger = Cmd::trigger_life_cycle(Stage::Start)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    assert!(client.call(trigger, HARNESS_TIMEOUT).unwrap().is_ok());

    // Ask the graph to stop; the gated extension must hold its stop
    // stage until triggered.
    let stop_rx = client
        .submit_cmd(Cmd::stop_graph().with_dest(Loc::graph(client.uri(), graph)))
        .unwrap();
    std::thread::sleep(Duration::from_millis(150));
    assert!(
        !journal_entries(&journal).contains(&"on_stop".to_string()),
        "stop ran without its trigger"
    );

    let trigger = Cmd::trigger_life_cycle(Stage::Stop)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let result = client.call(trigger, HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Ok);
    assert!(journal_entries(&journal).contains(&"on_stop".to_string()));

    let stop_result = stop_rx.recv_timeout(HARNESS_TIMEOUT).unwrap();
    assert_eq!(stop_result.status(), StatusCode::Ok);

    client.close().unwrap();
}

/// A trigger naming a stage that cannot be gated is answered with an
/// error.
#[test]
fn unrecognized_stage_is_rejected() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "gated", move |_name| {
            Box::new(GatedExtension {
                journal: j.clone(),
                started: false,
            })
        });
        builder
    });

    let graph = client.start_graph(gated_graph()).unwrap();

    // Deinit is not a triggerable stage.
    let trigger = Cmd::trigger_life_cycle(Stage::Deinit)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let result = client.call(trigger, HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Error);

    // A garbage stage string is equally rejected.
    let trigger = Cmd::with_kind("trigger_life_cycle", plexus_msg::CmdKind::TriggerLifeCycle)
        .with_property("stage", serde_json::json!("reboot"))
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let result = client.call(trigger, HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Error);
    assert_eq!(result.detail(), Some("unrecognized life cycle stage"));

    // Release the gate so close-down is orderly.
    let trigger = Cmd::trigger_life_cycle(Stage::Start)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    assert!(client.call(trigger, HARNESS_TIMEOUT).unwrap().is_ok());
    let trigger = Cmd::trigger_life_cycle(Stage::Stop)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let _ = client.submit_cmd(trigger).unwrap();
    client.close().unwrap();
}

/// A start trigger that arrives while the extension is still in init
/// is remembered and fires the stage as soon as init completes.
///
/// The init window is held open deterministically: the gated extension
/// defers `init_done` until a command to a deliberately slow peer
/// comes back. This also exercises result delivery during init —
/// results answer the extension's own sends and are exempt from
/// pre-start queueing.
#[test]
fn early_trigger_fires_when_stage_is_reached() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "gated_async", move |_name| {
            Box::new(AsyncInitGatedExtension {
                journal: j.clone(),
                started: false,
            })
        });
        register_test_addon(builder.registry(), "slow_echo", |_name| {
            Box::new(SlowEchoExtension {
                reply_delay: Duration::from_millis(250),
            })
        });
        builder
    });

    let graph_desc = GraphDescription::from_json(
        r#"{
            "nodes": [
                { "type": "extension", "name": "gated", "addon": "gated_async",
                  "extension_group": "default",
                  "property": { "plexus": { "manual_trigger_life_cycle": [ { "stage": "start" } ] } } },
                { "type": "extension", "name": "echo", "addon": "slow_echo",
                  "extension_group": "default" }
            ],
            "connections": [
                { "extension": "gated",
                  "cmd": [ { "name": "ping", "dest": [ { "extension": "echo" } ] } ] }
            ]
        }"#,
    )
    .unwrap();

    let graph = client.start_graph(graph_desc).unwrap();

    // The gated extension is inside its init window for ~250ms now;
    // this trigger lands early and must be remembered.
    let trigger = Cmd::trigger_life_cycle(Stage::Start)
        .with_dest(Loc::extension(client.uri(), graph, "gated"));
    let result = client.call(trigger, HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Ok);
    assert!(journal_entries(&journal).contains(&"on_start".to_string()));

    client.close().unwrap();
}

/// Defers `init_done` until a `ping` to its peer is answered; start is
/// gated on a manual trigger.
struct AsyncInitGatedExtension {
    journal: Journal,
    started: bool,
}

impl Extension for AsyncInitGatedExtension {
    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        env.send_cmd(
            Cmd::new("ping"),
            Some(Box::new(|env, _result| env.on_init_done())),
        )
        .expect("ping send failed");
    }

    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        self.started = true;
        self.journal
            .lock()
            .expect("journal poisoned")
            .push("on_start".into());
        env.on_start_done();
    }

    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let status = if self.started {
            StatusCode::Ok
        } else {
            StatusCode::Error
        };
        env.return_result(CmdResult::from_cmd(&cmd, status))
            .expect("reply failed");
    }
}

/// Answers everything Ok after a fixed delay.
struct SlowEchoExtension {
    reply_delay: Duration,
}

impl Extension for SlowEchoExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        std::thread::sleep(self.reply_delay);
        env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok))
            .expect("reply failed");
    }
}
