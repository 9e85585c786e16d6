//! Close-down choreography, including the close-under-create race.

mod common;

use common::*;
use plexus_msg::Cmd;
use plexus_types::{Loc, StatusCode};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// S6: a stop chases the start before any instance has finished
/// creating. Nothing asserts; once creation lands the thread goes
/// straight into teardown without ever entering its normal phase, and
/// no instance leaks.
#[test]
fn stop_during_instance_creation_is_clean() {
    let journal = new_journal();
    let j = journal.clone();
    let mut counters_handle = None;
    let mut client = spawn_app(|builder| {
        let counters = register_test_addon_with_delay(
            builder.registry(),
            "slow_create",
            Duration::from_millis(200),
            move |name| {
                Box::new(JournalingExtension {
                    journal: j.clone(),
                    name_hint: name.to_string(),
                })
            },
        );
        counters_handle = Some(counters);
        builder
    });
    let counters = counters_handle.expect("counters");

    let start_rx = client
        .submit_cmd(Cmd::start_graph(single_node_graph("worker", "slow_create")))
        .unwrap();

    // The stop needs the graph id; fish it out of the app by racing
    // a second command is not possible, so stop via close_app which
    // closes every engine regardless of id.
    let close_result = client.close().unwrap();
    assert_eq!(close_result.status(), StatusCode::Ok);

    // The start never completed: its engine closed first.
    let start_result = start_rx.recv_timeout(HARNESS_TIMEOUT).unwrap();
    assert_eq!(start_result.status(), StatusCode::Closed);

    // The instance that was mid-creation was still created, then
    // destroyed, and its lifecycle never ran.
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
    assert!(
        journal_entries(&journal).is_empty(),
        "lifecycle ran despite close-under-create: {:?}",
        journal_entries(&journal)
    );
}

/// Stopping a graph leaves the app serving other graphs.
#[test]
fn stop_graph_is_isolated() {
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

    let first = client
        .start_graph(single_node_graph("alpha", "journaling"))
        .unwrap();
    let second = client
        .start_graph(single_node_graph("beta", "journaling"))
        .unwrap();

    let result = client.stop_graph(first).unwrap();
    assert_eq!(result.status(), StatusCode::Ok);

    // The second graph still answers.
    let result = call_extension(&client, second, "beta", Cmd::new("ping"));
    assert_eq!(result.status(), StatusCode::Ok);

    // Commands to the stopped graph are rejected at the app.
    let dest = Loc::extension(client.uri(), first, "alpha");
    let result = client
        .call(Cmd::new("ping").with_dest(dest), HARNESS_TIMEOUT)
        .unwrap();
    assert_eq!(result.status(), StatusCode::RouteFailed);

    client.close().unwrap();
}

/// Stopping an unknown graph is an error result, not a hang.
#[test]
fn stop_unknown_graph_errors() {
    let mut client = spawn_app(|builder| builder);
    let result = client.stop_graph(plexus_types::GraphId::new()).unwrap();
    assert_eq!(result.status(), StatusCode::Error);
    client.close().unwrap();
}

/// Graph start with an unregistered addon fails the start command and
/// tears the engine down; the app survives.
#[test]
fn unknown_addon_fails_graph_start() {
    let mut client = spawn_app(|builder| builder);

    let rx = client
        .submit_cmd(Cmd::start_graph(single_node_graph("worker", "ghost")))
        .unwrap();
    let result = rx.recv_timeout(HARNESS_TIMEOUT).unwrap();
    assert_eq!(result.status(), StatusCode::Error);
    assert!(result.detail().unwrap_or("").contains("ghost"));

    client.close().unwrap();
}

/// Closing the app with graphs still running tears everything down in
/// order and quiesces the addon store.
#[test]
fn close_app_with_running_graphs() {
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

    let _g1 = client
        .start_graph(single_node_graph("alpha", "journaling"))
        .unwrap();
    let _g2 = client
        .start_graph(single_node_graph("beta", "journaling"))
        .unwrap();

    let result = client.close().unwrap();
    assert_eq!(result.status(), StatusCode::Ok);

    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    assert_eq!(counters.destroyed.load(Ordering::SeqCst), 2);

    let entries = journal_entries(&journal);
    for name in ["alpha", "beta"] {
        assert!(entries.contains(&format!("{name}:on_stop")), "{name} missing on_stop");
        assert!(entries.contains(&format!("{name}:on_deinit")), "{name} missing on_deinit");
    }
}
