//! Hello round-trip scenarios: the basic command/result contract.

mod common;

use common::*;
use plexus_msg::Cmd;
use plexus_runtime::builtin::register_builtin_addons;
use plexus_types::{Loc, StatusCode};

/// A command to a known extension gets exactly one Ok result with the
/// extension's payload.
#[test]
fn hello_round_trip() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "hello", move |_name| {
            Box::new(HelloExtension { journal: j.clone() })
        });
        builder
    });

    let graph = client.start_graph(single_node_graph("greeter", "hello")).unwrap();

    let result = call_extension(&client, graph, "greeter", Cmd::new("hello_world"));
    assert_eq!(result.status(), StatusCode::Ok);
    assert_eq!(result.detail(), Some("hello world, too"));

    assert!(journal_entries(&journal).contains(&"on_cmd:hello_world".to_string()));
    client.close().unwrap();
}

/// An unknown command is answered by the extension with Error; nothing
/// crashes and the sender is not left hanging.
#[test]
fn unknown_command_yields_error() {
    let journal = new_journal();
    let j = journal.clone();
    let mut client = spawn_app(|builder| {
        register_test_addon(builder.registry(), "hello", move |_name| {
            Box::new(HelloExtension { journal: j.clone() })
        });
        builder
    });

    let graph = client.start_graph(single_node_graph("greeter", "hello")).unwrap();

    let result = call_extension(&client, graph, "greeter", Cmd::new("unknown_cmd"));
    assert_eq!(result.status(), StatusCode::Error);
    assert_eq!(result.detail(), Some("unknown command"));

    // The extension is still alive afterwards.
    let result = call_extension(&client, graph, "greeter", Cmd::new("hello_world"));
    assert_eq!(result.status(), StatusCode::Ok);
    client.close().unwrap();
}

/// A command addressed to an extension the graph does not contain
/// comes back RouteFailed.
#[test]
fn unknown_destination_is_route_failed() {
    let mut client = spawn_app(|builder| {
        register_builtin_addons(builder.registry());
        builder
    });

    let graph = client.start_graph(single_node_graph("echoer", "echo")).unwrap();

    let dest = Loc::extension(client.uri(), graph, "nobody");
    let result = client
        .call(Cmd::new("hello_world").with_dest(dest), HARNESS_TIMEOUT)
        .unwrap();
    assert_eq!(result.status(), StatusCode::RouteFailed);
    client.close().unwrap();
}

/// The stock echo addon reflects properties back.
#[test]
fn echo_reflects_properties() {
    let mut client = spawn_app(|builder| {
        register_builtin_addons(builder.registry());
        builder
    });

    let graph = client.start_graph(single_node_graph("echoer", "echo")).unwrap();

    let cmd = Cmd::new("anything").with_property("data", data_value(7));
    let result = call_extension(&client, graph, "echoer", cmd);
    assert_eq!(result.status(), StatusCode::Ok);
    assert_eq!(data_of(&result), 7);
    client.close().unwrap();
}
