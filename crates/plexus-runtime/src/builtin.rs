//! Stock addons.

use plexus_extension::{Addon, CreateInstanceDone, Extension, ExtensionEnv};
use plexus_msg::{Cmd, CmdResult};
use plexus_types::StatusCode;
use std::sync::Arc;

/// Extension that answers every command with `Ok`, echoing the
/// command's properties back on the result. Handy for wiring checks
/// and as a minimal reference implementation.
pub struct EchoExtension;

impl Extension for EchoExtension {
    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        let mut result = CmdResult::from_cmd(&cmd, StatusCode::Ok).with_detail("echo");
        for (key, value) in cmd.properties() {
            result.set_property(key.clone(), value.clone());
        }
        if let Err(err) = env.return_result(result) {
            tracing::warn!(extension = env.extension_name(), %err, "echo reply failed");
        }
    }
}

/// Factory for [`EchoExtension`].
pub struct EchoAddon;

impl Addon for EchoAddon {
    fn on_create_instance(&self, _instance_name: &str, done: CreateInstanceDone) {
        done.done(Box::new(EchoExtension));
    }
}

/// Registers the stock addons under their conventional names
/// (`echo`).
pub fn register_builtin_addons(registry: &crate::AddonRegistry) {
    let _ = registry.register_blocking(
        plexus_extension::AddonType::Extension,
        "echo",
        Arc::new(EchoAddon),
    );
}
