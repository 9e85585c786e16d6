//! Addon factories.
//!
//! An addon is a named factory registered with the app's addon store.
//! Graph nodes reference addons by name; at graph start the runtime
//! asks the addon for one instance per node, on the thread that will
//! own the instance.

use crate::Extension;

/// What kind of instances an addon manufactures.
///
/// The store is partitioned by type, so an extension addon and a
/// protocol addon may share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonType {
    Extension,
    ExtensionGroup,
    Protocol,
    AddonLoader,
}

impl AddonType {
    /// The type name as it appears in registration APIs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::ExtensionGroup => "extension_group",
            Self::Protocol => "protocol",
            Self::AddonLoader => "addon_loader",
        }
    }

    /// Parses a type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "extension" => Some(Self::Extension),
            "extension_group" => Some(Self::ExtensionGroup),
            "protocol" => Some(Self::Protocol),
            "addon_loader" => Some(Self::AddonLoader),
            _ => None,
        }
    }
}

impl std::fmt::Display for AddonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot completion token for [`Addon::on_create_instance`].
///
/// The addon may call [`done`](Self::done) inside `on_create_instance`
/// or hold the token and complete later (e.g. after loading a model on
/// a helper thread); the creation handshake finishes only when the
/// token fires.
pub struct CreateInstanceDone {
    complete: Box<dyn FnOnce(Box<dyn Extension>) + Send>,
}

impl CreateInstanceDone {
    /// Wraps the runtime's completion callback. Constructed by the
    /// runtime; addons only consume it.
    #[must_use]
    pub fn new(complete: impl FnOnce(Box<dyn Extension>) + Send + 'static) -> Self {
        Self {
            complete: Box::new(complete),
        }
    }

    /// Delivers the freshly created instance.
    pub fn done(self, instance: Box<dyn Extension>) {
        (self.complete)(instance);
    }
}

impl std::fmt::Debug for CreateInstanceDone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CreateInstanceDone")
    }
}

/// One-shot completion token for [`Addon::on_destroy_instance`].
pub struct DestroyInstanceDone {
    complete: Box<dyn FnOnce() + Send>,
}

impl DestroyInstanceDone {
    /// Wraps the runtime's completion callback.
    #[must_use]
    pub fn new(complete: impl FnOnce() + Send + 'static) -> Self {
        Self {
            complete: Box::new(complete),
        }
    }

    /// Signals that the instance has been disposed of.
    pub fn done(self) {
        (self.complete)();
    }
}

impl std::fmt::Debug for DestroyInstanceDone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DestroyInstanceDone")
    }
}

/// A named factory for extension instances.
///
/// Addons are shared process-wide and may be asked for instances from
/// several extension threads, so they must be `Send + Sync`; any
/// factory state needs its own synchronization.
pub trait Addon: Send + Sync {
    /// Called once while the addon is being registered, before the
    /// store entry is published.
    fn on_configure(&self) {}

    /// Manufactures one instance. Invoked on the thread that will own
    /// the instance; complete through `done`, immediately or later.
    fn on_create_instance(&self, instance_name: &str, done: CreateInstanceDone);

    /// Takes an instance back at teardown. The default drops it.
    fn on_destroy_instance(&self, instance: Box<dyn Extension>, done: DestroyInstanceDone) {
        drop(instance);
        done.done();
    }

    /// Called when the store is quiesced at app close. After this
    /// returns the addon will never be asked for instances again.
    fn on_destroy(&self) {}
}
