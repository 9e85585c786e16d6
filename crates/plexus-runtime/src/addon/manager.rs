//! Addon registration and the instance-creation handshake.

use super::{AddonError, AddonStore};
use crate::extension_thread::ExtensionThread;
use crate::runloop::RunloopHandle;
use plexus_extension::{Addon, AddonType, CreateInstanceDone, DestroyInstanceDone, Extension};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner of the addon store; lives on the app thread.
///
/// Registration follows the asynchronous protocol: the factory's
/// `on_configure` runs first, the store entry is published, then the
/// caller's `done` callback fires. Only after `done` may graphs name
/// the addon.
pub struct AddonRegistry {
    store: Arc<AddonStore>,
}

impl AddonRegistry {
    /// Creates a registry with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(AddonStore::new()),
        }
    }

    /// A shared handle to the store for engines and extension threads.
    #[must_use]
    pub fn store(&self) -> Arc<AddonStore> {
        Arc::clone(&self.store)
    }

    /// Registers a factory. `done` fires once the entry is published
    /// (or with the rejection).
    pub fn register(
        &self,
        addon_type: AddonType,
        name: &str,
        addon: Arc<dyn Addon>,
        done: impl FnOnce(Result<(), AddonError>) + Send + 'static,
    ) {
        addon.on_configure();
        let result = self.store.insert(addon_type, name, addon);
        match &result {
            Ok(()) => info!(%addon_type, name, "addon registered"),
            Err(err) => warn!(%addon_type, name, %err, "addon registration rejected"),
        }
        done(result);
    }

    /// Convenience for callers with nothing to do asynchronously.
    pub fn register_blocking(
        &self,
        addon_type: AddonType,
        name: &str,
        addon: Arc<dyn Addon>,
    ) -> Result<(), AddonError> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.register(addon_type, name, addon, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Ok(()))
    }

    /// Quiesces the store at app close: every factory's `on_destroy`
    /// runs, then the single completion callback. No factory outlives
    /// the app.
    pub fn unregister_all_and_cleanup_after_app_close(&self, done: impl FnOnce() + Send + 'static) {
        let drained = self.store.drain();
        let count = drained.len();
        for (addon_type, name, addon) in drained {
            debug!(%addon_type, name = %name, "destroying addon");
            addon.on_destroy();
        }
        info!(count, "addon store quiesced");
        done();
    }
}

impl Default for AddonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Which runloop the factory call lands on, and who hears back.
///
/// Protocol and addon-loader instances are manufactured by external
/// collaborators (the wire layer and the module loader); their flows
/// terminate outside the core, so only the extension-thread flows are
/// represented here.
pub enum AddonContextFlow {
    /// An extension thread wants one extension instance.
    ExtensionThreadCreateExtension {
        thread: RunloopHandle<ExtensionThread>,
    },
    /// An extension thread returns an instance at teardown.
    ExtensionThreadDestroyExtension {
        thread: RunloopHandle<ExtensionThread>,
    },
}

/// A one-shot request driving one create or destroy handshake.
/// Consumed when the handshake completes.
pub struct AddonContext {
    pub addon_type: AddonType,
    pub addon_name: String,
    pub instance_name: String,
    pub flow: AddonContextFlow,
}

/// Resolves `(type, name)` in the store and posts the factory's
/// `on_create_instance` onto the flow target's runloop. When the
/// factory completes its token, the instance is posted back to the
/// requesting thread's `on_create_instance_done`.
pub fn create_instance_async(store: &AddonStore, ctx: AddonContext) -> Result<(), AddonError> {
    let addon = store
        .find(ctx.addon_type, &ctx.addon_name)
        .ok_or(AddonError::NotFound {
            addon_type: ctx.addon_type,
            name: ctx.addon_name.clone(),
        })?;

    match ctx.flow {
        AddonContextFlow::ExtensionThreadCreateExtension { thread } => {
            let instance_name = ctx.instance_name;
            let completion_thread = thread.clone();
            thread
                .post_task_tail(move |_t: &mut ExtensionThread| {
                    let name_for_done = instance_name.clone();
                    let done = CreateInstanceDone::new(move |instance: Box<dyn Extension>| {
                        let name = name_for_done.clone();
                        if completion_thread
                            .post_task_tail(move |t: &mut ExtensionThread| {
                                t.on_create_instance_done(name, instance)
                            })
                            .is_err()
                        {
                            warn!("instance created after its thread's runloop was destroyed");
                        }
                    });
                    addon.on_create_instance(&instance_name, done);
                })
                .map_err(|err| AddonError::FlowTargetGone(err.to_string()))
        }
        AddonContextFlow::ExtensionThreadDestroyExtension { .. } => Err(AddonError::FlowTargetGone(
            "destroy flow requires an instance; use destroy_instance_async".into(),
        )),
    }
}

/// Posts the factory's `on_destroy_instance` onto the flow target's
/// runloop; the completion is posted back to
/// `on_destroy_instance_done`.
pub fn destroy_instance_async(
    store: &AddonStore,
    ctx: AddonContext,
    instance: Box<dyn Extension>,
) -> Result<(), AddonError> {
    let addon = store
        .find(ctx.addon_type, &ctx.addon_name)
        .ok_or(AddonError::NotFound {
            addon_type: ctx.addon_type,
            name: ctx.addon_name.clone(),
        })?;

    match ctx.flow {
        AddonContextFlow::ExtensionThreadDestroyExtension { thread } => {
            let instance_name = ctx.instance_name;
            let completion_thread = thread.clone();
            thread
                .post_task_tail(move |_t: &mut ExtensionThread| {
                    let name_for_done = instance_name.clone();
                    let done = DestroyInstanceDone::new(move || {
                        let name = name_for_done.clone();
                        let _ = completion_thread.post_task_tail(
                            move |t: &mut ExtensionThread| t.on_destroy_instance_done(name),
                        );
                    });
                    addon.on_destroy_instance(instance, done);
                })
                .map_err(|err| AddonError::FlowTargetGone(err.to_string()))
        }
        AddonContextFlow::ExtensionThreadCreateExtension { .. } => Err(AddonError::FlowTargetGone(
            "create flow carries no instance; use create_instance_async".into(),
        )),
    }
}
