//! Environment handles and proxies.
//!
//! An environment handle is the capability object through which an
//! attached owner — app, engine, extension, extension group, addon or
//! addon loader — interacts with the runtime. The attachment is a
//! tagged variant rather than virtual dispatch because every call site
//! already branches on what the handle is attached to.
//!
//! The extension-attached handle is
//! [`ExtEnv`](crate::extension_thread::ExtEnv), lent to extension
//! callbacks on their home thread. App- and engine-attached
//! environments surface as methods on [`App`](crate::App) and
//! [`Engine`](crate::Engine) reached through posted tasks. Addon and
//! addon-loader attachments only log, which is thread-free, so they
//! need no posting machinery.
//!
//! [`EnvProxy`] is the generic thread-safe front: a reference-counted
//! poster onto an owner's runloop. The extension-specific counterpart
//! with environment access is
//! [`EnvProxyHandle`](plexus_extension::EnvProxyHandle), minted via
//! `ExtensionEnv::create_proxy`.

mod proxy;

pub use proxy::EnvProxy;

/// What an environment handle is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvAttachTo {
    App,
    Engine,
    Extension,
    ExtensionGroup,
    Addon,
    AddonLoader,
}

impl EnvAttachTo {
    /// Attachment name for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Engine => "engine",
            Self::Extension => "extension",
            Self::ExtensionGroup => "extension_group",
            Self::Addon => "addon",
            Self::AddonLoader => "addon_loader",
        }
    }
}

impl std::fmt::Display for EnvAttachTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
