//! Extension groups.

use crate::affinity::ThreadAffinity;

/// A named set of extensions co-located on one extension thread.
///
/// The group object travels with its thread: it is built on the engine
/// thread while the extension thread object is assembled, then latched
/// to the OS thread at the top of the thread's main function, together
/// with everything else the thread owns.
#[derive(Debug)]
pub struct ExtensionGroup {
    name: String,
    affinity: ThreadAffinity,
}

impl ExtensionGroup {
    /// Creates a group with an unset affinity tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affinity: ThreadAffinity::new(),
        }
    }

    /// The group name (also the extension thread's name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latches the group to the calling thread.
    pub fn latch_to_current_thread(&self) {
        self.affinity.latch_to_current();
    }

    /// Asserts the calling thread owns the group.
    pub fn assert_on_owner(&self) {
        self.affinity.assert_on_owner("extension group");
    }
}
