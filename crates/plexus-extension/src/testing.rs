//! Test doubles for extension code.
//!
//! [`RecordingExtension`] notes every callback it receives so tests can
//! assert lifecycle ordering without writing a bespoke mock each time.

use crate::{Extension, ExtensionEnv};
use plexus_msg::{AudioFrame, Cmd, CmdResult, Data, VideoFrame};
use plexus_types::StatusCode;
use std::sync::{Arc, Mutex};

/// Shared journal of callback names, in arrival order.
pub type CallJournal = Arc<Mutex<Vec<String>>>;

/// An extension that records its callbacks and answers every command
/// with `Ok`.
pub struct RecordingExtension {
    journal: CallJournal,
}

impl RecordingExtension {
    /// Creates the extension and the journal it writes to.
    #[must_use]
    pub fn new() -> (Self, CallJournal) {
        let journal: CallJournal = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                journal: Arc::clone(&journal),
            },
            journal,
        )
    }

    fn record(&self, entry: impl Into<String>) {
        self.journal
            .lock()
            .expect("journal poisoned")
            .push(entry.into());
    }
}

impl Extension for RecordingExtension {
    fn on_configure(&mut self, env: &mut dyn ExtensionEnv) {
        self.record("on_configure");
        env.on_configure_done();
    }

    fn on_init(&mut self, env: &mut dyn ExtensionEnv) {
        self.record("on_init");
        env.on_init_done();
    }

    fn on_start(&mut self, env: &mut dyn ExtensionEnv) {
        self.record("on_start");
        env.on_start_done();
    }

    fn on_stop(&mut self, env: &mut dyn ExtensionEnv) {
        self.record("on_stop");
        env.on_stop_done();
    }

    fn on_deinit(&mut self, env: &mut dyn ExtensionEnv) {
        self.record("on_deinit");
        env.on_deinit_done();
    }

    fn on_cmd(&mut self, env: &mut dyn ExtensionEnv, cmd: Cmd) {
        self.record(format!("on_cmd:{}", cmd.name()));
        let _ = env.return_result(CmdResult::from_cmd(&cmd, StatusCode::Ok));
    }

    fn on_data(&mut self, _env: &mut dyn ExtensionEnv, data: Data) {
        self.record(format!("on_data:{}", data.name()));
    }

    fn on_audio_frame(&mut self, _env: &mut dyn ExtensionEnv, frame: AudioFrame) {
        self.record(format!("on_audio_frame:{}", frame.name()));
    }

    fn on_video_frame(&mut self, _env: &mut dyn ExtensionEnv, frame: VideoFrame) {
        self.record(format!("on_video_frame:{}", frame.name()));
    }
}
