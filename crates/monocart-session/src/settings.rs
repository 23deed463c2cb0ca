use std::io;

use monocart_core::CoreView;
use serde::{Deserialize, Serialize};

use crate::storage::{GameStorage, Slot};

/// Emulator settings that survive across launches: the pair of
/// toggles the in-session menu controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub frame_speed: u32,
    pub audio_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_speed: 1,
            audio_enabled: true,
        }
    }
}

impl Settings {
    /// Snapshot of the live core's current values.
    pub fn capture(core: &dyn CoreView) -> Self {
        Self {
            frame_speed: core.frame_speed(),
            audio_enabled: core.audio_enabled(),
        }
    }

    /// Pushes the persisted values onto the live core.
    pub fn apply(&self, core: &dyn CoreView) {
        core.set_frame_speed(self.frame_speed);
        core.set_audio_enabled(self.audio_enabled);
    }

    /// Loads the persisted settings. An absent or unreadable blob
    /// falls back to defaults; stale settings are never worth failing
    /// session bring-up over.
    pub fn load(store: &GameStorage) -> Self {
        match store.read(Slot::Settings) {
            Ok(Some(bytes)) => match postcard::from_bytes(&bytes) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(error = %e, "settings blob unreadable, using defaults");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "settings read failed, using defaults");
                Self::default()
            }
        }
    }

    pub fn store(&self, store: &GameStorage) -> io::Result<()> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        store.write(Slot::Settings, &bytes)
    }
}
