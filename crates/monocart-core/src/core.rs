use std::{fmt, path::PathBuf, sync::Arc};

use crossbeam_channel::Receiver;

use crate::variables::Variable;

/// Content that may arrive either as a file on disk or as raw bytes.
///
/// The core binary and the ROM both take this shape: a provisioned
/// installation hands the core a path, while single-ROM builds that
/// embed the game image pass the bytes directly.
#[derive(Debug, Clone)]
pub enum ByteSource {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

impl ByteSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(bytes))
    }
}

/// Everything required to construct the embedded core view.
#[derive(Debug, Clone)]
pub struct CoreViewData {
    /// The emulation core binary.
    pub core: ByteSource,
    /// The game image the core should load.
    pub rom: ByteSource,
    /// Initial battery-backed save RAM; empty when no prior save exists.
    pub sram: Vec<u8>,
    /// Core configuration variables applied during construction.
    pub variables: Vec<Variable>,
}

impl CoreViewData {
    pub fn new(core: ByteSource, rom: ByteSource) -> Self {
        Self {
            core,
            rom,
            sram: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn with_sram(mut self, sram: Vec<u8>) -> Self {
        self.sram = sram;
        self
    }

    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = variables;
        self
    }
}

/// Key transition carried by a routed input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// Logical motion sources the core multiplexes onto one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionSource {
    DPad,
    AnalogLeft,
    AnalogRight,
}

/// Events emitted by the core view after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEvent {
    /// A frame finished rendering. The first occurrence drives the
    /// session readiness barrier; later ones are ignored by it.
    FrameRendered,
    /// The core cannot continue. Always fatal to the session.
    Fault(CoreFault),
}

/// Fatal conditions the core reports, each mapped to a distinct
/// user-facing diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoreFault {
    #[error("failed to load the emulation core")]
    LoadCore,
    #[error("failed to load the game image")]
    LoadGame,
    #[error("the graphics driver is not compatible with this core")]
    IncompatibleGraphics,
}

/// Error returned by core serialization entry points.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("the core does not support state serialization")]
    Unsupported,
    #[error("core serialization failed: {0}")]
    Serialize(String),
}

/// The live embedded core view.
///
/// Construction happens exactly once per session through a
/// [`CoreFactory`]. All methods take `&self`: the session coordinator
/// guarantees by ordering that at most one thread calls into the core
/// at a time (construction/input on the host UI thread, restore on the
/// worker after the readiness barrier opens), and implementations are
/// expected to expose the thread-safe serialize/unserialize entry
/// points libretro-style cores provide.
pub trait CoreView: Send + Sync {
    /// Forwards a key transition for the given controller port.
    fn send_key_event(&self, action: KeyAction, keycode: i32, port: u8);

    /// Forwards one logical motion source reading for the given port.
    fn send_motion_event(&self, source: MotionSource, x: f32, y: f32, port: u8);

    /// Serializes the full execution state as an opaque blob.
    fn serialize_state(&self) -> Result<Vec<u8>, CoreError>;

    /// Restores previously serialized state.
    ///
    /// Returns `false` when the core's internal save-state machinery is
    /// not ready yet, which can happen even after the first frame has
    /// rendered. Callers treat that as a soft race and retry.
    fn unserialize_state(&self, bytes: &[u8]) -> bool;

    /// Serializes the battery-backed save RAM.
    fn serialize_sram(&self) -> Vec<u8>;

    /// Soft-resets the emulated machine.
    fn reset(&self);

    fn audio_enabled(&self) -> bool;
    fn set_audio_enabled(&self, enabled: bool);

    /// Emulation speed multiplier; `1` is realtime.
    fn frame_speed(&self) -> u32;
    fn set_frame_speed(&self, speed: u32);

    /// Number of disks the loaded content exposes; `0` for single-disk
    /// or cartridge content.
    fn available_disks(&self) -> u32 {
        0
    }

    fn current_disk(&self) -> u32 {
        0
    }

    /// Switches to the given disk index. Out-of-range indices are
    /// ignored by implementations.
    fn change_disk(&self, _index: u32) {}

    /// The core's event stream. Each call returns a receiver attached
    /// to the same underlying stream.
    fn events(&self) -> Receiver<CoreEvent>;
}

impl fmt::Debug for dyn CoreView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CoreView")
    }
}

/// Construction seam for the embedded core view.
///
/// Construction failure signals a configuration problem (missing or
/// incompatible core binary, unsupported GPU) that provisioning cannot
/// fix; the session treats it as fatal and never retries.
pub trait CoreFactory {
    fn construct(&self, data: CoreViewData) -> Result<Box<dyn CoreView>, CoreFault>;
}
