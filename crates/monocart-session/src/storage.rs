use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha1::{Digest, Sha1};

/// Stable key that namespaces the persistence directory for one ROM.
///
/// Single-ROM installations use a fixed configured name; installations
/// that can host several ROMs derive the key from the ROM bytes so
/// saves never leak between games. Computed once at provisioning time
/// and immutable for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomIdentity {
    Fixed(String),
    Digest(String),
}

impl RomIdentity {
    /// Identity derived from the ROM content (lowercase hex SHA-1).
    pub fn digest_of(rom: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(rom);
        Self::Digest(hex::encode(hasher.finalize()))
    }

    pub fn dir_name(&self) -> &str {
        match self {
            Self::Fixed(name) | Self::Digest(name) => name,
        }
    }
}

/// Named byte-blob slots under a per-ROM directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Battery-backed save RAM, overwritten on every backgrounding.
    Sram,
    /// Explicit user-triggered save-state.
    State,
    /// Additional numbered save-state slots.
    NumberedState(u32),
    /// Implicit snapshot written before backgrounding, consumed on the
    /// next launch for crash/kill recovery.
    TempState,
    /// Persisted emulator settings blob.
    Settings,
}

impl Slot {
    fn file_name(&self) -> String {
        match self {
            Self::Sram => "sram".into(),
            Self::State => "state".into(),
            Self::NumberedState(n) => format!("state-{n}"),
            Self::TempState => "tempstate".into(),
            Self::Settings => "settings".into(),
        }
    }
}

/// Persistence store for one ROM identity. Pure file I/O; callers own
/// all ordering.
#[derive(Debug, Clone)]
pub struct GameStorage {
    dir: PathBuf,
}

impl GameStorage {
    /// Opens (and creates if needed) the identity directory under
    /// `root`. The root is an explicit dependency, never a process
    /// global, so stores can be pointed at scratch directories in
    /// tests.
    pub fn open(root: impl AsRef<Path>, identity: &RomIdentity) -> io::Result<Self> {
        let dir = root.as_ref().join(identity.dir_name());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Reads a slot. A missing file or a zero-length blob both read as
    /// `None`: "no prior state" is normal, not an error.
    pub fn read(&self, slot: Slot) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(slot)) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fully overwrites a slot with the given bytes.
    pub fn write(&self, slot: Slot, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.path(slot), bytes)
    }

    /// Removes a slot; removing an absent slot is not an error.
    pub fn remove(&self, slot: Slot) -> io::Result<()> {
        match fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
