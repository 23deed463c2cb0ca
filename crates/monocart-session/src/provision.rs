use std::{
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use monocart_core::ByteSource;
use tar::Archive;
use zip::ZipArchive;

use crate::storage::{GameStorage, RomIdentity, Slot};

/// Where provisioned assets live. Explicit constructor input so the
/// provisioner can be pointed at scratch directories in tests.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Durable data: per-ROM persistence directories and system files.
    pub data_dir: PathBuf,
    /// Re-creatable assets: the ROM copy and the core binary.
    pub cache_dir: PathBuf,
}

impl StorageLayout {
    pub fn system_dir(&self) -> PathBuf {
        self.data_dir.join("system")
    }

    pub fn rom_path(&self) -> PathBuf {
        self.cache_dir.join("rom")
    }

    pub fn core_path(&self, core_name: &str, abi: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{core_name}_libretro_{abi}.so"))
    }
}

/// How the per-ROM persistence directory is keyed.
#[derive(Debug, Clone)]
pub enum IdentitySource {
    /// Fixed configured name; single-ROM installations.
    Fixed(String),
    /// Content hash of the ROM bytes; multi-ROM installations.
    RomDigest,
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Core name as published by the build service, e.g. `gambatte`.
    pub core_name: String,
    /// Platform ABI segment of the download URL.
    pub abi: String,
    /// Download URL template; `{abi}` and `{core}` are substituted.
    pub core_url_template: String,
    /// The configured ROM source (bundled bytes or a file path).
    pub rom: ByteSource,
    /// Optional BIOS/system `tar.gz` archive to extract once.
    pub system_archive: Option<PathBuf>,
    /// When set, the core receives the ROM as raw bytes instead of the
    /// cached file path.
    pub load_rom_bytes: bool,
    pub identity: IdentitySource,
}

impl ProvisionConfig {
    pub const DEFAULT_CORE_URL_TEMPLATE: &'static str =
        "https://buildbot.libretro.com/nightly/android/latest/{abi}/{core}_libretro_android.so.zip";

    fn core_url(&self) -> String {
        self.core_url_template
            .replace("{abi}", &self.abi)
            .replace("{core}", &self.core_name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Connectivity failure while downloading the core binary. The
    /// only user-visible provisioning failure: with no cached core the
    /// session cannot start, and the host offers exit only. Must never
    /// be conflated with a core-load fault.
    #[error("failed to fetch the core binary from {url}: {error}")]
    Fetch { url: String, error: String },
    /// The downloaded archive did not contain a usable core binary.
    #[error("core archive unusable: {0}")]
    CoreUnpack(String),
    #[error("provisioning I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Download seam for the core binary, so provisioning is testable
/// without the network.
pub trait CoreFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError>;
}

/// Fetches over HTTP. Runs on the provisioning worker; the request
/// blocks for the duration of the download.
pub struct HttpFetcher;

impl CoreFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let mut response = ureq::get(url).call().map_err(|e| ProvisionError::Fetch {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        response
            .body_mut()
            .read_to_vec()
            .map_err(|e| ProvisionError::Fetch {
                url: url.to_string(),
                error: e.to_string(),
            })
    }
}

/// Output of a successful provisioning run: everything the session
/// coordinator needs to construct the core.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub core_path: PathBuf,
    pub rom: ByteSource,
    pub identity: RomIdentity,
    /// Prior battery-backed save, read from the identity's store;
    /// empty on a first launch.
    pub sram: Vec<u8>,
}

/// Ensures the ROM, system files, and core binary exist on local
/// storage. Filesystem side effects only; no core is constructed.
/// Runs entirely off the foreground thread.
pub struct Provisioner {
    layout: StorageLayout,
    config: ProvisionConfig,
    fetcher: Box<dyn CoreFetcher>,
}

impl Provisioner {
    pub fn new(layout: StorageLayout, config: ProvisionConfig, fetcher: Box<dyn CoreFetcher>) -> Self {
        Self {
            layout,
            config,
            fetcher,
        }
    }

    pub fn provision(&self) -> Result<Provisioned, ProvisionError> {
        fs::create_dir_all(&self.layout.cache_dir)?;
        fs::create_dir_all(&self.layout.data_dir)?;

        let rom_bytes = self.read_rom_bytes()?;

        let identity = match &self.config.identity {
            IdentitySource::Fixed(name) => RomIdentity::Fixed(name.clone()),
            IdentitySource::RomDigest => RomIdentity::digest_of(&rom_bytes),
        };

        let rom = if self.config.load_rom_bytes {
            ByteSource::from_bytes(rom_bytes)
        } else {
            self.ensure_rom_copy(&rom_bytes);
            ByteSource::Path(self.layout.rom_path())
        };

        self.ensure_system_files();
        let core_path = self.ensure_core()?;

        let store = GameStorage::open(&self.layout.data_dir, &identity)?;
        let sram = store.read(Slot::Sram)?.unwrap_or_default();

        Ok(Provisioned {
            core_path,
            rom,
            identity,
            sram,
        })
    }

    fn read_rom_bytes(&self) -> Result<Vec<u8>, ProvisionError> {
        match &self.config.rom {
            ByteSource::Bytes(bytes) => Ok(bytes.as_ref().clone()),
            ByteSource::Path(path) => Ok(fs::read(path)?),
        }
    }

    /// Copy-if-absent: an existing ROM file is never overwritten, and
    /// a copy failure is swallowed since a cached copy (or the bytes
    /// we already hold) is assumed usable.
    fn ensure_rom_copy(&self, rom_bytes: &[u8]) {
        let target = self.layout.rom_path();
        if target.exists() {
            return;
        }
        if let Err(e) = fs::write(&target, rom_bytes) {
            tracing::warn!(path = %target.display(), error = %e, "ROM copy failed, continuing");
        }
    }

    /// Extracts the BIOS/system archive exactly once: skipped when the
    /// target directory already has content, and any extraction error
    /// is swallowed on the assumption that previously extracted files
    /// are usable.
    fn ensure_system_files(&self) {
        let Some(archive_path) = &self.config.system_archive else {
            return;
        };
        let system_dir = self.layout.system_dir();

        if dir_is_populated(&system_dir) {
            return;
        }

        if let Err(e) = extract_tar_gz(archive_path, &system_dir) {
            tracing::warn!(
                archive = %archive_path.display(),
                error = %e,
                "system archive extraction failed, continuing"
            );
        }
    }

    fn ensure_core(&self) -> Result<PathBuf, ProvisionError> {
        let core_path = self
            .layout
            .core_path(&self.config.core_name, &self.config.abi);
        if core_path.exists() {
            return Ok(core_path);
        }

        let url = self.config.core_url();
        tracing::info!(%url, "fetching core binary");
        let archive = self.fetcher.fetch(&url)?;

        let core = unpack_single_zip_entry(&archive)?;
        fs::write(&core_path, core)?;
        Ok(core_path)
    }
}

fn dir_is_populated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn extract_tar_gz(archive: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    let file = fs::File::open(archive)?;
    Archive::new(GzDecoder::new(file)).unpack(target)
}

/// The core download is a zip archive containing exactly one entry,
/// the core shared object.
fn unpack_single_zip_entry(archive: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ProvisionError::CoreUnpack(e.to_string()))?;
    if zip.is_empty() {
        return Err(ProvisionError::CoreUnpack("archive has no entries".into()));
    }

    let mut entry = zip
        .by_index(0)
        .map_err(|e| ProvisionError::CoreUnpack(e.to_string()))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    io::copy(&mut entry, &mut bytes)?;
    Ok(bytes)
}
