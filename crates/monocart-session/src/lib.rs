//! Single-game front-end shell: brings one libretro core and one ROM
//! up into a playable session, keeps its state on disk, and routes
//! input to it.
//!
//! The pieces compose in bring-up order: [`Provisioner`] lays out the
//! on-disk assets, [`Session::create`] constructs the core and arms
//! the [`ReadinessBarrier`], and [`Shell`] ties lifecycle callbacks to
//! the persistence store and restore protocol.

pub mod barrier;
pub mod input;
pub mod overlay;
pub mod provision;
pub mod restore;
pub mod session;
pub mod settings;
pub mod shell;
pub mod storage;

pub use barrier::ReadinessBarrier;
pub use input::{InputConfig, InputRouter, MotionAxes, ShellRequest, port_for};
pub use overlay::{OverlayCapabilities, should_show_overlay};
pub use provision::{
    CoreFetcher, HttpFetcher, IdentitySource, ProvisionConfig, ProvisionError, Provisioned,
    Provisioner, StorageLayout,
};
pub use restore::{RestoreOutcome, RetryPolicy, persist_sram, persist_state, restore};
pub use session::{Session, SessionConfig, SessionError};
pub use settings::Settings;
pub use shell::{MenuAction, Shell};
pub use storage::{GameStorage, RomIdentity, Slot};
