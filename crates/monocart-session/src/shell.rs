use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::{
    input::ShellRequest,
    restore::{RestoreOutcome, RetryPolicy, persist_sram, persist_state, restore},
    session::{Session, SessionError},
    settings::Settings,
    storage::{GameStorage, Slot},
};

/// In-session menu entries. Disk actions only apply to multi-disk
/// content; the core ignores out-of-range disk changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Reset,
    SaveState,
    LoadState,
    ToggleMute,
    ToggleFastForward,
    NextDisk,
    PreviousDisk,
}

/// Wires the session, the persistence store, and the restore protocol
/// to the host process's lifecycle callbacks.
pub struct Shell {
    session: Arc<Session>,
    store: Arc<GameStorage>,
    restore_policy: RetryPolicy,
}

impl Shell {
    pub fn new(session: Arc<Session>, store: Arc<GameStorage>) -> Self {
        Self {
            session,
            store,
            restore_policy: RetryPolicy::default(),
        }
    }

    pub fn with_restore_policy(mut self, policy: RetryPolicy) -> Self {
        self.restore_policy = policy;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Spawns the post-barrier worker: blocks until the readiness
    /// barrier resolves, then applies persisted settings and restores
    /// the implicit crash-recovery snapshot. The temp-state blob is
    /// deleted after a successful restore so it can never be applied
    /// twice. Safe off the foreground thread: everything it touches
    /// after the barrier goes through the core's thread-safe
    /// serialize/unserialize entry points.
    pub fn spawn_ready_worker(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let store = Arc::clone(&self.store);
        let policy = self.restore_policy;

        thread::spawn(move || {
            if session.barrier().wait().is_err() {
                // Faulted before the first frame; the fault hook has
                // already escalated to the host.
                return;
            }

            if let Ok(core) = session.ready_core() {
                Settings::load(&store).apply(core);
            }

            match restore(&session, &store, Slot::TempState, policy) {
                Ok(RestoreOutcome::Applied) => {
                    if let Err(e) = store.remove(Slot::TempState) {
                        tracing::warn!(error = %e, "failed to delete consumed temp-state");
                    }
                }
                Ok(RestoreOutcome::Absent | RestoreOutcome::GaveUp) => {}
                Err(e) => tracing::warn!(error = %e, "temp-state restore failed"),
            }
        })
    }

    /// Persists SRAM, the crash-recovery snapshot, and settings.
    ///
    /// Called on every backgrounding event and must complete before
    /// the host considers itself safely backgrounded: the process may
    /// be killed immediately after. A session that never became ready
    /// has nothing valid to persist and is skipped.
    pub fn on_background(&self) -> Result<(), SessionError> {
        if !self.session.is_ready() {
            return Ok(());
        }

        persist_sram(&self.session, &self.store)?;
        persist_state(&self.session, &self.store, Slot::TempState)?;

        let core = self.session.ready_core()?;
        Settings::capture(core).store(&self.store)?;
        Ok(())
    }

    /// Executes one in-session menu action. Menu actions only exist
    /// while the session is ready (the menu cannot open earlier).
    pub fn handle_menu_action(&self, action: MenuAction) -> Result<(), SessionError> {
        match action {
            MenuAction::Reset => {
                self.session.ready_core()?.reset();
                Ok(())
            }
            MenuAction::SaveState => persist_state(&self.session, &self.store, Slot::State),
            MenuAction::LoadState => {
                restore(&self.session, &self.store, Slot::State, self.restore_policy).map(|_| ())
            }
            MenuAction::ToggleMute => {
                let core = self.session.ready_core()?;
                core.set_audio_enabled(!core.audio_enabled());
                Ok(())
            }
            MenuAction::ToggleFastForward => {
                let core = self.session.ready_core()?;
                let speed = if core.frame_speed() == 1 { 2 } else { 1 };
                core.set_frame_speed(speed);
                Ok(())
            }
            MenuAction::NextDisk => {
                let core = self.session.ready_core()?;
                if core.available_disks() > 0 {
                    core.change_disk(core.current_disk() + 1);
                }
                Ok(())
            }
            MenuAction::PreviousDisk => {
                let core = self.session.ready_core()?;
                let current = core.current_disk();
                if core.available_disks() > 0 && current > 0 {
                    core.change_disk(current - 1);
                }
                Ok(())
            }
        }
    }

    /// Maps a router side-channel request onto the matching action.
    /// `OpenMenu` is the host's to present; the rest resolve here.
    pub fn handle_request(&self, request: ShellRequest) -> Result<(), SessionError> {
        match request {
            ShellRequest::OpenMenu => Ok(()),
            ShellRequest::SaveState => self.handle_menu_action(MenuAction::SaveState),
            ShellRequest::LoadState => self.handle_menu_action(MenuAction::LoadState),
            ShellRequest::ToggleMute => self.handle_menu_action(MenuAction::ToggleMute),
            ShellRequest::ToggleFastForward => {
                self.handle_menu_action(MenuAction::ToggleFastForward)
            }
        }
    }
}
