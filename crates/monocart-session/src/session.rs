use std::{
    sync::{Arc, OnceLock},
    thread,
    time::Duration,
};

use monocart_core::{CoreError, CoreEvent, CoreFactory, CoreFault, CoreView, CoreViewData};

use crate::barrier::ReadinessBarrier;

/// Delay between the first rendered frame and the barrier release.
///
/// The frame event can fire slightly before the core has finished its
/// own internal setup (BIOS load, variable application); releasing the
/// barrier immediately risks restoring state into a half-initialized
/// core.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Core construction failed. Fatal: it signals a configuration
    /// problem (missing/incompatible core, unsupported GPU) that
    /// provisioning cannot fix, so it is never retried.
    #[error("core construction failed: {0}")]
    Construct(#[source] CoreFault),
    /// A state-affecting operation was invoked before the readiness
    /// barrier opened. Caller bug; the core has no valid state yet.
    #[error("session is not ready")]
    NotReady,
    #[error("core serialization failed: {0}")]
    Core(#[from] CoreError),
    #[error("persistence I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The single live emulation session.
///
/// Owns the core view exclusively for its lifetime. Nothing besides
/// construction and barrier-wait touches the core before the barrier
/// opens; every accessor that needs a live core goes through
/// [`Session::ready_core`].
pub struct Session {
    core: Box<dyn CoreView>,
    barrier: Arc<ReadinessBarrier>,
    fault: Arc<OnceLock<CoreFault>>,
}

impl Session {
    /// Constructs the embedded core exactly once and starts watching
    /// its event stream.
    ///
    /// The watcher thread releases the barrier after the configured
    /// settle delay the first time a frame is rendered; the
    /// subscription is self-cancelling for barrier purposes after
    /// that. Any fault event faults a pending barrier and always
    /// reaches `fault_hook`, so the host can present a fatal
    /// diagnostic and offer only exit.
    pub fn create(
        factory: &dyn CoreFactory,
        data: CoreViewData,
        config: SessionConfig,
        fault_hook: impl Fn(CoreFault) + Send + 'static,
    ) -> Result<Arc<Self>, SessionError> {
        let core = factory.construct(data).map_err(SessionError::Construct)?;

        let barrier = Arc::new(ReadinessBarrier::new());
        let fault = Arc::new(OnceLock::new());

        let events = core.events();
        let watcher_barrier = Arc::clone(&barrier);
        let watcher_fault = Arc::clone(&fault);
        let settle_delay = config.settle_delay;

        // The watcher exits when the core drops its event sender,
        // i.e. when the session is torn down.
        thread::spawn(move || {
            let mut frame_seen = false;
            while let Ok(event) = events.recv() {
                match event {
                    CoreEvent::FrameRendered if !frame_seen => {
                        frame_seen = true;
                        if !settle_delay.is_zero() {
                            thread::sleep(settle_delay);
                        }
                        watcher_barrier.open();
                    }
                    CoreEvent::FrameRendered => {}
                    CoreEvent::Fault(f) => {
                        tracing::error!(fault = %f, "core reported a fatal error");
                        watcher_barrier.fault(f);
                        let _ = watcher_fault.set(f);
                        fault_hook(f);
                    }
                }
            }
        });

        Ok(Arc::new(Self {
            core,
            barrier,
            fault,
        }))
    }

    pub fn barrier(&self) -> &ReadinessBarrier {
        &self.barrier
    }

    pub fn is_ready(&self) -> bool {
        self.barrier.is_open()
    }

    /// The fault the core reported, if any, including faults after the
    /// barrier already opened.
    pub fn fault(&self) -> Option<CoreFault> {
        self.fault.get().copied()
    }

    /// The live core, only available once the readiness barrier is
    /// open.
    pub fn ready_core(&self) -> Result<&dyn CoreView, SessionError> {
        if !self.barrier.is_open() {
            return Err(SessionError::NotReady);
        }
        Ok(self.core.as_ref())
    }
}
