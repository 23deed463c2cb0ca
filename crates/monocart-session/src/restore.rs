use std::{thread, time::Duration};

use crate::{
    session::{Session, SessionError},
    storage::{GameStorage, Slot},
};

/// Bounded retry parameters for handing persisted state to the core.
///
/// The core can report "not ready" from its unserialize entry point
/// even after the readiness barrier opens, because rendering the first
/// frame does not guarantee its internal save-state machinery is up.
/// That window is a soft race, not a hard error, so the protocol
/// retries a fixed number of times with a fixed backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The core accepted the snapshot.
    Applied,
    /// No persisted blob (or a zero-length one): normal cold start.
    Absent,
    /// The core never became ready within the retry bound. Non-fatal;
    /// the session continues with fresh state.
    GaveUp,
}

/// Attempts to restore the named slot into the session's core.
///
/// Must run on a worker thread: the backoff sleeps would freeze a
/// user-facing thread.
pub fn restore(
    session: &Session,
    store: &GameStorage,
    slot: Slot,
    policy: RetryPolicy,
) -> Result<RestoreOutcome, SessionError> {
    let core = session.ready_core()?;

    let Some(bytes) = store.read(slot)? else {
        return Ok(RestoreOutcome::Absent);
    };

    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if core.unserialize_state(&bytes) {
            return Ok(RestoreOutcome::Applied);
        }
        if attempt < attempts {
            thread::sleep(policy.backoff);
        }
    }

    tracing::warn!(
        ?slot,
        attempts,
        "core never accepted the persisted state, continuing with fresh state"
    );
    Ok(RestoreOutcome::GaveUp)
}

/// Serializes the battery-backed save RAM into its slot, fully
/// overwriting prior contents. Only valid once the session is ready.
pub fn persist_sram(session: &Session, store: &GameStorage) -> Result<(), SessionError> {
    let core = session.ready_core()?;
    store.write(Slot::Sram, &core.serialize_sram())?;
    Ok(())
}

/// Serializes the full core state into the named slot, fully
/// overwriting prior contents. Only valid once the session is ready.
pub fn persist_state(
    session: &Session,
    store: &GameStorage,
    slot: Slot,
) -> Result<(), SessionError> {
    let core = session.ready_core()?;
    let bytes = core.serialize_state()?;
    store.write(slot, &bytes)?;
    Ok(())
}
