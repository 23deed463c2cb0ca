use std::time::Duration;

use monocart_core::CoreFault;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarrierState {
    Pending,
    Open,
    Faulted(CoreFault),
}

/// One-shot readiness gate released by the core's first rendered frame.
///
/// Transitions `Pending -> Open` exactly once and never back; a fault
/// reported before the first frame moves `Pending -> Faulted` instead.
/// Any number of waiters may block on it and are all released together.
pub struct ReadinessBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BarrierState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Releases the barrier. Returns `true` on the `Pending -> Open`
    /// transition; later calls are no-ops, so a core that keeps firing
    /// frame events cannot re-release it.
    pub fn open(&self) -> bool {
        let mut state = self.state.lock();
        if *state != BarrierState::Pending {
            return false;
        }
        *state = BarrierState::Open;
        self.cond.notify_all();
        true
    }

    /// Marks the barrier faulted. Only a pending barrier can fault; a
    /// core error after the first frame no longer affects waiters.
    /// Returns `true` when the transition happened.
    pub fn fault(&self, fault: CoreFault) -> bool {
        let mut state = self.state.lock();
        if *state != BarrierState::Pending {
            return false;
        }
        *state = BarrierState::Faulted(fault);
        self.cond.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        *self.state.lock() == BarrierState::Open
    }

    /// Blocks until the barrier opens or faults.
    pub fn wait(&self) -> Result<(), CoreFault> {
        let mut state = self.state.lock();
        while *state == BarrierState::Pending {
            self.cond.wait(&mut state);
        }
        match *state {
            BarrierState::Open => Ok(()),
            BarrierState::Faulted(fault) => Err(fault),
            BarrierState::Pending => unreachable!(),
        }
    }

    /// Blocks until the barrier resolves or the timeout elapses.
    /// `None` means the barrier is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), CoreFault>> {
        let mut state = self.state.lock();
        if *state == BarrierState::Pending && self.cond.wait_for(&mut state, timeout).timed_out() {
            return None;
        }
        match *state {
            BarrierState::Open => Some(Ok(())),
            BarrierState::Faulted(fault) => Some(Err(fault)),
            BarrierState::Pending => None,
        }
    }
}

impl Default for ReadinessBarrier {
    fn default() -> Self {
        Self::new()
    }
}
