//! Per-relay boot gate
//!
//! Relays that demand payment or authentication before serving requests get
//! their normal traffic held back until they are ready or a grace period runs
//! out. The gate moves `Ungated -> Gated -> Lifted` and never goes back.

use crate::transport::SocketStatus;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Traffic flows freely
    Ungated,
    /// Traffic waits for readiness or the deadline
    Gated { deadline: Instant },
    /// Gate was opened; traffic flows freely for good
    Lifted,
}

#[derive(Debug)]
pub struct BootGate {
    state: watch::Sender<GateState>,
}

impl Default for BootGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BootGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Ungated);
        Self { state }
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn is_gated(&self) -> bool {
        matches!(self.state(), GateState::Gated { .. })
    }

    /// Hold traffic for at most `grace`. Only an ungated gate can be engaged.
    pub fn engage(&self, grace: Duration) -> bool {
        self.state.send_if_modified(|state| {
            if *state == GateState::Ungated {
                *state = GateState::Gated {
                    deadline: Instant::now() + grace,
                };
                true
            } else {
                false
            }
        })
    }

    /// Open the gate permanently.
    pub fn lift(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Lifted {
                false
            } else {
                *state = GateState::Lifted;
                true
            }
        });
    }

    /// Wait until traffic may be sent over a transport with the given status.
    ///
    /// Returns at once when the gate is not engaged. Otherwise returns when the
    /// transport becomes ready, the gate is lifted elsewhere, or the deadline
    /// passes, lifting the gate in the first and last case.
    pub async fn wait(&self, mut status: watch::Receiver<SocketStatus>) {
        let mut state = self.state.subscribe();
        let mut status_open = true;

        loop {
            let GateState::Gated { deadline } = *state.borrow_and_update() else {
                return;
            };

            if *status.borrow_and_update() == SocketStatus::Ready {
                self.lift();
                return;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.lift();
                    return;
                }
                changed = status.changed(), if status_open => {
                    status_open = changed.is_ok();
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
