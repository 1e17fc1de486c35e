//! Deterministic stand-ins for the OS clock and notifier.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::arming::ArmingState;
use crate::clock::IntervalClock;
use crate::config::Signal;
use crate::error::{TimerError, TimerResult};
use crate::notify::Notifier;
use crate::registry::{Dispatch, Registry, Token};
use crate::timer::IntervalTimer;

#[derive(Debug, Default)]
pub(super) struct FakeState {
    pub armed: ArmingState,
    pub created: Option<(Signal, Token)>,
    pub destroyed: bool,
    pub fail_create: bool,
    pub fail_query: bool,
    pub fail_arm: bool,
    pub calls: Vec<&'static str>,
}

/// Interval clock whose countdown only moves when a test says so.
#[derive(Clone, Default)]
pub(super) struct FakeClock {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeClock {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    /// Advances the countdown, reloading from the interval at zero. Returns
    /// the number of expirations that occurred.
    pub fn elapse(&self, mut by: Duration) -> u32 {
        let mut state = self.state();
        let mut expired = 0;
        while state.armed.is_armed() && by >= state.armed.value {
            by -= state.armed.value;
            state.armed.value = state.armed.interval;
            expired += 1;
        }
        if state.armed.is_armed() {
            state.armed.value -= by;
        }
        expired
    }
}

impl IntervalClock for FakeClock {
    type Handle = ();

    fn create(&self, signal: Signal, token: Token) -> TimerResult<()> {
        let mut state = self.state();
        state.calls.push("create");
        if state.fail_create {
            return Err(TimerError::Create {
                source: io::Error::from_raw_os_error(libc::EAGAIN),
            });
        }
        state.created = Some((signal, token));
        Ok(())
    }

    fn arm(&self, _handle: &(), armed: &ArmingState) -> TimerResult<ArmingState> {
        let mut state = self.state();
        state.calls.push("arm");
        if state.fail_arm {
            return Err(TimerError::Arm {
                source: io::Error::from_raw_os_error(libc::EINVAL),
            });
        }
        Ok(std::mem::replace(&mut state.armed, *armed))
    }

    fn query(&self, _handle: &()) -> TimerResult<ArmingState> {
        let mut state = self.state();
        state.calls.push("query");
        if state.fail_query {
            return Err(TimerError::Query {
                source: io::Error::from_raw_os_error(libc::EINVAL),
            });
        }
        Ok(state.armed)
    }

    fn destroy(&self, _handle: ()) -> TimerResult<()> {
        let mut state = self.state();
        state.calls.push("destroy");
        state.destroyed = true;
        Ok(())
    }
}

pub(super) struct AcceptingNotifier;

impl Notifier for AcceptingNotifier {
    fn register(&self, _signal: Signal) -> TimerResult<()> {
        Ok(())
    }
}

pub(super) struct RefusingNotifier;

impl Notifier for RefusingNotifier {
    fn register(&self, signal: Signal) -> TimerResult<()> {
        Err(TimerError::Registration {
            signal,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        })
    }
}

/// Lets `by` elapse on the timer's clock and delivers one notification per
/// expiration, the way the listener thread would.
pub(super) fn advance(timer: &IntervalTimer<FakeClock>, by: Duration) -> Vec<Dispatch> {
    let expired = timer.clock().elapse(by);
    (0..expired)
        .map(|_| Registry::global().dispatch(timer.signal(), timer.token()))
        .collect()
}
