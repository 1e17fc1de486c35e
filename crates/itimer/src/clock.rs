//! Interval clock capability and its POSIX implementation.
//!
//! [`IntervalClock`] is the seam between the timer state machine and the OS:
//! create a primitive bound to a notification signal and payload, arm it,
//! query it, destroy it. [`PosixClock`] maps these onto `timer_create`,
//! `timer_settime`, `timer_gettime` and `timer_delete`.

use core::mem::MaybeUninit;
use std::time::Duration;

use crate::arming::ArmingState;
use crate::config::{ClockId, Signal};
use crate::error::{TimerError, TimerResult};
use crate::registry::Token;

const NSEC_PER_SEC: u32 = 1_000_000_000;

/// OS countdown primitive with create/arm/query/destroy operations.
pub trait IntervalClock {
    /// Owned handle to one primitive instance.
    type Handle;

    /// Creates a disarmed primitive that notifies through `signal`, carrying
    /// `token` as its payload.
    fn create(&self, signal: Signal, token: Token) -> TimerResult<Self::Handle>;

    /// Applies `state` and returns the state that was in effect before.
    fn arm(&self, handle: &Self::Handle, state: &ArmingState) -> TimerResult<ArmingState>;

    /// Reads the current arming state.
    fn query(&self, handle: &Self::Handle) -> TimerResult<ArmingState>;

    /// Releases the primitive.
    fn destroy(&self, handle: Self::Handle) -> TimerResult<()>;
}

/// `timer_t` owned by exactly one [`PosixClock`] user.
#[derive(Debug)]
pub struct PosixTimerId(libc::timer_t);

// SAFETY: a timer_t is a kernel timer id; any thread may pass it to timer_*.
unsafe impl Send for PosixTimerId {}

/// Interval clock backed by POSIX per-process timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixClock {
    clock_id: ClockId,
}

impl PosixClock {
    pub fn new(clock_id: ClockId) -> Self {
        Self { clock_id }
    }

    pub fn clock_id(&self) -> ClockId {
        self.clock_id
    }
}

impl IntervalClock for PosixClock {
    type Handle = PosixTimerId;

    fn create(&self, signal: Signal, token: Token) -> TimerResult<PosixTimerId> {
        // SAFETY: sigevent is plain old data; all-zero is a valid starting point.
        let mut sev: libc::sigevent = unsafe { core::mem::zeroed() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = signal.raw();
        sev.sigev_value = libc::sigval {
            sival_ptr: token.as_payload(),
        };

        let mut id = MaybeUninit::<libc::timer_t>::uninit();
        // SAFETY: sev and id point to valid storage for the duration of the call.
        let rc = unsafe { libc::timer_create(self.clock_id.raw(), &mut sev, id.as_mut_ptr()) };
        if rc != 0 {
            return Err(TimerError::last_os(|source| TimerError::Create { source }));
        }

        // SAFETY: timer_create initialized id on success.
        Ok(PosixTimerId(unsafe { id.assume_init() }))
    }

    fn arm(&self, handle: &PosixTimerId, state: &ArmingState) -> TimerResult<ArmingState> {
        let new = to_itimerspec(state)?;
        // SAFETY: itimerspec is plain old data.
        let mut old: libc::itimerspec = unsafe { core::mem::zeroed() };

        // SAFETY: handle is a live timer id owned by the caller.
        let rc = unsafe { libc::timer_settime(handle.0, 0, &new, &mut old) };
        if rc != 0 {
            return Err(TimerError::last_os(|source| TimerError::Arm { source }));
        }

        from_itimerspec(&old)
    }

    fn query(&self, handle: &PosixTimerId) -> TimerResult<ArmingState> {
        // SAFETY: itimerspec is plain old data.
        let mut current: libc::itimerspec = unsafe { core::mem::zeroed() };

        // SAFETY: handle is a live timer id owned by the caller.
        let rc = unsafe { libc::timer_gettime(handle.0, &mut current) };
        if rc != 0 {
            return Err(TimerError::last_os(|source| TimerError::Query { source }));
        }

        from_itimerspec(&current)
    }

    fn destroy(&self, handle: PosixTimerId) -> TimerResult<()> {
        // SAFETY: the handle is consumed, so the id is never used again.
        let rc = unsafe { libc::timer_delete(handle.0) };
        if rc != 0 {
            // timer_delete only fails for an invalid id, which ownership rules out.
            log::warn!("timer_delete failed: {}", std::io::Error::last_os_error());
            return Err(TimerError::Unknown);
        }
        Ok(())
    }
}

fn to_timespec(duration: Duration, what: &'static str) -> TimerResult<libc::timespec> {
    let tv_sec =
        libc::time_t::try_from(duration.as_secs()).map_err(|_| TimerError::Transfer { what })?;
    Ok(libc::timespec {
        tv_sec,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    })
}

fn from_timespec(ts: &libc::timespec, what: &'static str) -> TimerResult<Duration> {
    let secs = u64::try_from(ts.tv_sec).map_err(|_| TimerError::Transfer { what })?;
    let nanos = u32::try_from(ts.tv_nsec)
        .ok()
        .filter(|nanos| *nanos < NSEC_PER_SEC)
        .ok_or(TimerError::Transfer { what })?;
    Ok(Duration::new(secs, nanos))
}

pub(crate) fn to_itimerspec(state: &ArmingState) -> TimerResult<libc::itimerspec> {
    Ok(libc::itimerspec {
        it_interval: to_timespec(state.interval, "interval")?,
        it_value: to_timespec(state.value, "value")?,
    })
}

pub(crate) fn from_itimerspec(spec: &libc::itimerspec) -> TimerResult<ArmingState> {
    Ok(ArmingState {
        value: from_timespec(&spec.it_value, "value")?,
        interval: from_timespec(&spec.it_interval, "interval")?,
    })
}
