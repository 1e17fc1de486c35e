//! Interval timer lifecycle.
//!
//! An [`IntervalTimer`] owns one OS countdown primitive and drives it through
//! `Idle → Running ⇄ Suspended`. The current state is never cached: it is
//! derived from the primitive's own arming state plus the value/interval
//! captured by the last [`IntervalTimer::try_suspend`].
//!
//! Every operation comes in two flavours. `try_*` returns a [`TimerResult`]
//! whose error is either fatal (an OS call failed) or a warning (the call was
//! redundant). The plain variants log warnings and abort the process on fatal
//! errors, for call sites that have already established the precondition.

use core::fmt;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::arming::ArmingState;
use crate::clock::{IntervalClock, PosixClock};
use crate::config::{ClockId, Signal, TimerConfig, UserData};
use crate::error::{TimerError, TimerResult};
use crate::notify::{Notifier, SignalNotifier};
use crate::registry::{self, Callback, Entry, Registry, Token};

/// Lifecycle state observed through the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Disarmed with nothing saved. Initial state.
    Idle,
    /// Armed and counting down.
    Running,
    /// Disarmed, holding the remaining time and interval for `resume`.
    Suspended,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerState::Idle => "idle",
            TimerState::Running => "running",
            TimerState::Suspended => "suspended",
        };
        f.write_str(name)
    }
}

/// Builder for [`IntervalTimer`].
pub struct TimerBuilder {
    config: TimerConfig,
    callback: Option<Callback>,
}

impl TimerBuilder {
    pub fn new(period: Duration) -> Self {
        Self::from_config(TimerConfig::builder().period(period).build())
    }

    pub fn from_config(config: TimerConfig) -> Self {
        Self {
            config,
            callback: None,
        }
    }

    /// Function run on every expiration. Without one, expirations are
    /// counted and otherwise dropped.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(UserData) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn user_data(mut self, data: UserData) -> Self {
        self.config.user_data = data;
        self
    }

    pub fn single_shot(mut self, single_shot: bool) -> Self {
        self.config.single_shot = single_shot;
        self
    }

    pub fn signal(mut self, signal: Signal) -> Self {
        self.config.signal = signal;
        self
    }

    pub fn clock(mut self, clock: ClockId) -> Self {
        self.config.clock = clock;
        self
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Creates a timer backed by a POSIX timer and the process-wide signal
    /// notifier.
    pub fn build(self) -> TimerResult<IntervalTimer<PosixClock>> {
        let signal = self.config.signal;
        let notifier = SignalNotifier::global()
            .map_err(|source| TimerError::Registration { signal, source })?;
        let clock = PosixClock::new(self.config.clock);
        self.build_with(clock, notifier)
    }

    /// Creates a timer on an arbitrary clock and notifier.
    ///
    /// The handler is registered before the primitive exists, so no
    /// expiration can arrive unhandled. If registration fails nothing is
    /// created; if creation fails the registry entry is rolled back.
    pub fn build_with<C, N>(self, clock: C, notifier: &N) -> TimerResult<IntervalTimer<C>>
    where
        C: IntervalClock,
        N: Notifier + ?Sized,
    {
        let TimerBuilder { config, callback } = self;

        notifier.register(config.signal)?;

        let registry = Registry::global();
        let (token, entry) = registry.insert(config.signal, config.user_data, callback);
        let handle = match clock.create(config.signal, token) {
            Ok(handle) => handle,
            Err(err) => {
                registry.remove(token);
                return Err(err);
            }
        };

        debug!(
            "timer {token}: created, period {:?}, signal {}, single shot {}",
            config.period, config.signal, config.single_shot
        );

        Ok(IntervalTimer {
            config,
            clock,
            handle: Some(handle),
            saved: ArmingState::DISARMED,
            token,
            entry,
            registry,
        })
    }
}

/// Periodic or one-shot timer invoking a callback on expiration.
///
/// The timer exclusively owns its OS primitive. Dropping it disarms the
/// primitive, waits for a callback already in flight to return, and only
/// then releases the primitive; no callback runs after `drop` returns.
pub struct IntervalTimer<C: IntervalClock = PosixClock> {
    config: TimerConfig,
    clock: C,
    // Only `None` while dropping.
    handle: Option<C::Handle>,
    saved: ArmingState,
    token: Token,
    entry: Arc<Entry>,
    registry: &'static Registry,
}

impl IntervalTimer<PosixClock> {
    pub fn builder(period: Duration) -> TimerBuilder {
        TimerBuilder::new(period)
    }

    /// Repeating timer on the default signal running `callback` every
    /// `period`.
    pub fn new<F>(period: Duration, callback: F) -> TimerResult<Self>
    where
        F: FnMut(UserData) + Send + 'static,
    {
        TimerBuilder::new(period).callback(callback).build()
    }
}

impl<C: IntervalClock> IntervalTimer<C> {
    /// Arms the timer for a full period. Warns if it is already running;
    /// the running countdown is left untouched.
    pub fn try_start(&mut self) -> TimerResult<()> {
        let handle = self.handle()?;
        if self.clock.query(handle)?.is_armed() {
            return Err(TimerError::StartWhileRunning);
        }

        let armed = ArmingState::for_period(self.config.period, self.config.single_shot);
        self.clock.arm(handle, &armed)?;
        self.saved = ArmingState::DISARMED;

        debug!("timer {}: started, {:?}", self.token, armed);
        Ok(())
    }

    /// Disarms the timer and forgets any suspended countdown. Always
    /// disarms; warns only if the timer was already idle.
    ///
    /// Stopping a suspended timer is not redundant even though its primitive
    /// is already disarmed: it discards the saved countdown and returns `Ok`.
    pub fn try_stop(&mut self) -> TimerResult<()> {
        let handle = self.handle()?;
        let previous = self.clock.arm(handle, &ArmingState::DISARMED)?;
        let was_idle = !previous.is_armed() && !self.saved.is_armed();
        self.saved = ArmingState::DISARMED;

        if was_idle {
            return Err(TimerError::StopWhileStopped);
        }

        debug!("timer {}: stopped", self.token);
        Ok(())
    }

    /// Stop followed by start: a fresh full-period countdown.
    pub fn try_reset(&mut self) -> TimerResult<()> {
        match self.try_stop() {
            Ok(()) | Err(TimerError::StopWhileStopped) => {}
            Err(err) => return Err(err),
        }
        self.try_start()
    }

    /// Disarms the timer, remembering the remaining time and interval.
    ///
    /// The old arming state is captured by the same call that disarms, so
    /// nothing elapses between reading and clearing it.
    pub fn try_suspend(&mut self) -> TimerResult<()> {
        let handle = self.handle()?;
        let previous = self.clock.arm(handle, &ArmingState::DISARMED)?;
        if !previous.is_armed() {
            return Err(TimerError::SuspendWhileStopped);
        }

        self.saved = previous;
        debug!("timer {}: suspended, {:?}", self.token, previous);
        Ok(())
    }

    /// Re-arms the timer from the state captured by the last suspend.
    pub fn try_resume(&mut self) -> TimerResult<()> {
        let handle = self.handle()?;
        if self.clock.query(handle)?.is_armed() {
            return Err(TimerError::ResumeWhileRunning);
        }
        if !self.saved.is_armed() {
            return Err(TimerError::ResumeWithoutSuspend);
        }

        self.clock.arm(handle, &self.saved)?;
        debug!("timer {}: resumed, {:?}", self.token, self.saved);
        self.saved = ArmingState::DISARMED;
        Ok(())
    }

    pub fn try_state(&self) -> TimerResult<TimerState> {
        let current = self.clock.query(self.handle()?)?;
        let state = if current.is_armed() {
            TimerState::Running
        } else if self.saved.is_armed() {
            TimerState::Suspended
        } else {
            TimerState::Idle
        };
        Ok(state)
    }

    /// Time left until the next expiration. For a suspended timer this is
    /// the time that will be left once it is resumed.
    pub fn try_remaining(&self) -> TimerResult<Duration> {
        let current = self.clock.query(self.handle()?)?;
        if current.is_armed() {
            Ok(current.value)
        } else {
            Ok(self.saved.value)
        }
    }

    /// See [`IntervalTimer::try_start`]. Aborts if the OS call fails.
    pub fn start(&mut self) {
        let result = self.try_start();
        self.settle("start", result);
    }

    /// See [`IntervalTimer::try_stop`]. Aborts if the OS call fails.
    pub fn stop(&mut self) {
        let result = self.try_stop();
        self.settle("stop", result);
    }

    /// See [`IntervalTimer::try_reset`]. Aborts if the OS call fails.
    pub fn reset(&mut self) {
        let result = self.try_reset();
        self.settle("reset", result);
    }

    /// See [`IntervalTimer::try_suspend`]. Aborts if the OS call fails.
    pub fn suspend(&mut self) {
        let result = self.try_suspend();
        self.settle("suspend", result);
    }

    /// See [`IntervalTimer::try_resume`]. Aborts if the OS call fails.
    pub fn resume(&mut self) {
        let result = self.try_resume();
        self.settle("resume", result);
    }

    pub fn state(&self) -> TimerState {
        self.try_state()
            .unwrap_or_else(|err| self.abort_on("query state", err))
    }

    pub fn remaining(&self) -> Duration {
        self.try_remaining()
            .unwrap_or_else(|err| self.abort_on("query remaining", err))
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn is_single_shot(&self) -> bool {
        self.config.single_shot
    }

    pub fn signal(&self) -> Signal {
        self.config.signal
    }

    pub fn user_data(&self) -> UserData {
        self.config.user_data
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Token carried by this timer's notifications.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Notifications delivered to this timer so far.
    pub fn expirations(&self) -> u64 {
        self.entry.expirations()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn handle(&self) -> TimerResult<&C::Handle> {
        self.handle.as_ref().ok_or(TimerError::Unknown)
    }

    fn settle(&self, operation: &str, result: TimerResult<()>) {
        match result {
            Ok(()) => {}
            Err(err) if err.is_warning() => info!("timer {}: {operation}: {err}", self.token),
            Err(err) => self.abort_on(operation, err),
        }
    }

    fn abort_on(&self, operation: &str, err: TimerError) -> ! {
        error!("timer {}: {operation} failed: {err}", self.token);
        process::abort()
    }
}

impl<C: IntervalClock> Drop for IntervalTimer<C> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Err(err) = self.clock.arm(&handle, &ArmingState::DISARMED) {
            warn!("timer {}: disarm before destroy failed: {err}", self.token);
        }

        self.registry.remove(self.token);
        if registry::is_dispatching(self.token) {
            debug!("timer {}: dropped from its own callback", self.token);
        } else {
            drop(self.entry.retire());
        }

        if let Err(err) = self.clock.destroy(handle) {
            warn!("timer {}: destroy failed: {err}", self.token);
        }
        debug!("timer {}: destroyed", self.token);
    }
}

impl<C: IntervalClock> fmt::Debug for IntervalTimer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTimer")
            .field("token", &self.token)
            .field("config", &self.config)
            .field("saved", &self.saved)
            .field("expirations", &self.expirations())
            .finish()
    }
}
