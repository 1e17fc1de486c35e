//! # itimer
//!
//! Periodic and one-shot interval timers backed by POSIX per-process timers
//! (`timer_create`), with expirations delivered by signal and turned into
//! ordinary callbacks on a dedicated listener thread.
//!
//! ```no_run
//! use std::time::Duration;
//! use itimer::IntervalTimer;
//!
//! let mut timer = IntervalTimer::new(Duration::from_millis(100), |_| println!("tick"))?;
//! timer.start();
//! std::thread::sleep(Duration::from_secs(1));
//! timer.suspend();
//! timer.resume();
//! timer.stop();
//! # Ok::<(), itimer::TimerError>(())
//! ```
//!
//! ## Module Overview
//! - [`timer`]    – The timer itself and its start/stop/reset/suspend/resume lifecycle.
//! - [`config`]   – Period, repeat mode, signal, clock and user data.
//! - [`arming`]   – Value/interval pairs as applied to the OS primitive.
//! - [`clock`]    – Interval clock capability and the POSIX implementation.
//! - [`notify`]   – Signal handler, notification pipe and listener thread.
//! - [`registry`] – Token → timer lookup and callback dispatch.
//! - [`error`]    – Fatal errors and redundant-call warnings.
//!
//! Callbacks run one at a time on the listener thread, never in signal
//! context. Linux only.

pub mod arming;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod timer;

pub use arming::ArmingState;
pub use clock::{IntervalClock, PosixClock, PosixTimerId};
pub use config::{ClockId, Signal, TimerConfig, TimerConfigBuilder, UserData};
pub use error::{ErrorKind, Severity, TimerError, TimerResult};
pub use notify::{Notifier, SignalNotifier};
pub use registry::{Callback, Registry, Token};
pub use timer::{IntervalTimer, TimerBuilder, TimerState};

#[cfg(test)]
mod tests;
