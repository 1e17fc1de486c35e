//! Timer configuration: period, repeat mode, notification signal, clock and
//! the opaque user pointer handed to callbacks.

use core::ffi::c_void;
use core::fmt;
use core::ptr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Signal number used to deliver expirations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signal(pub i32);

impl Signal {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Highest-numbered real-time signal of the running platform.
    pub fn rtmax() -> Self {
        Self(libc::SIGRTMAX())
    }

    /// Lowest-numbered real-time signal usable by applications.
    pub fn rtmin() -> Self {
        Self(libc::SIGRTMIN())
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn is_realtime(self) -> bool {
        (libc::SIGRTMIN()..=libc::SIGRTMAX()).contains(&self.0)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::rtmax()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clock the OS primitive counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClockId {
    #[default]
    Realtime,
    Monotonic,
    Boottime,
}

impl ClockId {
    pub fn raw(self) -> libc::clockid_t {
        match self {
            ClockId::Realtime => libc::CLOCK_REALTIME,
            ClockId::Monotonic => libc::CLOCK_MONOTONIC,
            ClockId::Boottime => libc::CLOCK_BOOTTIME,
        }
    }
}

/// Opaque pointer passed verbatim to the expiration callback.
///
/// The timer never allocates, frees or dereferences it. Whoever shares the
/// pointee between the owning thread and the callback is responsible for
/// synchronizing access to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserData(*mut c_void);

// SAFETY: the pointer is only ever copied and compared, never dereferenced.
unsafe impl Send for UserData {}
// SAFETY: see above.
unsafe impl Sync for UserData {}

impl UserData {
    pub const NULL: Self = Self(ptr::null_mut());

    pub fn new<T>(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }

    pub fn from_ref<T>(value: &T) -> Self {
        Self((value as *const T).cast_mut().cast())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn cast<T>(self) -> *mut T {
        self.0.cast()
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self::NULL
    }
}

/// Static part of a timer's configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimerConfig {
    pub period: Duration,
    pub single_shot: bool,
    pub signal: Signal,
    pub clock: ClockId,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub user_data: UserData,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            single_shot: false,
            signal: Signal::default(),
            clock: ClockId::default(),
            user_data: UserData::NULL,
        }
    }
}

impl TimerConfig {
    /// Creates a new timer configuration builder.
    pub fn builder() -> TimerConfigBuilder {
        TimerConfigBuilder::default()
    }

    /// Period split into whole seconds and the sub-second nanosecond part.
    pub fn period_parts(&self) -> (u64, u32) {
        (self.period.as_secs(), self.period.subsec_nanos())
    }
}

/// Builder for ergonomic timer configuration construction.
#[derive(Debug, Clone, Default)]
pub struct TimerConfigBuilder {
    config: TimerConfig,
}

impl TimerConfigBuilder {
    /// Sets the expiration period.
    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Sets the period from separate seconds and nanoseconds.
    ///
    /// Nanoseconds beyond one second carry into the seconds part.
    pub fn period_parts(mut self, secs: u64, nanos: u32) -> Self {
        self.config.period = Duration::new(secs, nanos);
        self
    }

    /// Expire at most once per arm cycle instead of repeating.
    pub fn single_shot(mut self, single_shot: bool) -> Self {
        self.config.single_shot = single_shot;
        self
    }

    /// Sets the signal used for expiration notifications.
    pub fn signal(mut self, signal: Signal) -> Self {
        self.config.signal = signal;
        self
    }

    /// Sets the clock the timer counts against.
    pub fn clock(mut self, clock: ClockId) -> Self {
        self.config.clock = clock;
        self
    }

    /// Sets the pointer handed to the callback on every expiration.
    pub fn user_data(mut self, data: UserData) -> Self {
        self.config.user_data = data;
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> TimerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TimerConfig::default();

        assert_eq!(config.period, Duration::from_secs(1));
        assert!(!config.single_shot);
        assert_eq!(config.signal, Signal::rtmax());
        assert_eq!(config.clock, ClockId::Realtime);
        assert!(config.user_data.is_null());
    }

    #[test]
    fn builder_overrides_every_field() {
        let mut slot = 7u32;
        let data = UserData::new(&mut slot as *mut u32);

        let config = TimerConfig::builder()
            .period_parts(2, 1_500_000_000)
            .single_shot(true)
            .signal(Signal::rtmin())
            .clock(ClockId::Monotonic)
            .user_data(data)
            .build();

        assert_eq!(config.period_parts(), (3, 500_000_000));
        assert!(config.single_shot);
        assert_eq!(config.signal, Signal::rtmin());
        assert_eq!(config.clock, ClockId::Monotonic);
        assert_eq!(config.user_data.cast::<u32>(), &mut slot as *mut u32);
    }

    #[test]
    fn user_data_passes_the_address_through() {
        let value = 42u64;
        let data = UserData::from_ref(&value);

        assert_eq!(data.as_ptr(), &value as *const u64 as *mut c_void);
        assert_eq!(UserData::NULL.as_ptr(), ptr::null_mut());
        assert!(!data.is_null());
    }

    #[test]
    fn default_signal_is_realtime() {
        assert!(Signal::default().is_realtime());
        assert!(!Signal::new(libc::SIGINT).is_realtime());
    }
}
