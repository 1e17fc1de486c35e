//! Arming state of an interval primitive: time left until the next expiration
//! plus the reload interval.

use std::time::Duration;

/// Value/interval pair as understood by `timer_settime`.
///
/// A zero `value` means disarmed; a zero `interval` means the primitive
/// expires once and then disarms itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmingState {
    pub value: Duration,
    pub interval: Duration,
}

impl ArmingState {
    pub const DISARMED: Self = Self {
        value: Duration::ZERO,
        interval: Duration::ZERO,
    };

    pub const fn new(value: Duration, interval: Duration) -> Self {
        Self { value, interval }
    }

    /// Arming state that starts a fresh countdown of `period`.
    ///
    /// A zero period still produces one expiration: the value is raised to
    /// a single nanosecond and the interval dropped, since a zero value
    /// would disarm the primitive and a zero interval would otherwise
    /// repeat back to back.
    pub fn for_period(period: Duration, single_shot: bool) -> Self {
        if period.is_zero() {
            return Self::new(Duration::from_nanos(1), Duration::ZERO);
        }

        let interval = if single_shot { Duration::ZERO } else { period };
        Self::new(period, interval)
    }

    pub fn is_armed(&self) -> bool {
        !self.value.is_zero()
    }

    pub fn is_periodic(&self) -> bool {
        !self.interval.is_zero()
    }
}
