//! Error taxonomy shared by every timer operation.
//!
//! Failures come in two classes. *Fatal* errors mean an OS call failed and the
//! timer should be abandoned. *Warnings* mean the call was redundant for the
//! current state (starting a running timer, stopping an idle one) and the
//! timer is still perfectly usable. [`TimerError::code`] encodes the class in
//! the sign: fatal codes are negative, warnings positive.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::Signal;

/// Result type used throughout the crate.
pub type TimerResult<T> = Result<T, TimerError>;

/// Whether an error invalidates the timer or merely reports a redundant call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

/// Everything that can go wrong while creating, driving or notifying a timer.
#[derive(Error, Debug)]
pub enum TimerError {
    #[error("sigaction({signal}) failed: {source}")]
    Registration {
        signal: Signal,
        #[source]
        source: io::Error,
    },
    #[error("timer_create failed: {source}")]
    Create {
        #[source]
        source: io::Error,
    },
    #[error("timer_gettime failed: {source}")]
    Query {
        #[source]
        source: io::Error,
    },
    #[error("timer_settime failed: {source}")]
    Arm {
        #[source]
        source: io::Error,
    },
    #[error("cannot transfer {what} to or from the platform representation")]
    Transfer { what: &'static str },
    #[error("unknown timer failure")]
    Unknown,

    #[error("timer is already running")]
    StartWhileRunning,
    #[error("timer is already running, nothing to resume")]
    ResumeWhileRunning,
    #[error("timer is not running")]
    StopWhileStopped,
    #[error("timer is not running, nothing to suspend")]
    SuspendWhileStopped,
    #[error("timer was not suspended, nothing to resume")]
    ResumeWithoutSuspend,
    #[error("notification arrived without a timer token")]
    NullPayload,
    #[error("notification for signal {expected} arrived on signal {delivered}")]
    UnexpectedSignal { expected: Signal, delivered: Signal },
}

/// Field-less mirror of [`TimerError`], convenient for matching and for
/// round-tripping through integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Registration,
    Create,
    Query,
    Arm,
    Transfer,
    Unknown,
    StartWhileRunning,
    ResumeWhileRunning,
    StopWhileStopped,
    SuspendWhileStopped,
    ResumeWithoutSuspend,
    NullPayload,
    UnexpectedSignal,
}

impl ErrorKind {
    const ALL: [ErrorKind; 13] = [
        ErrorKind::Registration,
        ErrorKind::Create,
        ErrorKind::Query,
        ErrorKind::Arm,
        ErrorKind::Transfer,
        ErrorKind::Unknown,
        ErrorKind::StartWhileRunning,
        ErrorKind::ResumeWhileRunning,
        ErrorKind::StopWhileStopped,
        ErrorKind::SuspendWhileStopped,
        ErrorKind::ResumeWithoutSuspend,
        ErrorKind::NullPayload,
        ErrorKind::UnexpectedSignal,
    ];

    /// Stable integer code: negative for fatal kinds, positive for warnings.
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::Registration => -1,
            ErrorKind::Create => -2,
            ErrorKind::Query => -3,
            ErrorKind::Arm => -4,
            ErrorKind::Transfer => -5,
            ErrorKind::Unknown => -6,
            ErrorKind::StartWhileRunning => 1,
            ErrorKind::ResumeWhileRunning => 2,
            ErrorKind::StopWhileStopped => 3,
            ErrorKind::SuspendWhileStopped => 4,
            ErrorKind::ResumeWithoutSuspend => 5,
            ErrorKind::NullPayload => 6,
            ErrorKind::UnexpectedSignal => 7,
        }
    }

    /// Maps a code produced by [`ErrorKind::code`] back to its kind.
    ///
    /// Unrecognized codes map to [`ErrorKind::Unknown`].
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .unwrap_or(ErrorKind::Unknown)
    }

    pub const fn severity(self) -> Severity {
        if self.code() < 0 {
            Severity::Fatal
        } else {
            Severity::Warning
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TimerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registration { .. } => ErrorKind::Registration,
            Self::Create { .. } => ErrorKind::Create,
            Self::Query { .. } => ErrorKind::Query,
            Self::Arm { .. } => ErrorKind::Arm,
            Self::Transfer { .. } => ErrorKind::Transfer,
            Self::Unknown => ErrorKind::Unknown,
            Self::StartWhileRunning => ErrorKind::StartWhileRunning,
            Self::ResumeWhileRunning => ErrorKind::ResumeWhileRunning,
            Self::StopWhileStopped => ErrorKind::StopWhileStopped,
            Self::SuspendWhileStopped => ErrorKind::SuspendWhileStopped,
            Self::ResumeWithoutSuspend => ErrorKind::ResumeWithoutSuspend,
            Self::NullPayload => ErrorKind::NullPayload,
            Self::UnexpectedSignal { .. } => ErrorKind::UnexpectedSignal,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub fn severity(&self) -> Severity {
        self.kind().severity()
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Wraps `errno` from the last failed libc call.
    pub(crate) fn last_os<F>(wrap: F) -> Self
    where
        F: FnOnce(io::Error) -> Self,
    {
        wrap(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_kind() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn unrecognized_code_is_unknown() {
        assert_eq!(ErrorKind::from_code(0), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_code(-42), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_code(99), ErrorKind::Unknown);
    }

    #[test]
    fn sign_separates_fatal_from_warning() {
        let fatal = TimerError::Arm {
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(fatal.is_fatal());
        assert!(fatal.code() < 0);

        let warning = TimerError::StartWhileRunning;
        assert!(warning.is_warning());
        assert!(warning.code() > 0);
    }

    #[test]
    fn display_names_the_failing_call() {
        let err = TimerError::Query {
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.to_string().starts_with("timer_gettime failed"));

        let err = TimerError::Registration {
            signal: Signal::new(64),
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.to_string().starts_with("sigaction(64) failed"));
    }
}
