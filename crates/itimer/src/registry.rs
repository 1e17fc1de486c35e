//! Process-wide registry mapping notification tokens to timer records.
//!
//! The OS payload attached to every primitive is a [`Token`], never the
//! address of a timer. Notifications resolve the token here, so a timer that
//! has already been dropped is simply not found.

use core::cell::Cell;
use core::ffi::c_void;
use core::fmt;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::{Signal, UserData};
use crate::error::TimerError;

/// Expiration callback. Receives the timer's [`UserData`] verbatim.
pub type Callback = Box<dyn FnMut(UserData) + Send + 'static>;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

thread_local! {
    /// Token whose callback is running on this thread, if any.
    static DISPATCHING: Cell<Token> = const { Cell::new(Token::NULL) };
}

/// Key identifying one timer for its whole lifetime. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Payload value that identifies no timer.
    pub const NULL: Self = Self(0);

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Encodes the token as a `sigval` pointer payload.
    pub fn as_payload(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }

    /// Decodes a `sigval` pointer payload.
    pub fn from_payload(payload: *mut c_void) -> Self {
        Self(payload as usize as u64)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// The callback ran to completion.
    Delivered,
    /// The timer has no callback; the expiration was counted and dropped.
    NoCallback,
    /// The payload carried no token.
    NullPayload,
    /// No live timer owns the token.
    Unregistered,
    /// The signal differs from the one the timer was configured with.
    SignalMismatch,
    /// The callback panicked; the panic was contained.
    Panicked,
}

pub(crate) struct Entry {
    signal: Signal,
    user_data: UserData,
    callback: Mutex<Option<Callback>>,
    expirations: AtomicU64,
}

impl Entry {
    pub(crate) fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Acquire)
    }

    /// Removes the callback, waiting for an in-flight invocation to finish.
    ///
    /// Must not be called from inside this entry's own callback.
    pub(crate) fn retire(&self) -> Option<Callback> {
        self.callback.lock().take()
    }
}

/// Token → timer record map plus the dispatch logic run on every
/// notification.
pub struct Registry {
    next: AtomicU64,
    entries: Mutex<HashMap<Token, Arc<Entry>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registry shared by every timer in the process.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub(crate) fn insert(
        &self,
        signal: Signal,
        user_data: UserData,
        callback: Option<Callback>,
    ) -> (Token, Arc<Entry>) {
        let token = Token(self.next.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            signal,
            user_data,
            callback: Mutex::new(callback),
            expirations: AtomicU64::new(0),
        });
        self.entries.lock().insert(token, Arc::clone(&entry));
        (token, entry)
    }

    pub(crate) fn remove(&self, token: Token) -> Option<Arc<Entry>> {
        self.entries.lock().remove(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.lock().contains_key(&token)
    }

    /// Routes one notification to its timer's callback.
    ///
    /// Runs the callback synchronously on the calling thread. The map lock is
    /// released before the callback runs, so callbacks may create and drop
    /// other timers.
    pub(crate) fn dispatch(&self, signal: Signal, token: Token) -> Dispatch {
        if token.is_null() {
            warn!("{}", TimerError::NullPayload);
            return Dispatch::NullPayload;
        }

        let Some(entry) = self.entries.lock().get(&token).cloned() else {
            debug!("notification for retired timer {token} ignored");
            return Dispatch::Unregistered;
        };

        if entry.signal != signal {
            warn!(
                "timer {token}: {}",
                TimerError::UnexpectedSignal {
                    expected: entry.signal,
                    delivered: signal,
                }
            );
            return Dispatch::SignalMismatch;
        }

        let mut slot = entry.callback.lock();
        let Some(callback) = slot.as_mut() else {
            entry.expirations.fetch_add(1, Ordering::AcqRel);
            return Dispatch::NoCallback;
        };
        entry.expirations.fetch_add(1, Ordering::AcqRel);

        let _marker = DispatchMarker::enter(token);
        let user_data = entry.user_data;
        match panic::catch_unwind(AssertUnwindSafe(|| callback(user_data))) {
            Ok(()) => Dispatch::Delivered,
            Err(_) => {
                error!("timer {token}: callback panicked");
                Dispatch::Panicked
            }
        }
    }
}

/// Whether the current thread is inside `token`'s callback.
pub(crate) fn is_dispatching(token: Token) -> bool {
    DISPATCHING.with(|current| current.get() == token)
}

struct DispatchMarker {
    previous: Token,
}

impl DispatchMarker {
    fn enter(token: Token) -> Self {
        let previous = DISPATCHING.with(|current| current.replace(token));
        Self { previous }
    }
}

impl Drop for DispatchMarker {
    fn drop(&mut self) {
        DISPATCHING.with(|current| current.set(self.previous));
    }
}
