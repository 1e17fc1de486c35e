//! Asynchronous notification capability.
//!
//! POSIX timers report expiration by raising a signal whose `sigval` payload
//! carries the timer's [`Token`]. Running user callbacks in signal context
//! would let them interrupt arbitrary code on any thread, so the handler
//! installed here does the minimum: it writes `(signal, token)` into a
//! non-blocking pipe. A dedicated listener thread reads the pipe and hands
//! each frame to the [`Registry`] for dispatch.

use core::ffi::{c_int, c_void};
use core::ptr;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::thread;

use log::{debug, error, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::Signal;
use crate::error::{TimerError, TimerResult};
use crate::registry::{Registry, Token};

const LISTENER_NAME: &str = "itimer-notify";

/// Wire size of one notification: signal (4 bytes) + token (8 bytes).
const FRAME_LEN: usize = 12;

/// Write end of the notification pipe, read by the signal handler.
static PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);
/// Notifications lost because the pipe was full.
static DROPPED: AtomicU64 = AtomicU64::new(0);

static GLOBAL: OnceCell<SignalNotifier> = OnceCell::new();

/// Registers the process to receive expiration notifications on a signal.
pub trait Notifier {
    fn register(&self, signal: Signal) -> TimerResult<()>;
}

/// Signal-based notifier shared by every timer in the process.
pub struct SignalNotifier {
    installed: Mutex<HashSet<Signal>>,
}

impl SignalNotifier {
    /// Returns the process-wide notifier, starting the listener thread on
    /// first use.
    pub fn global() -> io::Result<&'static SignalNotifier> {
        GLOBAL.get_or_try_init(|| {
            spawn_listener(Registry::global())?;
            Ok(SignalNotifier {
                installed: Mutex::new(HashSet::new()),
            })
        })
    }

    pub fn is_registered(&self, signal: Signal) -> bool {
        self.installed.lock().contains(&signal)
    }
}

impl Notifier for SignalNotifier {
    fn register(&self, signal: Signal) -> TimerResult<()> {
        let mut installed = self.installed.lock();
        if installed.contains(&signal) {
            return Ok(());
        }

        // SAFETY: sigaction is plain old data; all-zero is a valid starting point.
        let mut action: libc::sigaction = unsafe { core::mem::zeroed() };
        let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) = on_signal;
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;

        // SAFETY: action is a valid, exclusively borrowed sigaction.
        unsafe { libc::sigemptyset(&mut action.sa_mask) };
        // SAFETY: action is fully initialized; the old action is not requested.
        if unsafe { libc::sigaction(signal.raw(), &action, ptr::null_mut()) } != 0 {
            return Err(TimerError::last_os(|source| TimerError::Registration {
                signal,
                source,
            }));
        }

        installed.insert(signal);
        debug!("expiration handler installed for signal {signal}");
        Ok(())
    }
}

/// Number of notifications dropped because the listener fell behind.
pub fn dropped_notifications() -> u64 {
    DROPPED.load(Ordering::Relaxed)
}

fn spawn_listener(registry: &'static Registry) -> io::Result<()> {
    let mut fds: [RawFd; 2] = [-1; 2];
    // SAFETY: fds has room for the two descriptors pipe2 writes.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 succeeded, both descriptors are fresh and owned here.
    let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    // The handler must never block, whatever the listener is doing.
    set_nonblocking(&writer)?;

    thread::Builder::new()
        .name(LISTENER_NAME.into())
        .spawn(move || listen(reader, registry))?;

    PIPE_WRITE.store(writer.into_raw_fd(), Ordering::Release);
    debug!("notification listener started");
    Ok(())
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    // SAFETY: fd is a valid open descriptor for both calls.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: see above.
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn listen(mut pipe: File, registry: &Registry) {
    let mut frame = [0u8; FRAME_LEN];
    let mut reported = 0;

    loop {
        if let Err(err) = pipe.read_exact(&mut frame) {
            error!("notification pipe closed, listener exiting: {err}");
            return;
        }

        let dropped = dropped_notifications();
        if dropped != reported {
            warn!("{} timer notifications dropped", dropped - reported);
            reported = dropped;
        }

        let (signal, token) = decode(&frame);
        registry.dispatch(signal, token);
    }
}

fn encode(signal: Signal, token: Token) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..4].copy_from_slice(&signal.raw().to_ne_bytes());
    frame[4..].copy_from_slice(&token.raw().to_ne_bytes());
    frame
}

fn decode(frame: &[u8; FRAME_LEN]) -> (Signal, Token) {
    let mut signal = [0u8; 4];
    let mut token = [0u8; 8];
    signal.copy_from_slice(&frame[..4]);
    token.copy_from_slice(&frame[4..]);
    let payload = u64::from_ne_bytes(token) as usize as *mut c_void;
    (Signal::new(i32::from_ne_bytes(signal)), Token::from_payload(payload))
}

/// Async-signal-safe: one `write(2)`, no allocation, no locks, `errno`
/// preserved.
extern "C" fn on_signal(signo: c_int, info: *mut libc::siginfo_t, _context: *mut c_void) {
    let fd = PIPE_WRITE.load(Ordering::Acquire);
    if fd < 0 {
        return;
    }

    let token = if info.is_null() {
        Token::NULL
    } else {
        // SAFETY: SA_SIGINFO handlers receive a valid siginfo_t; for timer and
        // sigqueue notifications si_value holds the sender's payload.
        Token::from_payload(unsafe { (*info).si_value().sival_ptr })
    };
    let frame = encode(Signal::new(signo), token);

    // SAFETY: errno is thread-local; reading and restoring it is signal-safe.
    let saved_errno = unsafe { *libc::__errno_location() };
    forward(fd, &frame);
    // SAFETY: see above.
    unsafe { *libc::__errno_location() = saved_errno };
}

/// Writes one frame to `fd`, counting it as dropped if the pipe cannot take
/// all of it. Async-signal-safe.
fn forward(fd: RawFd, frame: &[u8; FRAME_LEN]) -> bool {
    // SAFETY: frame outlives the call; the caller owns fd for its duration.
    let written = unsafe { libc::write(fd, frame.as_ptr().cast(), FRAME_LEN) };
    if written != FRAME_LEN as isize {
        DROPPED.fetch_add(1, Ordering::Relaxed);
        return false;
    }
    true
}
