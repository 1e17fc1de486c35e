//! Example driving a repeating timer through its whole lifecycle.
//!
//! Prints a heartbeat every 250 ms, pauses it for a second, resumes, resets,
//! and keeps beating until Ctrl-C. Run with `RUST_LOG=debug` to see the
//! lifecycle transitions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use itimer::{IntervalTimer, TimerState, UserData};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    // Owned by main for the whole run; the callback only borrows it.
    let beats = Box::new(AtomicUsize::new(0));

    let mut timer = IntervalTimer::builder(Duration::from_millis(250))
        .user_data(UserData::from_ref(&*beats))
        .callback(|data| {
            // SAFETY: `beats` outlives the timer, which is dropped first.
            let beats = unsafe { &*data.cast::<AtomicUsize>() };
            let n = beats.fetch_add(1, Ordering::SeqCst) + 1;
            println!("   beat {n}");
        })
        .build()?;

    println!("=== itimer heartbeat ===\n");

    timer.start();
    thread::sleep(Duration::from_millis(1100));

    timer.suspend();
    println!("   {} with {:?} left", timer.state(), timer.remaining());
    thread::sleep(Duration::from_secs(1));

    timer.resume();
    println!("   {} again", timer.state());
    thread::sleep(Duration::from_millis(600));

    timer.reset();
    println!("   reset, next beat in {:?}\n", timer.remaining());

    println!("Press Ctrl-C to stop.");
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }

    timer.stop();
    assert_eq!(timer.state(), TimerState::Idle);
    drop(timer);

    println!("\n   {} beats in total", beats.load(Ordering::SeqCst));
    Ok(())
}
