use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Signal, UserData};
use crate::registry::{Dispatch, Registry, Token};
use crate::timer::{IntervalTimer, TimerBuilder};

use super::support::{advance, AcceptingNotifier, FakeClock};

const PERIOD: Duration = Duration::from_millis(10);

#[test]
fn null_payload_is_ignored() {
    assert_eq!(
        Registry::global().dispatch(Signal::rtmax(), Token::NULL),
        Dispatch::NullPayload
    );
}

#[test]
fn callback_sees_user_data_verbatim() {
    let slot = Box::new(AtomicUsize::new(0));
    let data = UserData::from_ref(&*slot);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let probe = Arc::clone(&seen);

    let mut timer = TimerBuilder::new(PERIOD)
        .user_data(data)
        .callback(move |data: UserData| {
            probe.lock().unwrap().push(data);
            // SAFETY: the test keeps `slot` alive for the timer's lifetime.
            unsafe { &*data.cast::<AtomicUsize>() }.fetch_add(1, Ordering::SeqCst);
        })
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();
    timer.try_start().unwrap();

    advance(&timer, PERIOD * 3);
    drop(timer);

    assert_eq!(slot.load(Ordering::SeqCst), 3);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|observed| *observed == data));
}

#[test]
fn mismatched_signal_never_reaches_callback() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let first = TimerBuilder::new(PERIOD)
        .signal(Signal::rtmax())
        .callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();
    let second = TimerBuilder::new(PERIOD)
        .signal(Signal::new(Signal::rtmax().raw() - 1))
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();

    let outcome = Registry::global().dispatch(second.signal(), first.token());

    assert_eq!(outcome, Dispatch::SignalMismatch);
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
    assert_eq!(first.expirations(), 0);
    assert_eq!(
        Registry::global().dispatch(first.signal(), first.token()),
        Dispatch::Delivered
    );
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert_eq!(second.expirations(), 0);
}

#[test]
fn expirations_without_callback_are_counted() {
    let mut timer = TimerBuilder::new(PERIOD)
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();
    timer.try_start().unwrap();

    let outcomes = advance(&timer, PERIOD * 2);

    assert_eq!(outcomes, vec![Dispatch::NoCallback; 2]);
    assert_eq!(timer.expirations(), 2);
}

#[test]
fn panicking_callback_is_contained() {
    let timer = TimerBuilder::new(PERIOD)
        .callback(|_| panic!("callback failure"))
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();

    let registry = Registry::global();
    assert_eq!(registry.dispatch(timer.signal(), timer.token()), Dispatch::Panicked);
    assert_eq!(registry.dispatch(timer.signal(), timer.token()), Dispatch::Panicked);
    assert_eq!(timer.expirations(), 2);
}

#[test]
fn timer_may_drop_itself_from_its_callback() {
    let slot: Arc<Mutex<Option<IntervalTimer<FakeClock>>>> = Arc::new(Mutex::new(None));
    let owner = Arc::clone(&slot);
    let clock = FakeClock::default();

    let mut timer = TimerBuilder::new(PERIOD)
        .callback(move |_| {
            owner.lock().unwrap().take();
        })
        .build_with(clock.clone(), &AcceptingNotifier)
        .unwrap();
    timer.try_start().unwrap();
    let (signal, token) = (timer.signal(), timer.token());
    *slot.lock().unwrap() = Some(timer);

    assert_eq!(Registry::global().dispatch(signal, token), Dispatch::Delivered);

    assert!(slot.lock().unwrap().is_none());
    assert!(clock.state().destroyed);
    assert!(!Registry::global().contains(token));
    assert_eq!(Registry::global().dispatch(signal, token), Dispatch::Unregistered);
}

#[test]
fn tokens_are_unique() {
    let first = TimerBuilder::new(PERIOD)
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();
    let second = TimerBuilder::new(PERIOD)
        .build_with(FakeClock::default(), &AcceptingNotifier)
        .unwrap();

    assert_ne!(first.token(), second.token());
    assert!(!first.token().is_null());
}
