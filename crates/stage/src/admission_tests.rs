use super::*;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

#[test]
fn unbounded_controller_is_pass_through() {
    let controller = Arc::new(AdmissionController::new(None));
    let never = CancelToken::new();

    let permits: Vec<Permit> = (0..100)
        .map(|_| controller.acquire(&never).expect("free permit"))
        .collect();

    assert_eq!(controller.available(), None);
    assert_eq!(controller.in_flight(), None);
    assert_eq!(controller.limit(), None);
    controller
        .drain_and_restore(&never)
        .expect("drain is a no-op");
    drop(permits);
}

#[test]
fn dropping_permit_releases_it() {
    let controller = Arc::new(AdmissionController::new(Some(2)));
    let never = CancelToken::new();

    let first = controller.acquire(&never).expect("first");
    let second = controller.acquire(&never).expect("second");
    assert_eq!(controller.available(), Some(0));
    assert_eq!(controller.in_flight(), Some(2));
    assert_eq!(controller.limit(), Some(2));

    drop(first);
    assert_eq!(controller.available(), Some(1));
    drop(second);
    assert_eq!(controller.available(), Some(2));
}

#[test]
fn acquire_blocks_until_release() {
    let controller = Arc::new(AdmissionController::new(Some(1)));
    let held = controller.acquire(&CancelToken::new()).expect("held");

    let waiter = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            let start = Instant::now();
            let _permit = controller.acquire(&CancelToken::new()).expect("eventual");
            start.elapsed()
        })
    };

    thread::sleep(Duration::from_millis(60));
    assert!(!waiter.is_finished(), "acquire should block at capacity");
    drop(held);

    let waited = waiter.join().expect("waiter panicked");
    assert!(waited >= Duration::from_millis(50), "waited {waited:?}");
    assert_eq!(controller.available(), Some(1));
}

#[test]
fn cancelled_acquire_consumes_nothing() {
    let controller = Arc::new(AdmissionController::new(Some(1)));
    let held = controller.acquire(&CancelToken::new()).expect("held");

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let err = controller.acquire(&token).expect_err("should be cancelled");
    assert!(matches!(err, StageError::Cancelled));
    canceller.join().expect("canceller panicked");

    drop(held);
    assert_eq!(controller.available(), Some(1));
}

#[test]
fn drain_waits_for_outstanding_permits_and_restores_capacity() {
    let controller = Arc::new(AdmissionController::new(Some(3)));
    let never = CancelToken::new();

    let a = controller.acquire(&never).expect("a");
    let b = controller.acquire(&never).expect("b");

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        drop(a);
        thread::sleep(Duration::from_millis(40));
        drop(b);
    });

    let start = Instant::now();
    controller.drain_and_restore(&never).expect("drain");
    assert!(start.elapsed() >= Duration::from_millis(70));
    releaser.join().expect("releaser panicked");

    assert_eq!(controller.available(), Some(3));
}

#[test]
fn drain_times_out_with_deadline_token() {
    let controller = Arc::new(AdmissionController::new(Some(1)));
    let _held = controller.acquire(&CancelToken::new()).expect("held");

    let err = controller
        .drain_and_restore(&CancelToken::with_timeout(Duration::from_millis(30)))
        .expect_err("drain should time out");
    assert!(matches!(err, StageError::Cancelled));

    // The held permit is untouched by the failed drain.
    assert_eq!(controller.available(), Some(0));
}
