use super::*;

use std::{
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

#[test]
fn offer_preserves_insertion_order() {
    let acc = Accumulator::new(None, None);
    for c in ["a", "b", "c"] {
        assert_eq!(acc.offer(c), Offer::Accepted);
    }

    assert!(acc.close(CloseReason::Explicit));
    let (reason, items) = acc.wait_closed();
    assert_eq!(reason, CloseReason::Explicit);
    assert_eq!(items, vec!["a", "b", "c"]);
}

#[test]
fn filling_append_is_kept_and_closes() {
    let acc = Accumulator::new(Some(2), None);
    assert_eq!(acc.offer(1), Offer::Accepted);
    assert_eq!(acc.offer(2), Offer::Filled);
    assert!(acc.is_closed());
    assert_eq!(acc.close_reason(), Some(CloseReason::Size));

    // Later offers are handed back untouched.
    assert_eq!(acc.offer(3), Offer::Rejected(3));

    let (_, items) = acc.wait_closed();
    assert_eq!(items, vec![1, 2]);
}

#[test]
fn zero_limits_mean_unbounded() {
    let acc = Accumulator::new(Some(0), Some(Duration::ZERO));
    assert_eq!(acc.size_limit(), None);
    assert_eq!(acc.age_limit(), None);
    assert_eq!(acc.deadline(), None);

    for i in 0..1_000 {
        assert_eq!(acc.offer(i), Offer::Accepted);
    }
    assert_eq!(acc.len(), 1_000);
}

#[test]
fn deadline_is_opened_at_plus_age() {
    let age = Duration::from_millis(50);
    let acc: Accumulator<u8> = Accumulator::new(None, Some(age));
    assert_eq!(acc.deadline(), Some(acc.opened_at() + age));
}

#[test]
fn close_is_idempotent() {
    let acc: Accumulator<u8> = Accumulator::new(None, None);
    assert!(acc.close(CloseReason::Explicit));
    assert!(!acc.close(CloseReason::Explicit));
    assert!(!acc.expire());
    assert_eq!(acc.close_reason(), Some(CloseReason::Explicit));
}

#[test]
fn closing_empty_accumulator_yields_empty_snapshot() {
    let acc: Accumulator<u8> = Accumulator::new(Some(5), None);
    assert!(acc.is_empty());
    assert!(acc.close(CloseReason::Explicit));
    let (_, items) = acc.wait_closed();
    assert!(items.is_empty());
}

#[test]
fn wait_closed_blocks_until_another_thread_closes() {
    let acc = Arc::new(Accumulator::new(None, None));
    acc.offer("x");

    let waiter = {
        let acc = Arc::clone(&acc);
        thread::spawn(move || acc.wait_closed())
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished(), "waiter returned before close");

    assert!(acc.expire());
    let (reason, items) = waiter.join().expect("waiter panicked");
    assert_eq!(reason, CloseReason::Age);
    assert_eq!(items, vec!["x"]);
}

#[test]
fn racing_closers_have_exactly_one_winner() {
    for _ in 0..200 {
        let acc = Arc::new(Accumulator::new(Some(1), Some(Duration::from_millis(1))));
        let barrier = Arc::new(Barrier::new(3));

        let filler = {
            let acc = Arc::clone(&acc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                matches!(acc.offer(7u32), Offer::Filled)
            })
        };
        let timer = {
            let acc = Arc::clone(&acc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                acc.expire()
            })
        };
        let flusher = {
            let acc = Arc::clone(&acc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                acc.close(CloseReason::Explicit)
            })
        };

        let wins = [filler, timer, flusher]
            .into_iter()
            .map(|h| h.join().expect("closer panicked"))
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1, "exactly one closer must win");
        assert!(acc.is_closed());
    }
}
