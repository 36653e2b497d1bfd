use std::{sync::Barrier, thread};

use super::*;
use crate::foundation::core::PositionIndex;

fn combo(variant: &str) -> CombinationKey {
    let mut key = CombinationKey::default();
    key.set(PositionIndex::new(1).unwrap(), Some(variant.into()));
    key
}

#[test]
fn first_claim_wins_and_duplicates_are_rejected() {
    let ledger = CombinationLedger::new();
    assert!(ledger.try_claim(&combo("a")));
    assert!(!ledger.try_claim(&combo("a")));
    assert!(ledger.try_claim(&combo("b")));

    assert_eq!(ledger.distinct_len(), 2);
    assert_eq!(ledger.emitted(), 2);
    assert_eq!(ledger.occurrences(&combo("a")), 1);
    assert_eq!(ledger.duplicates(), 0);
    assert!(!ledger.contains(&combo("c")));
}

#[test]
fn racing_claims_have_exactly_one_winner() {
    let ledger = CombinationLedger::new();
    let threads = 16;
    let barrier = Barrier::new(threads);

    let wins: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    ledger.try_claim(&combo("contested"))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });

    assert_eq!(wins, 1);
    assert_eq!(ledger.emitted(), 1);
}

#[test]
fn record_counts_repeats() {
    let ledger = CombinationLedger::new();
    assert_eq!(ledger.record(&combo("a")), 1);
    assert_eq!(ledger.record(&combo("a")), 2);
    assert_eq!(ledger.record(&combo("b")), 1);

    assert_eq!(ledger.distinct_len(), 2);
    assert_eq!(ledger.emitted(), 3);
    assert_eq!(ledger.duplicates(), 1);
    assert!(!ledger.try_claim(&combo("a")));
    assert_eq!(ledger.occurrences(&combo("a")), 2);
}

#[test]
fn snapshot_is_sorted() {
    let ledger = CombinationLedger::new();
    for v in ["c", "a", "b", "a"] {
        ledger.record(&combo(v));
    }
    assert_eq!(
        ledger.snapshot(),
        vec![(combo("a"), 2), (combo("b"), 1), (combo("c"), 1)]
    );
}
