//! Counter classification.
//!
//! Turns the raw set of on-chain counters into a prioritized action plan
//! for one ledger epoch. One deterministic pass: every input counter lands
//! in exactly one bucket, and the `current`/`register` slots never hold
//! more than one element.

use crate::error::ClassifyError;
use crate::types::{Counter, CounterSet};

/// Partition `counters` against the ledger's current `epoch`.
///
/// - epoch == E: the `current` slot; the counter with more accrued
///   transactions wins, the loser is deleted. An incumbent wins a tie.
/// - epoch == E-1: the `register` slot; a registered counter beats an
///   unregistered one regardless of tx count, tx count tie-breaks among
///   equals.
/// - epoch <= E-2: claimable if registered, otherwise too old to ever
///   become claimable and deleted.
/// - epoch > E: local state ahead of the ledger, which must never occur.
pub fn classify(counters: Vec<Counter>, epoch: u64) -> Result<CounterSet, ClassifyError> {
    let mut set = CounterSet::new(epoch);

    for counter in counters {
        if counter.epoch > epoch {
            return Err(ClassifyError::EpochAhead {
                id: counter.id,
                counter_epoch: counter.epoch,
                ledger_epoch: epoch,
            });
        }

        if counter.epoch == epoch {
            match set.current.take() {
                None => set.current = Some(counter),
                Some(incumbent) => {
                    if counter.tx_count > incumbent.tx_count {
                        set.delete.push(incumbent);
                        set.current = Some(counter);
                    } else {
                        set.delete.push(counter);
                        set.current = Some(incumbent);
                    }
                }
            }
        } else if counter.epoch + 1 == epoch {
            match set.register.take() {
                None => set.register = Some(counter),
                Some(incumbent) => {
                    // Registered state dominates tx count: only a registered
                    // counter is ever eligible to claim.
                    let challenger_wins = match (counter.registered, incumbent.registered) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => counter.tx_count > incumbent.tx_count,
                    };
                    if challenger_wins {
                        set.delete.push(incumbent);
                        set.register = Some(counter);
                    } else {
                        set.delete.push(counter);
                        set.register = Some(incumbent);
                    }
                }
            }
        } else if counter.registered {
            set.claim.push(counter);
        } else {
            set.delete.push(counter);
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectRef;

    fn counter(id: &str, epoch: u64, tx_count: u64, registered: bool) -> Counter {
        Counter {
            id: id.to_string(),
            reference: ObjectRef {
                id: id.to_string(),
                version: 1,
                digest: format!("digest-{id}"),
            },
            epoch,
            tx_count,
            registered,
        }
    }

    #[test]
    fn test_empty_input() {
        let set = classify(vec![], 10).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.epoch, 10);
    }

    #[test]
    fn test_total_partition() {
        let counters = vec![
            counter("a", 10, 5, false),
            counter("b", 10, 3, false),
            counter("c", 9, 2, true),
            counter("d", 9, 9, false),
            counter("e", 8, 4, true),
            counter("f", 7, 4, false),
        ];
        let total = counters.len();

        let set = classify(counters, 10).unwrap();

        assert_eq!(set.len(), total, "every counter lands in exactly one bucket");
        assert!(set.current.is_some());
        assert!(set.register.is_some());
    }

    #[test]
    fn test_current_keeps_higher_tx_count() {
        let set = classify(vec![counter("lo", 10, 3, false), counter("hi", 10, 7, false)], 10)
            .unwrap();

        assert_eq!(set.current.as_ref().unwrap().id, "hi");
        assert_eq!(set.delete.len(), 1);
        assert_eq!(set.delete[0].id, "lo");
    }

    #[test]
    fn test_current_tie_keeps_incumbent() {
        let set = classify(vec![counter("first", 10, 5, false), counter("second", 10, 5, false)], 10)
            .unwrap();

        assert_eq!(set.current.as_ref().unwrap().id, "first");
        assert_eq!(set.delete[0].id, "second");
    }

    #[test]
    fn test_registered_dominates_tx_count() {
        let set = classify(
            vec![counter("busy", 9, 10, false), counter("reg", 9, 2, true)],
            10,
        )
        .unwrap();

        assert_eq!(set.register.as_ref().unwrap().id, "reg");
        assert_eq!(set.delete.len(), 1);
        assert_eq!(set.delete[0].id, "busy");
    }

    #[test]
    fn test_register_tx_count_breaks_tie_among_unregistered() {
        let set = classify(
            vec![counter("small", 9, 2, false), counter("big", 9, 8, false)],
            10,
        )
        .unwrap();

        assert_eq!(set.register.as_ref().unwrap().id, "big");
    }

    #[test]
    fn test_old_registered_is_claimable() {
        let set = classify(vec![counter("old", 8, 4, true)], 10).unwrap();

        assert_eq!(set.claim.len(), 1);
        assert!(set.delete.is_empty());
    }

    #[test]
    fn test_old_unregistered_is_deleted() {
        let set = classify(vec![counter("dead", 8, 4, false)], 10).unwrap();

        assert!(set.claim.is_empty());
        assert_eq!(set.delete.len(), 1);
    }

    #[test]
    fn test_epoch_ahead_is_invariant_violation() {
        let err = classify(vec![counter("future", 11, 1, false)], 10).unwrap_err();

        match err {
            ClassifyError::EpochAhead {
                counter_epoch,
                ledger_epoch,
                ..
            } => {
                assert_eq!(counter_epoch, 11);
                assert_eq!(ledger_epoch, 10);
            }
        }
    }
}
