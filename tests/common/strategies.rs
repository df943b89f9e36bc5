//! Proptest strategies for dispatcher operation sequences.

use proptest::prelude::*;

pub const FILTERS: [&str; 2] = ["resize", "classify"];

/// One step applied to a [`super::DispatchHarness`]. Worker indexes are taken
/// modulo the number of workers still connected.
#[derive(Debug, Clone)]
pub enum Op {
    Connect { filter: usize },
    Submit { filter: usize },
    Reply { worker: usize, answered: bool },
    Heartbeat { worker: usize },
    Disconnect { worker: usize },
    Tick { secs: u64 },
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..FILTERS.len()).prop_map(|filter| Op::Connect { filter }),
        5 => (0..FILTERS.len()).prop_map(|filter| Op::Submit { filter }),
        6 => (0..16usize, any::<bool>()).prop_map(|(worker, answered)| Op::Reply { worker, answered }),
        1 => (0..16usize).prop_map(|worker| Op::Heartbeat { worker }),
        1 => (0..16usize).prop_map(|worker| Op::Disconnect { worker }),
        1 => (0..90u64).prop_map(|secs| Op::Tick { secs }),
    ]
}

pub fn op_sequence_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..80)
}
