//! Property tests: arbitrary join/leave/send sequences keep every invariant.

use huddle_harness::{InvariantRegistry, Scenario};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Join(String),
    Connect,
    Leave(usize),
    Send(usize, String),
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-z]{1,6}".prop_map(Op::Join),
        1 => Just(Op::Connect),
        1 => any::<usize>().prop_map(Op::Leave),
        5 => (any::<usize>(), "[ -~]{1,16}").prop_map(|(who, text)| Op::Send(who, text)),
    ]
}

fn run(seed: u64, ops: Vec<Op>) -> Scenario {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
    let mut scenario = Scenario::new(seed);

    runtime.block_on(async {
        for op in ops {
            match op {
                Op::Join(name) => {
                    scenario.join(&name).await.expect("join");
                },
                Op::Connect => {
                    scenario.connect().await.expect("connect");
                },
                Op::Leave(who) if scenario.participant_count() > 0 => {
                    scenario.leave(who % scenario.participant_count());
                },
                Op::Send(who, text) if scenario.participant_count() > 0 => {
                    // Anonymous or departed senders are refused locally.
                    let _ = scenario.send(who % scenario.participant_count(), &text);
                },
                _ => {},
            }
        }
    });

    scenario
}

proptest! {
    #[test]
    fn prop_invariants_hold_after_any_sequence(
        seed in any::<u64>(),
        ops in prop::collection::vec(arbitrary_op(), 0..40),
    ) {
        let scenario = run(seed, ops);
        let snapshot = scenario.snapshot();
        let result = InvariantRegistry::standard().check_all(&snapshot);
        prop_assert!(result.is_ok(), "{:?}", result);
    }

    #[test]
    fn prop_continuous_members_share_history(
        seed in any::<u64>(),
        names in prop::collection::vec("[a-z]{1,6}", 2..5),
        texts in prop::collection::vec((any::<usize>(), "[ -~]{1,16}"), 0..20),
    ) {
        let mut ops: Vec<Op> = names.into_iter().map(Op::Join).collect();
        ops.extend(texts.into_iter().map(|(who, text)| Op::Send(who, text)));
        let scenario = run(seed, ops);

        let first = scenario.participant(0).state().history().as_slice().to_vec();
        for index in 1..scenario.participant_count() {
            let history = scenario.participant(index).state().history().as_slice();
            prop_assert_eq!(history, first.as_slice());
        }
    }

    #[test]
    fn prop_same_seed_same_run(
        seed in any::<u64>(),
        ops in prop::collection::vec(arbitrary_op(), 0..30),
    ) {
        let a = run(seed, ops.clone());
        let b = run(seed, ops);

        prop_assert_eq!(a.relay().roster(), b.relay().roster());
        prop_assert_eq!(a.relay().frames_delivered(), b.relay().frames_delivered());
    }
}
