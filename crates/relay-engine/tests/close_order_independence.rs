//! Property test: P3/P5 hold regardless of the order in which children
//! report closed (§8). A fixed-order test like `close_protocol.rs` can only
//! cover the orderings someone thought to write; this lets proptest explore
//! arbitrary permutations of five timers' completion order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use relay_engine::testkit::{FakeTimer, InlineRunloop};
use relay_engine::{EngineConfig, EngineHandle, EngineId};

proptest! {
    #[test]
    fn close_completes_exactly_once_regardless_of_completion_order(
        permutation_keys in prop::collection::vec(0u32..10_000, 5)
    ) {
        let engine = EngineHandle::with_borrowed_runloop(
            EngineConfig::builder(EngineId::new("prop-close")).build(),
            InlineRunloop::new(),
        );

        let timers: Vec<_> = (0..5).map(|_| FakeTimer::new(false)).collect();
        for timer in &timers {
            let id = engine.insert_timer(timer.clone());
            timer.set_id(id);
        }

        let closed = Arc::new(AtomicUsize::new(0));
        let closed_cb = closed.clone();
        engine.set_on_closed(move || {
            closed_cb.fetch_add(1, Ordering::SeqCst);
        }).unwrap();

        engine.close_async();
        prop_assert_eq!(closed.load(Ordering::SeqCst), 0);

        let mut order: Vec<usize> = (0..timers.len()).collect();
        order.sort_by_key(|&i| permutation_keys[i]);

        for (step, &idx) in order.iter().enumerate() {
            timers[idx].finish_close();
            let expected = if step + 1 == order.len() { 1 } else { 0 };
            prop_assert_eq!(closed.load(Ordering::SeqCst), expected);
        }
    }
}
