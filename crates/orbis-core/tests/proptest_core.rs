//! Property tests for the leaf components: the quantified invariants that
//! must hold for every seed, every command arrival order, and every frame
//! chunking.

use proptest::prelude::*;

use orbis_core::prelude::*;

// ---------------------------------------------------------------------------
// RNG properties
// ---------------------------------------------------------------------------

proptest! {
    /// For any (seed, call_count): restoring the state reproduces the exact
    /// draws that follow.
    #[test]
    fn rng_state_roundtrip(seed in any::<u32>(), warmup in 0usize..200) {
        let mut rng = SeededRng::new(seed);
        for _ in 0..warmup {
            rng.next_u32();
        }
        let state = rng.state();
        let expected: Vec<u32> = (0..32).map(|_| rng.next_u32()).collect();

        let mut restored = SeededRng::new(seed ^ 0xdead_beef);
        restored.set_state(state);
        let actual: Vec<u32> = (0..32).map(|_| restored.next_u32()).collect();
        prop_assert_eq!(expected, actual);
    }

    /// reset(seed) followed by replaying call_count draws lands on the same
    /// stream position as set_state.
    #[test]
    fn rng_reset_and_advance_equals_set_state(seed in any::<u32>(), count in 0u64..500) {
        let mut replayed = SeededRng::new(0);
        replayed.reset(seed);
        for _ in 0..count {
            replayed.next_u32();
        }

        let mut jumped = SeededRng::new(0);
        jumped.set_state(RngState { seed, call_count: count });

        prop_assert_eq!(replayed.next_u32(), jumped.next_u32());
    }

    /// Bounded draws stay in range for arbitrary bounds.
    #[test]
    fn rng_bounded_draws_in_range(seed in any::<u32>(), n in 1u32..=u32::MAX) {
        let mut rng = SeededRng::new(seed);
        prop_assert!(rng.next_u32_below(n) < n);
    }
}

// ---------------------------------------------------------------------------
// Queue properties
// ---------------------------------------------------------------------------

fn make_command(raw: u64, target_tick: u64) -> Command {
    Command::new(
        CommandId::new(raw),
        CommandKind::Deselect,
        target_tick.saturating_sub(1),
        target_tick,
    )
}

proptest! {
    /// Flush order is a function of the ordering keys alone: any arrival
    /// permutation of the same keyed commands flushes identically.
    #[test]
    fn queue_flush_order_ignores_arrival_order(
        mut arrivals in proptest::collection::vec((0u8..4, 0u64..32), 1..24),
    ) {
        arrivals.sort();
        arrivals.dedup();

        let enqueue_all = |entries: &[(u8, u64)]| {
            let mut queue = CommandQueue::new(QueueMode::Lockstep);
            for (i, &(client, seq)) in entries.iter().enumerate() {
                let key = OrderingKey {
                    client_id: format!("client-{client}"),
                    seq,
                };
                queue.enqueue(make_command(i as u64, 5), key, 0);
            }
            queue.flush(5).iter().map(|c| c.id.raw()).collect::<Vec<_>>()
        };

        let forward = enqueue_all(&arrivals);

        let mut reversed_entries = arrivals.clone();
        reversed_entries.reverse();
        // Re-map ids so the same (client, seq) pair carries the same id in
        // both runs despite the reversed arrival order.
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        for &(client, seq) in &reversed_entries {
            let id = arrivals.iter().position(|&e| e == (client, seq)).unwrap() as u64;
            let key = OrderingKey {
                client_id: format!("client-{client}"),
                seq,
            };
            queue.enqueue(make_command(id, 5), key, 0);
        }
        let backward: Vec<u64> = queue.flush(5).iter().map(|c| c.id.raw()).collect();

        prop_assert_eq!(forward, backward);
    }

    /// Every accepted command is flushed exactly once, at exactly its
    /// target tick.
    #[test]
    fn queue_flushes_each_command_once(
        targets in proptest::collection::vec(1u64..20, 1..40),
    ) {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        for (i, &target) in targets.iter().enumerate() {
            let key = OrderingKey { client_id: "local".to_owned(), seq: i as u64 };
            queue.enqueue(make_command(i as u64, target), key, 0);
        }

        let mut seen = 0usize;
        for tick in 1..20 {
            let flushed = queue.flush(tick);
            for c in &flushed {
                prop_assert_eq!(c.target_tick, tick);
            }
            seen += flushed.len();
        }
        prop_assert_eq!(seen, targets.len());
        prop_assert_eq!(queue.pending_count(), 0);
    }
}

// ---------------------------------------------------------------------------
// Clock properties
// ---------------------------------------------------------------------------

proptest! {
    /// For any sequence of frame deltas summing to T, the executed tick
    /// count equals ⌊T/Δ⌋ when the catch-up cap is never the binding
    /// constraint. Deltas sit on a quarter-millisecond grid so the sums are
    /// exact in f64 and the floor comparison has no rounding seam.
    #[test]
    fn clock_tick_count_matches_elapsed_time(
        quarter_ms in proptest::collection::vec(0u32..800, 1..100),
    ) {
        let step_ms = 50.0;
        let mut clock = FixedClock::new(step_ms).with_max_ticks_per_step(u32::MAX);
        let mut now = 0.0;
        let mut total = 0u64;
        clock.step(now).unwrap();
        for q in &quarter_ms {
            now += f64::from(*q) / 4.0;
            total += u64::from(clock.step(now).unwrap().ticks);
        }
        prop_assert_eq!(total, (now / step_ms).floor() as u64);
    }

    /// Alpha stays inside [0, 1) for arbitrary frame timing.
    #[test]
    fn clock_alpha_in_unit_interval(
        deltas in proptest::collection::vec(0.0f64..500.0, 1..50),
    ) {
        let mut clock = FixedClock::new(50.0);
        let mut now = 0.0;
        clock.step(now).unwrap();
        for d in &deltas {
            now += d;
            let plan = clock.step(now).unwrap();
            prop_assert!((0.0..1.0).contains(&plan.alpha), "alpha {}", plan.alpha);
        }
    }
}
