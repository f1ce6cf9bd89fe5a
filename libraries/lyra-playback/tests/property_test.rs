//! Property tests for the queue state machine and crossfade curves

use lyra_core::types::{PlayMode, RepeatMode, Song, SortField, SortOrder};
use lyra_playback::crossfade::equal_power_curves;
use lyra_playback::queue::QueueMachine;
use proptest::prelude::*;

fn song(id: u32) -> Song {
    serde_json::from_value(serde_json::json!({
        "uuid": format!("s{id}"),
        "title": format!("Title {}", id % 7),
        "artist": format!("Artist {}", id % 3),
        "duration_secs": f64::from(id % 300) + 1.0,
        "year": 1990 + (id % 30) as i64,
    }))
    .unwrap()
}

/// One structural queue mutation
#[derive(Debug, Clone)]
enum QueueOp {
    SetItems(u8, u8),
    SetIndex(u8),
    Append(u8),
    Remove(u8),
    RemoveBatch(Vec<u8>),
    Reorder(u8, u8),
    ReorderBatch(Vec<u8>, u8),
    Sort(u8),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        (0u8..12, 0u8..12).prop_map(|(n, i)| QueueOp::SetItems(n, i)),
        (0u8..12).prop_map(QueueOp::SetIndex),
        (1u8..4).prop_map(QueueOp::Append),
        (0u8..12).prop_map(QueueOp::Remove),
        proptest::collection::vec(0u8..12, 0..4).prop_map(QueueOp::RemoveBatch),
        (0u8..12, 0u8..12).prop_map(|(f, t)| QueueOp::Reorder(f, t)),
        (proptest::collection::vec(0u8..12, 0..4), 0u8..12)
            .prop_map(|(i, t)| QueueOp::ReorderBatch(i, t)),
        (0u8..6).prop_map(QueueOp::Sort),
        Just(QueueOp::Clear),
    ]
}

fn apply(queue: &mut QueueMachine, op: &QueueOp, seed: &mut u32) {
    let fresh = |seed: &mut u32, n: u8| -> Vec<Song> {
        (0..n)
            .map(|_| {
                *seed += 1;
                song(*seed)
            })
            .collect()
    };

    match op {
        QueueOp::SetItems(n, i) => {
            let items = fresh(seed, *n);
            queue.set_items(items, usize::from(*i));
        }
        QueueOp::SetIndex(i) => queue.set_index(usize::from(*i)),
        QueueOp::Append(n) => {
            let items = fresh(seed, *n);
            queue.append(items);
        }
        QueueOp::Remove(i) => {
            queue.remove(usize::from(*i));
        }
        QueueOp::RemoveBatch(indices) => {
            let indices: Vec<usize> = indices.iter().map(|i| usize::from(*i)).collect();
            queue.remove_batch(&indices);
        }
        QueueOp::Reorder(from, to) => queue.reorder(usize::from(*from), usize::from(*to)),
        QueueOp::ReorderBatch(indices, to) => {
            let indices: Vec<usize> = indices.iter().map(|i| usize::from(*i)).collect();
            queue.reorder_batch(&indices, usize::from(*to));
        }
        QueueOp::Sort(field) => {
            let field = match field % 6 {
                0 => SortField::Artist,
                1 => SortField::Album,
                2 => SortField::Track,
                3 => SortField::Title,
                4 => SortField::Year,
                _ => SortField::Duration,
            };
            queue.sort(field, SortOrder::Ascending);
        }
        QueueOp::Clear => queue.clear(),
    }
}

proptest! {
    /// Queue integrity: after any structural mutation the index stays
    /// in range and addresses the current song
    #[test]
    fn queue_index_always_addresses_a_song(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut queue = QueueMachine::new();
        let mut seed = 0u32;

        for op in &ops {
            apply(&mut queue, op, &mut seed);

            if queue.is_empty() {
                prop_assert!(queue.current_song().is_none());
            } else {
                prop_assert!(queue.index() < queue.len());
                let current = queue.current_song().expect("non-empty queue has a current song");
                prop_assert_eq!(&current.uuid, &queue.items()[queue.index()].uuid);
            }
        }
    }

    /// Version monotonicity: every structural mutation bumps the version
    #[test]
    fn queue_version_is_strictly_monotone(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut queue = QueueMachine::new();
        let mut seed = 0u32;
        let mut last = queue.version();

        for op in &ops {
            apply(&mut queue, op, &mut seed);
            // Out-of-range reorders/removes are no-ops and may not bump;
            // everything that changed items or index must have
            let changed = queue.version() != last;
            if changed {
                prop_assert!(queue.version() > last);
            }
            last = queue.version();
        }
    }

    /// Shuffle/repeat exclusion after any toggle sequence
    #[test]
    fn shuffle_and_repeat_never_coexist(toggles in proptest::collection::vec(0u8..4, 1..30)) {
        let mut queue = QueueMachine::new();

        for toggle in toggles {
            match toggle {
                0 => queue.set_shuffle(true),
                1 => queue.set_shuffle(false),
                2 => queue.set_repeat(RepeatMode::All),
                _ => queue.set_repeat(RepeatMode::One),
            }

            let mode = queue.play_mode();
            if mode.shuffle() {
                prop_assert_eq!(mode.repeat(), RepeatMode::None);
            }
            if mode.repeat() != RepeatMode::None {
                prop_assert!(!mode.shuffle());
            }
            // And the combined value is always one of the four modes
            prop_assert!(matches!(
                mode,
                PlayMode::Sequential | PlayMode::Shuffle | PlayMode::RepeatAll | PlayMode::RepeatOne
            ));
        }
    }

    /// Equal-power law over the whole legal duration range
    #[test]
    fn crossfade_curves_conserve_energy(duration in 1.0f64..12.0) {
        let (fade_out, fade_in) = equal_power_curves(duration);
        prop_assert_eq!(fade_out.len(), fade_in.len());
        prop_assert!(fade_out.len() >= 100);

        for (out, inn) in fade_out.iter().zip(&fade_in) {
            let energy = out.powi(2) + inn.powi(2);
            prop_assert!((energy - 1.0).abs() < 1e-12);
        }
    }
}
