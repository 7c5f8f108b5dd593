//! First-Committer-Wins Model
//!
//! Property test: a batch of frames is opened together, each writes a random
//! subset of cells, then they are closed in random order. A commit must fail
//! exactly when an earlier commit in the batch wrote one of the same cells.

use crate::common::*;
use proptest::prelude::*;

const CELLS: usize = 5;

#[derive(Debug, Clone)]
struct Plan {
    /// Bit `c` set: the frame writes cell `c`
    mask: u8,
    commit: bool,
}

fn plans() -> impl Strategy<Value = (Vec<Plan>, Vec<usize>)> {
    prop::collection::vec(
        (0u8..(1 << CELLS), any::<bool>()).prop_map(|(mask, commit)| Plan { mask, commit }),
        1..7,
    )
    .prop_flat_map(|plans| {
        let order: Vec<usize> = (0..plans.len()).collect();
        (Just(plans), Just(order).prop_shuffle())
    })
}

fn writes(mask: u8, cell: usize) -> bool {
    mask & (1 << cell) != 0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn commits_follow_first_committer_wins((plans, order) in plans()) {
        let rt = unbound_runtime();
        let cells: Vec<StateCell<i64>> = (0..CELLS).map(|_| committed_cell(&rt, -1)).collect();

        let mut frames: Vec<Option<Frame>> = Vec::new();
        for (k, plan) in plans.iter().enumerate() {
            let mut frame = open(&rt);
            for (c, cell) in cells.iter().enumerate() {
                if writes(plan.mask, c) {
                    cell.set(&mut frame, (k * 100 + c) as i64).unwrap();
                }
            }
            frames.push(Some(frame));
        }

        let mut expected = vec![-1i64; CELLS];
        let mut written = [false; CELLS];
        let mut conflicts = 0;
        for k in order {
            let frame = frames[k].take().unwrap();
            let plan = &plans[k];
            if !plan.commit {
                frame.abort();
                continue;
            }
            let collides = (0..CELLS).any(|c| writes(plan.mask, c) && written[c]);
            let result = frame.commit();
            prop_assert_eq!(result.is_err(), collides, "frame {} mask {:05b}", k, plan.mask);
            if collides {
                conflicts += 1;
                continue;
            }
            for c in 0..CELLS {
                if writes(plan.mask, c) {
                    written[c] = true;
                    expected[c] = (k * 100 + c) as i64;
                }
            }
        }

        for (c, cell) in cells.iter().enumerate() {
            prop_assert_eq!(rt.read_committed(cell).unwrap(), expected[c], "cell {}", c);
        }
        prop_assert_eq!(rt.metrics().conflicts, conflicts);
        prop_assert_eq!(rt.open_frame_count(), 0);
    }
}
