//! Concurrency Stress Tests
//!
//! Many threads run short read-modify-write transactions against a shared
//! set of cells, retrying on conflict.

use crate::common::*;
use rand::Rng;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const TRANSACTIONS: usize = 200;

fn increment_with_retry(rt: &FrameRuntime, cell: &StateCell<u64>) -> usize {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match rt.frame(|f| Ok(cell.update(f, |v| *v += 1)?)) {
            Ok(()) => return attempts,
            Err(e) if e.is_retryable() => continue,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[test]
fn concurrent_increments_are_not_lost() {
    let rt = runtime();
    let cells: Arc<Vec<StateCell<u64>>> = Arc::new((0..4).map(|_| committed_cell(&rt, 0)).collect());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let rt = rt.clone();
            let cells = Arc::clone(&cells);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut retries = 0;
                for _ in 0..TRANSACTIONS {
                    let cell = &cells[rng.gen_range(0..cells.len())];
                    retries += increment_with_retry(&rt, cell) - 1;
                }
                retries
            })
        })
        .collect();

    let retries: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let total: u64 = cells.iter().map(|c| rt.read_committed(c).unwrap()).sum();
    assert_eq!(total, (THREADS * TRANSACTIONS) as u64);

    let metrics = rt.metrics();
    assert_eq!(metrics.open, 0);
    assert_eq!(metrics.conflicts as usize, retries);
}

#[test]
fn transfers_preserve_the_total() {
    let rt = runtime();
    let accounts: Arc<Vec<StateCell<i64>>> =
        Arc::new((0..6).map(|_| committed_cell(&rt, 100)).collect());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let rt = rt.clone();
            let accounts = Arc::clone(&accounts);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..TRANSACTIONS {
                    let from = rng.gen_range(0..accounts.len());
                    let to = (from + rng.gen_range(1..accounts.len())) % accounts.len();
                    let amount = rng.gen_range(1..10);
                    loop {
                        let result = rt.frame(|f| {
                            accounts[from].update(f, |v| *v -= amount)?;
                            accounts[to].update(f, |v| *v += amount)?;
                            Ok(())
                        });
                        match result {
                            Ok(()) => break,
                            Err(e) if e.is_retryable() => continue,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();

    // Readers never see money created or destroyed mid-transfer
    for _ in 0..50 {
        let total: i64 = rt
            .read(|f| {
                let mut sum = 0;
                for account in accounts.iter() {
                    sum += account.get(f)?;
                }
                Ok(sum)
            })
            .unwrap();
        assert_eq!(total, 600);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let total: i64 = accounts.iter().map(|a| rt.read_committed(a).unwrap()).sum();
    assert_eq!(total, 600);
    assert_eq!(rt.open_frame_count(), 0);
}
