//! Record Reuse Tests
//!
//! Writers recycle record slots nobody can read, so a cell written by one
//! frame after another keeps a short chain.

use crate::common::*;

#[test]
fn sequential_writers_keep_chain_at_two() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);
    assert_eq!(cell.chain_len(), 1);

    for i in 1..=50 {
        rt.frame(|f| Ok(cell.set(f, i)?)).unwrap();
        assert!(cell.chain_len() <= 2, "chain grew to {}", cell.chain_len());
    }
    assert_eq!(read(&rt, &cell), 50);
}

#[test]
fn aborted_record_is_reused() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);
    rt.frame(|f| Ok(cell.set(f, 1)?)).unwrap();
    let settled = cell.chain_len();

    rt.aborted(|f| Ok(cell.set(f, 99)?)).unwrap();
    let after_abort = cell.chain_len();
    rt.frame(|f| Ok(cell.set(f, 2)?)).unwrap();

    assert!(cell.chain_len() <= after_abort);
    assert!(cell.chain_len() <= settled.max(2));
    assert_eq!(read(&rt, &cell), 2);
}

#[test]
fn open_reader_keeps_its_record() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);
    rt.frame(|f| Ok(cell.set(f, 1)?)).unwrap();

    let reader = open(&rt);
    for i in 2..10 {
        rt.frame(|f| Ok(cell.set(f, i)?)).unwrap();
        assert_eq!(cell.get(&reader).unwrap(), 1);
    }
    reader.commit().unwrap();

    // Once the reader is gone the chain stops growing
    let len = cell.chain_len();
    rt.frame(|f| Ok(cell.set(f, 10)?)).unwrap();
    rt.frame(|f| Ok(cell.set(f, 11)?)).unwrap();
    assert_eq!(cell.chain_len(), len);
    assert_eq!(read(&rt, &cell), 11);
}

#[test]
fn chain_never_exceeds_writing_frames() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);
    let mut writers = 1;

    // Interleave overlapping writers, some aborted
    for round in 0..20 {
        let mut a = open(&rt);
        let mut b = open(&rt);
        cell.set(&mut a, round).unwrap();
        cell.set(&mut b, round + 100).unwrap();
        writers += 2;
        if round % 3 == 0 {
            a.abort();
            b.commit().unwrap();
        } else {
            a.commit().unwrap();
            assert!(b.commit().is_err());
        }
        assert!(cell.chain_len() <= writers);
    }
    assert!(cell.chain_len() <= 4, "chain length {}", cell.chain_len());
}

#[test]
fn reuse_disabled_grows_chain() {
    init_tracing();
    let rt = FrameRuntime::builder().record_reuse(false).build();
    let cell = committed_cell(&rt, 0);
    for i in 1..=5 {
        rt.frame(|f| Ok(cell.set(f, i)?)).unwrap();
    }
    assert_eq!(cell.chain_len(), 6);
    assert_eq!(read(&rt, &cell), 5);
}

#[test]
fn writes_within_one_frame_share_a_record() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);
    rt.frame(|f| {
        for i in 0..10 {
            cell.set(f, i)?;
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(cell.chain_len(), 2);
}
