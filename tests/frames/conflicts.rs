//! Conflict Tests
//!
//! First committer wins; the loser sees a conflict and nothing it wrote
//! becomes visible.

use crate::common::*;

// ============================================================================
// Write/write collisions
// ============================================================================

#[test]
fn first_committer_wins() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    cell.set(&mut f1, 1).unwrap();
    cell.set(&mut f2, 2).unwrap();

    f1.commit().unwrap();
    let err = Error::from(f2.commit().unwrap_err());
    assert!(err.is_conflict());
    assert!(err.is_retryable());

    assert_eq!(read(&rt, &cell), 1);
}

#[test]
fn first_committer_wins_in_reverse_order() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    cell.set(&mut f1, 1).unwrap();
    cell.set(&mut f2, 2).unwrap();

    f2.commit().unwrap();
    assert!(f1.commit().unwrap_err().is_conflict());

    assert_eq!(read(&rt, &cell), 2);
}

#[test]
fn commit_since_open_conflicts_even_if_written_later() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);

    // f1 writes and commits before f2 has touched the cell
    cell.set(&mut f1, 1).unwrap();
    f1.commit().unwrap();

    // f2 still reads the pre-f1 value and bases its write on it
    assert_eq!(cell.get(&f2).unwrap(), 0);
    cell.set(&mut f2, 2).unwrap();
    assert!(f2.commit().unwrap_err().is_conflict());

    assert_eq!(read(&rt, &cell), 1);
}

#[test]
fn conflict_discards_every_write_of_the_loser() {
    let rt = unbound_runtime();
    let shared = committed_cell(&rt, "start");
    let private = committed_cell(&rt, "start");

    let mut winner = open(&rt);
    let mut loser = open(&rt);
    shared.set(&mut winner, "winner").unwrap();
    shared.set(&mut loser, "loser").unwrap();
    private.set(&mut loser, "loser").unwrap();

    winner.commit().unwrap();
    assert!(loser.commit().is_err());

    // Strong atomicity: the non-conflicting write is gone too
    assert_eq!(read(&rt, &shared), "winner");
    assert_eq!(read(&rt, &private), "start");
    assert_eq!(rt.open_frame_count(), 0);
}

#[test]
fn retry_after_conflict_succeeds() {
    let rt = unbound_runtime();
    let counter = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    counter.update(&mut f1, |v| *v += 1).unwrap();
    counter.update(&mut f2, |v| *v += 1).unwrap();
    f1.commit().unwrap();
    assert!(f2.commit().is_err());

    // Re-run the transaction from scratch
    rt.frame(|f| Ok(counter.update(f, |v| *v += 1)?)).unwrap();
    assert_eq!(read(&rt, &counter), 2);
}

// ============================================================================
// No conflict
// ============================================================================

#[test]
fn disjoint_writes_both_commit() {
    let rt = unbound_runtime();
    let a = committed_cell(&rt, 0);
    let b = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    a.set(&mut f1, 1).unwrap();
    b.set(&mut f2, 2).unwrap();
    f1.commit().unwrap();
    f2.commit().unwrap();

    assert_eq!(read(&rt, &a), 1);
    assert_eq!(read(&rt, &b), 2);
}

#[test]
fn reads_never_conflict() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut writer = open(&rt);
    let reader = open(&rt);
    assert_eq!(cell.get(&reader).unwrap(), 0);
    cell.set(&mut writer, 1).unwrap();
    writer.commit().unwrap();
    reader.commit().unwrap();
    assert_eq!(rt.metrics().conflicts, 0);
}

#[test]
fn aborted_writer_does_not_cause_conflict() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    cell.set(&mut f1, 1).unwrap();
    cell.set(&mut f2, 2).unwrap();

    f1.abort();
    f2.commit().unwrap();
    assert_eq!(read(&rt, &cell), 2);
}

#[test]
fn frame_opened_after_commit_does_not_conflict() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    rt.frame(|f| Ok(cell.set(f, 1)?)).unwrap();
    let mut later = open(&rt);
    assert_eq!(cell.get(&later).unwrap(), 1);
    cell.set(&mut later, 2).unwrap();
    later.commit().unwrap();
    assert_eq!(read(&rt, &cell), 2);
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn conflicts_are_counted() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    cell.set(&mut f1, 1).unwrap();
    cell.set(&mut f2, 2).unwrap();
    f1.commit().unwrap();
    let _ = f2.commit();

    let metrics = rt.metrics();
    assert_eq!(metrics.conflicts, 1);
    assert_eq!(metrics.aborted, 1);
    assert_eq!(metrics.committed, 2);
    assert_eq!(metrics.open, 0);
}
