//! Isolation Tests
//!
//! A frame sees a point-in-time view; its writes stay private until commit.

use crate::common::*;

// ============================================================================
// Suspend / restore
// ============================================================================

#[test]
fn suspended_writes_are_invisible_to_other_frames() {
    let rt = runtime();
    let street = committed_cell(&rt, "123 Any Street".to_string());

    let (_, pending) = rt
        .suspended(|f| Ok(street.set(f, "456 Any Street".to_string())?))
        .unwrap();

    // A different frame still sees the committed address
    assert_eq!(read(&rt, &street), "123 Any Street");

    // The suspended frame still sees its own write
    rt.restored(pending, |f| {
        assert_eq!(street.get(f)?, "456 Any Street");
        Ok(())
    })
    .unwrap();

    assert_eq!(read(&rt, &street), "456 Any Street");
}

#[test]
fn frame_data_moves_across_threads() {
    let rt = runtime();
    let counter = committed_cell(&rt, 0u64);

    let (_, pending) = rt.suspended(|f| Ok(counter.set(f, 41)?)).unwrap();

    let worker_rt = rt.clone();
    let worker_counter = counter.clone();
    std::thread::spawn(move || {
        worker_rt
            .restored(pending, |f| {
                worker_counter.update(f, |v| *v += 1)?;
                Ok(())
            })
            .unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(rt.read_committed(&counter).unwrap(), 42);
}

#[test]
fn frame_sees_snapshot_from_open_time() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 1);

    let early = open(&rt);
    rt.frame(|f| Ok(cell.set(f, 2)?)).unwrap();

    // Opened before the commit: still sees the old value, repeatedly
    assert_eq!(cell.get(&early).unwrap(), 1);
    assert_eq!(cell.get(&early).unwrap(), 1);

    let late = open(&rt);
    assert_eq!(cell.get(&late).unwrap(), 2);

    early.commit().unwrap();
    late.commit().unwrap();
}

#[test]
fn concurrently_open_frame_commit_is_hidden_until_reopen() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, "a");

    let mut writer = open(&rt);
    let reader = open(&rt);
    cell.set(&mut writer, "b").unwrap();
    writer.commit().unwrap();

    // The reader was open while the writer was; it must not see "b"
    assert_eq!(cell.get(&reader).unwrap(), "a");
    reader.commit().unwrap();
    assert_eq!(read(&rt, &cell), "b");
}

// ============================================================================
// Abort
// ============================================================================

#[test]
fn aborted_frame_leaves_no_trace() {
    let rt = runtime();
    let cell = committed_cell(&rt, 10);

    rt.aborted(|f| {
        cell.set(f, 20)?;
        assert_eq!(cell.get(f)?, 20);
        Ok(())
    })
    .unwrap();

    assert_eq!(read(&rt, &cell), 10);
}

#[test]
fn cell_created_in_aborted_frame_has_no_record() {
    let rt = runtime();
    let orphan = rt.aborted(|f| rt.cell(f, 5)).unwrap();

    let err = rt.read_committed(&orphan).unwrap_err();
    assert!(err.is_serious());
}

#[test]
fn cell_created_in_open_frame_is_private() {
    let rt = unbound_runtime();
    let mut creator = open(&rt);
    let cell = rt.cell(&mut creator, 1).unwrap();

    let other = open(&rt);
    assert!(cell.get(&other).is_err());
    other.commit().unwrap();

    creator.commit().unwrap();
    assert_eq!(read(&rt, &cell), 1);
}

// ============================================================================
// Thread binding
// ============================================================================

#[test]
fn one_top_level_frame_per_thread() {
    let rt = runtime();
    let frame = open(&rt);
    assert_eq!(rt.current_frame_id(), Some(frame.id()));

    let err = rt.open(FrameOptions::new()).unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    let data = frame.suspend().unwrap();
    assert_eq!(rt.current_frame_id(), None);

    // Thread is free again once the frame is suspended
    rt.frame(|_| Ok(())).unwrap();
    rt.restored(data, |_| Ok(())).unwrap();
    assert_eq!(rt.open_frame_count(), 0);
}

#[test]
fn restore_on_busy_thread_hands_frame_back() {
    let rt = runtime();
    let cell = committed_cell(&rt, 1);
    let (_, data) = rt.suspended(|f| Ok(cell.set(f, 2)?)).unwrap();
    let busy = open(&rt);

    let err = rt.restore(data).unwrap_err();
    assert!(matches!(Error::from(err.error().clone()), Error::IllegalState(_)));
    // The rejected frame is still suspended, not aborted
    assert_eq!(rt.open_frame_count(), 2);
    let data = err.into_data();

    // Finish the transaction on another thread while this one stays busy
    let rt2 = rt.clone();
    std::thread::spawn(move || rt2.restored(data, |_| Ok(())))
        .join()
        .unwrap()
        .unwrap();
    busy.commit().unwrap();

    assert_eq!(read(&rt, &cell), 2);
    assert_eq!(rt.open_frame_count(), 0);
}

// ============================================================================
// Many writes
// ============================================================================

#[test]
fn thousand_changes_in_one_frame() {
    let rt = runtime();
    let cells: Vec<StateCell<usize>> = rt
        .frame(|f| (0..1000).map(|i| rt.cell(f, i)).collect())
        .unwrap();

    rt.frame(|f| {
        for cell in &cells {
            cell.update(f, |v| *v *= 2)?;
        }
        assert_eq!(f.modified_ids().len(), 1000);
        Ok(())
    })
    .unwrap();

    rt.read(|f| {
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.get(f)?, i * 2);
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn thousand_simultaneous_frames() {
    let rt = unbound_runtime();
    let cells: Vec<StateCell<usize>> = rt
        .frame(|f| (0..1000).map(|_| rt.cell(f, 0)).collect())
        .unwrap();

    let mut frames: Vec<Frame> = (0..1000).map(|_| open(&rt)).collect();
    for (i, frame) in frames.iter_mut().enumerate() {
        cells[i].set(frame, i + 1).unwrap();
    }
    assert_eq!(rt.open_frame_count(), 1000);

    for frame in frames {
        frame.commit().unwrap();
    }

    rt.read(|f| {
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.get(f)?, i + 1);
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(rt.metrics().conflicts, 0);
}
