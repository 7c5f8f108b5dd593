//! Observer Tests

use crate::common::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn read_observer_sees_every_read() {
    let rt = runtime();
    let a = committed_cell(&rt, 1);
    let b = committed_cell(&rt, 2);

    let reads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reads);
    let frame = rt
        .open(FrameOptions::new().read_observer(move |id| sink.lock().push(id)))
        .unwrap();
    a.get(&frame).unwrap();
    b.get(&frame).unwrap();
    a.get(&frame).unwrap();
    frame.commit().unwrap();

    assert_eq!(*reads.lock(), vec![a.id(), b.id(), a.id()]);
}

#[test]
fn commit_observer_sees_modified_cells() {
    let rt = runtime();
    let a = committed_cell(&rt, 1);
    let b = committed_cell(&rt, 2);
    let untouched = committed_cell(&rt, 3);

    let commits = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&commits);
    let _handle = rt.register_commit_observer(move |ids, frame| {
        sink.lock().push((ids.to_vec(), frame));
    });

    let frame_id = rt
        .frame(|f| {
            b.set(f, 20)?;
            a.set(f, 10)?;
            untouched.get(f)?;
            Ok(f.id())
        })
        .unwrap();

    let commits = commits.lock();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0], (vec![b.id(), a.id()], frame_id));
}

#[test]
fn commit_observer_skips_empty_and_failed_commits() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let _handle = rt.register_commit_observer(move |_, _| *sink.lock() += 1);

    // Read-only: nothing modified
    read(&rt, &cell);
    // Aborted
    rt.aborted(|f| Ok(cell.set(f, 1)?)).unwrap();
    // Conflicting
    let mut f1 = open(&rt);
    let mut f2 = open(&rt);
    cell.set(&mut f1, 1).unwrap();
    cell.set(&mut f2, 2).unwrap();
    f1.commit().unwrap();
    assert!(f2.commit().is_err());

    assert_eq!(*count.lock(), 1);
}

#[test]
fn disposed_observer_is_not_called() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);

    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let handle = rt.register_commit_observer(move |_, _| *sink.lock() += 1);

    rt.frame(|f| Ok(cell.set(f, 1)?)).unwrap();
    handle.dispose();
    rt.frame(|f| Ok(cell.set(f, 2)?)).unwrap();

    assert_eq!(*count.lock(), 1);
}

#[test]
fn observer_can_read_committed_state() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let observer_rt = rt.clone();
    let observed = cell.clone();
    let _handle = rt.register_commit_observer(move |_, _| {
        *sink.lock() = observer_rt.read_committed(&observed).ok();
    });

    rt.frame(|f| Ok(cell.set(f, 7)?)).unwrap();
    assert_eq!(*seen.lock(), Some(7));
}

#[test]
fn was_modified_tracks_framed_collections() {
    let rt = runtime();
    let list = rt.frame(|f| StateList::new(f, [1, 2, 3])).unwrap();
    let map = rt.frame(|f| StateMap::new(f, [("a", 1)])).unwrap();

    rt.frame(|f| {
        list.len(f)?;
        map.get(f, &"a")?;
        assert!(!f.was_modified(list.cell()));
        assert!(!f.was_modified(map.cell()));

        list.push(f, 4)?;
        assert!(f.was_modified(list.cell()));
        assert!(!f.was_modified(map.cell()));

        map.insert(f, "b", 2)?;
        assert!(f.was_modified(map.cell()));
        Ok(())
    })
    .unwrap();
}
