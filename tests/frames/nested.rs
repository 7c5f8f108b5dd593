//! Nested Frame Tests

use crate::common::*;

#[test]
fn child_sees_parent_writes_and_merges_on_commit() {
    let rt = runtime();
    let a = committed_cell(&rt, 1);
    let b = committed_cell(&rt, 10);

    let mut parent = open(&rt);
    a.set(&mut parent, 2).unwrap();

    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    assert!(child.is_nested());
    assert_eq!(a.get(&child).unwrap(), 2);
    b.set(&mut child, 20).unwrap();

    let parent = child.commit().unwrap().expect("parent handed back");
    assert!(!parent.is_nested());
    assert_eq!(b.get(&parent).unwrap(), 20);
    assert_eq!(parent.modified_ids(), vec![a.id(), b.id()]);

    // Nothing is visible outside until the outermost frame commits
    assert_eq!(rt.read_committed(&b).unwrap(), 10);

    assert!(parent.commit().unwrap().is_none());
    assert_eq!(rt.read_committed(&a).unwrap(), 2);
    assert_eq!(rt.read_committed(&b).unwrap(), 20);
}

#[test]
fn merged_parent_moves_to_a_fresh_id() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);

    let parent = open(&rt);
    let before = parent.id();
    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    let child_id = child.id();
    assert!(child_id > before);
    cell.set(&mut child, 1).unwrap();

    let parent = child.commit().unwrap().unwrap();
    assert!(parent.id() > child_id);
    parent.commit().unwrap();
}

#[test]
fn child_abort_leaves_parent_unchanged() {
    let rt = runtime();
    let cell = committed_cell(&rt, "base");

    let mut parent = open(&rt);
    cell.set(&mut parent, "parent").unwrap();
    let parent_id = parent.id();

    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    cell.set(&mut child, "child").unwrap();

    let parent = child.abort().expect("parent handed back");
    assert_eq!(parent.id(), parent_id);
    assert_eq!(cell.get(&parent).unwrap(), "parent");

    parent.commit().unwrap();
    assert_eq!(rt.read_committed(&cell).unwrap(), "parent");
}

#[test]
fn several_children_in_sequence() {
    let rt = runtime();
    let cell = committed_cell(&rt, 0);

    let mut frame = open(&rt);
    for _ in 0..5 {
        let mut child = rt.open_nested(frame, FrameOptions::new()).unwrap();
        cell.update(&mut child, |v| *v += 1).unwrap();
        frame = child.commit().unwrap().unwrap();
    }
    assert_eq!(cell.get(&frame).unwrap(), 5);
    frame.commit().unwrap();

    assert_eq!(rt.read_committed(&cell).unwrap(), 5);
    assert_eq!(rt.open_frame_count(), 0);
}

#[test]
fn grandchild_merges_through_both_levels() {
    let rt = runtime();
    let cell = committed_cell(&rt, vec![0]);

    let outer = open(&rt);
    let middle = rt.open_nested(outer, FrameOptions::new()).unwrap();
    let mut inner = rt.open_nested(middle, FrameOptions::new()).unwrap();
    cell.update(&mut inner, |v| v.push(1)).unwrap();

    let mut middle = inner.commit().unwrap().unwrap();
    cell.update(&mut middle, |v| v.push(2)).unwrap();
    let outer = middle.commit().unwrap().unwrap();
    assert_eq!(cell.get(&outer).unwrap(), vec![0, 1, 2]);
    outer.commit().unwrap();

    assert_eq!(rt.read_committed(&cell).unwrap(), vec![0, 1, 2]);
}

#[test]
fn child_of_read_only_frame_is_read_only() {
    let rt = runtime();
    let cell = committed_cell(&rt, 1);

    let parent = rt.open(FrameOptions::new().read_only()).unwrap();
    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    assert!(child.is_read_only());
    assert!(cell.set(&mut child, 2).is_err());
    child.commit().unwrap().unwrap().commit().unwrap();
}

#[test]
fn nested_frame_cannot_be_suspended() {
    let rt = runtime();
    let cell = committed_cell(&rt, 1);

    let mut parent = open(&rt);
    cell.set(&mut parent, 2).unwrap();
    let child = rt.open_nested(parent, FrameOptions::new()).unwrap();

    let err = Error::from(child.suspend().unwrap_err());
    assert!(matches!(err, Error::IllegalState(_)));

    // The whole stack was aborted
    assert_eq!(rt.open_frame_count(), 0);
    assert_eq!(rt.current_frame_id(), None);
    assert_eq!(rt.read_committed(&cell).unwrap(), 1);
}

#[test]
fn outer_frame_conflicts_after_nested_merge() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);

    let parent = open(&rt);
    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    cell.set(&mut child, 1).unwrap();
    let parent = child.commit().unwrap().unwrap();

    // Another frame commits to the same cell first
    let mut other = open(&rt);
    cell.set(&mut other, 2).unwrap();
    other.commit().unwrap();

    let err = Error::from(parent.commit().unwrap_err());
    assert!(err.is_conflict());
    assert_eq!(rt.read_committed(&cell).unwrap(), 2);
}

#[test]
fn commit_opened_while_nested_is_hidden_from_parent() {
    let rt = unbound_runtime();
    let cell = committed_cell(&rt, 0);
    let untouched = committed_cell(&rt, 0);

    let parent = open(&rt);
    let mut child = rt.open_nested(parent, FrameOptions::new()).unwrap();

    // Opened after the parent; its commit stays hidden after the merge
    let mut other = open(&rt);
    untouched.set(&mut other, 9).unwrap();
    other.commit().unwrap();

    cell.set(&mut child, 1).unwrap();
    let parent = child.commit().unwrap().unwrap();
    assert_eq!(untouched.get(&parent).unwrap(), 0);
    assert_eq!(cell.get(&parent).unwrap(), 1);
    parent.commit().unwrap();

    assert_eq!(rt.read_committed(&cell).unwrap(), 1);
    assert_eq!(rt.read_committed(&untouched).unwrap(), 9);
}

#[test]
fn thread_binding_follows_the_innermost_frame() {
    let rt = runtime();
    let parent = open(&rt);
    assert_eq!(rt.current_frame_id(), Some(parent.id()));

    let child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    assert_eq!(rt.current_frame_id(), Some(child.id()));

    // The thread still counts as busy while the child is open
    assert!(rt.open(FrameOptions::new()).is_err());

    let parent = child.abort().unwrap();
    assert_eq!(rt.current_frame_id(), Some(parent.id()));

    let child = rt.open_nested(parent, FrameOptions::new()).unwrap();
    let parent = child.commit().unwrap().unwrap();
    assert_eq!(rt.current_frame_id(), Some(parent.id()));

    parent.commit().unwrap();
    assert_eq!(rt.current_frame_id(), None);
}

#[test]
fn parent_from_another_runtime_is_rejected() {
    let rt = runtime();
    let other = unbound_runtime();
    let parent = open(&other);
    assert!(matches!(
        rt.open_nested(parent, FrameOptions::new()),
        Err(Error::IllegalState(_))
    ));
    assert_eq!(other.open_frame_count(), 0);
}
