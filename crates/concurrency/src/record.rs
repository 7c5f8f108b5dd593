//! Record chains
//!
//! A [`StateCell`] owns the chain of [`Record`]s for one mutable value. Each
//! record is one version of the value, stamped with the id of the frame that
//! wrote it. Reads pick the newest record the frame is allowed to see; the
//! first write in a frame gets a record of its own, every later write in the
//! same frame edits that record in place.
//!
//! ## Visibility
//!
//! A record stamped `r` is visible to a frame with id `f` and invalid set
//! `I` when `r != INVALID && r <= f && r ∉ I`. Of the visible records the one
//! with the largest stamp wins.
//!
//! ## Slot reuse
//!
//! Before growing the chain a writer looks for a slot nobody can read:
//! one discarded by an aborted frame, or the older of two records that every
//! open frame sees past. The chain therefore never holds more records than
//! there were distinct writing frames.
//!
//! Stamps are only comparable within one registry, so a cell is tied to the
//! registry of the frame that created it.

use crate::frame::Frame;
use crate::id_set::FrameIdSet;
use framestate_core::{Error, FrameId, Result, StateId};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One version of a cell's value
#[derive(Debug, Clone)]
pub(crate) struct Record<T> {
    frame_id: FrameId,
    value: T,
}

#[inline]
fn is_visible(stamp: FrameId, id: FrameId, invalid: &FrameIdSet) -> bool {
    !stamp.is_invalid() && stamp <= id && !invalid.contains(stamp)
}

fn readable_index<T>(records: &[Record<T>], id: FrameId, invalid: &FrameIdSet) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| is_visible(r.frame_id, id, invalid))
        .max_by_key(|(_, r)| r.frame_id)
        .map(|(i, _)| i)
}

/// A slot no open or future frame can read: a discarded record, or the
/// older of two records that are both at or below `limit`
fn reusable_index<T>(records: &[Record<T>], limit: FrameId) -> Option<usize> {
    if let Some(discarded) = records.iter().position(|r| r.frame_id.is_invalid()) {
        return Some(discarded);
    }
    let mut shadowing: Option<usize> = None;
    for (i, record) in records.iter().enumerate() {
        if record.frame_id <= limit {
            match shadowing {
                None => shadowing = Some(i),
                Some(j) if record.frame_id < records[j].frame_id => return Some(i),
                Some(j) => return Some(j),
            }
        }
    }
    None
}

/// Type-erased view of a record chain
///
/// Frames track the state objects they wrote without knowing their payload
/// types; commit validation and abort go through this trait.
pub trait StateObject: Send + Sync {
    /// Identity of the state object
    fn state_id(&self) -> StateId;

    /// Stamp of the record a frame with `id` and `invalid` would read
    fn readable_stamp(&self, id: FrameId, invalid: &FrameIdSet) -> Option<FrameId>;

    /// Re-stamp every record written by `frames` as [`FrameId::INVALID`]
    fn discard(&self, frames: &[FrameId]);

    /// Number of records in the chain
    fn chain_len(&self) -> usize;
}

/// Shared handle to a [`StateObject`], hashed and compared by state id
#[derive(Clone)]
pub struct StateRef(Arc<dyn StateObject>);

impl StateRef {
    /// Identity of the referenced state object
    pub fn id(&self) -> StateId {
        self.0.state_id()
    }

    pub(crate) fn object(&self) -> &dyn StateObject {
        self.0.as_ref()
    }
}

impl PartialEq for StateRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for StateRef {}

impl Hash for StateRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for StateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateRef({})", self.id())
    }
}

struct Chain<T> {
    id: StateId,
    /// Registry whose frame ids stamp the records
    registry: u64,
    records: RwLock<SmallVec<[Record<T>; 2]>>,
}

impl<T: Send + Sync> StateObject for Chain<T> {
    fn state_id(&self) -> StateId {
        self.id
    }

    fn readable_stamp(&self, id: FrameId, invalid: &FrameIdSet) -> Option<FrameId> {
        let records = self.records.read();
        readable_index(&records, id, invalid).map(|i| records[i].frame_id)
    }

    fn discard(&self, frames: &[FrameId]) {
        let mut records = self.records.write();
        for record in records.iter_mut() {
            if frames.contains(&record.frame_id) {
                record.frame_id = FrameId::INVALID;
            }
        }
    }

    fn chain_len(&self) -> usize {
        self.records.read().len()
    }
}

/// A transactional mutable value
///
/// All access goes through a [`Frame`]: reads see the frame's point-in-time
/// view, writes stay private to the frame until it commits. Cloning the cell
/// clones the handle, not the value.
pub struct StateCell<T> {
    chain: Arc<Chain<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<T> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("id", &self.chain.id)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
    /// Create a cell whose first record belongs to `frame`
    ///
    /// The cell becomes visible to other frames once `frame` commits. If
    /// `frame` aborts, the cell has no readable record and every later read
    /// fails with [`Error::NoRecordFound`].
    ///
    /// The cell can only be used with frames of the same registry; reads and
    /// writes through any other frame fail with [`Error::IllegalState`].
    pub fn new(frame: &mut Frame, value: T) -> Result<Self> {
        frame.check_writable()?;
        let mut records = SmallVec::new();
        records.push(Record {
            frame_id: frame.id(),
            value,
        });
        let cell = Self {
            chain: Arc::new(Chain {
                id: StateId::next(),
                registry: frame.registry_id(),
                records: RwLock::new(records),
            }),
        };
        frame.record_modified(cell.state_ref());
        Ok(cell)
    }

    /// Identity of this cell
    pub fn id(&self) -> StateId {
        self.chain.id
    }

    /// Number of records currently in the chain
    pub fn chain_len(&self) -> usize {
        self.chain.chain_len()
    }

    /// Read the value visible in `frame`
    pub fn get(&self, frame: &Frame) -> Result<T> {
        self.with(frame, T::clone)
    }

    /// Borrow the value visible in `frame`
    ///
    /// `f` runs under the chain's read lock and must not write to this cell.
    pub fn with<R>(&self, frame: &Frame, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.check_registry(frame.registry_id())?;
        frame.notify_read(self.chain.id);
        self.read_at(frame.id(), frame.invalid(), f)
    }

    /// Replace the value in `frame`
    pub fn set(&self, frame: &mut Frame, value: T) -> Result<()> {
        self.update(frame, move |slot| *slot = value)
    }

    /// Edit the value in `frame`
    ///
    /// The first write in a frame copies the visible value into a record
    /// owned by the frame; later writes edit that record in place. `f` runs
    /// under the chain's write lock and must not touch this cell.
    pub fn update<R>(&self, frame: &mut Frame, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        frame.check_writable()?;
        self.check_registry(frame.registry_id())?;
        let id = frame.id();
        let limit = frame.reuse_limit();
        let (result, first_write) = {
            let mut records = self.chain.records.write();
            let current = readable_index(&records, id, frame.invalid()).ok_or(
                Error::NoRecordFound {
                    state: self.chain.id,
                    frame: id,
                },
            )?;
            if records[current].frame_id == id {
                (f(&mut records[current].value), false)
            } else {
                let mut value = records[current].value.clone();
                let result = f(&mut value);
                let record = Record { frame_id: id, value };
                match limit.and_then(|limit| reusable_index(&records, limit)) {
                    Some(slot) => {
                        tracing::trace!(state = %self.chain.id, slot, frame_id = %id, "reusing record slot");
                        records[slot] = record;
                    }
                    None => records.push(record),
                }
                (result, true)
            }
        };
        if first_write {
            frame.record_modified(self.state_ref());
        }
        Ok(result)
    }

    /// Read through an explicit view, without read observers
    pub(crate) fn read_at<R>(
        &self,
        id: FrameId,
        invalid: &FrameIdSet,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let records = self.chain.records.read();
        let index = readable_index(&records, id, invalid).ok_or(Error::NoRecordFound {
            state: self.chain.id,
            frame: id,
        })?;
        Ok(f(&records[index].value))
    }

    pub(crate) fn check_registry(&self, registry: u64) -> Result<()> {
        if self.chain.registry != registry {
            return Err(Error::illegal_state(format!(
                "{} belongs to a different frame registry",
                self.chain.id
            )));
        }
        Ok(())
    }

    /// Type-erased handle for frame bookkeeping
    pub fn state_ref(&self) -> StateRef {
        StateRef(self.chain.clone())
    }
}
