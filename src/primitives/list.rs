//! Framed list.
//!
//! A `StateList` is a list whose contents follow frame semantics: the first
//! write in a frame copies the list into the frame's own record, and the
//! copy becomes visible to other frames when the frame commits.
//!
//! # Example
//!
//! ```ignore
//! let rt = FrameRuntime::new();
//! let todo = rt.frame(|f| StateList::new(f, ["milk"]))?;
//!
//! rt.frame(|f| {
//!     todo.push(f, "eggs")?;
//!     todo.remove(f, 0)?;
//!     Ok(())
//! })?;
//! ```

use crate::error::{Error, Result};
use framestate_concurrency::{Frame, StateCell};

/// List with frame isolation.
pub struct StateList<T> {
    cell: StateCell<Vec<T>>,
}

impl<T> Clone for StateList<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> std::fmt::Debug for StateList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateList").field("cell", &self.cell).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> StateList<T> {
    /// Create a list in `frame`.
    pub fn new(frame: &mut Frame, items: impl IntoIterator<Item = T>) -> Result<Self> {
        let cell = StateCell::new(frame, items.into_iter().collect())?;
        Ok(Self { cell })
    }

    /// The cell holding the list.
    pub fn cell(&self) -> &StateCell<Vec<T>> {
        &self.cell
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Number of elements.
    pub fn len(&self, frame: &Frame) -> Result<usize> {
        Ok(self.cell.with(frame, Vec::len)?)
    }

    /// True if the list has no elements.
    pub fn is_empty(&self, frame: &Frame) -> Result<bool> {
        Ok(self.cell.with(frame, Vec::is_empty)?)
    }

    /// Element at `index`, or `None` past the end.
    pub fn get(&self, frame: &Frame, index: usize) -> Result<Option<T>> {
        Ok(self.cell.with(frame, |items| items.get(index).cloned())?)
    }

    /// Copy of every element, in order.
    pub fn iter(&self, frame: &Frame) -> Result<Vec<T>> {
        Ok(self.cell.get(frame)?)
    }

    /// True if some element equals `item`.
    pub fn contains(&self, frame: &Frame, item: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        Ok(self.cell.with(frame, |items| items.contains(item))?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append an element.
    pub fn push(&self, frame: &mut Frame, item: T) -> Result<()> {
        Ok(self.cell.update(frame, |items| items.push(item))?)
    }

    /// Insert an element at `index`, shifting later elements.
    ///
    /// Fails with [`Error::IllegalState`] if `index > len`.
    pub fn insert(&self, frame: &mut Frame, index: usize, item: T) -> Result<()> {
        let len = self.len(frame)?;
        if index > len {
            return Err(out_of_bounds(index, len));
        }
        Ok(self.cell.update(frame, |items| items.insert(index, item))?)
    }

    /// Remove and return the element at `index`, or `None` past the end.
    pub fn remove(&self, frame: &mut Frame, index: usize) -> Result<Option<T>> {
        if index >= self.len(frame)? {
            return Ok(None);
        }
        Ok(Some(self.cell.update(frame, |items| items.remove(index))?))
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// Fails with [`Error::IllegalState`] if `index >= len`.
    pub fn set(&self, frame: &mut Frame, index: usize, item: T) -> Result<T> {
        let len = self.len(frame)?;
        if index >= len {
            return Err(out_of_bounds(index, len));
        }
        Ok(self
            .cell
            .update(frame, |items| std::mem::replace(&mut items[index], item))?)
    }

    /// Keep only the elements for which `keep` returns true.
    ///
    /// Does not write if every element is kept.
    pub fn retain(&self, frame: &mut Frame, mut keep: impl FnMut(&T) -> bool) -> Result<()> {
        let (kept, len) = self.cell.with(frame, |items| {
            let kept: Vec<T> = items.iter().filter(|item| keep(item)).cloned().collect();
            (kept, items.len())
        })?;
        if kept.len() == len {
            return Ok(());
        }
        Ok(self.cell.set(frame, kept)?)
    }

    /// Remove every element. Does not write if the list is already empty.
    pub fn clear(&self, frame: &mut Frame) -> Result<()> {
        if self.is_empty(frame)? {
            return Ok(());
        }
        Ok(self.cell.set(frame, Vec::new())?)
    }
}

fn out_of_bounds(index: usize, len: usize) -> Error {
    Error::IllegalState(format!("index {} out of bounds for length {}", index, len))
}
