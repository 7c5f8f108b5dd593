//! Frames
//!
//! A [`Frame`] is one transaction over state cells. It is opened by a
//! [`FrameRegistry`](crate::FrameRegistry) and ends in exactly one of:
//!
//! ```text
//! Open ──commit──▶ Committed      (writes become visible to later frames)
//!      ──abort───▶ Aborted        (writes are discarded)
//!      ──suspend─▶ FrameData ──restore──▶ Open
//! ```
//!
//! Dropping an open frame, or dropping suspended [`FrameData`] without
//! restoring it, aborts the frame.
//!
//! A `Frame` stays on the thread that opened or restored it. [`FrameData`]
//! is the sendable form used to continue the same transaction elsewhere.
//!
//! Work outside the cells that must be undone with the frame (handing back a
//! consumed resource, unregistering a callback) is attached with
//! [`Frame::on_abort`]. Hooks run once when the frame is aborted, dropped or
//! fails to commit, and are dropped unrun when it commits.

use crate::id_set::FrameIdSet;
use crate::observer::ReadObserver;
use crate::record::{StateCell, StateRef};
use crate::registry::RegistryInner;
use framestate_collections::PersistentOrderedSet;
use framestate_core::{Error, FrameId, Result, StateId};
use smallvec::SmallVec;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::ThreadId;

/// How a frame is opened
#[derive(Clone, Default)]
pub struct FrameOptions {
    read_only: bool,
    read_observer: Option<ReadObserver>,
}

impl FrameOptions {
    /// A writable frame without observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes with [`Error::ReadOnlyWrite`]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Call `observer` with the id of every state object read in the frame
    pub fn read_observer(mut self, observer: impl Fn(StateId) + Send + Sync + 'static) -> Self {
        self.read_observer = Some(Arc::new(observer));
        self
    }
}

impl std::fmt::Debug for FrameOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOptions")
            .field("read_only", &self.read_only)
            .field("read_observer", &self.read_observer.is_some())
            .finish()
    }
}

/// Undo action run when a frame is aborted
pub type AbortHook = Box<dyn FnOnce() + Send>;

/// The state of a frame, detached from any thread
///
/// Produced by [`Frame::suspend`] and consumed by
/// [`FrameRegistry::restore`](crate::FrameRegistry::restore). Dropping it
/// aborts the frame.
pub struct FrameData {
    pub(crate) registry: Arc<RegistryInner>,
    pub(crate) id: FrameId,
    pub(crate) invalid: FrameIdSet,
    /// Ids this frame held before advancing, and ids of merged children
    pub(crate) previous_ids: SmallVec<[FrameId; 2]>,
    pub(crate) modified: PersistentOrderedSet<StateRef>,
    pub(crate) pin: FrameId,
    read_only: bool,
    read_observers: SmallVec<[ReadObserver; 1]>,
    parent: Option<Box<FrameData>>,
    abort_hooks: Vec<AbortHook>,
    bound: Option<ThreadId>,
    closed: bool,
}

impl FrameData {
    /// Id of the suspended frame
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// True if the frame wrote to at least one state object
    pub fn has_pending_changes(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Every id whose records belong to this frame
    pub(crate) fn own_ids(&self) -> SmallVec<[FrameId; 4]> {
        let mut ids = SmallVec::with_capacity(self.previous_ids.len() + 1);
        ids.push(self.id);
        ids.extend(self.previous_ids.iter().copied());
        ids
    }

    fn discard(&mut self) {
        self.closed = true;
        if let Some(thread) = self.bound.take() {
            self.registry.unbind(thread, self.id);
        }
        self.registry.abort(self);
        tracing::debug!(frame_id = %self.id, modified = self.modified.len(), "frame aborted");
        self.run_abort_hooks();
    }

    fn run_abort_hooks(&mut self) {
        // Newest first, so later registrations are undone before earlier ones
        while let Some(hook) = self.abort_hooks.pop() {
            hook();
        }
    }
}

impl Drop for FrameData {
    fn drop(&mut self) {
        if !self.closed {
            self.discard();
        }
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameData")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("modified", &self.modified.len())
            .field("abort_hooks", &self.abort_hooks.len())
            .finish()
    }
}

/// A failed [`restore`](crate::FrameRegistry::restore)
///
/// Carries the suspended frame back to the caller, still open, so it can be
/// restored elsewhere or aborted explicitly.
pub struct RestoreError {
    error: Error,
    data: FrameData,
}

impl RestoreError {
    pub(crate) fn new(error: Error, data: FrameData) -> Self {
        Self { error, data }
    }

    /// Why the frame could not be restored
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The suspended frame, unchanged
    pub fn into_data(self) -> FrameData {
        self.data
    }

    /// Split into the error and the suspended frame
    pub fn into_parts(self) -> (Error, FrameData) {
        (self.error, self.data)
    }
}

impl From<RestoreError> for Error {
    /// Keep the error and abort the frame
    fn from(e: RestoreError) -> Self {
        e.error
    }
}

impl std::fmt::Display for RestoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot restore frame {}: {}", self.data.id, self.error)
    }
}

impl std::fmt::Debug for RestoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreError")
            .field("error", &self.error)
            .field("data", &self.data)
            .finish()
    }
}

impl std::error::Error for RestoreError {}

/// An open frame, bound to the thread that opened it
pub struct Frame {
    data: FrameData,
    _not_send: PhantomData<*const ()>,
}

impl Frame {
    fn wrap(data: FrameData) -> Self {
        Self {
            data,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn open_top(registry: &Arc<RegistryInner>, options: FrameOptions) -> Result<Frame> {
        registry.check_unbound()?;
        let opened = registry.begin();
        let mut data = FrameData {
            registry: Arc::clone(registry),
            id: opened.id,
            invalid: opened.invalid,
            previous_ids: SmallVec::new(),
            modified: PersistentOrderedSet::new(),
            pin: opened.pin,
            read_only: options.read_only,
            read_observers: options.read_observer.into_iter().collect(),
            parent: None,
            abort_hooks: Vec::new(),
            bound: None,
            closed: false,
        };
        data.bound = registry.bind(data.id)?;
        tracing::debug!(
            frame_id = %data.id,
            read_only = data.read_only,
            hidden = data.invalid.len(),
            "frame opened"
        );
        Ok(Frame::wrap(data))
    }

    /// Open a frame nested in this one
    ///
    /// The child sees this frame's writes. Committing the child merges its
    /// writes into this frame; nothing becomes visible to other frames until
    /// the outermost frame commits.
    pub fn open_nested(self, options: FrameOptions) -> Frame {
        let mut parent = self.data;
        let registry = Arc::clone(&parent.registry);
        let opened = registry.begin_nested(&parent);
        let bound = parent.bound.take();
        if let Some(thread) = bound {
            registry.rebind(thread, opened.id);
        }
        let mut read_observers = parent.read_observers.clone();
        read_observers.extend(options.read_observer);
        let mut data = FrameData {
            registry,
            id: opened.id,
            invalid: opened.invalid,
            previous_ids: SmallVec::new(),
            modified: PersistentOrderedSet::new(),
            pin: opened.pin,
            read_only: options.read_only || parent.read_only,
            read_observers,
            parent: None,
            abort_hooks: Vec::new(),
            bound,
            closed: false,
        };
        tracing::debug!(frame_id = %data.id, parent = %parent.id, "nested frame opened");
        data.parent = Some(Box::new(parent));
        Frame::wrap(data)
    }

    pub(crate) fn restore(mut data: FrameData) -> std::result::Result<Frame, RestoreError> {
        let bound = data
            .registry
            .check_unbound()
            .and_then(|()| data.registry.bind(data.id));
        match bound {
            Ok(thread) => data.bound = thread,
            Err(error) => return Err(RestoreError::new(error, data)),
        }
        tracing::debug!(frame_id = %data.id, modified = data.modified.len(), "frame restored");
        Ok(Frame::wrap(data))
    }

    /// Id of this frame. Changes when a nested frame merges into it.
    pub fn id(&self) -> FrameId {
        self.data.id
    }

    /// True if writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.data.read_only
    }

    /// True if this frame was opened inside another frame
    pub fn is_nested(&self) -> bool {
        self.data.parent.is_some()
    }

    /// True if this frame wrote to `cell`. Reads never count.
    pub fn was_modified<T: Clone + Send + Sync + 'static>(&self, cell: &StateCell<T>) -> bool {
        self.data.modified.contains(&cell.state_ref())
    }

    /// True if this frame wrote to at least one state object
    pub fn has_pending_changes(&self) -> bool {
        self.data.has_pending_changes()
    }

    /// State objects written in this frame, in first-write order
    pub fn modified_ids(&self) -> Vec<StateId> {
        self.data.modified.iter().map(|s| s.id()).collect()
    }

    /// Run `hook` if this frame ends without its writes becoming visible
    ///
    /// Hooks of a nested frame move to the parent when the child commits, so
    /// they still run if the outermost frame is aborted later.
    pub fn on_abort(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.data.abort_hooks.push(Box::new(hook));
    }

    /// Commit the frame
    ///
    /// A top-level frame is validated against everything committed since it
    /// opened. If another frame committed a write to a state object this
    /// frame also wrote, the frame is aborted and [`Error::FrameConflict`]
    /// is returned; otherwise its writes become visible to every frame
    /// opened from now on and `Ok(None)` is returned.
    ///
    /// A nested frame always merges into its parent, which is returned.
    pub fn commit(self) -> Result<Option<Frame>> {
        let mut data = self.data;
        let registry = Arc::clone(&data.registry);
        data.closed = true;

        let Some(mut parent) = data.parent.take() else {
            if let Some(thread) = data.bound.take() {
                registry.unbind(thread, data.id);
            }
            let modified = match registry.commit(&data) {
                Ok(modified) => modified,
                Err(e) => {
                    data.run_abort_hooks();
                    return Err(e);
                }
            };
            data.abort_hooks.clear();
            tracing::debug!(frame_id = %data.id, modified = modified.len(), "frame committed");
            if !modified.is_empty() {
                registry.notify_commit(&modified, data.id);
            }
            return Ok(None);
        };

        parent.modified = parent.modified.union(&data.modified);
        parent.previous_ids.extend(data.own_ids());
        parent.abort_hooks.append(&mut data.abort_hooks);
        registry.release_nested(data.pin);
        registry.advance(&mut parent);
        if let Some(thread) = data.bound.take() {
            registry.rebind(thread, parent.id);
            parent.bound = Some(thread);
        }
        tracing::debug!(
            frame_id = %data.id,
            parent = %parent.id,
            modified = data.modified.len(),
            "nested frame merged"
        );
        Ok(Some(Frame::wrap(*parent)))
    }

    /// Abort the frame, discarding its writes
    ///
    /// A nested frame hands back its parent, unchanged.
    pub fn abort(self) -> Option<Frame> {
        let mut data = self.data;
        let parent = data.parent.take();
        let bound = if parent.is_some() { data.bound.take() } else { None };
        data.discard();
        parent.map(|mut parent| {
            if let Some(thread) = bound {
                data.registry.rebind(thread, parent.id);
                parent.bound = Some(thread);
            }
            Frame::wrap(*parent)
        })
    }

    /// Detach the frame from this thread
    ///
    /// The returned [`FrameData`] can be sent to another thread and resumed
    /// with [`FrameRegistry::restore`](crate::FrameRegistry::restore).
    /// Nested frames cannot be suspended: the attempt fails with
    /// [`Error::IllegalState`] and aborts the frame and its parents.
    pub fn suspend(self) -> Result<FrameData> {
        let mut data = self.data;
        if data.parent.is_some() {
            return Err(Error::illegal_state(format!(
                "nested frame {} cannot be suspended",
                data.id
            )));
        }
        if let Some(thread) = data.bound.take() {
            data.registry.unbind(thread, data.id);
        }
        tracing::debug!(frame_id = %data.id, modified = data.modified.len(), "frame suspended");
        Ok(data)
    }

    pub(crate) fn data(&self) -> &FrameData {
        &self.data
    }

    pub(crate) fn invalid(&self) -> &FrameIdSet {
        &self.data.invalid
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.data.read_only {
            return Err(Error::ReadOnlyWrite(self.data.id));
        }
        Ok(())
    }

    pub(crate) fn record_modified(&mut self, state: StateRef) {
        self.data.modified = self.data.modified.add(state);
    }

    pub(crate) fn notify_read(&self, state: StateId) {
        for observer in &self.data.read_observers {
            observer(state);
        }
    }

    pub(crate) fn registry_id(&self) -> u64 {
        self.data.registry.id()
    }

    pub(crate) fn reuse_limit(&self) -> Option<FrameId> {
        self.data.registry.reuse_limit()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.data.id)
            .field("read_only", &self.data.read_only)
            .field("nested", &self.is_nested())
            .field("modified", &self.data.modified.len())
            .finish()
    }
}
