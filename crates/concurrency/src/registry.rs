//! Frame registry
//!
//! The registry owns the only global mutable state of the system: the next
//! frame id, the set of open frame ids and the pins that bound record reuse.
//! All of it sits behind one mutex that is held only for bookkeeping, never
//! while user code runs inside a frame.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. Acquire the registry lock
//! 2. For every modified state object compare the record the frame based
//!    its writes on with the newest record a fresh frame would see
//! 3. IF any differ: discard the frame's records, close it, return FrameConflict
//! 4. Remove the frame's ids from the open set (VISIBILITY POINT)
//! 5. Release the pin and the lock
//! 6. Notify commit observers
//! ```
//!
//! Records are never copied or moved at commit time. Closing the frame's ids
//! is what makes its records visible to frames opened afterwards.

use crate::frame::{Frame, FrameData, FrameOptions, RestoreError};
use crate::id_set::FrameIdSet;
use crate::observer::{CommitObserver, ObserverHandle, ObserverList};
use crate::record::StateCell;
use dashmap::DashMap;
use framestate_core::{Error, FrameId, Result, StateId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// Registry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Allow at most one top-level frame per OS thread
    pub thread_binding: bool,
    /// Reuse aborted or shadowed record slots instead of growing chains
    pub record_reuse: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            thread_binding: true,
            record_reuse: true,
        }
    }
}

/// Point-in-time counters of a registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMetrics {
    /// Frames opened, nested frames included
    pub frames_opened: u64,
    /// Frames committed, nested merges included
    pub committed: u64,
    /// Frames aborted, failed commits included
    pub aborted: u64,
    /// Commits that failed with a conflict
    pub conflicts: u64,
    /// Frames currently open or suspended
    pub open: u64,
}

#[derive(Default)]
struct Counters {
    opened: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
    live: AtomicU64,
}

struct RegistryState {
    next_id: FrameId,
    open: FrameIdSet,
    /// Multiset of pinned ids
    pins: BTreeMap<FrameId, usize>,
}

impl RegistryState {
    fn allocate(&mut self) -> FrameId {
        let id = self.next_id;
        self.next_id = id.next();
        self.open = self.open.with(id);
        id
    }

    fn pin(&mut self, id: FrameId) {
        *self.pins.entry(id).or_insert(0) += 1;
    }

    fn unpin(&mut self, id: FrameId) {
        if let Some(count) = self.pins.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&id);
            }
        }
    }

    /// Highest id whose records every open and future frame sees past
    fn reuse_limit(&self) -> u64 {
        let floor = self.pins.keys().next().copied().unwrap_or(self.next_id);
        floor.as_u64().saturating_sub(1)
    }
}

/// A freshly allocated frame id with its view
pub(crate) struct Opened {
    pub(crate) id: FrameId,
    pub(crate) invalid: FrameIdSet,
    pub(crate) pin: FrameId,
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct RegistryInner {
    id: u64,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    reuse_limit: AtomicU64,
    bindings: DashMap<ThreadId, FrameId>,
    observers: Arc<ObserverList>,
    counters: Counters,
}

impl RegistryInner {
    fn new(config: RegistryConfig) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            state: Mutex::new(RegistryState {
                next_id: FrameId::FIRST,
                open: FrameIdSet::new(),
                pins: BTreeMap::new(),
            }),
            reuse_limit: AtomicU64::new(0),
            bindings: DashMap::new(),
            observers: Arc::new(ObserverList::default()),
            counters: Counters::default(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Allocate an id for a top-level frame. Its view excludes every frame
    /// that is open right now.
    pub(crate) fn begin(&self) -> Opened {
        let mut state = self.state.lock();
        let invalid = state.open.clone();
        let id = state.allocate();
        let pin = invalid.lowest().map_or(id, |lowest| lowest.min(id));
        state.pin(pin);
        self.publish_limit(&state);
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        self.counters.live.fetch_add(1, Ordering::Relaxed);
        Opened { id, invalid, pin }
    }

    /// Allocate an id for a frame nested in `parent`. The child sees what the
    /// parent sees plus the parent's own records, and nothing opened since.
    pub(crate) fn begin_nested(&self, parent: &FrameData) -> Opened {
        let mut state = self.state.lock();
        let id = state.allocate();
        let invalid = parent
            .invalid
            .with_range_except(parent.id.next(), id, &[]);
        let pin = invalid.lowest().map_or(id, |lowest| lowest.min(id));
        state.pin(pin);
        self.publish_limit(&state);
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        self.counters.live.fetch_add(1, Ordering::Relaxed);
        Opened { id, invalid, pin }
    }

    /// Move a parent frame to a fresh id after a child merged into it, so
    /// the child's records become visible to the parent
    pub(crate) fn advance(&self, parent: &mut FrameData) {
        let mut state = self.state.lock();
        let id = state.allocate();
        parent.invalid = parent
            .invalid
            .with_range_except(parent.id.next(), id, &parent.previous_ids);
        parent.previous_ids.push(parent.id);
        parent.id = id;
        self.counters.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Validate and publish a top-level frame
    ///
    /// On success returns the modified state ids in first-write order. On
    /// conflict the frame's records are discarded and its ids closed before
    /// the error is returned.
    pub(crate) fn commit(&self, frame: &FrameData) -> Result<Vec<StateId>> {
        let own_ids = frame.own_ids();
        let mut state = self.state.lock();

        if !frame.modified.is_empty() {
            let based_on = frame.invalid.with_all(own_ids.iter().copied());
            for state_ref in frame.modified.iter() {
                let object = state_ref.object();
                let previous = object.readable_stamp(frame.id, &based_on);
                let current = object.readable_stamp(state.next_id, &state.open);
                if previous != current {
                    for state_ref in frame.modified.iter() {
                        state_ref.object().discard(&own_ids);
                    }
                    self.close_locked(&mut state, &own_ids, frame.pin);
                    drop(state);
                    self.counters.aborted.fetch_add(1, Ordering::Relaxed);
                    self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        frame_id = %frame.id,
                        state = %state_ref.id(),
                        ?previous,
                        ?current,
                        "frame commit conflict"
                    );
                    return Err(Error::FrameConflict {
                        frame: frame.id,
                        state: state_ref.id(),
                    });
                }
            }
        }

        self.close_locked(&mut state, &own_ids, frame.pin);
        drop(state);
        self.counters.committed.fetch_add(1, Ordering::Relaxed);
        Ok(frame.modified.iter().map(|s| s.id()).collect())
    }

    /// Discard a frame's records and close its ids
    pub(crate) fn abort(&self, frame: &FrameData) {
        let own_ids = frame.own_ids();
        for state_ref in frame.modified.iter() {
            state_ref.object().discard(&own_ids);
        }
        let mut state = self.state.lock();
        self.close_locked(&mut state, &own_ids, frame.pin);
        drop(state);
        self.counters.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Release a nested frame's pin after it merged into its parent. Its ids
    /// stay open until the outermost frame closes.
    pub(crate) fn release_nested(&self, pin: FrameId) {
        let mut state = self.state.lock();
        state.unpin(pin);
        self.publish_limit(&state);
        self.counters.live.fetch_sub(1, Ordering::Relaxed);
    }

    fn close_locked(&self, state: &mut RegistryState, ids: &[FrameId], pin: FrameId) {
        state.open = state.open.without_all(ids);
        state.unpin(pin);
        self.publish_limit(state);
        self.counters.live.fetch_sub(1, Ordering::Relaxed);
    }

    fn publish_limit(&self, state: &RegistryState) {
        self.reuse_limit
            .store(state.reuse_limit(), Ordering::Release);
    }

    /// Records stamped at or below this id may be shadowed and reused.
    /// `None` when reuse is disabled.
    pub(crate) fn reuse_limit(&self) -> Option<FrameId> {
        self.config
            .record_reuse
            .then(|| FrameId::new(self.reuse_limit.load(Ordering::Acquire)))
    }

    /// Bind `id` to the calling thread
    pub(crate) fn bind(&self, id: FrameId) -> Result<Option<ThreadId>> {
        if !self.config.thread_binding {
            return Ok(None);
        }
        let thread = thread::current().id();
        match self.bindings.entry(thread) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(Error::illegal_state(format!(
                "frame {} is already open on this thread",
                entry.get()
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(Some(thread))
            }
        }
    }

    /// Fail if the calling thread already has a frame
    pub(crate) fn check_unbound(&self) -> Result<()> {
        if !self.config.thread_binding {
            return Ok(());
        }
        match self.bindings.get(&thread::current().id()) {
            Some(bound) => Err(Error::illegal_state(format!(
                "frame {} is already open on this thread",
                *bound
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn rebind(&self, thread: ThreadId, id: FrameId) {
        self.bindings.insert(thread, id);
    }

    pub(crate) fn unbind(&self, thread: ThreadId, id: FrameId) {
        self.bindings.remove_if(&thread, |_, bound| *bound == id);
    }

    pub(crate) fn notify_commit(&self, modified: &[StateId], frame: FrameId) {
        self.observers.notify(modified, frame);
    }
}

/// Registry of open frames
///
/// Cloning a registry clones a handle; all clones share the same frames.
/// Most programs use [`FrameRegistry::global`]; separate registries keep
/// independent id spaces, which is useful for isolating tests.
///
/// # Example
///
/// ```ignore
/// let registry = FrameRegistry::new(RegistryConfig::default());
/// let cell = registry.frame(|f| StateCell::new(f, 1))?;
/// registry.frame(|f| cell.set(f, 2))?;
/// assert_eq!(registry.read_committed(&cell)?, 2);
/// ```
#[derive(Clone)]
pub struct FrameRegistry {
    inner: Arc<RegistryInner>,
}

static GLOBAL: OnceLock<FrameRegistry> = OnceLock::new();

impl FrameRegistry {
    /// Create an independent registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner::new(config)),
        }
    }

    /// The process-wide registry, created with default settings on first use
    pub fn global() -> &'static FrameRegistry {
        GLOBAL.get_or_init(|| FrameRegistry::new(RegistryConfig::default()))
    }

    /// Settings this registry was created with
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Open a frame
    ///
    /// Without a parent the frame is top-level: its view is the committed
    /// state at this instant and it is bound to the calling thread. Fails
    /// with [`Error::IllegalState`] if the thread already has a frame.
    ///
    /// With a parent the frame is nested: the parent is consumed and handed
    /// back by [`Frame::commit`] or [`Frame::abort`].
    pub fn open(&self, options: FrameOptions, parent: Option<Frame>) -> Result<Frame> {
        match parent {
            None => Frame::open_top(&self.inner, options),
            Some(parent) => {
                if !Arc::ptr_eq(&parent.data().registry, &self.inner) {
                    return Err(Error::illegal_state(
                        "parent frame belongs to a different registry",
                    ));
                }
                Ok(parent.open_nested(options))
            }
        }
    }

    /// Resume a suspended frame on the calling thread
    ///
    /// Fails with [`Error::IllegalState`] if the thread already has a frame
    /// or `data` came from another registry. The error hands `data` back
    /// still suspended, so the transaction can be restored somewhere else.
    pub fn restore(&self, data: FrameData) -> std::result::Result<Frame, RestoreError> {
        if !Arc::ptr_eq(&data.registry, &self.inner) {
            return Err(RestoreError::new(
                Error::illegal_state("frame data belongs to a different registry"),
                data,
            ));
        }
        Frame::restore(data)
    }

    /// Run `f` in a new frame and commit it. If `f` fails the frame is
    /// aborted and the error returned.
    pub fn frame<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let mut frame = self.open(FrameOptions::new(), None)?;
        match f(&mut frame) {
            Ok(value) => {
                frame.commit()?;
                Ok(value)
            }
            Err(e) => {
                frame.abort();
                Err(e)
            }
        }
    }

    /// Run `f` in a new frame and abort it
    pub fn aborted<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let mut frame = self.open(FrameOptions::new(), None)?;
        let result = f(&mut frame);
        frame.abort();
        result
    }

    /// Run `f` in a new frame and suspend it
    pub fn suspended<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<(R, FrameData)> {
        let mut frame = self.open(FrameOptions::new(), None)?;
        let value = f(&mut frame)?;
        Ok((value, frame.suspend()?))
    }

    /// Restore `data`, run `f` in it and commit
    ///
    /// If the restore fails `data` is dropped, which aborts it. Use
    /// [`restore`](Self::restore) to keep it.
    pub fn restored<R>(&self, data: FrameData, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let mut frame = self.restore(data)?;
        match f(&mut frame) {
            Ok(value) => {
                frame.commit()?;
                Ok(value)
            }
            Err(e) => {
                frame.abort();
                Err(e)
            }
        }
    }

    /// Latest committed value of `cell`, read without opening a frame
    pub fn read_committed<T: Clone + Send + Sync + 'static>(&self, cell: &StateCell<T>) -> Result<T> {
        cell.check_registry(self.inner.id)?;
        let (view, open) = {
            let state = self.inner.state.lock();
            (
                FrameId::new(state.next_id.as_u64() - 1),
                state.open.clone(),
            )
        };
        cell.read_at(view, &open, T::clone)
    }

    /// Register an observer called after every top-level commit that
    /// modified at least one state object
    pub fn register_commit_observer(
        &self,
        observer: impl Fn(&[StateId], FrameId) + Send + Sync + 'static,
    ) -> ObserverHandle {
        let observer: CommitObserver = Arc::new(observer);
        self.inner.observers.register(observer)
    }

    /// Number of frames currently open or suspended
    pub fn open_frame_count(&self) -> usize {
        self.inner.counters.live.load(Ordering::Relaxed) as usize
    }

    /// Frame bound to the calling thread, if any
    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.inner
            .bindings
            .get(&thread::current().id())
            .map(|bound| *bound)
    }

    /// Snapshot of the registry counters
    pub fn metrics(&self) -> FrameMetrics {
        let c = &self.inner.counters;
        FrameMetrics {
            frames_opened: c.opened.load(Ordering::Relaxed),
            committed: c.committed.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
            conflicts: c.conflicts.load(Ordering::Relaxed),
            open: c.live.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for FrameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRegistry")
            .field("config", &self.inner.config)
            .field("metrics", &self.metrics())
            .field("commit_observers", &self.inner.observers.len())
            .finish()
    }
}
