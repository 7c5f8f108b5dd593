//! Main entry point for framestate.
//!
//! This module provides the `FrameRuntime` struct, which ties one frame
//! registry to one saveable state registry.

use crate::error::{Error, Result};
use framestate_concurrency::{
    Frame, FrameData, FrameMetrics, FrameOptions, FrameRegistry, ObserverHandle, RegistryConfig,
    RestoreError, StateCell,
};
use framestate_core::{Error as CoreError, FrameId, StateId, Value};
use framestate_saveable::{CanBeSaved, RegistrationHandle, SaveableStateRegistry, SavedState};
use std::sync::Arc;

/// The framestate runtime.
///
/// Create one with [`FrameRuntime::new`] or [`FrameRuntime::builder`]. The
/// runtime is a cheap handle; clones share frames and saved state.
///
/// # Example
///
/// ```ignore
/// use framestate::prelude::*;
///
/// let rt = FrameRuntime::new();
/// let street = rt.frame(|f| Ok(rt.cell(f, "123 Any Street".to_string())?))?;
///
/// rt.frame(|f| {
///     street.set(f, "456 Any Street".to_string())?;
///     Ok(())
/// })?;
/// assert_eq!(rt.read_committed(&street)?, "456 Any Street");
/// ```
#[derive(Clone, Debug)]
pub struct FrameRuntime {
    registry: FrameRegistry,
    saveable: SaveableStateRegistry,
}

impl FrameRuntime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for runtime configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let rt = FrameRuntime::builder()
    ///     .thread_binding(false)
    ///     .restored(previously_saved)
    ///     .build();
    /// ```
    pub fn builder() -> FrameRuntimeBuilder {
        FrameRuntimeBuilder::new()
    }

    /// The underlying frame registry.
    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    /// The saveable state registry.
    pub fn saveable(&self) -> &SaveableStateRegistry {
        &self.saveable
    }

    // =========================================================================
    // Frame lifecycle
    // =========================================================================

    /// Open a top-level frame bound to the calling thread.
    pub fn open(&self, options: FrameOptions) -> Result<Frame> {
        Ok(self.registry.open(options, None)?)
    }

    /// Open a frame nested in `parent`.
    pub fn open_nested(&self, parent: Frame, options: FrameOptions) -> Result<Frame> {
        Ok(self.registry.open(options, Some(parent))?)
    }

    /// Resume a suspended frame on the calling thread.
    ///
    /// On failure the [`RestoreError`] still holds the suspended frame.
    pub fn restore(&self, data: FrameData) -> std::result::Result<Frame, RestoreError> {
        self.registry.restore(data)
    }

    /// Run `f` in a new frame and commit it.
    ///
    /// If `f` fails the frame is aborted and the error returned. A conflict
    /// at commit is returned as [`Error::Conflict`]; nothing `f` wrote is
    /// visible in that case.
    pub fn frame<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let frame = self.open(FrameOptions::new())?;
        run_and_commit(frame, f)
    }

    /// Run `f` in a new read-only frame.
    pub fn read<R>(&self, f: impl FnOnce(&Frame) -> Result<R>) -> Result<R> {
        let frame = self.open(FrameOptions::new().read_only())?;
        let result = f(&frame);
        frame.commit()?;
        result
    }

    /// Run `f` in a new frame and abort it.
    pub fn aborted<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let mut frame = self.open(FrameOptions::new())?;
        let result = f(&mut frame);
        frame.abort();
        result
    }

    /// Run `f` in a new frame and suspend it.
    pub fn suspended<R>(&self, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<(R, FrameData)> {
        let mut frame = self.open(FrameOptions::new())?;
        let value = f(&mut frame)?;
        Ok((value, frame.suspend()?))
    }

    /// Restore `data`, run `f` in it and commit.
    ///
    /// If `data` cannot be restored here it is dropped, which aborts it.
    pub fn restored<R>(&self, data: FrameData, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
        let frame = self.restore(data)?;
        run_and_commit(frame, f)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Create a cell in `frame`.
    pub fn cell<T: Clone + Send + Sync + 'static>(&self, frame: &mut Frame, value: T) -> Result<StateCell<T>> {
        Ok(StateCell::new(frame, value)?)
    }

    /// Latest committed value of `cell`.
    pub fn read_committed<T: Clone + Send + Sync + 'static>(&self, cell: &StateCell<T>) -> Result<T> {
        Ok(self.registry.read_committed(cell)?)
    }

    /// Create a cell whose committed value is saved under `key`.
    ///
    /// The cell starts from the restored value for `key` if there is one,
    /// else from `default`. The provider reads the latest committed value,
    /// so writes still pending in open frames are not saved. Until `frame`
    /// commits, a save keeps the restored value.
    ///
    /// If `frame` is aborted or fails to commit, the provider is
    /// unregistered and the restored value goes back to the registry for the
    /// next caller.
    pub fn saveable_cell(
        &self,
        key: &str,
        frame: &mut Frame,
        default: impl Into<Value>,
    ) -> Result<(StateCell<Value>, RegistrationHandle)> {
        let restored = self.saveable.consume_restored(key);
        let give_back = {
            let saveable = self.saveable.clone();
            let key = key.to_string();
            let restored = restored.clone();
            move || {
                if let Some(value) = restored {
                    saveable.return_restored(&key, value);
                }
            }
        };

        let initial = restored.clone().unwrap_or_else(|| default.into());
        let cell = match StateCell::new(frame, initial) {
            Ok(cell) => cell,
            Err(e) => {
                give_back();
                return Err(e.into());
            }
        };

        let registry = self.registry.clone();
        let source = cell.clone();
        let registered = self.saveable.register_fallible_provider(key, move || {
            match registry.read_committed(&source) {
                Ok(value) => Ok(Some(value)),
                // Creating frame still open
                Err(CoreError::NoRecordFound { .. }) => Ok(restored.clone()),
                Err(e) => Err(e),
            }
        });
        let handle = match registered {
            Ok(handle) => handle,
            Err(e) => {
                give_back();
                return Err(e.into());
            }
        };

        let registration = handle.clone();
        frame.on_abort(move || {
            registration.unregister();
            give_back();
        });
        Ok((cell, handle))
    }

    /// Collect every saveable value.
    pub fn perform_save(&self) -> Result<SavedState> {
        Ok(self.saveable.perform_save()?)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Register an observer called after every top-level commit that wrote
    /// at least one cell.
    pub fn register_commit_observer(
        &self,
        observer: impl Fn(&[StateId], FrameId) + Send + Sync + 'static,
    ) -> ObserverHandle {
        self.registry.register_commit_observer(observer)
    }

    /// Number of frames currently open or suspended.
    pub fn open_frame_count(&self) -> usize {
        self.registry.open_frame_count()
    }

    /// Frame bound to the calling thread, if any.
    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.registry.current_frame_id()
    }

    /// Get runtime metrics.
    pub fn metrics(&self) -> FrameMetrics {
        self.registry.metrics()
    }
}

impl Default for FrameRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn run_and_commit<R>(mut frame: Frame, f: impl FnOnce(&mut Frame) -> Result<R>) -> Result<R> {
    match f(&mut frame) {
        Ok(value) => {
            frame.commit().map_err(Error::from)?;
            Ok(value)
        }
        Err(e) => {
            frame.abort();
            Err(e)
        }
    }
}

/// Builder for runtime configuration.
///
/// # Example
///
/// ```ignore
/// // One frame per thread, record reuse on (the defaults)
/// let rt = FrameRuntime::builder().build();
///
/// // Several frames on one thread, e.g. a single-threaded test driver
/// let rt = FrameRuntime::builder().thread_binding(false).build();
/// ```
#[derive(Default)]
pub struct FrameRuntimeBuilder {
    config: RegistryConfig,
    can_be_saved: Option<CanBeSaved>,
    restored: Option<SavedState>,
}

impl FrameRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most one top-level frame per thread (default `true`).
    pub fn thread_binding(mut self, enabled: bool) -> Self {
        self.config.thread_binding = enabled;
        self
    }

    /// Reuse aborted or shadowed record slots (default `true`).
    ///
    /// With reuse off every write in a new frame grows the record chain.
    pub fn record_reuse(mut self, enabled: bool) -> Self {
        self.config.record_reuse = enabled;
        self
    }

    /// Decide which values may be saved.
    ///
    /// Defaults to accepting plain data and rejecting opaque values.
    pub fn can_be_saved(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.can_be_saved = Some(Arc::new(predicate));
        self
    }

    /// Seed the saveable registry with a previous save.
    pub fn restored(mut self, saved: SavedState) -> Self {
        self.restored = Some(saved);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> FrameRuntime {
        tracing::debug!(
            thread_binding = self.config.thread_binding,
            record_reuse = self.config.record_reuse,
            restored_keys = self.restored.as_ref().map_or(0, |r| r.len()),
            "frame runtime created"
        );
        FrameRuntime {
            registry: FrameRegistry::new(self.config),
            saveable: SaveableStateRegistry::new(self.restored, self.can_be_saved),
        }
    }
}
