//! Shared helpers for framestate integration tests

#![allow(dead_code)]

pub use framestate::prelude::*;
pub use framestate::{FrameMetrics, FrameRegistry, RegistryConfig};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Runtime with default settings: one top-level frame per thread
pub fn runtime() -> FrameRuntime {
    init_tracing();
    FrameRuntime::new()
}

/// Runtime that lets one thread hold many top-level frames, for tests that
/// interleave frames by hand
pub fn unbound_runtime() -> FrameRuntime {
    init_tracing();
    FrameRuntime::builder().thread_binding(false).build()
}

/// Create and commit a cell holding `value`
pub fn committed_cell<T: Clone + Send + Sync + 'static>(rt: &FrameRuntime, value: T) -> StateCell<T> {
    rt.frame(|f| rt.cell(f, value)).expect("create cell")
}

/// Open a top-level writable frame
pub fn open(rt: &FrameRuntime) -> Frame {
    rt.open(FrameOptions::new()).expect("open frame")
}

/// Read the committed value of `cell` through a fresh read-only frame
pub fn read<T: Clone + Send + Sync + 'static>(rt: &FrameRuntime, cell: &StateCell<T>) -> T {
    rt.read(|f| Ok(cell.get(f)?)).expect("read cell")
}
