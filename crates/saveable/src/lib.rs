//! Saveable state registry
//!
//! The boundary between in-memory state and whatever persists it across a
//! process or navigation restart. Components register value providers under
//! stable keys; [`SaveableStateRegistry::perform_save`] collects their values,
//! and a registry created from the saved map hands them back through
//! [`SaveableStateRegistry::consume_restored`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;

pub use registry::{CanBeSaved, RegistrationHandle, SaveableStateRegistry, SavedState, ValueProvider};
