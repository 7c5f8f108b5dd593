//! Framed collections.
//!
//! Each collection wraps one state cell and takes the frame explicitly:
//! reads take `&Frame`, writes take `&mut Frame`.

mod list;
mod map;

pub use list::StateList;
pub use map::StateMap;
