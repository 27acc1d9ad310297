//! Keyboard input sampled once per frame.
//!
//! # Invariants
//! - `InputState::update` runs exactly once per frame, before any reads.
//! - A key is "pressed" only on the frame it goes from up to down.

pub mod key;
pub mod state;

pub use key::Key;
pub use state::{InputState, KeySource};
