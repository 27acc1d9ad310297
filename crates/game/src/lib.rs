//! Game state: a single free-fly camera moved by held keys.
//!
//! # Invariants
//! - `GameState::update` runs after input sampling and before rendering.
//! - Movement is a fixed step per frame along world axes; no rotation control.

pub mod camera;

pub use camera::{GameState, WindowControl};
