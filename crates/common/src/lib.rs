//! Shared types used by the game, input and render crates.

pub mod types;

pub use types::Transform;
