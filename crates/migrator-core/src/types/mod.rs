//! Shared value types.

pub mod pattern;

pub use pattern::{Pattern, Side};
