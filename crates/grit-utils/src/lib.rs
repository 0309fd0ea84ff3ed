//! Foundation utilities for the grit repository engine.

pub mod path;
pub mod pattern;

pub use path::PathError;
