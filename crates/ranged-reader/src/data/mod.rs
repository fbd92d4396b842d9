//! Immutable configuration and reporting types.
//!
//! These types are built by the caller and handed to the reader; the reader
//! never mutates them after construction.

pub mod options;
pub mod progress;

pub use options::{
    DEFAULT_PARALLELISM, DEFAULT_PART_SIZE, DEFAULT_QUEUE_DEPTH, ReadOptions, ReaderConfig,
};
pub use progress::{Progress, ReaderState};
