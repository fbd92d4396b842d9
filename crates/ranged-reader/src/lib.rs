//! Parallel range-request reader.
//!
//! Exposes a remote object of known size as one ordered byte stream while
//! fetching it as fixed-size parts over concurrent ranged GETs.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - `data` - Configuration, per-stream options and progress types
//! - `core` - Pure part layout arithmetic
//! - `effects` - Range transport, buffer pool and the fetch pipeline
//!
//! # Key Features
//!
//! - **Ordered**: Parts finish in any order but are delivered strictly in sequence
//! - **Bounded Memory**: At most `parallelism * queue_depth` parts are buffered
//! - **Recycled Buffers**: Part buffers come from a pool and return to it on drop
//! - **Sticky Errors**: The first failure, timeout or close ends the stream for good
//! - **Transport-Agnostic**: Any [`RangeClient`] works; reqwest is built in

mod core;
mod data;
mod effects;
mod error;

pub use crate::core::{ByteRange, PartLayout};
pub use data::{
    DEFAULT_PARALLELISM, DEFAULT_PART_SIZE, DEFAULT_QUEUE_DEPTH, Progress, ReadOptions, ReaderConfig, ReaderState,
};
pub use effects::mock;
pub use effects::{
    BoxStream, BufferPool, CloseHandle, ParallelReader, PoolStats, PooledBuffer, RangeBody, RangeClient,
};
#[cfg(feature = "reqwest")]
pub use effects::{RangeRequestError, ReqwestRangeClient};
pub use error::{ReaderError, Result, SharedError};

pub use tokio_util::sync::CancellationToken;
