//! Effectful side of the reader: the range transport, the buffer pool and the
//! task pipeline that turns part fetches into an ordered stream.
//!
//! The pipeline is a scheduler feeding part indices into a bounded queue, a
//! fixed pool of fetchers, and a consumer that routes results through one-shot
//! slots. Everything shares a single [`CancelSignal`](cancel::CancelSignal).

mod cancel;
mod client;
mod fetcher;
pub mod mock;
mod pool;
mod reader;
mod router;
mod scheduler;

pub use client::{BoxStream, RangeBody, RangeClient};
#[cfg(feature = "reqwest")]
pub use client::{RangeRequestError, ReqwestRangeClient};
pub use pool::{BufferPool, PoolStats, PooledBuffer};
pub use reader::{CloseHandle, ParallelReader};
