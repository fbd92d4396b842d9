//! In-memory range client for tests and benches.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};

use super::client::{RangeBody, RangeClient};
use crate::core::ByteRange;

/// Error produced by [`MockRangeClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mock transport failure: {0}")]
pub struct MockError(pub String);

/// Fault injected into the request whose range starts at a given offset.
#[derive(Debug, Clone)]
pub enum MockFault {
    /// The request itself fails.
    Request(String),
    /// The body fails after yielding `after` bytes.
    Body { after: usize, message: String },
    /// The body ends cleanly after `len` bytes.
    Truncate(usize),
    /// The body yields `extra` bytes past the end of the range.
    Overrun(usize),
    /// The request never completes.
    Hang,
    /// The request completes after an extra delay.
    Delay(Duration),
}

/// A request observed by [`MockRangeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub range:   ByteRange,
    pub headers: Vec<(String, String)>,
}

/// Serves byte ranges of an in-memory object.
///
/// # Examples
///
/// ```
/// use ranged_reader::mock::{MockFault, MockRangeClient};
///
/// let client = MockRangeClient::new(vec![7u8; 100])
///     .with_chunk_size(16)
///     .with_fault(50, MockFault::Request("boom".into()));
/// assert_eq!(client.len(), 100);
/// ```
#[derive(Debug)]
pub struct MockRangeClient {
    data:       Bytes,
    chunk_size: usize,
    latency:    Duration,
    faults:     HashMap<u64, MockFault>,
    requests:   Mutex<Vec<RecordedRequest>>,
}

impl MockRangeClient {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data:       data.into(),
            chunk_size: 8192,
            latency:    Duration::ZERO,
            faults:     HashMap::new(),
            requests:   Mutex::new(Vec::new()),
        }
    }

    /// Split bodies into chunks of `chunk_size` bytes.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delay every request by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inject `fault` into the request whose range starts at `range_start`.
    #[must_use]
    pub fn with_fault(mut self, range_start: u64, fault: MockFault) -> Self {
        self.faults.insert(range_start, fault);
        self
    }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn chunked(&self, body: Bytes) -> Vec<std::result::Result<Bytes, MockError>> {
        (0..body.len())
            .step_by(self.chunk_size)
            .map(|at| Ok(body.slice(at..(at + self.chunk_size).min(body.len()))))
            .collect()
    }
}

impl RangeClient for MockRangeClient {
    type Error = MockError;

    async fn get_range(
        &self,
        range: ByteRange,
        headers: &[(String, String)],
    ) -> std::result::Result<RangeBody<Self::Error>, Self::Error> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                range,
                headers: headers.to_vec(),
            });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let fault = self.faults.get(&range.start).cloned();
        match &fault {
            Some(MockFault::Request(message)) => return Err(MockError(message.clone())),
            Some(MockFault::Hang) => std::future::pending::<()>().await,
            Some(MockFault::Delay(delay)) => tokio::time::sleep(*delay).await,
            _ => {}
        }

        let len = self.data.len() as u64;
        if range.start >= len || range.end >= len {
            return Err(MockError(format!(
                "range {range} out of bounds for object of {len} bytes"
            )));
        }

        let mut end = range.end as usize + 1;
        if let Some(MockFault::Overrun(extra)) = &fault {
            end = (end + extra).min(self.data.len());
        }
        let body = self.data.slice(range.start as usize..end);

        let body: RangeBody<MockError> = match fault {
            Some(MockFault::Truncate(keep)) => {
                let keep = keep.min(body.len());
                Box::pin(stream::iter(self.chunked(body.slice(..keep))))
            }
            Some(MockFault::Body { after, message }) => {
                let after = after.min(body.len());
                let chunks = self.chunked(body.slice(..after));
                Box::pin(stream::iter(chunks).chain(stream::once(async move { Err(MockError(message)) })))
            }
            _ => Box::pin(stream::iter(self.chunked(body))),
        };
        Ok(body)
    }
}
