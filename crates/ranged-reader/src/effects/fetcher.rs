use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Mutex;

use super::cancel::CancelSignal;
use super::client::RangeClient;
use super::pool::BufferPool;
use super::router::{Dispatch, Part, PartSlot};
use crate::core::PartLayout;
use crate::error::{ReaderError, Result};

/// One member of the fixed fetcher pool.
///
/// Loops claiming a slot and a part index, fetching that part with a single
/// ranged read and answering the slot, until the work runs out or the signal
/// fires.
pub(crate) struct PartFetcher<C> {
    pub(crate) id:           usize,
    pub(crate) client:       Arc<C>,
    pub(crate) layout:       PartLayout,
    pub(crate) start_offset: u64,
    pub(crate) headers:      Arc<[(String, String)]>,
    pub(crate) strict:       bool,
    pub(crate) pool:         Arc<BufferPool>,
    pub(crate) dispatch:     Arc<Mutex<Dispatch>>,
    pub(crate) signal:       CancelSignal,
}

impl<C: RangeClient> PartFetcher<C> {
    pub(crate) async fn run(self) {
        let mut fetched = 0u64;

        loop {
            let claimed = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                claimed = self.claim() => claimed,
            };
            let Some((slot, index)) = claimed else {
                break;
            };

            // Dropping the fetch on cancellation drops the slot and any buffer it holds.
            let result = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                result = self.fetch_part(index) => result,
            };

            match &result {
                Ok(part) => {
                    tracing::trace!(worker = self.id, part = index, len = part.buffer.len(), "part fetched")
                }
                Err(err) => tracing::debug!(worker = self.id, part = index, error = %err, "part fetch failed"),
            }
            fetched += 1;

            // The consumer may be gone; an unsent part returns its buffer on drop.
            let _ = slot.send(result);
        }

        tracing::trace!(worker = self.id, fetched, "part fetcher exiting");
    }

    async fn claim(&self) -> Option<(PartSlot, u64)> { self.dispatch.lock().await.claim().await }

    async fn fetch_part(&self, index: u64) -> Result<Part> {
        let range = self
            .layout
            .part_range(index)
            .and_then(|range| range.shifted(self.start_offset))
            .ok_or_else(|| ReaderError::Internal(format!("part {index} lies outside the stream")))?;
        let expected = range.length();

        let mut body = self
            .client
            .get_range(range, &self.headers)
            .await
            .map_err(|e| ReaderError::transport(index, e))?;

        let mut buffer = self.pool.acquire();
        let mut surplus = 0usize;
        let mut ended = false;
        while (buffer.len() as u64) < expected {
            let Some(chunk) = body.next().await else {
                ended = true;
                break;
            };
            let chunk = chunk.map_err(|e| ReaderError::transport(index, e))?;

            let wanted = (expected - buffer.len() as u64).min(chunk.len() as u64) as usize;
            buffer.fill_from(&chunk[..wanted]);
            surplus += chunk.len() - wanted;
        }

        // Drain the rest so the connection ends cleanly; the part is already complete.
        if !ended {
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => surplus += chunk.len(),
                    Err(err) => {
                        tracing::debug!(part = index, error = %err, "body failed after part was complete");
                        break;
                    }
                }
            }
        }
        drop(body);
        if surplus > 0 {
            tracing::trace!(part = index, surplus, "discarded bytes past range end");
        }

        let actual = buffer.len() as u64;
        if actual < expected {
            if self.strict {
                return Err(ReaderError::ShortRead {
                    index,
                    expected,
                    actual,
                });
            }
            tracing::debug!(part = index, expected, actual, "accepting short part");
        }

        Ok(Part { index, buffer })
    }
}
