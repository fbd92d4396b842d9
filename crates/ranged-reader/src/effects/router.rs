//! One-shot result routing between the consumer and the part fetchers.
//!
//! The consumer submits one slot per part, oldest first, and always waits on
//! the oldest slot. Fetchers claim a slot together with the next part index,
//! so slot `k` is always answered with part `k` and no reorder buffer is
//! needed even though fetches complete in any order.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::cancel::CancelSignal;
use super::pool::PooledBuffer;
use crate::error::{ReaderError, Result};

/// A fetched part. The filled prefix of `buffer` is the part's data.
#[derive(Debug)]
pub(crate) struct Part {
    pub(crate) index:  u64,
    pub(crate) buffer: PooledBuffer,
}

pub(crate) type PartResult = Result<Part>;

/// Sending half of a one-shot response slot.
pub(crate) type PartSlot = oneshot::Sender<PartResult>;

/// Work sources shared by every fetcher.
pub(crate) struct Dispatch {
    slots: mpsc::Receiver<PartSlot>,
    parts: mpsc::Receiver<u64>,
}

impl Dispatch {
    pub(crate) fn new(slots: mpsc::Receiver<PartSlot>, parts: mpsc::Receiver<u64>) -> Self {
        Self { slots, parts }
    }

    /// Claim the next slot and the next part index as one unit.
    ///
    /// Must be called with exclusive access so concurrent fetchers cannot
    /// interleave slots and indices.
    pub(crate) async fn claim(&mut self) -> Option<(PartSlot, u64)> {
        let slot = self.slots.recv().await?;
        // A closed request queue drops the slot, which its receiver sees as abandoned.
        let index = self.parts.recv().await?;
        Some((slot, index))
    }
}

struct PendingPart {
    index:    u64,
    receiver: oneshot::Receiver<PartResult>,
}

/// Consumer side: keeps the prefetch window of outstanding slots.
pub(crate) struct SlotRouter {
    slots:        Option<mpsc::Sender<PartSlot>>,
    pending:      VecDeque<PendingPart>,
    window:       usize,
    next_request: u64,
    total_parts:  u64,
}

impl SlotRouter {
    pub(crate) fn new(slots: mpsc::Sender<PartSlot>, window: usize, total_parts: u64) -> Self {
        Self {
            slots: Some(slots),
            pending: VecDeque::with_capacity(window),
            window,
            next_request: 0,
            total_parts,
        }
    }

    /// Submit slots until the window is full or every part has been requested.
    ///
    /// The slot channel is closed right after the last part's slot so idle
    /// fetchers can exit.
    pub(crate) fn fill_window(&mut self, signal: &CancelSignal) -> Result<()> {
        while self.pending.len() < self.window && self.next_request < self.total_parts {
            if let Some(cause) = signal.cause() {
                return Err(cause);
            }

            let Some(slots) = self.slots.as_ref() else {
                return Err(ReaderError::Internal(
                    "slot channel closed before the last part was requested".into(),
                ));
            };

            let (slot, receiver) = oneshot::channel();
            match slots.try_send(slot) {
                Ok(()) => {}
                // The channel holds at most `window` slots and at most `window` are pending.
                Err(TrySendError::Full(_)) => {
                    return Err(ReaderError::Internal("slot channel over capacity".into()));
                }
                Err(TrySendError::Closed(_)) => {
                    return Err(signal.cause().unwrap_or_else(|| {
                        ReaderError::Internal("every part fetcher exited early".into())
                    }));
                }
            }

            self.pending.push_back(PendingPart {
                index: self.next_request,
                receiver,
            });
            self.next_request += 1;

            if self.next_request == self.total_parts {
                self.slots = None;
            }
        }
        Ok(())
    }

    /// Wait for the oldest outstanding slot.
    pub(crate) fn poll_next(&mut self, cx: &mut Context<'_>, signal: &CancelSignal) -> Poll<Result<Part>> {
        let Some(front) = self.pending.front_mut() else {
            return Poll::Ready(Err(ReaderError::Internal(
                "no part has been requested".into(),
            )));
        };

        let received = ready!(Pin::new(&mut front.receiver).poll(cx));
        let expected = front.index;
        self.pending.pop_front();

        Poll::Ready(match received {
            Ok(Ok(part)) if part.index == expected => Ok(part),
            Ok(Ok(part)) => Err(ReaderError::Internal(format!(
                "expected part {expected}, received part {}",
                part.index
            ))),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(signal.cause().unwrap_or_else(|| {
                ReaderError::Internal(format!("part {expected} was abandoned by its fetcher"))
            })),
        })
    }

    /// Drop every outstanding slot and stop submitting.
    ///
    /// Parts already delivered into dropped slots release their buffers.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.slots = None;
    }

    pub(crate) fn outstanding(&self) -> usize { self.pending.len() }
}
