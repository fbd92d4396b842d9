use tokio::sync::mpsc;

use super::cancel::CancelSignal;

/// Emits part indices `0..total_parts` in order into the bounded request queue.
///
/// Stops early when the signal fires or every fetcher has gone. Dropping
/// `parts` on return closes the queue, which is how fetchers learn there is
/// no more work.
pub(crate) async fn schedule_parts(total_parts: u64, parts: mpsc::Sender<u64>, signal: CancelSignal) {
    for index in 0..total_parts {
        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                tracing::debug!(next_part = index, "scheduler stopped by cancellation");
                return;
            }
            sent = parts.send(index) => {
                if sent.is_err() {
                    tracing::debug!(next_part = index, "request queue closed, scheduler exiting");
                    return;
                }
            }
        }
    }
    tracing::trace!(total_parts, "scheduler emitted every part");
}
