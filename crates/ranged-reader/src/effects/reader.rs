use std::future::{Future, poll_fn};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Sleep;
use tokio_util::sync::WaitForCancellationFutureOwned;

use super::cancel::CancelSignal;
use super::client::RangeClient;
use super::fetcher::PartFetcher;
use super::pool::{BufferPool, PoolStats};
use super::router::{Dispatch, Part, SlotRouter};
use super::scheduler::schedule_parts;
use crate::core::PartLayout;
use crate::data::{Progress, ReadOptions, ReaderConfig, ReaderState};
use crate::error::{ReaderError, Result};

/// Consumer position within the stream. Only the reader touches it.
#[derive(Debug, Default)]
struct Cursor {
    /// Parts delivered to the reader so far.
    next_part: u64,
    /// Bytes copied out to the caller.
    offset:    u64,
    /// Bytes of every delivered part.
    delivered: u64,
    current:   Option<Part>,
    consumed:  usize,
}

impl Cursor {
    /// Copy from the current part, releasing it once fully consumed.
    fn copy_to(&mut self, buf: &mut [u8]) -> Option<usize> {
        let part = self.current.as_ref()?;
        let remaining = &part.buffer[self.consumed..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);

        self.consumed += n;
        self.offset += n as u64;
        if self.consumed == part.buffer.len() {
            self.release();
        }
        Some(n)
    }

    fn release(&mut self) {
        self.current = None;
        self.consumed = 0;
    }
}

/// Reads one remote object as an ordered byte stream using parallel range requests.
///
/// The object is split into parts of [`ReaderConfig::part_size`] bytes. On the
/// first read a scheduler and a pool of [`ReaderConfig::parallelism`] fetchers
/// start downloading up to [`ReaderConfig::window`] parts ahead of the
/// consumer; parts are handed out strictly in order.
///
/// The first error, whether from a part, a timeout or a close, is terminal:
/// every later read returns it.
///
/// # Examples
///
/// ```
/// use ranged_reader::mock::MockRangeClient;
/// use ranged_reader::{ParallelReader, ReadOptions, ReaderConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ranged_reader::Result<()> {
/// let data: Vec<u8> = (0..100u8).collect();
/// let client = MockRangeClient::new(data.clone());
/// let config = ReaderConfig::default().part_size(16).parallelism(3);
///
/// let mut reader = ParallelReader::new(client, 100, config, ReadOptions::default())?;
/// let mut out = Vec::new();
/// let mut buf = [0u8; 7];
/// loop {
///     let n = reader.read(&mut buf).await?;
///     if n == 0 {
///         break;
///     }
///     out.extend_from_slice(&buf[..n]);
/// }
/// reader.close().await?;
/// assert_eq!(out, data);
/// # Ok(())
/// # }
/// ```
pub struct ParallelReader<C: RangeClient> {
    client:    Arc<C>,
    layout:    PartLayout,
    config:    ReaderConfig,
    options:   ReadOptions,
    pool:      Arc<BufferPool>,
    signal:    CancelSignal,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    deadline:  Option<Pin<Box<Sleep>>>,
    router:    Option<SlotRouter>,
    collector: Option<JoinHandle<()>>,
    cursor:    Cursor,
    started:   bool,
    closed:    bool,
}

impl<C: RangeClient> ParallelReader<C> {
    /// Create a reader for a stream of `total_size` bytes.
    ///
    /// Nothing is spawned until the first [`read`](Self::read) or
    /// [`start`](Self::start).
    pub fn new(client: C, total_size: u64, config: ReaderConfig, options: ReadOptions) -> Result<Self> {
        config.validate()?;
        let layout = PartLayout::new(total_size, config.part_size)?;

        if options.start_offset.checked_add(total_size).is_none() {
            return Err(ReaderError::InvalidConfig(format!(
                "stream of {total_size} bytes at offset {} overflows the object address space",
                options.start_offset
            )));
        }

        let buffer_len = usize::try_from(config.part_size)
            .map_err(|_| ReaderError::InvalidConfig("part size does not fit in memory".into()))?;
        let pool = match &options.buffer_pool {
            Some(pool) if pool.buffer_len() == buffer_len => Arc::clone(pool),
            Some(pool) => {
                return Err(ReaderError::InvalidConfig(format!(
                    "buffer pool hands out {} byte buffers, part size is {buffer_len}",
                    pool.buffer_len()
                )));
            }
            None => BufferPool::new(buffer_len),
        };

        let signal = CancelSignal::new(options.cancel_token.as_ref());
        let cancelled = Box::pin(signal.cancelled_owned());

        Ok(Self {
            client: Arc::new(client),
            layout,
            config,
            options,
            pool,
            signal,
            cancelled,
            deadline: None,
            router: None,
            collector: None,
            cursor: Cursor::default(),
            started: false,
            closed: false,
        })
    }

    pub fn layout(&self) -> &PartLayout { &self.layout }

    pub fn state(&self) -> ReaderState {
        if self.closed {
            ReaderState::Closed
        } else if !self.started {
            ReaderState::NotStarted
        } else if self.signal.is_cancelled() {
            ReaderState::Error
        } else {
            ReaderState::Running
        }
    }

    /// Bytes handed to the caller so far.
    pub fn position(&self) -> u64 { self.cursor.offset }

    pub fn pool_stats(&self) -> PoolStats { self.pool.stats() }

    /// Handle that closes this reader from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            signal: self.signal.clone(),
        }
    }

    /// Spawn the scheduler, the fetcher pool and the collector.
    ///
    /// Idempotent. A stream without parts starts no task. Fails instead of
    /// panicking when called outside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.started || self.closed {
            return Ok(());
        }

        let total_parts = self.layout.total_parts();
        if total_parts == 0 {
            self.started = true;
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ReaderError::Internal(format!("parallel reader needs a tokio runtime: {e}")))?;

        // Never hold more slots than there are parts.
        let window = self
            .config
            .window()
            .min(usize::try_from(total_parts).unwrap_or(usize::MAX));
        let workers = (self.config.parallelism as u64).min(total_parts) as usize;
        let (parts_tx, parts_rx) = mpsc::channel(window);
        let (slots_tx, slots_rx) = mpsc::channel(window);
        let dispatch = Arc::new(Mutex::new(Dispatch::new(slots_rx, parts_rx)));

        let mut tasks = JoinSet::new();
        tasks.spawn_on(
            schedule_parts(total_parts, parts_tx, self.signal.clone()),
            &runtime,
        );
        for id in 0..workers {
            let fetcher = PartFetcher {
                id,
                client: Arc::clone(&self.client),
                layout: self.layout,
                start_offset: self.options.start_offset,
                headers: Arc::clone(&self.options.headers),
                strict: self.config.strict_part_length,
                pool: Arc::clone(&self.pool),
                dispatch: Arc::clone(&dispatch),
                signal: self.signal.clone(),
            };
            tasks.spawn_on(fetcher.run(), &runtime);
        }

        self.collector = Some(runtime.spawn(collect(tasks, dispatch, self.signal.clone())));
        self.router = Some(SlotRouter::new(slots_tx, window, total_parts));
        self.deadline = self.config.timeout.map(|timeout| Box::pin(tokio::time::sleep(timeout)));
        self.started = true;

        tracing::debug!(
            total_size = self.layout.total_size(),
            part_size = self.layout.part_size(),
            total_parts,
            workers,
            window,
            start_offset = self.options.start_offset,
            "parallel reader started"
        );
        Ok(())
    }

    /// Read into `buf`, returning the number of bytes copied.
    ///
    /// `Ok(0)` marks the end of the stream (or an empty `buf`). A single call
    /// never crosses a part boundary.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> { poll_fn(|cx| self.poll_read_inner(cx, buf)).await }

    /// Cancel every task, wait for them to finish and release held buffers.
    ///
    /// Idempotent. Later reads return [`ReaderError::Closed`] unless an earlier
    /// error already ended the stream. Closing a reader that never started
    /// does nothing; it can still be read afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed || !self.started {
            return Ok(());
        }
        self.closed = true;

        self.signal.cancel(ReaderError::Closed);
        if let Some(router) = self.router.as_mut() {
            router.clear();
        }
        self.cursor.release();
        self.deadline = None;

        if let Some(collector) = self.collector.take() {
            collector
                .await
                .map_err(|e| ReaderError::Internal(format!("collector task failed: {e}")))?;
        }

        tracing::debug!(position = self.cursor.offset, "parallel reader closed");
        Ok(())
    }

    fn poll_read_inner(&mut self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<Result<usize>> {
        loop {
            if let Some(cause) = self.signal.cause() {
                return Poll::Ready(Err(cause));
            }
            if buf.is_empty() {
                return Poll::Ready(Ok(0));
            }
            if let Some(n) = self.cursor.copy_to(buf) {
                return Poll::Ready(Ok(n));
            }
            if self.cursor.next_part == self.layout.total_parts() {
                return Poll::Ready(self.finish());
            }

            if let Err(err) = self.start() {
                return Poll::Ready(Err(self.fail(err)));
            }

            let submitted = match self.router.as_mut() {
                Some(router) => router.fill_window(&self.signal),
                None => Err(ReaderError::Internal("part router missing after start".into())),
            };
            if let Err(err) = submitted {
                return Poll::Ready(Err(self.fail(err)));
            }

            // Cancellation wakes this read; the top of the loop reports the cause.
            if self.cancelled.as_mut().poll(cx).is_ready() {
                continue;
            }
            let expired = self
                .deadline
                .as_mut()
                .is_some_and(|deadline| deadline.as_mut().poll(cx).is_ready());
            if expired {
                return Poll::Ready(Err(self.fail(ReaderError::TimedOut)));
            }

            let polled = match self.router.as_mut() {
                Some(router) => router.poll_next(cx, &self.signal),
                None => Poll::Ready(Err(ReaderError::Internal(
                    "part router missing after start".into(),
                ))),
            };
            let part = match ready!(polled) {
                Ok(part) => part,
                Err(err) => return Poll::Ready(Err(self.fail(err))),
            };

            self.deliver(part);
        }
    }

    fn deliver(&mut self, part: Part) {
        self.cursor.next_part += 1;
        self.cursor.delivered += part.buffer.len() as u64;
        tracing::trace!(part = part.index, len = part.buffer.len(), "part delivered");

        if let Some(on_progress) = &self.options.on_progress {
            on_progress(&Progress {
                part_index:      part.index,
                parts_completed: self.cursor.next_part,
                total_parts:     self.layout.total_parts(),
                bytes_completed: self.cursor.delivered,
                total_bytes:     self.layout.total_size(),
            });
        }

        // An empty part only occurs with lenient part length; skip it.
        if !part.buffer.is_empty() {
            self.cursor.current = Some(part);
            self.cursor.consumed = 0;
        }
    }

    fn finish(&mut self) -> Result<usize> {
        if self.cursor.offset == self.layout.total_size() {
            if let Some(router) = self.router.as_mut() {
                router.clear();
            }
            return Ok(0);
        }

        Err(self.fail(ReaderError::StreamEndedEarly {
            delivered: self.cursor.offset,
            expected:  self.layout.total_size(),
        }))
    }

    /// Make `err` the cancellation cause (unless one exists) and drop held parts.
    fn fail(&mut self, err: ReaderError) -> ReaderError {
        let cause = self.signal.cancel(err);
        if let Some(router) = self.router.as_mut() {
            router.clear();
        }
        self.cursor.release();

        if cause.is_cancellation() {
            tracing::debug!(position = self.cursor.offset, cause = %cause, "parallel read cancelled");
        } else {
            tracing::warn!(
                position = self.cursor.offset,
                part = self.cursor.next_part,
                error = %cause,
                "parallel read failed"
            );
        }
        cause
    }
}

impl<C: RangeClient> AsyncRead for ParallelReader<C> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = ready!(this.poll_read_inner(cx, buf.initialize_unfilled()))?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl<C: RangeClient> Drop for ParallelReader<C> {
    fn drop(&mut self) {
        if self.started && !self.closed {
            self.signal.cancel(ReaderError::Closed);
        }
    }
}

impl<C: RangeClient> std::fmt::Debug for ParallelReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelReader")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("position", &self.cursor.offset)
            .field("next_part", &self.cursor.next_part)
            .field("pending_parts", &self.router.as_ref().map_or(0, SlotRouter::outstanding))
            .finish()
    }
}

/// Closes a [`ParallelReader`] from another task.
///
/// A read blocked on a part returns [`ReaderError::Closed`] promptly. The
/// handle does not wait for tasks; call [`ParallelReader::close`] for that.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    signal: CancelSignal,
}

impl CloseHandle {
    pub fn close(&self) { self.signal.cancel(ReaderError::Closed); }

    pub fn is_cancelled(&self) -> bool { self.signal.is_cancelled() }
}

/// Joins every pipeline task, then lets go of the shared dispatch so the slot
/// channel closes only after the last fetcher has exited.
async fn collect(mut tasks: JoinSet<()>, dispatch: Arc<Mutex<Dispatch>>, signal: CancelSignal) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined
            && err.is_panic()
        {
            tracing::warn!(error = %err, "parallel reader task panicked");
            signal.cancel(ReaderError::Internal(format!("pipeline task panicked: {err}")));
        }
    }
    drop(dispatch);
    tracing::trace!("parallel reader tasks finished");
}
