//! Error types for ranged-reader.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Boxed foreign error kept behind an `Arc` so a cause can be cloned to every caller.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by [`ParallelReader`](crate::ParallelReader).
///
/// The first error observed becomes the terminal state of the reader; every
/// later call returns a clone of it, which is why foreign errors are held in
/// an [`Arc`].
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    #[error("failed to fetch part {index}: {source}")]
    Transport { index: u64, source: SharedError },

    #[error("short read on part {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index:    u64,
        expected: u64,
        actual:   u64,
    },

    #[error("reader closed")]
    Closed,

    #[error("read cancelled")]
    Cancelled,

    #[error("read timed out")]
    TimedOut,

    #[error("download stream ended early: delivered {delivered} of {expected} bytes")]
    StreamEndedEarly { delivered: u64, expected: u64 },

    #[error("invalid reader configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReaderError {
    pub(crate) fn transport<E>(index: u64, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ReaderError::Transport {
            index,
            source: Arc::new(err),
        }
    }

    /// Returns `true` for the errors raised by cancellation rather than by a part.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ReaderError::Closed | ReaderError::Cancelled | ReaderError::TimedOut
        )
    }
}

impl From<ReaderError> for io::Error {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::TimedOut => io::Error::new(io::ErrorKind::TimedOut, err),
            ReaderError::StreamEndedEarly { .. } | ReaderError::ShortRead { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn transport_error_keeps_source_message() {
        let err = ReaderError::transport(3, Reset);
        assert_eq!(err.to_string(), "failed to fetch part 3: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn clones_share_the_same_source() {
        let err = ReaderError::transport(1, Reset);
        let copy = err.clone();
        match (err, copy) {
            (
                ReaderError::Transport { source: a, .. },
                ReaderError::Transport { source: b, .. },
            ) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected transport errors"),
        }
    }

    #[test]
    fn io_conversion_preserves_inner_error() {
        let io_err: io::Error = ReaderError::StreamEndedEarly {
            delivered: 5,
            expected:  10,
        }
        .into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
        let inner = io_err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ReaderError>())
            .unwrap();
        assert!(matches!(inner, ReaderError::StreamEndedEarly { delivered: 5, .. }));

        let io_err: io::Error = ReaderError::TimedOut.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn cancellation_classification() {
        assert!(ReaderError::Closed.is_cancellation());
        assert!(ReaderError::Cancelled.is_cancellation());
        assert!(ReaderError::TimedOut.is_cancellation());
        assert!(!ReaderError::Internal("x".into()).is_cancellation());
    }
}
