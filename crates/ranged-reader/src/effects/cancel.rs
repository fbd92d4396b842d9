use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::ReaderError;

/// Shared cancellation token with a write-once cause.
///
/// The first caller of [`cancel`](Self::cancel) records the cause; later
/// callers only observe it. A token cancelled by its parent carries no
/// recorded cause and reports [`ReaderError::Cancelled`].
#[derive(Debug, Clone)]
pub(crate) struct CancelSignal {
    token: CancellationToken,
    cause: Arc<OnceLock<ReaderError>>,
}

impl CancelSignal {
    pub(crate) fn new(parent: Option<&CancellationToken>) -> Self {
        Self {
            token: parent.map_or_else(CancellationToken::new, CancellationToken::child_token),
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// Cancel with `cause` unless already cancelled; returns the cause in effect.
    pub(crate) fn cancel(&self, cause: ReaderError) -> ReaderError {
        let recorded = if self.token.is_cancelled() && self.cause.get().is_none() {
            self.cause.get_or_init(|| ReaderError::Cancelled)
        } else {
            self.cause.get_or_init(|| cause)
        };
        self.token.cancel();
        recorded.clone()
    }

    pub(crate) fn cause(&self) -> Option<ReaderError> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        self.token
            .is_cancelled()
            .then(|| self.cause.get_or_init(|| ReaderError::Cancelled).clone())
    }

    pub(crate) fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    pub(crate) async fn cancelled(&self) { self.token.cancelled().await }

    pub(crate) fn cancelled_owned(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}
