use std::fmt;

/// Lifecycle of a [`ParallelReader`](crate::ParallelReader).
///
/// `NotStarted → Running → (Error | Closed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderState {
    /// Constructed; no task has been spawned yet.
    #[default]
    NotStarted,

    /// Scheduler and fetchers are running (or have finished all parts).
    Running,

    /// A part failed or the stream was cancelled; every read returns the cause.
    Error,

    /// `close` was called.
    Closed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderState::NotStarted => write!(f, "NotStarted"),
            ReaderState::Running => write!(f, "Running"),
            ReaderState::Error => write!(f, "Error"),
            ReaderState::Closed => write!(f, "Closed"),
        }
    }
}

/// Progress of a stream, reported once per part handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Index of the part just delivered.
    pub part_index: u64,

    /// Parts delivered so far, including this one.
    pub parts_completed: u64,

    pub total_parts: u64,

    /// Bytes of all parts delivered so far.
    pub bytes_completed: u64,

    pub total_bytes: u64,
}

impl Progress {
    pub fn percentage(&self) -> f32 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_completed as f32 / self.total_bytes as f32) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool { self.parts_completed == self.total_parts }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = Progress {
            part_index:      0,
            parts_completed: 1,
            total_parts:     4,
            bytes_completed: 25,
            total_bytes:     100,
        };
        assert_eq!(progress.percentage(), 25.0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReaderState::default().to_string(), "NotStarted");
        assert_eq!(ReaderState::Error.to_string(), "Error");
    }
}
