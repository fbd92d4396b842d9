use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::progress::Progress;
use crate::effects::BufferPool;
use crate::error::{ReaderError, Result};

/// Default part size: 16 MiB.
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// Default number of concurrent part fetchers.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Default number of queued parts per fetcher.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// Tuning knobs of a [`ParallelReader`](crate::ParallelReader).
///
/// The prefetch window, and with it the memory bound of a reader, is
/// `parallelism * queue_depth` parts.
///
/// # Examples
///
/// ```
/// use ranged_reader::ReaderConfig;
/// use std::time::Duration;
///
/// let config = ReaderConfig::default()
///     .part_size(8 * 1024 * 1024)
///     .parallelism(8)
///     .timeout(Some(Duration::from_secs(300)));
/// assert_eq!(config.window(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Size of every part except possibly the last one.
    ///
    /// Default: 16 MiB
    pub part_size: u64,

    /// Number of fetcher tasks.
    ///
    /// Default: 4
    pub parallelism: usize,

    /// Parts queued ahead per fetcher.
    ///
    /// Default: 2
    pub queue_depth: usize,

    /// Fail a part whose body is shorter than its range.
    ///
    /// When disabled, a short body is accepted and the end-of-stream
    /// accounting reports the missing bytes instead.
    ///
    /// Default: true
    pub strict_part_length: bool,

    /// Deadline for the whole stream, measured from start.
    ///
    /// Default: None
    pub timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            part_size:          DEFAULT_PART_SIZE,
            parallelism:        DEFAULT_PARALLELISM,
            queue_depth:        DEFAULT_QUEUE_DEPTH,
            strict_part_length: true,
            timeout:            None,
        }
    }
}

impl ReaderConfig {
    #[must_use]
    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    #[must_use]
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    #[must_use]
    pub fn strict_part_length(mut self, strict: bool) -> Self {
        self.strict_part_length = strict;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of parts that may be queued or in flight ahead of the consumer.
    pub fn window(&self) -> usize { self.parallelism.saturating_mul(self.queue_depth) }

    /// Check the invariants the reader relies on.
    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(ReaderError::InvalidConfig(
                "part size must be greater than 0".into(),
            ));
        }
        if usize::try_from(self.part_size).is_err() {
            return Err(ReaderError::InvalidConfig(format!(
                "part size {} does not fit in memory",
                self.part_size
            )));
        }
        if self.parallelism == 0 {
            return Err(ReaderError::InvalidConfig(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(ReaderError::InvalidConfig(
                "queue depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Per-stream options passed through to every part request.
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Object offset at which the stream starts.
    ///
    /// Part `i` covers object bytes
    /// `start_offset + i * part_size ..` so a caller can resume or skip a prefix.
    ///
    /// Default: 0
    pub start_offset: u64,

    /// Custom headers sent with every part request.
    ///
    /// Default: empty
    pub headers: Arc<[(String, String)]>,

    /// Invoked each time a part is handed to the consumer.
    ///
    /// Default: None
    pub on_progress: Option<Arc<dyn Fn(&Progress) + Send + Sync>>,

    /// Parent token; cancelling it cancels the reader with
    /// [`ReaderError::Cancelled`].
    ///
    /// Default: None
    pub cancel_token: Option<CancellationToken>,

    /// Pool to draw part buffers from. Its buffer length must equal the part size.
    ///
    /// Default: None (the reader creates its own pool)
    pub buffer_pool: Option<Arc<BufferPool>>,
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("start_offset", &self.start_offset)
            .field("headers", &self.headers)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .field("cancel_token", &self.cancel_token)
            .field("buffer_pool", &self.buffer_pool)
            .finish()
    }
}

impl ReadOptions {
    #[must_use]
    pub fn start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    /// Add a single custom header.
    ///
    /// ```
    /// use ranged_reader::ReadOptions;
    ///
    /// let options = ReadOptions::default()
    ///     .header("Authorization", "Bearer token")
    ///     .header("User-Agent", "ranged-reader/0.1");
    /// assert_eq!(options.headers.len(), 2);
    /// ```
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    /// Replace all custom headers.
    #[must_use]
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = Arc::from(headers);
        self
    }

    #[must_use]
    pub fn on_progress(mut self, on_progress: Arc<dyn Fn(&Progress) + Send + Sync>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    #[must_use]
    pub fn buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = Some(pool);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReaderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window(), DEFAULT_PARALLELISM * DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn test_invalid_configs() {
        for config in [
            ReaderConfig::default().part_size(0),
            ReaderConfig::default().parallelism(0),
            ReaderConfig::default().queue_depth(0),
        ] {
            assert!(matches!(
                config.validate(),
                Err(ReaderError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_config_from_toml_fills_defaults() {
        let config: ReaderConfig = toml::from_str(
            r#"
            part_size = 1048576
            parallelism = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.part_size, 1024 * 1024);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert!(config.strict_part_length);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_config_json_roundtrip_with_timeout() {
        let config = ReaderConfig::default().timeout(Some(Duration::from_secs(30)));
        let json = serde_json::to_string(&config).unwrap();
        let back: ReaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_headers_accumulate() {
        let options = ReadOptions::default()
            .header("a", "1")
            .header("b", "2")
            .start_offset(7);
        assert_eq!(
            &*options.headers,
            &[("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(options.start_offset, 7);
        assert!(format!("{options:?}").contains("start_offset: 7"));
    }
}
