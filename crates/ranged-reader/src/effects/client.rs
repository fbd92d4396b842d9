use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;

use crate::core::ByteRange;

/// A boxed stream type for ranged response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Body of one ranged read: a stream of chunks ending at the end of the range.
pub type RangeBody<E> = BoxStream<'static, std::result::Result<Bytes, E>>;

/// Object storage client able to read a byte range of one object.
///
/// The reader calls [`get_range`](Self::get_range) exactly once per part and
/// drains the returned body before dropping it. Implementations handle their
/// own connection reuse, timeouts and authentication.
///
/// # Implementations
///
/// - [`ReqwestRangeClient`]: HTTP implementation using `reqwest`
/// - [`MockRangeClient`](crate::mock::MockRangeClient): in-memory object for tests
pub trait RangeClient: Send + Sync + 'static {
    /// Error type for request and body failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Request the inclusive object range `range`.
    ///
    /// `headers` are the pass-through headers from
    /// [`ReadOptions`](crate::ReadOptions).
    fn get_range(
        &self,
        range: ByteRange,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<RangeBody<Self::Error>, Self::Error>> + Send;
}

impl<C: RangeClient> RangeClient for Arc<C> {
    type Error = C::Error;

    fn get_range(
        &self,
        range: ByteRange,
        headers: &[(String, String)],
    ) -> impl Future<Output = std::result::Result<RangeBody<Self::Error>, Self::Error>> + Send {
        (**self).get_range(range, headers)
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::TryStreamExt;
    use reqwest::header::RANGE;
    use reqwest::{StatusCode, Url};

    use super::*;

    /// Error raised by [`ReqwestRangeClient`].
    #[derive(Debug, thiserror::Error)]
    pub enum RangeRequestError {
        #[error(transparent)]
        Request(#[from] reqwest::Error),

        #[error("server ignored range {range}: status {status}")]
        RangeIgnored { range: ByteRange, status: StatusCode },
    }

    /// HTTP range client for a single object URL.
    #[derive(Debug, Clone)]
    pub struct ReqwestRangeClient {
        client: reqwest::Client,
        url:    Url,
    }

    impl ReqwestRangeClient {
        /// Create a client for `url` with a default `reqwest::Client`.
        pub fn new(url: &str) -> crate::error::Result<Self> {
            let url = Url::parse(url)
                .map_err(|e| crate::error::ReaderError::InvalidConfig(format!("invalid URL {url}: {e}")))?;
            Ok(Self::with_client(reqwest::Client::new(), url))
        }

        /// Reuse an existing `reqwest::Client` (connection pool, TLS setup).
        pub fn with_client(client: reqwest::Client, url: Url) -> Self { Self { client, url } }

        pub fn url(&self) -> &Url { &self.url }
    }

    impl RangeClient for ReqwestRangeClient {
        type Error = RangeRequestError;

        async fn get_range(
            &self,
            range: ByteRange,
            headers: &[(String, String)],
        ) -> std::result::Result<RangeBody<Self::Error>, Self::Error> {
            let mut request = self
                .client
                .get(self.url.clone())
                .header(RANGE, range.header_value());

            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?.error_for_status()?;
            let status = response.status();

            // A 200 carries the whole object, which is only correct when the
            // range starts at the beginning.
            if status != StatusCode::PARTIAL_CONTENT && range.start != 0 {
                return Err(RangeRequestError::RangeIgnored { range, status });
            }

            let body = response.bytes_stream().map_err(RangeRequestError::from);
            Ok(Box::pin(body))
        }
    }

}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{RangeRequestError, ReqwestRangeClient};
