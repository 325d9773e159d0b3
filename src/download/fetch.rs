//! Byte-stream transport for downloads.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::DownloadError;

/// An open response: its advertised length and its body.
pub struct FetchResponse {
    /// `None` when the server sent no Content-Length
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Vec<u8>, DownloadError>>,
}

/// Opens a source URL as a byte stream.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| DownloadError::Network(e.to_string()))
            })
            .boxed();

        Ok(FetchResponse {
            content_length,
            body,
        })
    }
}

/// Mock implementations for testing.
#[cfg(test)]
pub mod mocks {
    use futures::stream;

    use super::*;

    /// Serves fixed chunks for every URL.
    #[derive(Clone, Default)]
    pub struct MockFetcher {
        chunks: Vec<Vec<u8>>,
        content_length: Option<u64>,
        fail_after_chunks: bool,
        hang_after_chunks: bool,
        fail_to_open: bool,
    }

    impl MockFetcher {
        /// Serve `chunks` with a correct Content-Length.
        pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
            let total = chunks.iter().map(|c| c.len() as u64).sum();
            Self {
                chunks,
                content_length: Some(total),
                ..Default::default()
            }
        }

        /// Advertise a different Content-Length (or none).
        pub fn content_length(mut self, length: Option<u64>) -> Self {
            self.content_length = length;
            self
        }

        /// Yield a network error after the chunks.
        pub fn fail_after_chunks(mut self) -> Self {
            self.fail_after_chunks = true;
            self
        }

        /// Never finish the body after the chunks.
        pub fn hang_after_chunks(mut self) -> Self {
            self.hang_after_chunks = true;
            self
        }

        /// Fail before any byte is received.
        pub fn unreachable() -> Self {
            Self {
                fail_to_open: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchResponse, DownloadError> {
            if self.fail_to_open {
                return Err(DownloadError::Network("connection refused".to_string()));
            }

            let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
            let body = if self.fail_after_chunks {
                chunks
                    .chain(stream::once(async {
                        Err(DownloadError::Network("connection reset".to_string()))
                    }))
                    .boxed()
            } else if self.hang_after_chunks {
                chunks.chain(stream::pending()).boxed()
            } else {
                chunks.boxed()
            };

            Ok(FetchResponse {
                content_length: self.content_length,
                body,
            })
        }
    }
}
