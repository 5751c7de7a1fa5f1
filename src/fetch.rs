// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The fetcher collaborator: HEAD/GET of non-rendered URLs and assets
//! (spec.md §6.5). Swappable behind a trait; `ReqwestFetcher` is the
//! default implementation used outside of tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("http transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
}

/// The result of a HEAD (or HEAD-equivalent) probe.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub final_url: Url,
}

/// A complete, buffered response — used for small text resources
/// (`robots.txt`, sitemaps) where streaming would be overkill.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: u16,
    pub final_url: Url,
    pub body: String,
}

/// Narrow boundary to the outside world's HTTP client. Redirects are
/// followed by the implementation; 4xx/5xx propagate as
/// [`FetchError::Status`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<HeadInfo, FetchError>;

    async fn get_text(&self, url: &Url, timeout: Duration) -> Result<FetchedBody, FetchError>;

    async fn stream_get(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<(HeadInfo, BoxStream<'static, Result<Bytes, FetchError>>), FetchError>;
}

/// Default `reqwest`-backed implementation.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .expect("reqwest client configuration is static and known-valid"),
        }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn head_info_from(response: &reqwest::Response) -> HeadInfo {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    HeadInfo {
        status: response.status().as_u16(),
        content_type,
        content_length: response.content_length(),
        final_url: response.url().clone(),
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<HeadInfo, FetchError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| to_fetch_error(url, source, timeout))?;
        Ok(head_info_from(&response))
    }

    async fn get_text(&self, url: &Url, timeout: Duration) -> Result<FetchedBody, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| to_fetch_error(url, source, timeout))?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|source| to_fetch_error(url, source, timeout))?;
        Ok(FetchedBody {
            status,
            final_url,
            body,
        })
    }

    async fn stream_get(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<(HeadInfo, BoxStream<'static, Result<Bytes, FetchError>>), FetchError> {
        use futures::StreamExt;

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| to_fetch_error(url, source, timeout))?;

        if response.status().is_client_error() || response.status().is_server_error() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let info = head_info_from(&response);
        let url_string = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|source| FetchError::Transport {
                url: url_string.clone(),
                source,
            })
        });
        Ok((info, stream.boxed()))
    }
}

fn to_fetch_error(url: &Url, source: reqwest::Error, timeout: Duration) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source,
        }
    }
}
