use std::error::Error as _;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::{redirect, Client, Method, RequestBuilder};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::models::{ApiConfig, CredentialProfile, ManifestResponse};
use crate::domain::AppError;

/// How much of an unexpected response body is echoed back in errors.
const BODY_SNIPPET_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {}", describe(.0))]
    RequestError(#[from] reqwest::Error),

    #[error("no Location header in response (HTTP {0})")]
    MissingLocation(u16),

    #[error("no content id in redirect target {0:?}")]
    MalformedLocation(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("manifest lists {available} playback URLs, need index {index}")]
    NoDownloadUrl { available: usize, index: usize },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// reqwest's top-level message hides the interesting part (DNS, refused, timeout)
/// in its source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RequestError(e) => AppError::Network(describe(&e)),
            ApiError::MissingLocation(_) | ApiError::MalformedLocation(_) => {
                AppError::IdentifyFailed(err.to_string())
            }
            ApiError::InvalidResponse(_) | ApiError::NoDownloadUrl { .. } => {
                AppError::ManifestParseFailed(err.to_string())
            }
            ApiError::Status { status, url } => AppError::HttpStatus { status, url },
        }
    }
}

/// Pull the content id out of the share link's redirect target: the last
/// non-empty path segment, ignoring query and fragment.
pub fn content_id_from_location(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.split(['?', '#']).next()?.to_string(),
    };
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    profile: CredentialProfile,
    /// Follows redirects; used for probing, the manifest and downloads.
    http: Client,
    /// Never follows redirects; the identify hop needs to see the `Location`.
    no_redirect: Client,
}

impl ApiClient {
    /// Builds both HTTP clients up front so a broken TLS/HTTP stack fails here
    /// rather than on the first request.
    pub fn new(config: ApiConfig, profile: CredentialProfile) -> std::result::Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| AppError::ClientInit(describe(&e)))?;

        let no_redirect = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AppError::ClientInit(describe(&e)))?;

        Ok(Self {
            config,
            profile,
            http,
            no_redirect,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn with_credentials<'a>(
        &self,
        mut request: RequestBuilder,
        headers: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> RequestBuilder {
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(cookie) = self.profile.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        request
    }

    /// Metadata-only request; returns the declared `Content-Type`, if any.
    pub async fn head_content_type(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .http
            .head(url)
            .timeout(self.config.head_timeout)
            .send()
            .await?;

        Ok(response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    /// Step 1: Request the share link without following the redirect and
    /// read the content id from `Location`.
    pub async fn identify(&self, share_url: &str) -> Result<String> {
        let request = self
            .no_redirect
            .get(share_url)
            .timeout(self.config.request_timeout);
        let response = self
            .with_credentials(request, &self.profile.identify_headers)
            .send()
            .await?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::MissingLocation(status))?;

        let content_id = content_id_from_location(location)
            .ok_or_else(|| ApiError::MalformedLocation(location.to_string()))?;

        debug!(%location, %content_id, "share link redirected");
        Ok(content_id)
    }

    /// Step 2: Ask the detail endpoint for the playback URLs of `content_id`
    /// and pick the configured entry.
    pub async fn fetch_manifest(&self, content_id: &str) -> Result<String> {
        let request = self
            .http
            .request(Method::OPTIONS, &self.config.manifest_endpoint)
            .timeout(self.config.request_timeout)
            .query(&[("aweme_id", content_id)])
            .query(&self.profile.device_params);
        let response = self
            .with_credentials(request, &self.profile.manifest_headers)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let manifest: ManifestResponse = serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "{} (HTTP {}, body: {})",
                e,
                status.as_u16(),
                snippet(&body)
            ))
        })?;

        let urls = manifest.detail.video.play_addr.url_list;
        let index = self.config.play_url_index;
        let url = urls.get(index).cloned().ok_or(ApiError::NoDownloadUrl {
            available: urls.len(),
            index,
        })?;

        info!(%content_id, "manifest resolved");
        Ok(url)
    }

    /// Open a streaming GET.
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, BoxStream<'static, Result<bytes::Bytes>>)> {
        let response = self.http.get(download_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: download_url.to_string(),
            });
        }

        let total_size = response.content_length();
        let stream = response
            .bytes_stream()
            .map_err(ApiError::RequestError)
            .boxed();

        Ok((total_size, stream))
    }
}
