use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    domain::{AppError, CandidateUrl, ResolvedTarget},
    utils::{extract_url, has_video_extension, is_video_content_type},
};

/// Turns a share link into a direct media URL.
///
/// The provider contract is undocumented and changes without notice, so it
/// sits behind this trait and can be replaced or stubbed as a unit.
#[async_trait]
pub trait ShareResolver: Send + Sync {
    async fn resolve_share(&self, candidate: &CandidateUrl) -> Result<ResolvedTarget, AppError>;
}

#[async_trait]
impl ShareResolver for ApiClient {
    async fn resolve_share(&self, candidate: &CandidateUrl) -> Result<ResolvedTarget, AppError> {
        let content_id = self.identify(candidate.as_str()).await?;
        let direct_url = self.fetch_manifest(&content_id).await?;

        Ok(ResolvedTarget {
            direct_url,
            is_already_media: false,
        })
    }
}

#[derive(Clone)]
pub struct LinkResolver {
    api_client: ApiClient,
    share_resolver: Arc<dyn ShareResolver>,
    check_resolved: bool,
}

impl LinkResolver {
    pub fn new(api_client: ApiClient) -> Self {
        let share_resolver = Arc::new(api_client.clone());
        Self::with_share_resolver(api_client, share_resolver)
    }

    pub fn with_share_resolver(api_client: ApiClient, share_resolver: Arc<dyn ShareResolver>) -> Self {
        Self {
            api_client,
            share_resolver,
            check_resolved: false,
        }
    }

    /// Also run [`is_direct_media`](Self::is_direct_media) on the URL a share
    /// link resolved to, and reject it with [`AppError::NotMedia`] when it
    /// does not pass. Off by default.
    pub fn with_resolved_check(mut self, enabled: bool) -> Self {
        self.check_resolved = enabled;
        self
    }

    /// First usable link in `raw_text`. `None` is an ordinary outcome.
    pub fn extract(raw_text: &str) -> Option<CandidateUrl> {
        extract_url(raw_text)
    }

    /// Extension allow-list first, then a HEAD request. A failed request counts
    /// as "not media" so the caller falls through to resolution.
    pub async fn is_direct_media(&self, url: &CandidateUrl) -> bool {
        if has_video_extension(url.as_url()) {
            return true;
        }

        match self.api_client.head_content_type(url.as_str()).await {
            Ok(Some(content_type)) => is_video_content_type(&content_type),
            Ok(None) => false,
            Err(e) => {
                debug!(url = %url, error = %e, "media check failed, assuming not media");
                false
            }
        }
    }

    pub async fn resolve(&self, candidate: &CandidateUrl) -> Result<ResolvedTarget, AppError> {
        self.share_resolver.resolve_share(candidate).await
    }

    /// Full pipeline from pasted text to something the downloader can fetch.
    pub async fn resolve_text(&self, raw_text: &str) -> Result<ResolvedTarget, AppError> {
        let candidate = Self::extract(raw_text.trim()).ok_or(AppError::ExtractionEmpty)?;
        info!(url = %candidate, "extracted link");

        if self.is_direct_media(&candidate).await {
            return Ok(ResolvedTarget {
                direct_url: candidate.as_str().to_string(),
                is_already_media: true,
            });
        }

        let target = self.resolve(&candidate).await?;
        info!(direct_url = %target.direct_url, "resolved share link");

        if self.check_resolved {
            let looks_like_media = match CandidateUrl::parse(&target.direct_url) {
                Some(resolved) => self.is_direct_media(&resolved).await,
                None => false,
            };
            if !looks_like_media {
                warn!(direct_url = %target.direct_url, "resolved link is not a video");
                return Err(AppError::NotMedia(target.direct_url));
            }
        }
        Ok(target)
    }
}
