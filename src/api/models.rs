use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::AppError;

/// Response from the aweme detail endpoint. Only the path down to the
/// playback URL list is modelled; everything else is ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestResponse {
    #[serde(rename = "aweme_detail")]
    pub detail: ManifestDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestDetail {
    pub video: ManifestVideo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestVideo {
    #[serde(rename = "play_addr_h264")]
    pub play_addr: PlayAddress,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayAddress {
    pub url_list: Vec<String>,
}

/// Headers, cookies and device parameters the provider expects.
///
/// Supplied by the caller (usually from a JSON file). Nothing here is
/// generated or refreshed by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CredentialProfile {
    /// Browser-like headers sent when following the share link.
    #[serde(default)]
    pub identify_headers: BTreeMap<String, String>,
    /// App-client headers sent to the manifest endpoint.
    #[serde(default)]
    pub manifest_headers: BTreeMap<String, String>,
    /// Sent as a single `Cookie` header on both resolution hops.
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    /// Client-identity query parameters for the manifest endpoint.
    #[serde(default)]
    pub device_params: BTreeMap<String, String>,
}

impl CredentialProfile {
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        serde_json::from_str(json).map_err(|e| AppError::InvalidProfile(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidProfile(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// `k1=v1; k2=v2`, or `None` when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub manifest_endpoint: String,
    /// Position of the usable entry in the manifest's playback URL list.
    pub play_url_index: usize,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub head_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            manifest_endpoint: "https://api5-normal.amemv.com/aweme/v1/aweme/detail/".to_string(),
            play_url_index: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            request_timeout: Duration::from_secs(10),
            head_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_json() {
        let profile = CredentialProfile::from_json_str(
            r#"{
                "cookies": {"ttwid": "abc", "odin_tt": "xyz"},
                "device_params": {"aid": "1128"}
            }"#,
        )
        .unwrap();
        assert!(profile.identify_headers.is_empty());
        assert_eq!(profile.device_params["aid"], "1128");
        // BTreeMap keeps cookie order stable
        assert_eq!(
            profile.cookie_header().as_deref(),
            Some("odin_tt=xyz; ttwid=abc")
        );
    }

    #[test]
    fn test_profile_rejects_malformed_json() {
        let err = CredentialProfile::from_json_str("{\"cookies\": [1, 2]}").unwrap_err();
        assert!(matches!(err, AppError::InvalidProfile(_)));
    }

    #[test]
    fn test_example_profile_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/profile.example.json");
        let profile = CredentialProfile::from_json_file(path).unwrap();
        assert!(profile.identify_headers.contains_key("user-agent"));
        assert!(profile.device_params.contains_key("aid"));
    }

    #[test]
    fn test_manifest_shape() {
        let json = r#"{"aweme_detail": {"video": {"play_addr_h264": {"url_list": ["a", "b"]}}}, "status_code": 0}"#;
        let manifest: ManifestResponse = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.detail.video.play_addr.url_list, vec!["a", "b"]);
    }
}
