//! Resolve pasted share text to a direct video URL and stream it to disk.
//!
//! [`LinkResolver`] finds a link in free text and, unless it already points at
//! video bytes, walks the provider's share-link → content id → manifest chain.
//! [`StreamDownloader`] fetches the result in the background and reports
//! progress through a [`SessionHandle`].

pub mod api;
pub mod application;
pub mod domain;
pub mod logging;
pub mod utils;

pub use api::{ApiClient, ApiConfig, CredentialProfile};
pub use application::{
    DownloaderConfig, LinkResolver, SessionHandle, ShareResolver, StreamDownloader,
};
pub use domain::{
    AppError, CandidateUrl, DownloadEvent, DownloadPhase, ProgressEvent, ResolvedTarget,
};
