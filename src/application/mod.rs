pub mod link_resolver;
pub mod stream_downloader;

pub use link_resolver::{LinkResolver, ShareResolver};
pub use stream_downloader::{DownloaderConfig, SessionHandle, StreamDownloader};
