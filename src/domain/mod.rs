pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    CandidateUrl, DownloadEvent, DownloadPhase, DownloadSession, ProgressEvent, ResolvedTarget,
};
