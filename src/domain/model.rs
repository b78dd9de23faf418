use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use url::Url;

use super::AppError;
use crate::utils::{format_eta, format_file_size, format_speed};

/// An `http`/`https` URL with a non-empty host, as found in user text.
///
/// Keeps the token exactly as it appeared; `as_url` exposes the parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    raw: String,
    url: Url,
}

impl CandidateUrl {
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => Some(Self {
                raw: raw.to_string(),
                url,
            }),
            _ => None,
        }
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub direct_url: String,
    pub is_already_media: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress snapshot pushed to the observer after every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Only present when the server declared a content length.
    pub percent: Option<u8>,
    pub bytes_done: u64,
    pub throughput_bytes_per_sec: f64,
    /// Estimated time left; needs a declared length and a measured rate.
    pub eta: Option<Duration>,
    pub human_message: String,
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Status(String),
    Progress(ProgressEvent),
    Completed(PathBuf),
    Failed(AppError),
    Cancelled,
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed(_) | DownloadEvent::Failed(_) | DownloadEvent::Cancelled
        )
    }
}

/// Book-keeping for a single transfer. Owned exclusively by the worker task.
#[derive(Debug)]
pub struct DownloadSession {
    pub url: String,
    pub destination_path: PathBuf,
    /// Zero when the server did not declare a length.
    pub total_bytes: u64,
    pub bytes_written: u64,
    pub started_at: Instant,
    phase: watch::Sender<DownloadPhase>,
}

impl DownloadSession {
    pub fn new(url: String, destination_path: PathBuf) -> Self {
        Self {
            url,
            destination_path,
            total_bytes: 0,
            bytes_written: 0,
            started_at: Instant::now(),
            phase: watch::Sender::new(DownloadPhase::Idle),
        }
    }

    pub fn phase(&self) -> DownloadPhase {
        *self.phase.borrow()
    }

    /// Observers see the change even after the receiving side went away.
    pub fn set_phase(&mut self, phase: DownloadPhase) {
        self.phase.send_replace(phase);
    }

    pub fn watch_phase(&self) -> watch::Receiver<DownloadPhase> {
        self.phase.subscribe()
    }

    pub fn record_chunk(&mut self, len: usize) -> ProgressEvent {
        self.bytes_written += len as u64;
        self.progress(self.started_at.elapsed())
    }

    /// Progress as of `elapsed` since the session started.
    pub fn progress(&self, elapsed: Duration) -> ProgressEvent {
        let percent = (self.total_bytes > 0).then(|| {
            let pct = (self.bytes_written as u128 * 100) / self.total_bytes as u128;
            pct.min(100) as u8
        });

        let secs = elapsed.as_secs_f64();
        let (throughput, speed_str) = if secs > 0.0 {
            let speed = self.bytes_written as f64 / secs;
            (speed, format_speed(speed))
        } else {
            (0.0, "measuring...".to_string())
        };

        let eta = (self.total_bytes > self.bytes_written && throughput > 0.0)
            .then(|| (self.total_bytes - self.bytes_written) as f64 / throughput)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        let human_message = match (percent, eta) {
            (Some(pct), Some(eta)) => {
                format!("{}% - {} - {} left", pct, speed_str, format_eta(eta))
            }
            (Some(pct), None) => format!("{}% - {}", pct, speed_str),
            (None, _) => format!(
                "Downloaded: {} - {}",
                format_file_size(self.bytes_written),
                speed_str
            ),
        };

        ProgressEvent {
            percent,
            bytes_done: self.bytes_written,
            throughput_bytes_per_sec: throughput,
            eta,
            human_message,
        }
    }

    /// The 100%-equivalent event emitted once the stream is exhausted.
    pub fn final_progress(&self) -> ProgressEvent {
        let elapsed = self.started_at.elapsed();
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            self.bytes_written as f64 / secs
        } else {
            0.0
        };
        ProgressEvent {
            percent: Some(100),
            bytes_done: self.bytes_written,
            throughput_bytes_per_sec: throughput,
            eta: Some(Duration::ZERO),
            human_message: "100% - Download complete".to_string(),
        }
    }
}
