use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    api::ApiClient,
    domain::{AppError, DownloadEvent, DownloadPhase, DownloadSession},
    utils::{file_name_from_url, format_file_size},
};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Must already exist; the downloader never creates it.
    pub destination_dir: PathBuf,
    /// Upper bound on the bytes written (and reported) per progress step.
    pub chunk_size: usize,
    /// Events buffered for the consumer. A full buffer pauses the transfer.
    pub event_capacity: usize,
}

impl DownloaderConfig {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Holds the "download active" flag for one session and clears it on drop,
/// so a panicking worker cannot wedge the downloader.
struct ActiveGuard {
    flag: Arc<AtomicBool>,
    released: bool,
}

impl ActiveGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
                released: false,
            })
    }

    /// Idempotent; a later session may already own the flag.
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.flag.store(false, Ordering::Release);
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Single-file HTTP downloader. At most one session runs at a time; clones
/// share that restriction.
#[derive(Clone)]
pub struct StreamDownloader {
    api_client: ApiClient,
    config: DownloaderConfig,
    active: Arc<AtomicBool>,
}

impl StreamDownloader {
    pub fn new(api_client: ApiClient, config: DownloaderConfig) -> Self {
        Self {
            api_client,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Spawn a transfer of `url` into the destination directory and return
    /// immediately. Fails with [`AppError::Busy`] while another session is
    /// still running.
    pub fn start(&self, url: &str) -> Result<SessionHandle, AppError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::ClientInit(format!("no async runtime: {}", e)))?;
        let guard = ActiveGuard::acquire(&self.active).ok_or(AppError::Busy)?;

        let destination = self.config.destination_dir.join(file_name_from_url(url));
        let session = DownloadSession::new(url.to_string(), destination.clone());
        let phase = session.watch_phase();
        info!(url, destination = %destination.display(), "download session started");

        let cancel = CancellationToken::new();
        let events = transfer_events(
            TransferState::Start {
                client: self.api_client.clone(),
                session,
                chunk_size: self.config.chunk_size.max(1),
            },
            cancel.clone(),
        );

        let (tx, rx) = mpsc::channel(self.config.event_capacity.max(1));
        let task = runtime.spawn(forward_events(events, tx, guard));

        Ok(SessionHandle {
            destination,
            events: rx,
            phase,
            cancel,
            task,
        })
    }
}

/// Drives the transfer and hands every event to the session's receiver.
/// The transfer only advances once the previous event found room in the
/// channel. The active flag is cleared before the terminal event goes out,
/// so an observer reacting to it can start the next download straight away.
async fn forward_events(
    mut events: BoxStream<'static, DownloadEvent>,
    tx: mpsc::Sender<DownloadEvent>,
    mut guard: ActiveGuard,
) {
    while let Some(event) = events.next().await {
        if event.is_terminal() {
            guard.release();
        }
        // A dropped receiver does not stop the transfer.
        let _ = tx.send(event).await;
    }
}

/// Caller's side of a running download.
pub struct SessionHandle {
    destination: PathBuf,
    events: mpsc::Receiver<DownloadEvent>,
    phase: watch::Receiver<DownloadPhase>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where the transfer is right now. Runs ahead of the events still
    /// queued for the consumer.
    pub fn phase(&self) -> DownloadPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<DownloadPhase> {
        self.phase.clone()
    }

    /// Ask the transfer to stop, whether it is still connecting or already
    /// streaming. The session then ends with [`DownloadEvent::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token for cancelling after the handle has been given to [`subscribe`](Self::subscribe).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the terminal event has been consumed.
    pub async fn recv(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Drain events until the session ends and return the terminal one.
    pub async fn wait(mut self) -> Option<DownloadEvent> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Deliver every event to `observer`, one at a time and in order, from a
    /// separate task. The returned handle resolves after the terminal event.
    pub fn subscribe<F>(self, mut observer: F) -> JoinHandle<()>
    where
        F: FnMut(DownloadEvent) + Send + 'static,
    {
        let SessionHandle {
            mut events, task, ..
        } = self;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                observer(event);
            }
            let _ = task.await;
        })
    }
}

enum TransferState {
    Start {
        client: ApiClient,
        session: DownloadSession,
        chunk_size: usize,
    },
    Connect {
        client: ApiClient,
        session: DownloadSession,
        chunk_size: usize,
    },
    Ready {
        file: File,
        stream: BoxStream<'static, crate::api::Result<Bytes>>,
        session: DownloadSession,
        chunk_size: usize,
    },
    Downloading {
        file: File,
        stream: BoxStream<'static, crate::api::Result<Bytes>>,
        pending: Bytes,
        session: DownloadSession,
        chunk_size: usize,
    },
    Finishing {
        file: File,
        session: DownloadSession,
    },
    Completed(PathBuf),
    Finished,
}

fn fail(session: &mut DownloadSession, err: AppError) -> Option<(DownloadEvent, TransferState)> {
    session.set_phase(DownloadPhase::Failed);
    warn!(
        url = %session.url,
        bytes_written = session.bytes_written,
        error = %err,
        "download failed"
    );
    Some((DownloadEvent::Failed(err), TransferState::Finished))
}

fn cancelled(session: &mut DownloadSession) -> Option<(DownloadEvent, TransferState)> {
    session.set_phase(DownloadPhase::Cancelled);
    info!(url = %session.url, bytes_written = session.bytes_written, "download cancelled");
    Some((DownloadEvent::Cancelled, TransferState::Finished))
}

/// One event per step; the stream ends right after the terminal event.
fn transfer_events(
    initial: TransferState,
    cancel: CancellationToken,
) -> BoxStream<'static, DownloadEvent> {
    futures::stream::unfold(initial, move |state| {
        let cancel = cancel.clone();
        async move {
            match state {
                TransferState::Start {
                    client,
                    mut session,
                    chunk_size,
                } => {
                    if cancel.is_cancelled() {
                        return cancelled(&mut session);
                    }
                    session.set_phase(DownloadPhase::Connecting);
                    Some((
                        DownloadEvent::Status("Connecting to server...".to_string()),
                        TransferState::Connect {
                            client,
                            session,
                            chunk_size,
                        },
                    ))
                }
                TransferState::Connect {
                    client,
                    mut session,
                    chunk_size,
                } => {
                    let opened = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        opened = client.download_file_stream(&session.url) => Some(opened),
                    };
                    let (total_size, stream) = match opened {
                        None => return cancelled(&mut session),
                        Some(Ok(opened)) => opened,
                        Some(Err(e)) => return fail(&mut session, e.into()),
                    };

                    let file = match File::create(&session.destination_path).await {
                        Ok(file) => file,
                        Err(e) => {
                            return fail(
                                &mut session,
                                AppError::StreamIo(format!("Failed to create file: {}", e)),
                            )
                        }
                    };

                    session.total_bytes = total_size.unwrap_or(0);
                    let status = if session.total_bytes > 0 {
                        format!("File size: {}", format_file_size(session.total_bytes))
                    } else {
                        "File size: unknown".to_string()
                    };

                    Some((
                        DownloadEvent::Status(status),
                        TransferState::Ready {
                            file,
                            stream,
                            session,
                            chunk_size,
                        },
                    ))
                }
                TransferState::Ready {
                    mut file,
                    stream,
                    mut session,
                    chunk_size,
                } => {
                    if cancel.is_cancelled() {
                        let _ = file.flush().await;
                        return cancelled(&mut session);
                    }
                    session.set_phase(DownloadPhase::Streaming);
                    Some((
                        DownloadEvent::Status("Starting download...".to_string()),
                        TransferState::Downloading {
                            file,
                            stream,
                            pending: Bytes::new(),
                            session,
                            chunk_size,
                        },
                    ))
                }
                TransferState::Downloading {
                    mut file,
                    mut stream,
                    mut pending,
                    mut session,
                    chunk_size,
                } => {
                    while pending.is_empty() && !cancel.is_cancelled() {
                        let next = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            next = stream.next() => next,
                        };

                        match next {
                            Some(Ok(bytes)) => pending = bytes,
                            Some(Err(e)) => {
                                // The partial file stays; make sure it holds what was reported.
                                let _ = file.flush().await;
                                return fail(&mut session, e.into());
                            }
                            None => {
                                return Some((
                                    DownloadEvent::Progress(session.final_progress()),
                                    TransferState::Finishing { file, session },
                                ))
                            }
                        }
                    }

                    if cancel.is_cancelled() {
                        let _ = file.flush().await;
                        return cancelled(&mut session);
                    }

                    let piece = pending.split_to(chunk_size.min(pending.len()));
                    if let Err(e) = file.write_all(&piece).await {
                        return fail(
                            &mut session,
                            AppError::StreamIo(format!("Write error: {}", e)),
                        );
                    }

                    let progress = session.record_chunk(piece.len());
                    Some((
                        DownloadEvent::Progress(progress),
                        TransferState::Downloading {
                            file,
                            stream,
                            pending,
                            session,
                            chunk_size,
                        },
                    ))
                }
                TransferState::Finishing {
                    mut file,
                    mut session,
                } => {
                    if let Err(e) = file.flush().await {
                        return fail(
                            &mut session,
                            AppError::StreamIo(format!("Failed to flush file: {}", e)),
                        );
                    }
                    if let Err(e) = file.sync_all().await {
                        return fail(
                            &mut session,
                            AppError::StreamIo(format!("Failed to sync file: {}", e)),
                        );
                    }

                    session.set_phase(DownloadPhase::Completed);
                    info!(
                        url = %session.url,
                        bytes = session.bytes_written,
                        path = %session.destination_path.display(),
                        "download completed"
                    );
                    Some((
                        DownloadEvent::Status(format!(
                            "Download complete: {}",
                            session.destination_path.display()
                        )),
                        TransferState::Completed(session.destination_path),
                    ))
                }
                TransferState::Completed(path) => {
                    Some((DownloadEvent::Completed(path), TransferState::Finished))
                }
                TransferState::Finished => None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiConfig, ApiError, CredentialProfile};
    use std::sync::Mutex;
    use std::time::Duration;

    const MIB: usize = 1024 * 1024;

    fn downloader(dir: &Path) -> StreamDownloader {
        let api = ApiClient::new(ApiConfig::default(), CredentialProfile::default()).unwrap();
        StreamDownloader::new(api, DownloaderConfig::new(dir))
    }

    async fn collect(mut handle: SessionHandle) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.recv().await {
            events.push(event);
        }
        events
    }

    fn progress_bytes(events: &[DownloadEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) => Some(p.bytes_done),
                _ => None,
            })
            .collect()
    }

    fn injected(
        file: File,
        path: &Path,
        chunks: BoxStream<'static, crate::api::Result<Bytes>>,
    ) -> TransferState {
        let mut session = DownloadSession::new("https://cdn.example.com/v.mp4".into(), path.into());
        session.set_phase(DownloadPhase::Streaming);
        TransferState::Downloading {
            file,
            stream: chunks,
            pending: Bytes::new(),
            session,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[tokio::test]
    async fn test_ten_mib_download_reports_monotonic_progress() {
        let payload = vec![0x5au8; 10 * MIB];
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/media/big.mp4")
            .with_status(200)
            .with_body(payload.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let handle = downloader
            .start(&format!("{}/media/big.mp4", server.url()))
            .unwrap();
        assert_eq!(handle.destination(), dir.path().join("big.mp4"));
        let phases = handle.watch_phase();

        let events = collect(handle).await;

        let bytes = progress_bytes(&events);
        assert!(bytes.len() >= 10 * MIB / DEFAULT_CHUNK_SIZE);
        assert!(bytes.windows(2).all(|w| w[0] <= w[1]));
        assert!(bytes
            .windows(2)
            .all(|w| w[1] - w[0] <= DEFAULT_CHUNK_SIZE as u64));
        assert_eq!(*bytes.last().unwrap(), (10 * MIB) as u64);

        match events.last() {
            Some(DownloadEvent::Completed(path)) => assert_eq!(path, &dir.path().join("big.mp4")),
            other => panic!("expected completion last, got {other:?}"),
        }
        assert!(matches!(
            &events[events.len() - 3],
            DownloadEvent::Progress(p) if p.percent == Some(100)
        ));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(std::fs::read(dir.path().join("big.mp4")).unwrap(), payload);
        assert!(!downloader.is_active());
        assert_eq!(*phases.borrow(), DownloadPhase::Completed);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_busy() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a.mp4")
            .with_status(200)
            .with_body(vec![1u8; 64 * 1024])
            .create_async()
            .await;
        let never = server
            .mock("GET", "/b.mp4")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());

        let first = downloader.start(&format!("{}/a.mp4", server.url())).unwrap();
        assert!(downloader.is_active());
        let second = downloader.start(&format!("{}/b.mp4", server.url()));
        assert!(matches!(second, Err(AppError::Busy)));

        assert!(matches!(first.wait().await, Some(DownloadEvent::Completed(_))));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);

        // A terminal state frees the slot for a fresh session.
        let again = downloader.start(&format!("{}/a.mp4", server.url())).unwrap();
        assert!(matches!(again.wait().await, Some(DownloadEvent::Completed(_))));
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_fails_without_creating_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.mp4")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let events = collect(
            downloader
                .start(&format!("{}/gone.mp4", server.url()))
                .unwrap(),
        )
        .await;

        assert!(matches!(events.first(), Some(DownloadEvent::Status(_))));
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed(AppError::HttpStatus { status: 404, .. }))
        ));
        assert!(!dir.path().join("gone.mp4").exists());
        assert!(!downloader.is_active());
    }

    #[tokio::test]
    async fn test_unknown_length_reports_bytes_only() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/live/stream")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(&[3u8; 20_000]))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let handle = downloader
            .start(&format!("{}/live/stream", server.url()))
            .unwrap();
        let name = handle.destination().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("video_") && name.ends_with(".mp4"));

        let events = collect(handle).await;
        let during: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) if p.bytes_done < 20_000 => Some(p),
                _ => None,
            })
            .collect();
        assert!(!during.is_empty());
        assert!(during.iter().all(|p| p.percent.is_none()));
        assert!(during[0].human_message.starts_with("Downloaded: "));
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
        assert_eq!(std::fs::metadata(dir.path().join(&name)).unwrap().len(), 20_000);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mp4");
        let file = File::create(&path).await.unwrap();

        let chunks: Vec<crate::api::Result<Bytes>> = vec![
            Ok(Bytes::from(vec![9u8; 10_000])),
            Ok(Bytes::from(vec![9u8; 5_000])),
            Err(ApiError::InvalidResponse("connection reset".into())),
        ];
        let events: Vec<_> = transfer_events(
            injected(file, &path, futures::stream::iter(chunks).boxed()),
            CancellationToken::new(),
        )
        .collect()
        .await;

        let failures: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Failed(err) => Some(err),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(!failures[0].to_string().is_empty());
        assert!(matches!(events.last(), Some(DownloadEvent::Failed(_))));
        assert_eq!(progress_bytes(&events), vec![8192, 10_000, 15_000]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 15_000);
    }

    #[tokio::test]
    async fn test_cancel_stops_stalled_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stalled.mp4");
        let file = File::create(&path).await.unwrap();

        let chunks = futures::stream::iter(vec![Ok(Bytes::from(vec![1u8; 4096]))])
            .chain(futures::stream::pending())
            .boxed();
        let cancel = CancellationToken::new();
        let mut events = transfer_events(injected(file, &path, chunks), cancel.clone());

        assert!(matches!(events.next().await, Some(DownloadEvent::Progress(_))));
        cancel.cancel();
        assert!(matches!(events.next().await, Some(DownloadEvent::Cancelled)));
        assert!(events.next().await.is_none());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_in_order_with_terminal_last() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/clip.webm")
            .with_status(200)
            .with_body(vec![7u8; 40_000])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        downloader
            .start(&format!("{}/clip.webm", server.url()))
            .unwrap()
            .subscribe(move |event| sink.lock().unwrap().push(event))
            .await
            .unwrap();

        let events = seen.lock().unwrap();
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
        assert!(progress_bytes(&events).windows(2).all(|w| w[0] <= w[1]));
        assert!(!downloader.is_active());
    }

    #[tokio::test]
    async fn test_cancel_right_after_start_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let never = server
            .mock("GET", "/early.mp4")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let handle = downloader
            .start(&format!("{}/early.mp4", server.url()))
            .unwrap();
        handle.cancel();
        let phases = handle.watch_phase();

        let events = collect(handle).await;
        assert!(matches!(events.as_slice(), [DownloadEvent::Cancelled]));
        assert_eq!(*phases.borrow(), DownloadPhase::Cancelled);
        assert!(!dir.path().join("early.mp4").exists());
        assert!(!downloader.is_active());
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_while_connecting_does_not_wait_for_server() {
        // Accepts connections into the backlog but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/silent.mp4", listener.local_addr().unwrap());

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        let mut handle = downloader.start(&url).unwrap();
        assert!(matches!(handle.recv().await, Some(DownloadEvent::Status(_))));
        assert_eq!(handle.phase(), DownloadPhase::Connecting);

        handle.cancel();
        let rest = tokio::time::timeout(Duration::from_secs(5), collect(handle))
            .await
            .expect("cancel must not wait for the server");
        assert!(matches!(rest.as_slice(), [DownloadEvent::Cancelled]));
        assert!(!dir.path().join("silent.mp4").exists());
        assert!(!downloader.is_active());
        drop(listener);
    }

    #[tokio::test]
    async fn test_missing_destination_dir_fails_with_stream_io() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v.mp4")
            .with_status(200)
            .with_body(vec![1u8; 1024])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&dir.path().join("missing"));
        let handle = downloader.start(&format!("{}/v.mp4", server.url())).unwrap();
        let phases = handle.watch_phase();

        match handle.wait().await {
            Some(DownloadEvent::Failed(AppError::StreamIo(message))) => {
                assert!(message.starts_with("Failed to create file"))
            }
            other => panic!("expected an I/O failure, got {other:?}"),
        }
        assert_eq!(*phases.borrow(), DownloadPhase::Failed);
        assert!(!downloader.is_active());
    }

    #[tokio::test]
    async fn test_slow_consumer_pauses_transfer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/paced.mp4")
            .with_status(200)
            .with_body(vec![4u8; MIB])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = ApiClient::new(ApiConfig::default(), CredentialProfile::default()).unwrap();
        let config = DownloaderConfig {
            event_capacity: 4,
            ..DownloaderConfig::new(dir.path())
        };
        let downloader = StreamDownloader::new(api, config);
        let handle = downloader
            .start(&format!("{}/paced.mp4", server.url()))
            .unwrap();

        let mut phases = handle.watch_phase();
        phases
            .wait_for(|phase| *phase == DownloadPhase::Streaming)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Nobody is reading, so the transfer sits on a full channel.
        assert_eq!(handle.phase(), DownloadPhase::Streaming);
        assert!(downloader.is_active());
        let written = std::fs::metadata(dir.path().join("paced.mp4")).unwrap().len();
        assert!(written < MIB as u64);

        let events = collect(handle).await;
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
        assert_eq!(
            std::fs::metadata(dir.path().join("paced.mp4")).unwrap().len(),
            MIB as u64
        );
    }

    #[test]
    fn test_start_outside_runtime_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(dir.path());
        assert!(matches!(
            downloader.start("https://cdn.example.com/v.mp4"),
            Err(AppError::ClientInit(_))
        ));
        assert!(!downloader.is_active());
    }
}
