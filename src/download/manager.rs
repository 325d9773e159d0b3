//! In-flight download registry and the per-download pipeline.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use futures::future::{self, AbortHandle, AbortRegistration, Abortable};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::convert::{Encoder, transcode_and_remove};
use super::fetch::Fetcher;
use super::filename::uniquify_with_sibling;
use super::{
    AudioFormat, DownloadError, DownloadOutcome, DownloadRequest, Phase, ProgressEvent,
    SourceFormat, classify_source,
};

/// Extension of the temp file every transfer writes into.
const TEMP_EXTENSION: &str = "flac";

type Registry = Arc<Mutex<HashMap<String, InFlight>>>;

struct InFlight {
    /// Distinguishes a restarted key from the entry it replaced
    token: u64,
    abort: AbortHandle,
}

/// A key claimed in the registry before its download runs.
///
/// [`DownloadManager::cancel`] works from the moment the reservation
/// exists, so a job can be aborted while its source is still resolving.
/// Dropping the reservation releases the key.
pub struct Reservation {
    key: String,
    token: u64,
    registration: Option<AbortRegistration>,
    registry: Registry,
}

impl Reservation {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if registry.get(&self.key).is_some_and(|e| e.token == self.token) {
            registry.remove(&self.key);
        }
    }
}

/// Paths one download writes to.
#[derive(Debug, Clone)]
struct Destination {
    temp: PathBuf,
    final_path: PathBuf,
}

/// Runs downloads and tracks the ones in flight.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct DownloadManager {
    fetcher: Arc<dyn Fetcher>,
    encoder: Arc<dyn Encoder>,
    registry: Registry,
    next_token: Arc<AtomicU64>,
    progress_tx: UnboundedSender<ProgressEvent>,
}

impl DownloadManager {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        encoder: Arc<dyn Encoder>,
        progress_tx: UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            fetcher,
            encoder,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            progress_tx,
        }
    }

    /// Create `path` and its parents.
    pub async fn ensure_directory(&self, path: &Path) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| DownloadError::filesystem(path, e))
    }

    /// Whether a transfer for `key` is in flight.
    pub fn is_active(&self, key: &str) -> bool {
        self.registry.lock().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Claim `key` for a download that will start shortly.
    ///
    /// Fails with [`DownloadError::AlreadyInFlight`] while another transfer
    /// holds the key.
    pub fn reserve(&self, key: &str) -> Result<Reservation, DownloadError> {
        let (abort, registration) = AbortHandle::new_pair();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut registry = self.registry.lock();
        if registry.contains_key(key) {
            return Err(DownloadError::AlreadyInFlight(key.to_string()));
        }
        registry.insert(key.to_string(), InFlight { token, abort });
        Ok(Reservation {
            key: key.to_string(),
            token,
            registration: Some(registration),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Download, optionally convert, and place one file.
    ///
    /// Progress events are keyed by `request.requested_filename`. Only one
    /// download per key may run at a time.
    pub async fn start_download(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadOutcome, DownloadError> {
        let reservation = self.reserve(&request.requested_filename)?;
        let DownloadRequest {
            source_url,
            dest_dir,
            preferred_format,
            ..
        } = request;
        self.download_resolving(
            reservation,
            dest_dir,
            preferred_format,
            future::ready(Ok(source_url)),
        )
        .await
    }

    /// Run a reserved download whose source URL comes from `resolve`.
    ///
    /// Resolution and transfer share the reservation's abort handle.
    /// Nothing touches the disk before `resolve` has produced a URL.
    pub async fn download_resolving<S>(
        &self,
        mut reservation: Reservation,
        dest_dir: PathBuf,
        preferred_format: AudioFormat,
        resolve: S,
    ) -> Result<DownloadOutcome, DownloadError>
    where
        S: Future<Output = Result<String, DownloadError>>,
    {
        let key = reservation.key.clone();
        let Some(registration) = reservation.registration.take() else {
            return Err(DownloadError::Cancelled);
        };
        let written: Mutex<Option<Destination>> = Mutex::new(None);

        let job = async {
            let request = DownloadRequest {
                source_url: resolve.await?,
                dest_dir,
                requested_filename: key.clone(),
                preferred_format,
            };

            // A failure here resurfaces when the temp file is created.
            if let Err(e) = self.ensure_directory(&request.dest_dir).await {
                warn!(target: "download", dir = %request.dest_dir.display(), error = %e, "Could not create destination directory");
            }

            let destination = resolve_destination(&request);
            info!(
                target: "download",
                key = %key,
                temp = %destination.temp.display(),
                target_path = %destination.final_path.display(),
                "Starting download"
            );
            *written.lock() = Some(destination.clone());
            self.run_pipeline(&request, &destination).await
        };

        let result = match Abortable::new(job, registration).await {
            Ok(result) => result,
            Err(_aborted) => {
                // The pipeline future (and its file handle) is dropped by now.
                let destination = written.lock().take();
                if let Some(destination) = destination {
                    remove_quietly(&destination.temp).await;
                    if destination.final_path != destination.temp {
                        remove_quietly(&destination.final_path).await;
                    }
                }
                info!(target: "download", key = %key, "Download cancelled");
                Err(DownloadError::Cancelled)
            }
        };

        drop(reservation);

        match &result {
            Ok(outcome) => {
                info!(target: "download", key = %key, path = %outcome.path.display(), "Download complete")
            }
            Err(DownloadError::Cancelled) => {}
            Err(e) => warn!(target: "download", key = %key, error = %e, "Download failed"),
        }
        result
    }

    /// Abort the transfer for `key`. Returns whether one was running.
    ///
    /// The partial file tracked for the transfer is removed once the
    /// pipeline has released it. Unknown keys are a no-op.
    pub fn cancel(&self, key: &str) -> bool {
        let Some(entry) = self.registry.lock().remove(key) else {
            debug!(target: "download", key, "Cancel for unknown key ignored");
            return false;
        };
        debug!(target: "download", key, token = entry.token, "Aborting transfer");
        entry.abort.abort();
        true
    }

    async fn run_pipeline(
        &self,
        request: &DownloadRequest,
        destination: &Destination,
    ) -> Result<DownloadOutcome, DownloadError> {
        let key = &request.requested_filename;
        self.transfer(&request.source_url, &destination.temp, key)
            .await?;

        let source = classify_source(&request.source_url);
        match (request.preferred_format, source) {
            (AudioFormat::Mp3, SourceFormat::Lossless) => {
                self.emit(key, 0, Phase::Converting);
                transcode_and_remove(
                    self.encoder.as_ref(),
                    &destination.temp,
                    &destination.final_path,
                )
                .await?;
                Ok(outcome(destination.final_path.clone()))
            }
            _ => place(&destination.temp, &destination.final_path).await,
        }
    }

    async fn transfer(&self, url: &str, temp: &Path, key: &str) -> Result<(), DownloadError> {
        let response = self.fetcher.fetch(url).await?;
        let total = response.content_length.unwrap_or(0);

        let mut file = tokio::fs::File::create(temp)
            .await
            .map_err(|e| DownloadError::filesystem(temp, e))?;

        let mut body = response.body;
        let mut received: u64 = 0;
        let mut last_percentage: u8 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::filesystem(temp, e))?;
            received += chunk.len() as u64;

            let percentage = percentage_of(received, total);
            if percentage != last_percentage {
                last_percentage = percentage;
                self.emit(key, percentage, Phase::Transferring);
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::filesystem(temp, e))?;
        debug!(target: "download", key, bytes = received, "Transfer finished");
        Ok(())
    }

    fn emit(&self, key: &str, percentage: u8, phase: Phase) {
        // The receiver only disappears during shutdown.
        let _ = self.progress_tx.send(ProgressEvent {
            key: key.to_string(),
            percentage,
            phase,
        });
    }
}

/// Compute the unique final name and its lossless temp sibling.
fn resolve_destination(request: &DownloadRequest) -> Destination {
    let stem = strip_audio_extension(&request.requested_filename);
    let wanted = request
        .dest_dir
        .join(format!("{}.{}", stem, request.preferred_format.extension()));
    let final_path = uniquify_with_sibling(&wanted, TEMP_EXTENSION);
    let temp = final_path.with_extension(TEMP_EXTENSION);
    Destination { temp, final_path }
}

fn strip_audio_extension(filename: &str) -> &str {
    let lower = filename.to_ascii_lowercase();
    for ext in [".flac", ".mp3"] {
        if lower.ends_with(ext) {
            return &filename[..filename.len() - ext.len()];
        }
    }
    filename
}

/// Rounded percentage; 0 when the total is unknown.
fn percentage_of(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((received as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Move the temp file to its final name, falling back to the temp file.
async fn place(temp: &Path, final_path: &Path) -> Result<DownloadOutcome, DownloadError> {
    if temp == final_path {
        return Ok(outcome(final_path.to_path_buf()));
    }
    match tokio::fs::rename(temp, final_path).await {
        Ok(()) => Ok(outcome(final_path.to_path_buf())),
        Err(e) if tokio::fs::try_exists(temp).await.unwrap_or(false) => {
            warn!(target: "download", temp = %temp.display(), error = %e, "Rename failed, keeping temp name");
            Ok(outcome(temp.to_path_buf()))
        }
        Err(e) => Err(DownloadError::filesystem(temp, e)),
    }
}

fn outcome(path: PathBuf) -> DownloadOutcome {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    DownloadOutcome { path, filename }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(target: "download", path = %path.display(), error = %e, "Could not remove partial file");
    }
}
