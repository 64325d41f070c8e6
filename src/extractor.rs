//! Media extraction via yt-dlp
//!
//! The bot never parses sites or transcodes itself: every download goes
//! through the [`MediaExtractor`] seam, implemented here by running the
//! yt-dlp executable into the scratch directory.

use crate::config::{Settings, MAX_ERROR_DESCRIPTION_CHARS};
use crate::utils::error_description;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Title used when the site does not report one
pub const UNTITLED: &str = "Untitled";

/// Errors that can occur while fetching media
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The downloader process could not be started
    #[error("failed to start {binary}: {source}")]
    Spawn {
        /// Executable that failed to start
        binary: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The downloader reported an error (unsupported site, network, transcoding)
    #[error("{0}")]
    Failed(String),
    /// The download did not finish in time
    #[error("download timed out after {0}s")]
    Timeout(u64),
    /// The downloader exited successfully without producing a file
    #[error("downloader finished without producing a file")]
    MissingOutput,
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output format offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Audio only, transcoded to MP3
    Mp3,
    /// Muxed audio and video
    Mp4,
}

impl MediaFormat {
    /// Label shown in progress messages and captions
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Mp4 => "MP4",
        }
    }

    /// Whether the result is sent as audio
    #[must_use]
    pub const fn is_audio(self) -> bool {
        matches!(self, Self::Mp3)
    }
}

/// A single download job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// Link supplied by the user
    pub url: String,
    /// Requested output format
    pub format: MediaFormat,
}

/// A downloaded file in the scratch directory.
///
/// The value owns the file: [`DownloadedMedia::discard`] deletes it, and if
/// that never happens the file is deleted when the value is dropped.
#[derive(Debug)]
pub struct DownloadedMedia {
    path: PathBuf,
    title: String,
    removed: bool,
}

impl DownloadedMedia {
    /// Take ownership of a file produced by an extractor
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            removed: false,
        }
    }

    /// Location of the file on disk
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Title reported by the site
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// File name without directories, used for uploads
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| "media".to_string(), |n| n.to_string_lossy().to_string())
    }

    /// Size of the file in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Delete the file. A file that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn discard(mut self) -> std::io::Result<()> {
        let result = match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
        self.removed = result.is_ok();
        result
    }
}

impl Drop for DownloadedMedia {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to remove downloaded file"
                    );
                }
            }
        }
    }
}

/// Interface for media extraction backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Download `request.url` in the requested format into the scratch directory
    async fn fetch(&self, request: MediaRequest) -> Result<DownloadedMedia, ExtractionError>;
}

/// Fields printed by yt-dlp once the final file is in place
#[derive(Debug, Deserialize)]
struct PrintedInfo {
    title: Option<String>,
    filepath: Option<String>,
}

/// Extractor backed by the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
    downloads_dir: PathBuf,
    cookies_file: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpExtractor {
    /// Create an extractor writing into `downloads_dir`
    #[must_use]
    pub fn new(
        binary: impl Into<String>,
        downloads_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            downloads_dir: downloads_dir.into(),
            cookies_file: None,
            timeout,
        }
    }

    /// Build an extractor from application settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut extractor = Self::new(
            settings.ytdlp_binary.clone(),
            settings.downloads_dir.clone(),
            settings.download_timeout(),
        );
        extractor.cookies_file.clone_from(&settings.cookies_file);
        extractor
    }

    /// Use a Netscape cookies file for sites that need a session
    #[must_use]
    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    /// Scratch directory the extractor writes into
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Report the yt-dlp version, or `None` if the executable is unusable
    pub async fn probe(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Command line for one download. `token` makes the output name unique.
    fn build_args(&self, request: &MediaRequest, token: &str) -> Vec<OsString> {
        let template = self.downloads_dir.join(format!("{token}.%(ext)s"));

        let mut args: Vec<OsString> = [
            "--no-playlist",
            "--no-warnings",
            "--no-progress",
            "--no-simulate",
            "--print",
            "after_move:%(.{title,filepath})j",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        match request.format {
            MediaFormat::Mp3 => args.extend(
                [
                    "-f",
                    "bestaudio/best",
                    "-x",
                    "--audio-format",
                    "mp3",
                    "--audio-quality",
                    "0",
                ]
                .iter()
                .map(OsString::from),
            ),
            MediaFormat::Mp4 => args.extend(
                [
                    "-f",
                    "bestvideo[height<=720]+bestaudio/best[height<=720]/best",
                    "--merge-output-format",
                    "mp4",
                ]
                .iter()
                .map(OsString::from),
            ),
        }

        if let Some(cookies) = self.cookies_file.as_ref().filter(|p| p.exists()) {
            args.push("--cookies".into());
            args.push(cookies.clone().into_os_string());
        }

        args.push("-o".into());
        args.push(template.into_os_string());
        // End of options: a link starting with '-' must not be read as a flag
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }

    /// Delete whatever a failed run left behind for `token`
    async fn remove_partials(&self, token: &str) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.downloads_dir).await else {
            return 0;
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_name().to_string_lossy().starts_with(token) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to remove partial download"
                ),
            }
        }
        if removed > 0 {
            debug!(files_deleted = removed, "Cleaned up partial download files");
        }
        removed
    }

    fn parse_output(stdout: &str) -> Option<PrintedInfo> {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(|line| serde_json::from_str::<PrintedInfo>(line).ok())
    }
}

/// Grace period for a killed downloader to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Wait for the child while draining both pipes, leaving the handle usable
/// if the wait is abandoned.
async fn collect_output(child: &mut Child) -> std::io::Result<Output> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) =
        tokio::try_join!(child.wait(), read_pipe(stdout), read_pipe(stderr))?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Kill the downloader's whole process group and reap the downloader.
///
/// Helpers such as ffmpeg keep writing into the scratch directory unless
/// they are killed too, so this must finish before partial files are removed.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            debug!(pgid, error = %e, "Failed to kill yt-dlp process group");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "yt-dlp already exited");
    }
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "Error waiting for killed yt-dlp"),
        Err(_) => warn!("yt-dlp still alive after SIGKILL"),
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn fetch(&self, request: MediaRequest) -> Result<DownloadedMedia, ExtractionError> {
        let token = Uuid::new_v4().simple().to_string();
        let args = self.build_args(&request, &token);

        info!(
            url = %request.url,
            format = request.format.label(),
            token = %token,
            "Starting yt-dlp download"
        );

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // ffmpeg and other helpers join the group and die with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ExtractionError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let waited = tokio::time::timeout(self.timeout, collect_output(&mut child)).await;
        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(url = %request.url, error = %e, "Failed to wait for yt-dlp");
                terminate(&mut child).await;
                self.remove_partials(&token).await;
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    url = %request.url,
                    timeout_secs = self.timeout.as_secs(),
                    "yt-dlp timed out"
                );
                terminate(&mut child).await;
                self.remove_partials(&token).await;
                return Err(ExtractionError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let description = error_description(&stderr, MAX_ERROR_DESCRIPTION_CHARS);
            warn!(
                url = %request.url,
                status = %output.status,
                error = %description,
                "yt-dlp failed"
            );
            self.remove_partials(&token).await;
            return Err(ExtractionError::Failed(description));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(info) = Self::parse_output(&stdout) else {
            self.remove_partials(&token).await;
            return Err(ExtractionError::MissingOutput);
        };
        let Some(path) = info.filepath.map(PathBuf::from).filter(|p| p.exists()) else {
            self.remove_partials(&token).await;
            return Err(ExtractionError::MissingOutput);
        };

        let title = info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        info!(path = %path.display(), title = %title, "yt-dlp download finished");
        Ok(DownloadedMedia::new(path, title))
    }
}
