//! Heterogeneous input resolution.
//!
//! Job inputs arrive as one of three forms: a local path (passed
//! through untouched), a remote URL (downloaded into the request work
//! directory), or an inline base64 payload (decoded and written out).
//! Resolution never retries; a failed transfer is reported to the
//! caller as-is.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::types::ResolvedMedia;

/// How an input reference should be materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Already a local path; used verbatim.
    Path,
    /// Remote URL; fetched into the work directory.
    Url,
    /// Inline base64 payload; decoded into the work directory.
    Base64,
}

impl FromStr for InputKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, InputError> {
        match s {
            "path" => Ok(Self::Path),
            "url" => Ok(Self::Url),
            "base64" => Ok(Self::Base64),
            other => Err(InputError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Errors from input resolution.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The resolution kind string is not one of `path`/`url`/`base64`.
    #[error("unsupported input kind: {0}")]
    UnsupportedKind(String),

    /// The URL download failed (transport error, timeout, or non-2xx).
    #[error("download failed for {url}: {source}")]
    Transfer {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The inline payload is not valid base64.
    #[error("base64 decoding failed: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Filesystem error while materializing the input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A resolved input path does not exist on disk.
    #[error("input file not found: {0}")]
    NotFound(PathBuf),
}

/// Resolves input references into local files.
///
/// Holds a [`reqwest::Client`] configured with the download timeouts;
/// one resolver is created per job and its work directory is never
/// shared across jobs.
pub struct InputResolver {
    client: reqwest::Client,
}

/// Connect timeout applied to URL downloads.
const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl InputResolver {
    /// Create a resolver whose downloads are bounded by
    /// `download_timeout` total wall-clock time per transfer.
    pub fn new(download_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .timeout(download_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Materialize one input reference as a local file path.
    ///
    /// * `Path` inputs are returned unchanged with no existence check;
    ///   the caller validates existence before any network interaction.
    /// * `Url` and `Base64` inputs are written to
    ///   `work_dir/output_filename`, creating `work_dir` if needed.
    pub async fn resolve(
        &self,
        value: &str,
        kind: InputKind,
        work_dir: &Path,
        output_filename: &str,
    ) -> Result<PathBuf, InputError> {
        match kind {
            InputKind::Path => {
                tracing::info!(path = %value, "Using local path input");
                Ok(PathBuf::from(value))
            }
            InputKind::Url => {
                let target = work_dir.join(output_filename);
                self.download(value, work_dir, &target).await?;
                Ok(target)
            }
            InputKind::Base64 => {
                let target = work_dir.join(output_filename);
                write_base64(value, work_dir, &target).await?;
                Ok(target)
            }
        }
    }

    /// Fetch a URL into `target`, creating `work_dir` first.
    async fn download(
        &self,
        url: &str,
        work_dir: &Path,
        target: &Path,
    ) -> Result<(), InputError> {
        tokio::fs::create_dir_all(work_dir).await?;

        tracing::info!(url = %url, target = %target.display(), "Downloading input");

        let transfer = |source| InputError::Transfer {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transfer)?;
        let bytes = response.bytes().await.map_err(transfer)?;

        tokio::fs::write(target, &bytes).await?;
        tracing::info!(
            url = %url,
            bytes = bytes.len(),
            "Download complete",
        );
        Ok(())
    }
}

/// Decode a base64 payload into `target`, creating `work_dir` first.
///
/// Decoding happens before any filesystem write: a malformed payload
/// leaves no file behind.
async fn write_base64(payload: &str, work_dir: &Path, target: &Path) -> Result<(), InputError> {
    let decoded = BASE64.decode(payload)?;

    tokio::fs::create_dir_all(work_dir).await?;
    tokio::fs::write(target, &decoded).await?;

    tracing::info!(
        target = %target.display(),
        bytes = decoded.len(),
        "Saved base64 input",
    );
    Ok(())
}

/// Check that a resolved input exists and capture its byte size.
///
/// Reported as a distinct "not found" condition so missing local files
/// are surfaced before any network interaction happens.
pub async fn ensure_exists(path: &Path) -> Result<ResolvedMedia, InputError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(ResolvedMedia {
            path: path.to_path_buf(),
            byte_size: meta.len(),
        }),
        _ => Err(InputError::NotFound(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn input_kind_parses_known_values() {
        assert_eq!(InputKind::from_str("path").unwrap(), InputKind::Path);
        assert_eq!(InputKind::from_str("url").unwrap(), InputKind::Url);
        assert_eq!(InputKind::from_str("base64").unwrap(), InputKind::Base64);
    }

    #[test]
    fn input_kind_rejects_unknown_values() {
        let err = InputKind::from_str("ftp").unwrap_err();
        assert_matches!(err, InputError::UnsupportedKind(kind) if kind == "ftp");
    }

    #[tokio::test]
    async fn path_input_is_passed_through_without_existence_check() {
        let resolver = InputResolver::new(Duration::from_secs(60));
        let resolved = resolver
            .resolve("/no/such/file.jpg", InputKind::Path, Path::new("/tmp/x"), "a.jpg")
            .await
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/no/such/file.jpg"));
    }

    #[tokio::test]
    async fn base64_input_is_decoded_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("task_1");
        let resolver = InputResolver::new(Duration::from_secs(60));

        let payload = BASE64.encode(b"hello media");
        let resolved = resolver
            .resolve(&payload, InputKind::Base64, &work_dir, "input.wav")
            .await
            .unwrap();

        assert_eq!(resolved, work_dir.join("input.wav"));
        let written = std::fs::read(&resolved).unwrap();
        assert_eq!(written, b"hello media");
    }

    #[tokio::test]
    async fn malformed_base64_fails_without_writing_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("task_2");
        let resolver = InputResolver::new(Duration::from_secs(60));

        let err = resolver
            .resolve("!!not-base64!!", InputKind::Base64, &work_dir, "input.wav")
            .await
            .unwrap_err();

        assert_matches!(err, InputError::Decode(_));
        assert!(!work_dir.join("input.wav").exists());
        // The work directory itself is not created either.
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn ensure_exists_reports_size_for_present_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.bin");
        std::fs::write(&path, b"12345").unwrap();

        let media = ensure_exists(&path).await.unwrap();
        assert_eq!(media.byte_size, 5);
        assert_eq!(media.path, path);
    }

    #[tokio::test]
    async fn ensure_exists_fails_for_missing_file() {
        let err = ensure_exists(Path::new("/no/such/media.bin"))
            .await
            .unwrap_err();
        assert_matches!(err, InputError::NotFound(_));
    }
}
