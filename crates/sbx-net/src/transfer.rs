//! Resumable single-file transfers.
//!
//! One partial file (`<name>.part`) per URL carries the bytes received so
//! far; it survives process restarts and failed attempts, and every retry
//! recomputes its resume offset from whatever is actually on disk. The
//! final name only exists once the content is complete (atomic rename).

use futures::StreamExt;
use reqwest::{header, Client, StatusCode, Url};
use sbx_core::config::TransferConfig;
use sbx_core::{SbxError, SbxResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{filename, resolve};

/// Connect timeout for transfer sockets. Generous: kiosk uplinks are slow.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Transfer {
    client: Client,
    max_attempts: u32,
    backoff_step: Duration,
}

impl Transfer {
    pub fn new(config: &TransferConfig) -> SbxResult<Self> {
        // Redirect following stays off: resolution happens up front so that
        // ranged retries always target the same final endpoint.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(crate::USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| SbxError::Network(format!("building transfer client: {e}")))?;

        Ok(Transfer {
            client,
            max_attempts: config.max_attempts.max(1),
            backoff_step: Duration::from_millis(config.backoff_step_ms),
        })
    }

    /// Download `url` into `target_dir`, resuming a previous partial if one
    /// exists. Returns the final path on success.
    pub async fn fetch(&self, url: &str, target_dir: &Path) -> SbxResult<PathBuf> {
        self.fetch_named(url, target_dir, None).await
    }

    /// Like [`fetch`](Self::fetch), but with a caller-supplied final name
    /// that overrides whatever the response headers or URL would produce.
    /// The catalog uses this when a manifest entry names its asset, so the
    /// on-disk name always matches what the sync plan expects.
    pub async fn fetch_named(
        &self,
        url: &str,
        target_dir: &Path,
        final_name: Option<&str>,
    ) -> SbxResult<PathBuf> {
        let final_url = resolve::resolve(&self.client, url).await?;
        let part_path = target_dir.join(filename::partial_name(&final_url));
        let resume_from = file_len(&part_path).await;
        info!(
            url = %final_url,
            resume_from = resume_from,
            "starting transfer"
        );

        for attempt in 1..=self.max_attempts {
            match self
                .attempt(&final_url, target_dir, &part_path, final_name)
                .await
            {
                Ok(path) => return Ok(path),
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        url = %final_url,
                        error = %e,
                        "transfer attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff_step * attempt).await;
                    }
                }
            }
        }

        Err(SbxError::DownloadExhausted {
            url: final_url.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn attempt(
        &self,
        url: &Url,
        target_dir: &Path,
        part_path: &Path,
        name_override: Option<&str>,
    ) -> SbxResult<PathBuf> {
        let mut offset = file_len(part_path).await;

        let mut request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_ENCODING, "identity");
        if offset > 0 {
            debug!(offset, "requesting resume");
            request = request.header(header::RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SbxError::Network(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SbxError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if status == StatusCode::OK && offset > 0 {
            // Server ignored the Range header. Appending this full body to
            // the partial would interleave wrong-offset bytes, so the
            // partial is discarded and this same response streams from zero.
            warn!(url = %url, "server ignored range request; restarting file");
            fs::remove_file(part_path).await.ok();
            offset = 0;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(part_path)
            .await
            .map_err(|e| {
                SbxError::Filesystem(format!("opening {}: {e}", part_path.display()))
            })?;

        let mut written = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SbxError::Network(format!("reading body: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let final_name = match name_override {
            Some(name) => filename::sanitize(name),
            None => filename::resolve_final(disposition.as_deref(), url),
        };
        let final_path = target_dir.join(&final_name);
        if fs::metadata(&final_path).await.is_ok() {
            fs::remove_file(&final_path).await.ok();
        }
        if let Err(e) = fs::rename(part_path, &final_path).await {
            // Rename can fail across mount points; fall back to copy+delete.
            debug!(error = %e, "rename failed; copying into place");
            fs::copy(part_path, &final_path).await.map_err(|e| {
                SbxError::Filesystem(format!(
                    "publishing {}: {e}",
                    final_path.display()
                ))
            })?;
            fs::remove_file(part_path).await.ok();
        }

        info!(url = %url, file = %final_path.display(), bytes = written, "transfer complete");
        Ok(final_path)
    }
}

async fn file_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}
