//! Archive upload over HTTP multipart.
//!
//! Called from the blocking trigger loop, well after the capture lock has
//! been released — an unreachable endpoint can stall this thread but never
//! the audio callback or the drainer.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// POST `archive` to `endpoint` as a multipart form (field name `archive`).
///
/// Failures are returned, not retried; the archive stays on disk either way
/// and the caller decides whether to warn or give up.
pub fn upload_archive(endpoint: &str, archive: &Path) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .build()
        .context("could not build HTTP client")?;

    let form = reqwest::blocking::multipart::Form::new()
        .file("archive", archive)
        .with_context(|| format!("could not attach {}", archive.display()))?;

    let response = client
        .post(endpoint)
        .multipart(form)
        .send()
        .with_context(|| format!("upload request to {endpoint} failed"))?;

    if !response.status().is_success() {
        bail!("upload endpoint returned {}", response.status());
    }
    Ok(())
}
