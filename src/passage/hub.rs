//! Download of passage files from HuggingFace dataset repositories.

use std::path::{Path, PathBuf};

use crate::error::PassageError;

const HF_RESOLVE_BASE: &str = "https://huggingface.co/datasets";

/// Local cache path for `file` of `repo` at `revision`:
/// `<cache_dir>/<owner>__<name>/<revision>/<file>`.
pub fn cache_path(cache_dir: &Path, repo: &str, revision: &str, file: &str) -> PathBuf {
    cache_dir
        .join(repo.replace('/', "__"))
        .join(revision.replace('/', "__"))
        .join(file)
}

/// Download a dataset file unless it is already cached, returning its path.
pub async fn download_file(
    repo: &str,
    revision: &str,
    file: &str,
    cache_dir: &Path,
    token: Option<&str>,
) -> Result<PathBuf, PassageError> {
    let local_path = cache_path(cache_dir, repo, revision, file);
    if local_path.is_file() {
        tracing::debug!(path = %local_path.display(), "Using cached dataset file");
        return Ok(local_path);
    }

    let url = format!(
        "{}/{}/resolve/{}/{}",
        HF_RESOLVE_BASE,
        repo,
        urlencoding::encode(revision),
        file
    );
    tracing::info!(repo, revision, file, "Downloading passages from HuggingFace");

    let failed = |reason: String| PassageError::DownloadFailed {
        repo: repo.to_string(),
        file: file.to_string(),
        reason,
    };

    let client = reqwest::Client::new();
    let mut request = client.get(&url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let resp = request.send().await.map_err(|e| failed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        return Err(failed(format!(
            "{}: {}",
            status,
            resp.text().await.unwrap_or_default()
        )));
    }

    let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;

    if let Some(parent) = local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write under a temporary name so an interrupted download is not mistaken
    // for a cached file on the next start.
    let partial = local_path.with_extension("partial");
    std::fs::write(&partial, &bytes)?;
    std::fs::rename(&partial, &local_path)?;

    tracing::info!(
        path = %local_path.display(),
        size = bytes.len(),
        "Dataset file downloaded"
    );

    Ok(local_path)
}
