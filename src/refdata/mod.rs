//! On-disk reference data: airport catalog, repeater directory and the
//! satellite TLE + frequency tables. Each dataset separates fetching
//! (HTTP to a temp file, committed by rename), parsing and the
//! in-memory index the dispatcher queries. A `.stamp` sidecar records
//! the last successful refresh; a refresh younger than its interval is
//! skipped.

pub mod airports;
pub mod repeaters;
pub mod satellites;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::fs;
use tracing::{debug, info};

/// Download the URL and atomically replace `path` with the new content.
/// Returns true when the file changed.
pub async fn download_to(client: &reqwest::Client, url: &str, path: &Path) -> Result<bool> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("cannot fetch {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("{} returned {}", url, response.status());
    }
    let body = response.bytes().await.context("download interrupted")?;

    if let Ok(existing) = fs::read(path).await {
        if existing == body {
            debug!("{} unchanged upstream", path.display());
            write_stamp(path).await?;
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &body)
        .await
        .with_context(|| format!("cannot write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("cannot move {} into place", tmp.display()))?;
    write_stamp(path).await?;
    info!("Refreshed {} ({} bytes)", path.display(), body.len());
    Ok(true)
}

pub fn stamp_path(path: &Path) -> PathBuf {
    let mut stamp = path.as_os_str().to_owned();
    stamp.push(".stamp");
    PathBuf::from(stamp)
}

async fn write_stamp(path: &Path) -> Result<()> {
    fs::write(stamp_path(path), Utc::now().to_rfc3339())
        .await
        .context("cannot write refresh stamp")
}

pub async fn read_stamp(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(stamp_path(path)).await.ok()?;
    DateTime::parse_from_rfc3339(content.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A dataset is stale when the file or its stamp is missing, or the
/// stamp is older than the refresh interval.
pub async fn is_stale(path: &Path, max_age: Duration) -> bool {
    if !path.exists() {
        return true;
    }
    match read_stamp(path).await {
        Some(stamp) => Utc::now() - stamp > max_age,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stamp_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("airports.txt");
        fs::write(&path, "data").await.unwrap();
        write_stamp(&path).await.unwrap();

        let stamp = read_stamp(&path).await.unwrap();
        assert!((Utc::now() - stamp).num_seconds() < 5);
        assert!(!is_stale(&path, Duration::days(1)).await);
        assert!(is_stale(&path, Duration::seconds(-1)).await);
    }

    #[tokio::test]
    async fn missing_file_is_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.txt");
        assert!(is_stale(&path, Duration::days(30)).await);
    }
}
