//! Web-app shortcuts as files in a launcher directory

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use berth_errors::{Error, NetworkError, PlatformError};
use reqwest::Client;
use tracing::info;

use super::{local_source, map_reqwest_error, parse_url};
use crate::webapp::{Shortcut, WebAppPublisher};

/// Writes `<id>.json` plus `<id>.icon` for each published shortcut
pub struct FsShortcutPublisher {
    dir: PathBuf,
    client: Client,
}

impl FsShortcutPublisher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(dir: PathBuf, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;
        Ok(Self { dir, client })
    }
}

fn shortcut_error(message: impl Into<String>) -> Error {
    PlatformError::ShortcutFailed {
        message: message.into(),
    }
    .into()
}

#[async_trait]
impl WebAppPublisher for FsShortcutPublisher {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, Error> {
        let parsed = parse_url(url)?;
        if let Some(path) = local_source(&parsed)? {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| Error::io_with_path(&e, &path));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, &e))?;
        if !response.status().is_success() {
            return Err(NetworkError::HttpError {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }
            .into());
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(url, &e))?;
        Ok(bytes.to_vec())
    }

    async fn publish_shortcut(&self, shortcut: &Shortcut) -> Result<(), Error> {
        if shortcut.id.is_empty() || shortcut.id.contains(['/', '\\']) {
            return Err(shortcut_error(format!("invalid shortcut id `{}`", shortcut.id)));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.dir))?;

        let entry = serde_json::to_vec_pretty(shortcut)?;
        let entry_path = self.dir.join(format!("{}.json", shortcut.id));
        tokio::fs::write(&entry_path, entry)
            .await
            .map_err(|e| Error::io_with_path(&e, &entry_path))?;

        let icon_path = self.dir.join(format!("{}.icon", shortcut.id));
        tokio::fs::write(&icon_path, &shortcut.icon)
            .await
            .map_err(|e| Error::io_with_path(&e, &icon_path))?;

        info!(id = %shortcut.id, name = %shortcut.name, "shortcut published");
        Ok(())
    }
}
