//! Streaming HTTP download transport

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berth_errors::{Error, NetworkError};
use berth_types::TransportJobId;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::{local_source, map_reqwest_error, parse_url, partial_path};
use crate::transport::{DownloadTransport, TransportEvent, TransportRequest, TransportSender};

/// Runs each fetch as a tokio task and reports through a channel
///
/// `file://` URLs are copied instead of fetched.
pub struct HttpTransport {
    client: Client,
    tx: TransportSender,
    next_id: AtomicU64,
    pending: Arc<DashMap<TransportJobId, Option<AbortHandle>>>,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(tx: TransportSender, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("berth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;

        Ok(Self {
            client,
            tx,
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
        })
    }
}

#[async_trait]
impl DownloadTransport for HttpTransport {
    async fn enqueue(&self, request: TransportRequest) -> Result<TransportJobId, Error> {
        // Reject malformed URLs up front rather than as a failed event
        parse_url(&request.url)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(id, None);

        let client = self.client.clone();
        let tx = self.tx.clone();
        let pending = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            let outcome = fetch(&client, &request, id, &tx).await;
            pending.remove(&id);
            let event = match outcome {
                Ok(()) => {
                    debug!(transport_id = id, url = %request.url, "transport download completed");
                    TransportEvent::Completed { id }
                }
                Err(e) => {
                    warn!(transport_id = id, url = %request.url, error = %e, "transport download failed");
                    TransportEvent::Failed {
                        id,
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(event);
        });

        if let Some(mut slot) = self.pending.get_mut(&id) {
            *slot = Some(handle.abort_handle());
        }
        Ok(id)
    }

    async fn cancel(&self, ids: &[TransportJobId]) -> Result<(), Error> {
        for id in ids {
            if let Some((_, Some(handle))) = self.pending.remove(id) {
                handle.abort();
                debug!(transport_id = id, "transport download cancelled");
            }
        }
        Ok(())
    }

    async fn is_pending(&self, id: TransportJobId) -> bool {
        self.pending.contains_key(&id)
    }
}

async fn fetch(
    client: &Client,
    request: &TransportRequest,
    id: TransportJobId,
    tx: &TransportSender,
) -> Result<(), Error> {
    let url = parse_url(&request.url)?;

    if let Some(parent) = request.destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let temp_path = partial_path(&request.destination);

    if let Some(source) = local_source(&url)? {
        let copied = tokio::fs::copy(&source, &temp_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &source))?;
        let _ = tx.send(TransportEvent::Progress {
            id,
            downloaded_bytes: copied,
            total_bytes: Some(copied),
        });
    } else {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, &e))?;

        if !response.status().is_success() {
            return Err(NetworkError::HttpError {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            }
            .into());
        }

        let total_bytes = response.content_length();
        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &temp_path))?;
        let mut stream = response.bytes_stream();
        let mut downloaded_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
            downloaded_bytes += u64::try_from(chunk.len()).unwrap_or(u64::MAX);
            let _ = tx.send(TransportEvent::Progress {
                id,
                downloaded_bytes,
                total_bytes,
            });
        }
        file.flush().await?;
    }

    tokio::fs::rename(&temp_path, &request.destination)
        .await
        .map_err(|e| Error::io_with_path(&e, &request.destination))?;
    Ok(())
}
