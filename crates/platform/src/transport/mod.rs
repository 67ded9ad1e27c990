//! Download transport contract

use async_trait::async_trait;
use berth_errors::Error;
use berth_types::TransportJobId;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One artifact fetch handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Shown by transports that surface their own notifications
    pub title: String,
}

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes received so far; `total_bytes` is `None` until the size is known
    Progress {
        id: TransportJobId,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    Completed {
        id: TransportJobId,
    },
    Failed {
        id: TransportJobId,
        message: String,
    },
}

impl TransportEvent {
    #[must_use]
    pub fn id(&self) -> TransportJobId {
        match self {
            Self::Progress { id, .. } | Self::Completed { id } | Self::Failed { id, .. } => *id,
        }
    }
}

pub type TransportSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// OS download transport
///
/// `enqueue` returns as soon as the fetch is accepted. Progress and the
/// final outcome arrive later as `TransportEvent`s.
#[async_trait]
pub trait DownloadTransport: Send + Sync {
    async fn enqueue(&self, request: TransportRequest) -> Result<TransportJobId, Error>;

    /// Stop the given fetches. Unknown ids are ignored.
    async fn cancel(&self, ids: &[TransportJobId]) -> Result<(), Error>;

    /// Whether the fetch is still running
    async fn is_pending(&self, id: TransportJobId) -> bool;
}
