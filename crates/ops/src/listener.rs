//! Ingress of asynchronous platform notifications

use berth_events::EventEmitter;
use berth_install::{DownloadCoordinator, InstallExecutor};
use berth_platform::{LifecycleReceiver, PackageLifecycleEvent, TransportEvent, TransportReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Feed transport notifications to the coordinator until the channel closes
pub fn spawn_transport_listener(
    coordinator: DownloadCoordinator,
    mut rx: TransportReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let id = event.id();
            let result = match event {
                TransportEvent::Progress {
                    id,
                    downloaded_bytes,
                    total_bytes,
                } => {
                    coordinator
                        .on_transport_progress(id, downloaded_bytes, total_bytes)
                        .await
                }
                TransportEvent::Completed { id } => coordinator.on_transport_completed(id).await,
                TransportEvent::Failed { id, message } => {
                    coordinator.on_transport_failed(id, &message).await
                }
            };
            if let Err(e) = result {
                warn!(transport_id = id, error = %e, "failed to apply transport event");
                coordinator.emit_warning(format!("download {id}: {e}"));
            }
        }
        debug!("transport listener closed");
    })
}

/// Feed package lifecycle broadcasts to the executor until the channel closes
pub fn spawn_lifecycle_listener(
    executor: InstallExecutor,
    mut rx: LifecycleReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let package = event.package().to_string();
            let result = match event {
                PackageLifecycleEvent::Added { package } => {
                    executor.on_package_added(&package).await
                }
                PackageLifecycleEvent::Removed { package } => {
                    executor.on_package_removed(&package).await
                }
                PackageLifecycleEvent::InstallFailed {
                    package,
                    status,
                    message,
                } => executor.on_install_failed(&package, status, &message).await,
            };
            if let Err(e) = result {
                warn!(%package, error = %e, "failed to apply lifecycle event");
                executor.emit_warning(format!("{package}: {e}"));
            }
        }
        debug!("lifecycle listener closed");
    })
}
