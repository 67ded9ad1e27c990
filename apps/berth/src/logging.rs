//! Structured logging integration for events
//!
//! Every pipeline event is mirrored into `tracing` with structured fields so
//! the `--debug` JSON log carries the full job history keyed by job id.

use berth_events::{
    AppEvent, DownloadEvent, EventMessage, GeneralEvent, InstallEvent, NoticeEvent, QueueEvent,
};
use berth_types::JobStatus;
use tracing::{debug, error, info, warn};

/// Log an event using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let event = &message.event;
    let meta = &message.meta;

    match event {
        AppEvent::Queue(queue_event) => match queue_event {
            QueueEvent::JobQueued {
                job_id,
                package,
                job_type,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    job_type = %job_type,
                    "Job queued"
                );
            }
            QueueEvent::StatusChanged { job_id, from, to } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    from = %from,
                    to = %to,
                    "Job status changed"
                );
            }
            QueueEvent::Cancelled { job_id } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    "Job cancelled"
                );
            }
            QueueEvent::Finished { job_id, status } => {
                if *status == JobStatus::Installed {
                    info!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        job_id = %job_id,
                        status = %status,
                        "Job finished"
                    );
                } else {
                    warn!(
                        source = meta.source.as_str(),
                        event_id = %meta.event_id,
                        job_id = %job_id,
                        status = %status,
                        "Job finished"
                    );
                }
            }
        },

        AppEvent::Download(download_event) => match download_event {
            DownloadEvent::Dispatched {
                job_id,
                url,
                transport_id,
            } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    url = %url,
                    transport_id,
                    "Download dispatched"
                );
            }
            DownloadEvent::Progress { job_id, percent } => {
                debug!(
                    source = meta.source.as_str(),
                    job_id = %job_id,
                    percent,
                    "Download progress"
                );
            }
            DownloadEvent::Completed { job_id, package } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    "Download completed"
                );
            }
            DownloadEvent::Failed {
                job_id,
                package,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Download failed"
                );
            }
        },

        AppEvent::Install(install_event) => match install_event {
            InstallEvent::SessionOpened {
                job_id,
                package,
                files,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    files,
                    "Install session opened"
                );
            }
            InstallEvent::SessionCommitted { job_id, package } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    "Install session committed"
                );
            }
            InstallEvent::Completed { job_id, package } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    "Package installed"
                );
            }
            InstallEvent::Failed {
                job_id,
                package,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    job_id = %job_id,
                    package = %package,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Package installation failed"
                );
            }
        },

        AppEvent::Notice(notice) => log_notice(meta.source.as_str(), notice),

        AppEvent::General(general_event) => match general_event {
            GeneralEvent::Warning { message } => {
                warn!(source = meta.source.as_str(), "{message}");
            }
            GeneralEvent::Error { message } => {
                error!(source = meta.source.as_str(), "{message}");
            }
            GeneralEvent::DebugLog { message } => {
                debug!(source = meta.source.as_str(), "{message}");
            }
        },
    }
}

fn log_notice(source: &str, notice: &NoticeEvent) {
    match notice {
        NoticeEvent::PurchaseRequiresAccount { package } => {
            info!(source, package = %package, "Purchase requires a signed-in account");
        }
        NoticeEvent::PurchaseFlowRequired { package } => {
            info!(source, package = %package, "Purchase flow required");
        }
        NoticeEvent::LoadError { package, message } => {
            warn!(source, package = %package, message = %message, "Package could not be resolved");
        }
        NoticeEvent::LowStorage { package, missing } => {
            warn!(source, package = %package, missing_bytes = missing, "Not enough free storage");
        }
        NoticeEvent::NetworkUnavailable { package } => {
            warn!(source, package = %package, "Network unavailable");
        }
        NoticeEvent::SignatureMismatch { package } => {
            warn!(source, package = %package, "Installed copy has a different signature");
        }
        NoticeEvent::UpdatesCompleted {
            count,
            packages,
            completed_at,
        } => {
            info!(
                source,
                count,
                packages = ?packages,
                completed_at = %completed_at,
                "Update batch completed"
            );
        }
    }
}
