//! Event handling and progress display

use std::collections::HashMap;

use berth_events::{
    AppEvent, DownloadEvent, EventMessage, GeneralEvent, InstallEvent, NoticeEvent, QueueEvent,
};
use berth_types::JobStatus;
use console::{Style, Term};

use crate::logging::log_event_with_tracing;

/// Renders pipeline events on stderr while a command runs
pub struct EventHandler {
    colors_enabled: bool,
    debug_enabled: bool,
    /// Last rendered download percent per job
    progress: HashMap<String, i32>,
    term: Term,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, debug_enabled: bool) -> Self {
        Self {
            colors_enabled,
            debug_enabled,
            progress: HashMap::new(),
            term: Term::stderr(),
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, message: EventMessage) {
        log_event_with_tracing(&message);

        match message.event {
            AppEvent::Queue(event) => self.handle_queue_event(event),
            AppEvent::Download(event) => self.handle_download_event(event),
            AppEvent::Install(event) => self.handle_install_event(event),
            AppEvent::Notice(notice) => self.handle_notice(&notice),
            AppEvent::General(event) => self.handle_general_event(event),
        }
    }

    fn handle_queue_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::JobQueued {
                job_id, package, ..
            } => {
                self.show_status(&format!("Queued {package} ({job_id})"));
            }
            QueueEvent::StatusChanged { job_id, from, to } => {
                if self.debug_enabled {
                    self.show_status(&format!("{job_id}: {from} -> {to}"));
                }
            }
            QueueEvent::Cancelled { job_id } => {
                self.progress.remove(&job_id);
                self.show_status(&format!("Cancelled {job_id}"));
            }
            QueueEvent::Finished { job_id, status } => {
                self.progress.remove(&job_id);
                match status {
                    JobStatus::Installed => {}
                    JobStatus::Blocked => {
                        self.show_error(&format!("{job_id} was blocked by the installer"));
                    }
                    other => self.show_error(&format!("{job_id} finished as {other}")),
                }
            }
        }
    }

    fn handle_download_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Dispatched { .. } => {}
            DownloadEvent::Progress { job_id, percent } => {
                self.handle_download_progress(&job_id, percent);
            }
            DownloadEvent::Completed { job_id, package } => {
                self.progress.remove(&job_id);
                self.show_status(&format!("Downloaded {package}"));
            }
            DownloadEvent::Failed {
                job_id,
                package,
                failure,
            } => {
                self.progress.remove(&job_id);
                self.show_error(&format!("Download failed for {package}: {}", failure.message));
                if let Some(hint) = failure.hint {
                    self.show_hint(&hint);
                }
            }
        }
    }

    fn handle_install_event(&mut self, event: InstallEvent) {
        match event {
            InstallEvent::SessionOpened { package, files, .. } => {
                self.show_status(&format!("Installing {package} ({files} files)"));
            }
            InstallEvent::SessionCommitted { .. } => {}
            InstallEvent::Completed { package, .. } => {
                self.show_success(&format!("Installed {package}"));
            }
            InstallEvent::Failed {
                package, failure, ..
            } => {
                self.show_error(&format!("Install failed for {package}: {}", failure.message));
                if let Some(hint) = failure.hint {
                    self.show_hint(&hint);
                }
            }
        }
    }

    fn handle_notice(&mut self, notice: &NoticeEvent) {
        match notice {
            NoticeEvent::PurchaseRequiresAccount { package } => {
                self.show_error(&format!("Sign in to purchase {package}"));
            }
            NoticeEvent::PurchaseFlowRequired { package } => {
                self.show_status(&format!("{package} must be purchased before it can install"));
            }
            NoticeEvent::LoadError { package, message } => {
                self.show_error(&format!("Could not load {package}: {message}"));
            }
            NoticeEvent::LowStorage { package, missing } => {
                self.show_error(&format!(
                    "Not enough space for {package}: free up {}",
                    crate::display::format_size(*missing)
                ));
            }
            NoticeEvent::NetworkUnavailable { package } => {
                self.show_error(&format!("No network connection, {package} was not queued"));
            }
            NoticeEvent::SignatureMismatch { package } => {
                self.show_error(&format!(
                    "{package} conflicts with the installed copy; uninstall it and try again"
                ));
            }
            NoticeEvent::UpdatesCompleted {
                count, packages, ..
            } => {
                self.show_success(&format!("{count} updates installed: {}", packages.join(", ")));
            }
        }
    }

    fn handle_general_event(&mut self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message } | GeneralEvent::Error { message } => {
                self.show_error(&message);
            }
            GeneralEvent::DebugLog { message } => {
                if self.debug_enabled {
                    self.show_status(&message);
                }
            }
        }
    }

    /// Only whole steps of ten are printed
    fn handle_download_progress(&mut self, job_id: &str, percent: i32) {
        let step = percent / 10;
        let last = self.progress.insert(job_id.to_string(), step);
        if last != Some(step) {
            self.show_status(&format!("{job_id}: {percent}%"));
        }
    }

    fn show_status(&self, message: &str) {
        self.term.write_line(message).unwrap_or(());
    }

    fn show_success(&self, message: &str) {
        let line = if self.colors_enabled {
            Style::new().green().apply_to(message).to_string()
        } else {
            message.to_string()
        };
        self.term.write_line(&line).unwrap_or(());
    }

    fn show_error(&self, message: &str) {
        let line = if self.colors_enabled {
            Style::new().red().apply_to(message).to_string()
        } else {
            message.to_string()
        };
        self.term.write_line(&line).unwrap_or(());
    }

    fn show_hint(&self, hint: &str) {
        let line = if self.colors_enabled {
            Style::new().dim().apply_to(format!("  hint: {hint}")).to_string()
        } else {
            format!("  hint: {hint}")
        };
        self.term.write_line(&line).unwrap_or(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_types::JobType;

    fn message(event: AppEvent) -> EventMessage {
        EventMessage::from_event(event)
    }

    #[test]
    fn test_event_handler_creation() {
        let mut handler = EventHandler::new(false, false);

        handler.handle_event(message(AppEvent::Queue(QueueEvent::JobQueued {
            job_id: "job-1".to_string(),
            package: "org.example".to_string(),
            job_type: JobType::Native,
        })));
        handler.handle_event(message(AppEvent::Notice(NoticeEvent::LowStorage {
            package: "org.example".to_string(),
            missing: 2048,
        })));

        assert!(handler.progress.is_empty());
    }

    #[test]
    fn test_download_progress_tracking() {
        let mut handler = EventHandler::new(false, false);

        handler.handle_event(message(AppEvent::Download(DownloadEvent::Progress {
            job_id: "job-1".to_string(),
            percent: 42,
        })));
        assert_eq!(handler.progress.get("job-1"), Some(&4));

        handler.handle_event(message(AppEvent::Download(DownloadEvent::Completed {
            job_id: "job-1".to_string(),
            package: "org.example".to_string(),
        })));
        assert!(!handler.progress.contains_key("job-1"));
    }
}
