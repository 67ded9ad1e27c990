//! Install session driver and commit outcome handling

use berth_errors::{Error, InstallError};
use berth_events::{AppEvent, EventEmitter, EventSender, FailureContext, InstallEvent};
use berth_platform::{InstallStatus, Platform, SessionParams};
use berth_state::JobStore;
use berth_types::{Job, JobStatus, JobTransition};
use tracing::{debug, info, warn};

use crate::cache::CacheLayout;
use crate::recovery::FaultRecovery;

/// Writes cached artifacts into a platform install session
///
/// `install` only commits. Whether the package actually landed is reported
/// later through `on_package_added` and `on_install_failed`.
#[derive(Debug, Clone)]
pub struct InstallExecutor {
    store: JobStore,
    platform: Platform,
    cache: CacheLayout,
    recovery: FaultRecovery,
    tx: Option<EventSender>,
}

impl EventEmitter for InstallExecutor {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl InstallExecutor {
    #[must_use]
    pub fn new(
        store: JobStore,
        platform: Platform,
        cache: CacheLayout,
        recovery: FaultRecovery,
    ) -> Self {
        Self {
            store,
            platform,
            cache,
            recovery,
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn recovery(&self) -> &FaultRecovery {
        &self.recovery
    }

    /// Stream every cached artifact of `job` into one session and commit it
    ///
    /// Does nothing when no artifacts are cached.
    ///
    /// # Errors
    ///
    /// A failure while opening, writing or committing the session marks the
    /// job `InstallationIssue` and is then returned to the caller.
    pub async fn install(&self, job: &mut Job) -> Result<(), Error> {
        let files = self.cache.list_cached(&job.package_name).await?;
        if files.is_empty() {
            debug!(job_id = %job.id, package = %job.package_name, "nothing cached, install skipped");
            return Ok(());
        }

        match self.run_session(job, &files).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(job_id = %job.id, package = %job.package_name, error = %e, "install session failed");
                self.emit(AppEvent::Install(InstallEvent::Failed {
                    job_id: job.id.clone(),
                    package: job.package_name.clone(),
                    failure: FailureContext::from_error(&e),
                }));
                if e.is_signature_conflict() {
                    self.recovery
                        .on_install_failure(&job.package_name, true, &e.to_string())
                        .await?;
                }
                self.store.transition(job, JobTransition::Fail).await?;
                Err(e)
            }
        }
    }

    async fn run_session(&self, job: &Job, files: &[std::path::PathBuf]) -> Result<(), Error> {
        let params = SessionParams {
            package_name: job.package_name.clone(),
            version_code: job.version_code,
            signature: job.signature.clone(),
            attribution: job.origin,
        };
        let mut session = self
            .platform
            .installer()
            .open_session(params)
            .await
            .map_err(|e| Self::session_error(job, &e))?;

        self.emit(AppEvent::Install(InstallEvent::SessionOpened {
            job_id: job.id.clone(),
            package: job.package_name.clone(),
            files: files.len(),
        }));

        for path in files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Err(e) = session.write(&name, path).await {
                session.abandon().await;
                return Err(Self::session_error(job, &e));
            }
        }

        session
            .commit()
            .await
            .map_err(|e| Self::session_error(job, &e))?;

        info!(job_id = %job.id, package = %job.package_name, files = files.len(), "install session committed");
        self.emit(AppEvent::Install(InstallEvent::SessionCommitted {
            job_id: job.id.clone(),
            package: job.package_name.clone(),
        }));
        Ok(())
    }

    fn session_error(job: &Job, error: &Error) -> Error {
        if error.is_signature_conflict() {
            return error.clone();
        }
        InstallError::SessionFailed {
            package: job.package_name.clone(),
            message: error.to_string(),
        }
        .into()
    }

    /// Map a commit outcome onto the install error taxonomy
    #[must_use]
    pub fn classify(package: &str, status: InstallStatus, message: &str) -> InstallError {
        if status == InstallStatus::Blocked {
            InstallError::Blocked {
                package: package.to_string(),
                message: message.to_string(),
            }
        } else if status.is_signature_conflict(message) {
            InstallError::SignatureConflict {
                package: package.to_string(),
                message: message.to_string(),
            }
        } else {
            InstallError::SessionFailed {
                package: package.to_string(),
                message: message.to_string(),
            }
        }
    }

    /// The platform reported a failed commit for `package`
    ///
    /// Installing jobs of the package end in `Blocked` for policy denials and
    /// `InstallationIssue` otherwise. Signature conflicts are recorded once
    /// per report regardless of how many jobs matched.
    pub async fn on_install_failed(
        &self,
        package: &str,
        status: InstallStatus,
        message: &str,
    ) -> Result<(), Error> {
        let error = Self::classify(package, status, message);
        let conflict = matches!(error, InstallError::SignatureConflict { .. });
        self.recovery
            .on_install_failure(package, conflict, message)
            .await?;

        let transition = if matches!(error, InstallError::Blocked { .. }) {
            JobTransition::Block
        } else {
            JobTransition::Fail
        };
        for mut job in self.store.get_by_package(package).await? {
            if job.status != JobStatus::Installing {
                continue;
            }
            warn!(job_id = %job.id, package, ?status, message, "install failed");
            self.store.transition(&mut job, transition).await?;
            self.emit(AppEvent::Install(InstallEvent::Failed {
                job_id: job.id.clone(),
                package: package.to_string(),
                failure: FailureContext::from_error(&error),
            }));
        }
        Ok(())
    }

    /// The platform reported `package` installed
    pub async fn on_package_added(&self, package: &str) -> Result<(), Error> {
        for mut job in self.store.get_by_package(package).await? {
            if job.status != JobStatus::Installing {
                continue;
            }
            self.store
                .transition(&mut job, JobTransition::CompleteInstall)
                .await?;
            self.emit(AppEvent::Install(InstallEvent::Completed {
                job_id: job.id.clone(),
                package: package.to_string(),
            }));
            self.cache.clear(package).await?;
            self.store.delete(&job.id).await?;
            info!(job_id = %job.id, package, "package installed");
        }

        self.recovery.on_package_changed(package).await?;
        Ok(())
    }

    pub async fn on_package_removed(&self, package: &str) -> Result<(), Error> {
        self.recovery.on_package_changed(package).await?;
        Ok(())
    }
}
