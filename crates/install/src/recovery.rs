//! Suppression of retries for packages that hit a signature conflict

use berth_errors::Error;
use berth_events::{EventEmitter, EventSender, NoticeEvent};
use berth_state::FaultStore;
use berth_types::{FaultReason, FaultyPackageRecord};
use tracing::{info, warn};

/// Owns the faulty package records
///
/// A record is created when an install fails with a signature or version
/// conflict and removed when the OS reports the package added or removed.
#[derive(Debug, Clone)]
pub struct FaultRecovery {
    faults: FaultStore,
    tx: Option<EventSender>,
}

impl EventEmitter for FaultRecovery {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl FaultRecovery {
    #[must_use]
    pub fn new(faults: FaultStore) -> Self {
        Self { faults, tx: None }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// React to a failed install; only signature conflicts are recorded
    pub async fn on_install_failure(
        &self,
        package: &str,
        is_signature_conflict: bool,
        message: &str,
    ) -> Result<(), Error> {
        if !is_signature_conflict {
            return Ok(());
        }

        let record = FaultyPackageRecord {
            package_name: package.to_string(),
            reason: FaultReason::from_message(message),
            recorded_at: chrono::Utc::now(),
        };
        self.faults.record(&record).await?;
        warn!(package, reason = record.reason.as_str(), "package marked faulty");

        self.emit_notice(NoticeEvent::SignatureMismatch {
            package: package.to_string(),
        });
        Ok(())
    }

    /// The OS added or removed `package`; the conflict no longer applies
    pub async fn on_package_changed(&self, package: &str) -> Result<bool, Error> {
        let cleared = self.faults.clear(package).await?;
        if cleared {
            info!(package, "fault cleared");
        }
        Ok(cleared)
    }

    /// Fault to surface instead of retrying the install
    pub async fn fault_for(&self, package: &str) -> Result<Option<FaultyPackageRecord>, Error> {
        self.faults.get(package).await
    }

    pub async fn list(&self) -> Result<Vec<FaultyPackageRecord>, Error> {
        self.faults.list().await
    }
}
