//! Job status machine
//!
//! `JobStatus::apply` is the only place that decides whether a status change
//! is legal. Everything that advances a job goes through it.

use berth_errors::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an install job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Awaiting,
    Downloading,
    Downloaded,
    Installing,
    /// Terminal. The record is deleted right after this status is published.
    Installed,
    /// Terminal for the current attempt; kept visible so the user can retry.
    InstallationIssue,
    Unavailable,
    PurchaseNeeded,
    /// Terminal, denied by install policy.
    Blocked,
}

/// Input to the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTransition {
    /// Explicit caller decision to retry a job parked in a retryable state
    Requeue,
    /// Handed to the work queue
    Await,
    StartDownload,
    /// Every transport job for the record reported completion
    CompleteDownload,
    /// Web-app jobs install straight from `Downloading`
    StartInstall,
    /// Artifacts are already cached, skip straight to the install step
    RecoverInstall,
    CompleteInstall,
    Fail,
    RequirePurchase,
    MarkUnavailable,
    Block,
}

impl JobStatus {
    pub const ALL: [JobStatus; 10] = [
        JobStatus::Queued,
        JobStatus::Awaiting,
        JobStatus::Downloading,
        JobStatus::Downloaded,
        JobStatus::Installing,
        JobStatus::Installed,
        JobStatus::InstallationIssue,
        JobStatus::Unavailable,
        JobStatus::PurchaseNeeded,
        JobStatus::Blocked,
    ];

    /// Stable identifier used in the database and in events
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Awaiting => "awaiting",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::InstallationIssue => "installation_issue",
            Self::Unavailable => "unavailable",
            Self::PurchaseNeeded => "purchase_needed",
            Self::Blocked => "blocked",
        }
    }

    /// Whether the job still has pipeline work ahead of it
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Awaiting | Self::Downloading | Self::Downloaded | Self::Installing
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// States a caller may explicitly requeue from
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::InstallationIssue | Self::PurchaseNeeded
        )
    }

    /// Apply a transition, rejecting combinations outside the status graph
    ///
    /// # Errors
    ///
    /// Returns `StateError::InvalidTransition` when `transition` is not legal
    /// from the current status.
    pub fn apply(self, transition: JobTransition) -> Result<JobStatus, StateError> {
        use JobStatus as S;
        use JobTransition as T;

        let next = match (self, transition) {
            (s, T::Requeue) if s.is_retryable() => Some(S::Queued),
            (S::Queued, T::Await) => Some(S::Awaiting),
            (S::Awaiting, T::StartDownload) => Some(S::Downloading),
            (S::Downloading, T::CompleteDownload) => Some(S::Downloaded),
            (S::Downloading | S::Downloaded, T::StartInstall) => Some(S::Installing),
            (s, T::RecoverInstall) if s.is_active() => Some(S::Installing),
            (S::Installing, T::CompleteInstall) => Some(S::Installed),
            (s, T::Fail) if s.is_active() || s == S::InstallationIssue => {
                Some(S::InstallationIssue)
            }
            (S::Queued, T::RequirePurchase) => Some(S::PurchaseNeeded),
            (s, T::MarkUnavailable) if s.is_active() => Some(S::Unavailable),
            (s, T::Block) if s.is_active() => Some(S::Blocked),
            _ => None,
        };

        next.ok_or_else(|| StateError::InvalidTransition {
            from: self.to_string(),
            transition: format!("{transition:?}"),
        })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StateError::CorruptedRecord {
                id: String::new(),
                message: format!("unknown job status `{s}`"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rank(status: JobStatus) -> Option<u8> {
        match status {
            JobStatus::Queued => Some(0),
            JobStatus::Awaiting => Some(1),
            JobStatus::Downloading => Some(2),
            JobStatus::Downloaded => Some(3),
            JobStatus::Installing => Some(4),
            JobStatus::Installed => Some(5),
            _ => None,
        }
    }

    fn transition_strategy() -> impl Strategy<Value = JobTransition> {
        prop_oneof![
            Just(JobTransition::Requeue),
            Just(JobTransition::Await),
            Just(JobTransition::StartDownload),
            Just(JobTransition::CompleteDownload),
            Just(JobTransition::StartInstall),
            Just(JobTransition::RecoverInstall),
            Just(JobTransition::CompleteInstall),
            Just(JobTransition::Fail),
            Just(JobTransition::RequirePurchase),
            Just(JobTransition::MarkUnavailable),
            Just(JobTransition::Block),
        ]
    }

    #[test]
    fn happy_path_reaches_installed() {
        let mut status = JobStatus::Queued;
        for t in [
            JobTransition::Await,
            JobTransition::StartDownload,
            JobTransition::CompleteDownload,
            JobTransition::StartInstall,
            JobTransition::CompleteInstall,
        ] {
            status = status.apply(t).unwrap();
        }
        assert_eq!(status, JobStatus::Installed);
    }

    #[test]
    fn installed_is_final() {
        for t in [
            JobTransition::Requeue,
            JobTransition::Fail,
            JobTransition::RecoverInstall,
            JobTransition::Await,
        ] {
            assert!(JobStatus::Installed.apply(t).is_err());
        }
    }

    #[test]
    fn requeue_only_from_retryable_states() {
        assert_eq!(
            JobStatus::InstallationIssue
                .apply(JobTransition::Requeue)
                .unwrap(),
            JobStatus::Queued
        );
        assert!(JobStatus::Blocked.apply(JobTransition::Requeue).is_err());
        assert!(JobStatus::Downloading.apply(JobTransition::Requeue).is_err());
    }

    #[test]
    fn fail_is_idempotent_on_issue() {
        assert_eq!(
            JobStatus::InstallationIssue
                .apply(JobTransition::Fail)
                .unwrap(),
            JobStatus::InstallationIssue
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("exploded".parse::<JobStatus>().is_err());
    }

    proptest! {
        #[test]
        fn random_event_sequences_follow_the_graph(
            transitions in proptest::collection::vec(transition_strategy(), 0..40)
        ) {
            let mut status = JobStatus::Queued;
            for t in transitions {
                let Ok(next) = status.apply(t) else { continue };

                prop_assert!(status != JobStatus::Installed);
                prop_assert!(status != JobStatus::Blocked);

                match (rank(status), rank(next)) {
                    // Forward-only along the main line
                    (Some(from), Some(to)) => prop_assert!(to >= from),
                    // Leaving a parked state is only ever an explicit requeue
                    (None, Some(to)) => {
                        prop_assert_eq!(t, JobTransition::Requeue);
                        prop_assert_eq!(to, 0);
                    }
                    _ => {}
                }

                if next == JobStatus::Installed {
                    prop_assert_eq!(status, JobStatus::Installing);
                }
                status = next;
            }
        }
    }
}
