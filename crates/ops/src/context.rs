//! Operations context for dependency injection

use berth_config::Config;
use berth_errors::{Error, OpsError};
use berth_events::EventSender;
use berth_install::CacheLayout;
use berth_platform::Platform;
use berth_state::{FaultStore, JobStore};

/// Everything the install service is assembled from
#[derive(Debug, Clone)]
pub struct OpsCtx {
    /// Job records
    pub jobs: JobStore,
    /// Faulty package records
    pub faults: FaultStore,
    /// OS collaborators
    pub platform: Platform,
    /// Event sender for progress reporting
    pub tx: EventSender,
    /// System configuration
    pub config: Config,
}

impl OpsCtx {
    /// Artifact cache rooted at the configured cache and asset directories
    #[must_use]
    pub fn cache(&self) -> CacheLayout {
        CacheLayout::new(self.config.cache_dir(), self.config.asset_dir())
    }
}

/// Builder for [`OpsCtx`]
#[derive(Debug, Default)]
pub struct OpsContextBuilder {
    jobs: Option<JobStore>,
    faults: Option<FaultStore>,
    platform: Option<Platform>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl OpsContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: JobStore) -> Self {
        self.jobs = Some(jobs);
        self
    }

    #[must_use]
    pub fn with_faults(mut self, faults: FaultStore) -> Self {
        self.faults = Some(faults);
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context
    ///
    /// The job store is wired to the event sender so status changes are
    /// published.
    ///
    /// # Errors
    ///
    /// Returns an error if any required component is missing.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let tx = self.tx.ok_or_else(|| missing("event_sender"))?;
        let jobs = self.jobs.ok_or_else(|| missing("jobs"))?;
        let faults = self.faults.ok_or_else(|| missing("faults"))?;
        let platform = self.platform.ok_or_else(|| missing("platform"))?;
        let config = self.config.ok_or_else(|| missing("config"))?;

        Ok(OpsCtx {
            jobs: jobs.with_event_sender(tx.clone()),
            faults,
            platform,
            tx,
            config,
        })
    }
}

fn missing(component: &str) -> Error {
    OpsError::MissingComponent {
        component: component.to_string(),
    }
    .into()
}
