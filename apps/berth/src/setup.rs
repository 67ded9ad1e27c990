//! System setup and initialization

use crate::error::CliError;
use berth_config::Config;
use berth_events::EventSender;
use berth_ops::{InstallService, OpsContextBuilder};
use berth_platform::{LifecycleReceiver, Platform, TransportReceiver};
use berth_state::{FaultStore, JobStore};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Platform notification receivers, consumed once by `InstallService::start`
pub struct PlatformChannels {
    pub transport_rx: TransportReceiver,
    pub lifecycle_rx: LifecycleReceiver,
}

/// System setup and component initialization
pub struct SystemSetup {
    config: Config,
    jobs: Option<JobStore>,
    faults: Option<FaultStore>,
    platform: Option<Platform>,
    channels: Option<PlatformChannels>,
}

impl SystemSetup {
    /// Create new system setup
    pub fn new(config: Config) -> Self {
        Self {
            config,
            jobs: None,
            faults: None,
            platform: None,
            channels: None,
        }
    }

    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<(), CliError> {
        info!("Initializing berth system components");

        self.ensure_system_directories().await?;
        self.init_state().await?;
        self.init_platform()?;

        info!("System initialization completed");
        Ok(())
    }

    /// Wire an install service over the initialized components
    pub fn build_service(&self, event_sender: EventSender) -> Result<InstallService, CliError> {
        let (Some(jobs), Some(faults), Some(platform)) = (&self.jobs, &self.faults, &self.platform)
        else {
            return Err(CliError::Setup("system not initialized".to_string()));
        };

        let ctx = OpsContextBuilder::new()
            .with_jobs(jobs.clone())
            .with_faults(faults.clone())
            .with_platform(platform.clone())
            .with_event_sender(event_sender)
            .with_config(self.config.clone())
            .build()?;

        Ok(InstallService::new(ctx))
    }

    /// Hand out the platform receivers; `None` after the first call
    pub fn take_channels(&mut self) -> Option<PlatformChannels> {
        self.channels.take()
    }

    fn required_dirs(&self) -> [PathBuf; 6] {
        [
            self.config.data_dir(),
            self.config.cache_dir(),
            self.config.asset_dir(),
            self.config.install_root(),
            self.config.shortcut_dir(),
            self.config.log_dir(),
        ]
    }

    /// Ensure required system directories exist
    async fn ensure_system_directories(&self) -> Result<(), CliError> {
        for path in &self.required_dirs() {
            if !path.exists() {
                debug!("Creating directory: {}", path.display());
                tokio::fs::create_dir_all(path).await.map_err(|e| {
                    CliError::Setup(format!("Failed to create {}: {e}", path.display()))
                })?;
            }

            let metadata = tokio::fs::metadata(path).await.map_err(|e| {
                CliError::Setup(format!("Cannot access {}: {e}", path.display()))
            })?;
            if metadata.permissions().readonly() {
                return Err(CliError::Setup(format!(
                    "No write permission for {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Open the job database
    async fn init_state(&mut self) -> Result<(), CliError> {
        debug!("Opening job database");
        let (jobs, faults) = berth_state::open(&self.config.db_path())
            .await
            .map_err(|e| CliError::Setup(format!("Failed to initialize state: {e}")))?;

        self.jobs = Some(jobs);
        self.faults = Some(faults);
        Ok(())
    }

    /// Build the local platform and its notification channels
    fn init_platform(&mut self) -> Result<(), CliError> {
        debug!("Initializing platform");
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();

        let platform = Platform::local(&self.config, transport_tx, lifecycle_tx)?;

        self.platform = Some(platform);
        self.channels = Some(PlatformChannels {
            transport_rx,
            lifecycle_rx,
        });
        Ok(())
    }
}
