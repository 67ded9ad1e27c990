//! Aggregate handle over every platform capability

use std::sync::Arc;

use berth_config::Config;
use berth_errors::{Error, PlatformError};

use crate::catalog::{AccountSession, Catalog};
use crate::implementations::local::{
    ConfigAccount, DirectoryInstaller, FsShortcutPublisher, HttpTransport, PassthroughCatalog,
    SysinfoStorageProbe, TcpReachability,
};
use crate::installer::{LifecycleSender, PackageInstaller, PackageQuery};
use crate::probe::{NetworkMonitor, StorageProbe};
use crate::transport::{DownloadTransport, TransportSender};
use crate::webapp::WebAppPublisher;

/// Every OS collaborator the pipeline calls, behind shared trait objects
#[derive(Clone)]
pub struct Platform {
    transport: Arc<dyn DownloadTransport>,
    installer: Arc<dyn PackageInstaller>,
    packages: Arc<dyn PackageQuery>,
    network: Arc<dyn NetworkMonitor>,
    storage: Arc<dyn StorageProbe>,
    catalog: Arc<dyn Catalog>,
    account: Arc<dyn AccountSession>,
    webapp: Arc<dyn WebAppPublisher>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

impl Platform {
    #[must_use]
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::default()
    }

    /// Local implementations wired from configuration
    ///
    /// Transport notifications go to `transport_tx`, install outcomes and
    /// package changes to `lifecycle_tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn local(
        config: &Config,
        transport_tx: TransportSender,
        lifecycle_tx: LifecycleSender,
    ) -> Result<Self, Error> {
        let installer = Arc::new(DirectoryInstaller::new(config.install_root(), lifecycle_tx));
        let http_timeout = std::time::Duration::from_secs(config.network.timeout);

        Self::builder()
            .with_transport(Arc::new(HttpTransport::new(transport_tx, http_timeout)?))
            .with_installer(installer.clone())
            .with_packages(installer)
            .with_network(Arc::new(TcpReachability::new(
                config.network.probe_address.clone(),
                std::time::Duration::from_millis(config.network.probe_timeout_ms),
            )))
            .with_storage(Arc::new(SysinfoStorageProbe))
            .with_catalog(Arc::new(PassthroughCatalog))
            .with_account(Arc::new(ConfigAccount::from_config(&config.account)))
            .with_webapp(Arc::new(FsShortcutPublisher::new(
                config.shortcut_dir(),
                http_timeout,
            )?))
            .build()
    }

    #[must_use]
    pub fn transport(&self) -> &dyn DownloadTransport {
        &*self.transport
    }

    #[must_use]
    pub fn installer(&self) -> &dyn PackageInstaller {
        &*self.installer
    }

    #[must_use]
    pub fn packages(&self) -> &dyn PackageQuery {
        &*self.packages
    }

    #[must_use]
    pub fn network(&self) -> &dyn NetworkMonitor {
        &*self.network
    }

    #[must_use]
    pub fn storage(&self) -> &dyn StorageProbe {
        &*self.storage
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        &*self.catalog
    }

    #[must_use]
    pub fn account(&self) -> &dyn AccountSession {
        &*self.account
    }

    #[must_use]
    pub fn webapp(&self) -> &dyn WebAppPublisher {
        &*self.webapp
    }
}

/// Builder for [`Platform`]
#[derive(Default)]
pub struct PlatformBuilder {
    transport: Option<Arc<dyn DownloadTransport>>,
    installer: Option<Arc<dyn PackageInstaller>>,
    packages: Option<Arc<dyn PackageQuery>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    storage: Option<Arc<dyn StorageProbe>>,
    catalog: Option<Arc<dyn Catalog>>,
    account: Option<Arc<dyn AccountSession>>,
    webapp: Option<Arc<dyn WebAppPublisher>>,
}

fn missing(capability: &str) -> Error {
    PlatformError::CapabilityUnavailable {
        capability: capability.to_string(),
    }
    .into()
}

impl PlatformBuilder {
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn DownloadTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    #[must_use]
    pub fn with_packages(mut self, packages: Arc<dyn PackageQuery>) -> Self {
        self.packages = Some(packages);
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageProbe>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn with_account(mut self, account: Arc<dyn AccountSession>) -> Self {
        self.account = Some(account);
        self
    }

    #[must_use]
    pub fn with_webapp(mut self, webapp: Arc<dyn WebAppPublisher>) -> Self {
        self.webapp = Some(webapp);
        self
    }

    /// # Errors
    ///
    /// Returns `PlatformError::CapabilityUnavailable` naming the first
    /// capability that was not provided.
    pub fn build(self) -> Result<Platform, Error> {
        Ok(Platform {
            transport: self.transport.ok_or_else(|| missing("transport"))?,
            installer: self.installer.ok_or_else(|| missing("installer"))?,
            packages: self.packages.ok_or_else(|| missing("package_query"))?,
            network: self.network.ok_or_else(|| missing("network"))?,
            storage: self.storage.ok_or_else(|| missing("storage"))?,
            catalog: self.catalog.ok_or_else(|| missing("catalog"))?,
            account: self.account.ok_or_else(|| missing("account"))?,
            webapp: self.webapp.ok_or_else(|| missing("webapp"))?,
        })
    }
}
