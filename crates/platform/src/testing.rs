//! In-memory platform used by pipeline tests
//!
//! Every capability records what it was asked to do and lets the test drive
//! the asynchronous side: delivering downloads, failing commits, toggling the
//! network or the free space.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use berth_errors::{CatalogError, Error, InstallError, PlatformError};
use berth_types::{Job, TransportJobId};

use crate::catalog::{AccountSession, Catalog, ResolvedDownload};
use crate::core::Platform;
use crate::installer::{
    InstallSession, InstallStatus, LifecycleSender, PackageInstaller, PackageLifecycleEvent,
    PackageQuery, SessionParams,
};
use crate::probe::{NetworkMonitor, StorageProbe};
use crate::transport::{DownloadTransport, TransportEvent, TransportRequest, TransportSender};
use crate::webapp::{Shortcut, WebAppPublisher};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct TransportState {
    requests: Vec<(TransportJobId, TransportRequest)>,
    pending: BTreeSet<TransportJobId>,
    cancelled: Vec<TransportJobId>,
}

/// Transport that only finishes downloads when told to
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<TransportSender>,
    next_id: AtomicU64,
    reject: AtomicBool,
    enqueue_delay: Duration,
    state: Mutex<TransportState>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new(tx: Option<TransportSender>) -> Self {
        Self {
            tx,
            next_id: AtomicU64::new(1),
            reject: AtomicBool::new(false),
            enqueue_delay: Duration::ZERO,
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Yield for `delay` inside every `enqueue`
    #[must_use]
    pub fn with_enqueue_delay(mut self, delay: Duration) -> Self {
        self.enqueue_delay = delay;
        self
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<(TransportJobId, TransportRequest)> {
        lock(&self.state).requests.clone()
    }

    #[must_use]
    pub fn pending(&self) -> Vec<TransportJobId> {
        lock(&self.state).pending.iter().copied().collect()
    }

    #[must_use]
    pub fn cancelled(&self) -> Vec<TransportJobId> {
        lock(&self.state).cancelled.clone()
    }

    /// Forget every pending fetch, as a transport restarted without state would
    pub fn drop_pending(&self) {
        lock(&self.state).pending.clear();
    }

    /// Write `bytes` to the request's destination and report it complete
    pub async fn deliver(&self, id: TransportJobId, bytes: &[u8]) -> Option<TransportEvent> {
        let request = {
            let mut state = lock(&self.state);
            if !state.pending.remove(&id) {
                return None;
            }
            state
                .requests
                .iter()
                .find(|(request_id, _)| *request_id == id)
                .map(|(_, request)| request.clone())?
        };

        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent).await.ok()?;
        }
        tokio::fs::write(&request.destination, bytes).await.ok()?;

        let total = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        self.send(TransportEvent::Progress {
            id,
            downloaded_bytes: total,
            total_bytes: Some(total),
        });
        let event = TransportEvent::Completed { id };
        self.send(event.clone());
        Some(event)
    }

    /// Deliver every pending fetch
    pub async fn deliver_all(&self, bytes: &[u8]) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        for id in self.pending() {
            events.extend(self.deliver(id, bytes).await);
        }
        events
    }

    pub fn fail(&self, id: TransportJobId, message: &str) -> Option<TransportEvent> {
        if !lock(&self.state).pending.remove(&id) {
            return None;
        }
        let event = TransportEvent::Failed {
            id,
            message: message.to_string(),
        };
        self.send(event.clone());
        Some(event)
    }

    fn send(&self, event: TransportEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl DownloadTransport for MemoryTransport {
    async fn enqueue(&self, request: TransportRequest) -> Result<TransportJobId, Error> {
        if !self.enqueue_delay.is_zero() {
            tokio::time::sleep(self.enqueue_delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(PlatformError::TransportFailed {
                message: format!("rejected {}", request.url),
            }
            .into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        state.pending.insert(id);
        state.requests.push((id, request));
        Ok(id)
    }

    async fn cancel(&self, ids: &[TransportJobId]) -> Result<(), Error> {
        let mut state = lock(&self.state);
        for id in ids {
            state.pending.remove(id);
            state.cancelled.push(*id);
        }
        Ok(())
    }

    async fn is_pending(&self, id: TransportJobId) -> bool {
        lock(&self.state).pending.contains(&id)
    }
}

/// Committed session as seen by [`MemoryInstaller`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSession {
    pub params: SessionParams,
    pub files: Vec<String>,
}

#[derive(Debug, Default)]
struct InstallerState {
    installed: HashMap<String, i64>,
    commits: Vec<CommittedSession>,
    outcome: Option<(InstallStatus, String)>,
}

/// Installer that broadcasts commit outcomes on the lifecycle channel
#[derive(Debug)]
pub struct MemoryInstaller {
    tx: Option<LifecycleSender>,
    fail_open: AtomicBool,
    conflict_on_open: AtomicBool,
    state: Arc<Mutex<InstallerState>>,
}

impl MemoryInstaller {
    #[must_use]
    pub fn new(tx: Option<LifecycleSender>) -> Self {
        Self {
            tx,
            fail_open: AtomicBool::new(false),
            conflict_on_open: AtomicBool::new(false),
            state: Arc::new(Mutex::new(InstallerState::default())),
        }
    }

    /// Make every following commit fail with `status` and `message`
    pub fn fail_commits(&self, status: InstallStatus, message: &str) {
        lock(&self.state).outcome = Some((status, message.to_string()));
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Reject the next sessions up front as an incompatible update
    pub fn set_conflict_on_open(&self, conflict: bool) {
        self.conflict_on_open.store(conflict, Ordering::SeqCst);
    }

    pub fn set_installed(&self, package: &str, version_code: i64) {
        lock(&self.state)
            .installed
            .insert(package.to_string(), version_code);
    }

    #[must_use]
    pub fn commits(&self) -> Vec<CommittedSession> {
        lock(&self.state).commits.clone()
    }
}

#[async_trait]
impl PackageInstaller for MemoryInstaller {
    async fn open_session(&self, params: SessionParams) -> Result<Box<dyn InstallSession>, Error> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PlatformError::SessionError {
                message: format!("cannot open session for {}", params.package_name),
            }
            .into());
        }
        if self.conflict_on_open.load(Ordering::SeqCst) {
            return Err(InstallError::SignatureConflict {
                package: params.package_name,
                message: "INSTALL_FAILED_UPDATE_INCOMPATIBLE".to_string(),
            }
            .into());
        }
        Ok(Box::new(MemorySession {
            params,
            files: Vec::new(),
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl PackageQuery for MemoryInstaller {
    async fn installed_version(&self, package: &str) -> Result<Option<i64>, Error> {
        Ok(lock(&self.state).installed.get(package).copied())
    }
}

struct MemorySession {
    params: SessionParams,
    files: Vec<String>,
    tx: Option<LifecycleSender>,
    state: Arc<Mutex<InstallerState>>,
}

#[async_trait]
impl InstallSession for MemorySession {
    async fn write(&mut self, name: &str, source: &Path) -> Result<(), Error> {
        tokio::fs::metadata(source)
            .await
            .map_err(|e| Error::io_with_path(&e, source))?;
        self.files.push(name.to_string());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let package = self.params.package_name.clone();
        let event = {
            let mut state = lock(&self.state);
            let event = match state.outcome.clone() {
                Some((status, message)) => PackageLifecycleEvent::InstallFailed {
                    package,
                    status,
                    message,
                },
                None => {
                    state
                        .installed
                        .insert(package.clone(), self.params.version_code);
                    PackageLifecycleEvent::Added { package }
                }
            };
            state.commits.push(CommittedSession {
                params: self.params.clone(),
                files: self.files.clone(),
            });
            event
        };
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
        Ok(())
    }

    async fn abandon(self: Box<Self>) {}
}

/// Network that is reachable until told otherwise
#[derive(Debug)]
pub struct StaticNetwork(AtomicBool);

impl StaticNetwork {
    #[must_use]
    pub fn new(reachable: bool) -> Self {
        Self(AtomicBool::new(reachable))
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.0.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkMonitor for StaticNetwork {
    async fn is_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed amount of free space on every volume
#[derive(Debug)]
pub struct StaticStorage(AtomicU64);

impl StaticStorage {
    #[must_use]
    pub fn new(available: u64) -> Self {
        Self(AtomicU64::new(available))
    }

    pub fn set_available(&self, available: u64) {
        self.0.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProbe for StaticStorage {
    async fn available_bytes(&self, _path: &Path) -> Result<u64, Error> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
enum Resolution {
    PurchaseRequired,
    Failed(String),
    Urls(Vec<String>),
}

/// Catalog that returns a job's own URLs unless told otherwise per package
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    resolutions: Mutex<HashMap<String, Resolution>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_purchase(&self, package: &str) {
        lock(&self.resolutions).insert(package.to_string(), Resolution::PurchaseRequired);
    }

    pub fn fail(&self, package: &str, message: &str) {
        lock(&self.resolutions).insert(package.to_string(), Resolution::Failed(message.to_string()));
    }

    pub fn resolve_to(&self, package: &str, urls: Vec<String>) {
        lock(&self.resolutions).insert(package.to_string(), Resolution::Urls(urls));
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn resolve(&self, job: &Job) -> Result<ResolvedDownload, Error> {
        let resolution = lock(&self.resolutions).get(&job.package_name).cloned();
        match resolution {
            Some(Resolution::PurchaseRequired) => Err(CatalogError::PurchaseRequired {
                package: job.package_name.clone(),
            }
            .into()),
            Some(Resolution::Failed(message)) => Err(CatalogError::ResolutionFailed {
                package: job.package_name.clone(),
                message,
            }
            .into()),
            Some(Resolution::Urls(download_urls)) => Ok(ResolvedDownload {
                download_urls,
                files: job.files.clone(),
            }),
            None => Ok(ResolvedDownload {
                download_urls: job.download_urls.clone(),
                files: job.files.clone(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct StaticAccount(AtomicBool);

impl StaticAccount {
    #[must_use]
    pub fn new(anonymous: bool) -> Self {
        Self(AtomicBool::new(anonymous))
    }

    pub fn set_anonymous(&self, anonymous: bool) {
        self.0.store(anonymous, Ordering::SeqCst);
    }
}

impl AccountSession for StaticAccount {
    fn is_anonymous(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shortcut publisher that keeps shortcuts in memory
#[derive(Debug, Default)]
pub struct MemoryWebApp {
    fail_icon: AtomicBool,
    shortcuts: Mutex<Vec<Shortcut>>,
}

impl MemoryWebApp {
    pub fn set_fail_icon(&self, fail: bool) {
        self.fail_icon.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn shortcuts(&self) -> Vec<Shortcut> {
        lock(&self.shortcuts).clone()
    }
}

#[async_trait]
impl WebAppPublisher for MemoryWebApp {
    async fn fetch_icon(&self, url: &str) -> Result<Vec<u8>, Error> {
        if self.fail_icon.load(Ordering::SeqCst) {
            return Err(PlatformError::ShortcutFailed {
                message: format!("icon unavailable: {url}"),
            }
            .into());
        }
        Ok(b"icon".to_vec())
    }

    async fn publish_shortcut(&self, shortcut: &Shortcut) -> Result<(), Error> {
        lock(&self.shortcuts).push(shortcut.clone());
        Ok(())
    }
}

/// Handles to every fake behind a [`Platform`]
#[derive(Debug, Clone)]
pub struct FakePlatform {
    pub transport: Arc<MemoryTransport>,
    pub installer: Arc<MemoryInstaller>,
    pub network: Arc<StaticNetwork>,
    pub storage: Arc<StaticStorage>,
    pub catalog: Arc<MemoryCatalog>,
    pub account: Arc<StaticAccount>,
    pub webapp: Arc<MemoryWebApp>,
}

impl FakePlatform {
    /// Reachable network, 10 GB free, signed-in account
    #[must_use]
    pub fn new(transport_tx: Option<TransportSender>, lifecycle_tx: Option<LifecycleSender>) -> Self {
        Self::with_transport(MemoryTransport::new(transport_tx), lifecycle_tx)
    }

    #[must_use]
    pub fn with_transport(transport: MemoryTransport, lifecycle_tx: Option<LifecycleSender>) -> Self {
        Self {
            transport: Arc::new(transport),
            installer: Arc::new(MemoryInstaller::new(lifecycle_tx)),
            network: Arc::new(StaticNetwork::new(true)),
            storage: Arc::new(StaticStorage::new(10_000_000_000)),
            catalog: Arc::new(MemoryCatalog::new()),
            account: Arc::new(StaticAccount::new(false)),
            webapp: Arc::new(MemoryWebApp::default()),
        }
    }

    /// # Panics
    ///
    /// Never: every capability is provided.
    #[must_use]
    pub fn platform(&self) -> Platform {
        Platform::builder()
            .with_transport(self.transport.clone())
            .with_installer(self.installer.clone())
            .with_packages(self.installer.clone())
            .with_network(self.network.clone())
            .with_storage(self.storage.clone())
            .with_catalog(self.catalog.clone())
            .with_account(self.account.clone())
            .with_webapp(self.webapp.clone())
            .build()
            .expect("all capabilities provided")
    }
}
