#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

//! Contracts for the OS collaborators of the install pipeline.
//!
//! The pipeline never talks to the download manager, the package installer
//! or the network directly. It goes through the traits in this crate:
//! - Download transport with asynchronous completion events
//! - Install sessions whose outcome arrives on the package lifecycle channel
//! - Probes for network reachability, free storage and installed versions
//! - Catalog resolution, account session and web-app shortcut publishing
//!
//! `implementations::local` provides a working implementation of each one
//! backed by HTTP and the local filesystem.

pub mod catalog;
pub mod core;
pub mod implementations;
pub mod installer;
pub mod probe;
pub mod transport;
pub mod webapp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::{Platform, PlatformBuilder};
pub use catalog::{AccountSession, Catalog, ResolvedDownload};
pub use installer::{
    InstallSession, InstallStatus, LifecycleReceiver, LifecycleSender, PackageInstaller,
    PackageLifecycleEvent, PackageQuery, SessionParams,
};
pub use probe::{NetworkMonitor, StorageProbe};
pub use transport::{
    DownloadTransport, TransportEvent, TransportReceiver, TransportRequest, TransportSender,
};
pub use webapp::{Shortcut, WebAppPublisher};
