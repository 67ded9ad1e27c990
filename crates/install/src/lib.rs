#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Download and install stages of the berth pipeline
//!
//! This crate turns an accepted job into an installed package: it lays out
//! the artifact cache, dispatches downloads, aggregates their progress,
//! drives the platform install session and keeps track of packages whose
//! installs hit a signature conflict.

mod cache;
mod coordinator;
mod executor;
mod progress;
mod recovery;
mod storage_guard;

pub use cache::CacheLayout;
pub use coordinator::DownloadCoordinator;
pub use executor::InstallExecutor;
pub use progress::{calculate_progress, ProgressSnapshot, ProgressTracker};
pub use recovery::FaultRecovery;
pub use storage_guard::StorageGuard;

// Re-export EventSender for callers wiring the stages together
pub use berth_events::EventSender;
