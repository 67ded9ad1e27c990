#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Install pipeline orchestration for berth
//!
//! This crate sits between the CLI and the pipeline stages. It admits jobs,
//! runs them through a named work queue one at a time, feeds platform
//! notifications back into the stages and reports batch update results.

mod context;
mod jobfile;
mod listener;
mod processor;
mod scheduler;
mod service;
mod tracker;
mod types;
mod work_queue;

pub use context::{OpsContextBuilder, OpsCtx};
pub use jobfile::{load_job_file, parse_jobs};
pub use listener::{spawn_lifecycle_listener, spawn_transport_listener};
pub use processor::JobProcessor;
pub use scheduler::InstallScheduler;
pub use service::InstallService;
pub use tracker::UpdateCompletionTracker;
pub use types::{EnqueueReport, JobInfo, OperationResult, ProgressReport};
pub use work_queue::{WorkItem, WorkQueue};

use berth_errors::Error;

/// Every persisted job in insertion order
///
/// # Errors
///
/// Returns an error if the records cannot be read.
pub async fn list_jobs(ctx: &OpsCtx) -> Result<OperationResult, Error> {
    let jobs = ctx.jobs.get_all().await?;
    Ok(OperationResult::JobList(jobs.iter().map(JobInfo::from).collect()))
}

/// Recorded signature and version conflicts
///
/// # Errors
///
/// Returns an error if the records cannot be read.
pub async fn list_faults(ctx: &OpsCtx) -> Result<OperationResult, Error> {
    Ok(OperationResult::Faults(ctx.faults.list().await?))
}
