//! End-to-end tests for the install pipeline

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::time::Duration;

    use berth_config::Config;
    use berth_events::{AppEvent, EventMessage, NoticeEvent, QueueEvent};
    use berth_install::CacheLayout;
    use berth_ops::*;
    use berth_platform::testing::FakePlatform;
    use berth_platform::{InstallStatus, LifecycleReceiver, TransportReceiver};
    use berth_state::open;
    use berth_types::{FaultReason, FaultyPackageRecord, Job, JobStatus, JobTransition};
    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Harness {
        service: InstallService,
        ctx: OpsCtx,
        fakes: FakePlatform,
        cache: CacheLayout,
        events: UnboundedReceiver<EventMessage>,
        channels: Option<(TransportReceiver, LifecycleReceiver)>,
        _dir: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = Config::default();
            config.paths.data_dir = Some(dir.path().to_path_buf());
            config.pipeline.webapp_download_settle_ms = 0;
            config.pipeline.webapp_install_settle_ms = 0;

            let (tx, events) = berth_events::channel();
            let (transport_tx, transport_rx) = mpsc::unbounded_channel();
            let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
            let fakes = FakePlatform::new(Some(transport_tx), Some(lifecycle_tx));

            let (jobs, faults) = open(&config.db_path()).await.unwrap();
            let ctx = OpsContextBuilder::new()
                .with_jobs(jobs)
                .with_faults(faults)
                .with_platform(fakes.platform())
                .with_event_sender(tx)
                .with_config(config)
                .build()
                .unwrap();

            Self {
                service: InstallService::new(ctx.clone()),
                cache: ctx.cache(),
                ctx,
                fakes,
                events,
                channels: Some((transport_rx, lifecycle_rx)),
                _dir: dir,
            }
        }

        async fn started() -> Self {
            let mut harness = Self::new().await;
            harness.start().await;
            harness
        }

        async fn start(&mut self) -> usize {
            let (transport_rx, lifecycle_rx) = self.channels.take().unwrap();
            self.service.start(transport_rx, lifecycle_rx).await.unwrap()
        }

        async fn status(&self, id: &str) -> Option<JobStatus> {
            self.ctx.jobs.get_by_id(id).await.unwrap().map(|job| job.status)
        }

        async fn wait_idle(&self) {
            tokio::time::timeout(Duration::from_secs(10), self.service.wait_idle())
                .await
                .expect("work queue did not drain");
        }

        async fn wait_for_pending(&self, count: usize) {
            let transport = self.fakes.transport.clone();
            eventually(|| {
                let transport = transport.clone();
                async move { transport.pending().len() == count }
            })
            .await;
        }

        fn drain(&mut self) -> Vec<AppEvent> {
            let mut out = Vec::new();
            while let Ok(message) = self.events.try_recv() {
                out.push(message.event);
            }
            out
        }
    }

    async fn eventually<F, Fut>(check: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..500 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn native_job(id: &str, package: &str, urls: usize) -> Job {
        let urls = (0..urls)
            .map(|n| format!("https://cdn.example/{package}/{n}"))
            .collect();
        let mut job = Job::native(id, package, urls);
        job.version_code = 7;
        job.app_size = 1_000;
        job
    }

    #[tokio::test]
    async fn no_network_leaves_issue_and_empty_cache() {
        let mut h = Harness::started().await;
        h.fakes.network.set_reachable(false);

        assert!(!h.service.enqueue(native_job("j1", "org.app", 2)).await);

        assert_eq!(h.status("j1").await, Some(JobStatus::InstallationIssue));
        assert_eq!(h.ctx.jobs.get_all().await.unwrap().len(), 1);
        assert!(h.cache.list_cached("org.app").await.unwrap().is_empty());
        assert!(h.fakes.transport.requests().is_empty());
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::Notice(NoticeEvent::NetworkUnavailable { .. }))));
    }

    #[tokio::test]
    async fn successful_install_deletes_the_record() {
        let h = Harness::started().await;

        assert!(h.service.enqueue(native_job("j1", "org.app", 2)).await);
        h.wait_for_pending(2).await;
        h.fakes.transport.deliver_all(b"apk").await;
        h.wait_idle().await;

        assert!(h.ctx.jobs.get_all().await.unwrap().is_empty());
        let commits = h.fakes.installer.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].files.len(), 2);
        assert!(h.cache.list_cached("org.app").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn signature_conflict_records_fault_and_notifies_once() {
        let mut h = Harness::started().await;
        h.fakes.installer.fail_commits(
            InstallStatus::Incompatible,
            "INSTALL_FAILED_UPDATE_INCOMPATIBLE: existing package signed differently",
        );

        assert!(h.service.enqueue(native_job("j1", "p", 2)).await);
        h.wait_for_pending(2).await;
        h.fakes.transport.deliver_all(b"apk").await;
        h.wait_idle().await;

        assert_eq!(h.status("j1").await, Some(JobStatus::InstallationIssue));
        let faults = h.service.faults().await.unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].package_name, "p");

        let mismatches = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AppEvent::Notice(NoticeEvent::SignatureMismatch { .. })))
            .count();
        assert_eq!(mismatches, 1);
    }

    #[tokio::test]
    async fn duplicate_enqueue_while_live_is_rejected() {
        let h = Harness::started().await;

        assert!(h.service.enqueue(native_job("j1", "org.app", 2)).await);
        h.wait_for_pending(2).await;

        assert!(!h.service.enqueue(native_job("j1", "org.app", 2)).await);
        assert_eq!(h.fakes.transport.requests().len(), 2);
        assert_eq!(h.status("j1").await, Some(JobStatus::Downloading));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueue_of_one_id_admits_once() {
        let h = Harness::started().await;

        let first = tokio::spawn({
            let service = h.service.clone();
            async move { service.enqueue(native_job("j1", "org.app", 2)).await }
        });
        let second = tokio::spawn({
            let service = h.service.clone();
            async move { service.enqueue(native_job("j1", "org.app", 2)).await }
        });
        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        assert!(first ^ second, "accepted=({first}, {second})");
        h.wait_for_pending(2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.fakes.transport.requests().len(), 2);
        assert_eq!(h.status("j1").await, Some(JobStatus::Downloading));
    }

    #[tokio::test]
    async fn faulty_package_is_held_until_cleared() {
        let mut h = Harness::started().await;
        h.ctx
            .faults
            .record(&FaultyPackageRecord {
                package_name: "org.app".to_string(),
                reason: FaultReason::SignatureMismatch,
                recorded_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        assert!(!h.service.enqueue(native_job("j1", "org.app", 1)).await);
        assert_eq!(
            h.service.update_all(vec![native_job("j2", "org.app", 1)]).await,
            0
        );
        assert!(h.fakes.transport.requests().is_empty());
        assert_eq!(h.status("j1").await, None);

        let mismatches = h
            .drain()
            .into_iter()
            .filter(|e| {
                matches!(e, AppEvent::Notice(NoticeEvent::SignatureMismatch { package }) if package == "org.app")
            })
            .count();
        assert_eq!(mismatches, 2);

        h.ctx.faults.clear("org.app").await.unwrap();
        assert!(h.service.enqueue(native_job("j1", "org.app", 1)).await);
        h.wait_for_pending(1).await;
    }

    #[tokio::test]
    async fn issue_can_be_requeued_explicitly() {
        let h = Harness::started().await;
        h.fakes.network.set_reachable(false);
        assert!(!h.service.enqueue(native_job("j1", "org.app", 1)).await);

        h.fakes.network.set_reachable(true);
        assert!(h.service.enqueue(native_job("j1", "org.app", 1)).await);
        h.wait_for_pending(1).await;
        h.fakes.transport.deliver_all(b"apk").await;
        h.wait_idle().await;

        assert_eq!(h.status("j1").await, None);
    }

    #[tokio::test]
    async fn paid_package_needs_an_account() {
        let mut h = Harness::started().await;
        h.fakes.account.set_anonymous(true);
        let mut job = native_job("j1", "org.paid", 1);
        job.is_free = false;

        assert!(!h.service.enqueue(job).await);
        assert_eq!(h.status("j1").await, None);
        assert!(h.drain().iter().any(|e| matches!(
            e,
            AppEvent::Notice(NoticeEvent::PurchaseRequiresAccount { .. })
        )));
    }

    #[tokio::test]
    async fn purchase_required_is_persisted_without_dispatch() {
        let mut h = Harness::started().await;
        h.fakes.catalog.require_purchase("org.paid");

        assert!(!h.service.enqueue(native_job("j1", "org.paid", 1)).await);
        assert_eq!(h.status("j1").await, Some(JobStatus::PurchaseNeeded));
        assert!(h.fakes.transport.requests().is_empty());
        assert!(h.drain().iter().any(|e| matches!(
            e,
            AppEvent::Notice(NoticeEvent::PurchaseFlowRequired { .. })
        )));
    }

    #[tokio::test]
    async fn resolution_failure_is_not_persisted() {
        let mut h = Harness::started().await;
        h.fakes.catalog.fail("org.app", "catalog offline");

        assert!(!h.service.enqueue(native_job("j1", "org.app", 1)).await);
        assert_eq!(h.status("j1").await, None);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::Notice(NoticeEvent::LoadError { .. }))));
    }

    #[tokio::test]
    async fn low_storage_reports_missing_bytes() {
        let mut h = Harness::started().await;
        h.fakes.storage.set_available(1_000_000_000);
        let mut job = native_job("j1", "org.big", 1);
        job.app_size = 700_000_000;

        assert!(!h.service.enqueue(job).await);
        assert_eq!(h.status("j1").await, Some(JobStatus::InstallationIssue));
        let missing = h.drain().into_iter().find_map(|e| match e {
            AppEvent::Notice(NoticeEvent::LowStorage { missing, .. }) => Some(missing),
            _ => None,
        });
        assert_eq!(missing, Some(200_000_000));
    }

    #[tokio::test]
    async fn cancel_removes_downloads_record_and_cache() {
        let mut h = Harness::started().await;

        assert!(h.service.enqueue(native_job("j1", "org.app", 2)).await);
        h.wait_for_pending(2).await;
        let ids = h.fakes.transport.pending();

        assert!(h.service.cancel("j1").await.unwrap());
        h.wait_idle().await;

        assert_eq!(h.status("j1").await, None);
        let mut cancelled = h.fakes.transport.cancelled();
        cancelled.sort_unstable();
        assert_eq!(cancelled, ids);
        assert!(!h.cache.package_dir("org.app").unwrap().exists());
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, AppEvent::Queue(QueueEvent::Cancelled { .. }))));
        assert!(!h.service.cancel("j1").await.unwrap());
    }

    #[tokio::test]
    async fn cancel_keeps_installation_issue_visible() {
        let h = Harness::started().await;
        h.fakes.network.set_reachable(false);
        assert!(!h.service.enqueue(native_job("j1", "org.app", 1)).await);

        assert!(h.service.cancel("j1").await.unwrap());
        assert_eq!(h.status("j1").await, Some(JobStatus::InstallationIssue));
    }

    #[tokio::test]
    async fn update_batch_announces_once_when_drained() {
        let mut h = Harness::started().await;

        let accepted = h
            .service
            .update_all(vec![native_job("a", "org.a", 1), native_job("b", "org.b", 1)])
            .await;
        assert_eq!(accepted, 2);

        for _ in 0..2 {
            h.wait_for_pending(1).await;
            h.fakes.transport.deliver_all(b"apk").await;
        }
        h.wait_idle().await;

        let summaries: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::Notice(NoticeEvent::UpdatesCompleted {
                    count, packages, ..
                }) => Some((count, packages)),
                _ => None,
            })
            .collect();
        assert_eq!(
            summaries,
            vec![(2, vec!["org.a".to_string(), "org.b".to_string()])]
        );
    }

    #[tokio::test]
    async fn parked_jobs_do_not_delay_update_summary() {
        let mut h = Harness::started().await;
        for (id, status) in [("blocked", JobStatus::Blocked), ("gone", JobStatus::Unavailable)] {
            let mut job = native_job(id, &format!("org.{id}"), 1);
            job.status = status;
            h.ctx.jobs.add(&job).await.unwrap();
        }

        assert_eq!(h.service.update_all(vec![native_job("a", "org.a", 1)]).await, 1);
        h.wait_for_pending(1).await;
        h.fakes.transport.deliver_all(b"apk").await;
        h.wait_idle().await;

        let summaries = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AppEvent::Notice(NoticeEvent::UpdatesCompleted { count: 1, .. })))
            .count();
        assert_eq!(summaries, 1);
        assert_eq!(h.status("blocked").await, Some(JobStatus::Blocked));
    }

    #[tokio::test]
    async fn webapp_job_publishes_shortcut() {
        let h = Harness::started().await;
        let job = Job::webapp("w1", "Example", "https://app.example", "https://app.example/i.png");

        assert!(h.service.enqueue(job).await);
        h.wait_idle().await;

        assert_eq!(h.status("w1").await, None);
        assert_eq!(h.fakes.webapp.shortcuts().len(), 1);
    }

    #[tokio::test]
    async fn cached_but_not_installed_skips_download() {
        let h = Harness::started().await;
        let dir = h.cache.reset("org.app").await.unwrap();
        tokio::fs::write(dir.join("org.app_1.apk"), b"apk").await.unwrap();

        assert!(h.service.enqueue(native_job("j1", "org.app", 1)).await);
        h.wait_idle().await;

        assert!(h.fakes.transport.requests().is_empty());
        assert_eq!(h.fakes.installer.commits().len(), 1);
        assert_eq!(h.status("j1").await, None);
    }

    #[tokio::test]
    async fn start_resumes_persisted_jobs() {
        let mut h = Harness::new().await;

        let queued = native_job("queued", "org.q", 1);
        h.ctx.jobs.add(&queued).await.unwrap();

        let mut lost = native_job("lost", "org.l", 1);
        lost.status = JobStatus::Awaiting;
        h.ctx.jobs.add(&lost).await.unwrap();
        h.ctx
            .jobs
            .transition(&mut lost, JobTransition::StartDownload)
            .await
            .unwrap();
        lost.download_ids.insert(999, false);
        h.ctx.jobs.update(&lost).await.unwrap();

        assert_eq!(h.start().await, 1);
        assert_eq!(h.status("lost").await, Some(JobStatus::InstallationIssue));

        h.wait_for_pending(1).await;
        h.fakes.transport.deliver_all(b"apk").await;
        h.wait_idle().await;
        assert_eq!(h.status("queued").await, None);
    }

    #[tokio::test]
    async fn progress_query_uses_job_transport_ids() {
        let h = Harness::started().await;
        assert_eq!(h.service.progress("missing").await.unwrap(), (1, 0));

        assert!(h.service.enqueue(native_job("j1", "org.app", 1)).await);
        h.wait_for_pending(1).await;
        assert_eq!(h.service.progress("j1").await.unwrap(), (1, 0));
    }

    #[tokio::test]
    async fn listing_reports_every_record() {
        let h = Harness::started().await;
        h.fakes.network.set_reachable(false);
        h.service.enqueue(native_job("a", "org.a", 1)).await;
        h.service.enqueue(native_job("b", "org.b", 1)).await;

        let OperationResult::JobList(jobs) = list_jobs(&h.ctx).await.unwrap() else {
            panic!("expected a job list");
        };
        let ids: Vec<_> = jobs.iter().map(|job| job.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(jobs.iter().all(|job| job.status == JobStatus::InstallationIssue));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const TRANSITIONS: [JobTransition; 11] = [
            JobTransition::Requeue,
            JobTransition::Await,
            JobTransition::StartDownload,
            JobTransition::CompleteDownload,
            JobTransition::StartInstall,
            JobTransition::RecoverInstall,
            JobTransition::CompleteInstall,
            JobTransition::Fail,
            JobTransition::RequirePurchase,
            JobTransition::MarkUnavailable,
            JobTransition::Block,
        ];

        #[derive(Debug, Clone)]
        enum External {
            DownloadComplete(usize),
            DownloadFailed(usize),
            Cancel,
        }

        fn external() -> impl Strategy<Value = External> {
            prop_oneof![
                4 => (0usize..3).prop_map(External::DownloadComplete),
                1 => (0usize..3).prop_map(External::DownloadFailed),
                1 => Just(External::Cancel),
            ]
        }

        fn is_edge(from: JobStatus, to: JobStatus) -> bool {
            TRANSITIONS
                .iter()
                .any(|t| matches!(from.apply(*t), Ok(next) if next == to))
        }

        async fn run(events: Vec<External>, conflict: bool) -> Vec<(JobStatus, JobStatus)> {
            let mut h = Harness::started().await;
            if conflict {
                h.fakes
                    .installer
                    .fail_commits(InstallStatus::Incompatible, "INSTALL_FAILED_UPDATE_INCOMPATIBLE");
            }
            assert!(h.service.enqueue(native_job("j1", "org.app", 3)).await);
            h.wait_for_pending(3).await;

            for event in events {
                let pending = h.fakes.transport.pending();
                match event {
                    External::DownloadComplete(n) if !pending.is_empty() => {
                        h.fakes.transport.deliver(pending[n % pending.len()], b"apk").await;
                    }
                    External::DownloadFailed(n) if !pending.is_empty() => {
                        h.fakes.transport.fail(pending[n % pending.len()], "reset");
                    }
                    External::Cancel => {
                        h.service.cancel("j1").await.unwrap();
                    }
                    _ => {}
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            h.fakes.transport.deliver_all(b"apk").await;
            h.wait_idle().await;

            let final_status = h.status("j1").await;
            assert!(final_status.is_none_or(JobStatus::is_terminal));

            h.drain()
                .into_iter()
                .filter_map(|e| match e {
                    AppEvent::Queue(QueueEvent::StatusChanged { from, to, .. }) => Some((from, to)),
                    _ => None,
                })
                .collect()
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn external_events_only_follow_the_graph(
                events in proptest::collection::vec(external(), 0..8),
                conflict in any::<bool>(),
            ) {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let changes = runtime.block_on(run(events, conflict));
                for (from, to) in changes {
                    prop_assert!(is_edge(from, to), "illegal change {} -> {}", from, to);
                }
            }
        }
    }
}
