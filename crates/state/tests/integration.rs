//! Integration tests for the job and fault stores

#[cfg(test)]
mod tests {
    use berth_state::*;
    use berth_types::{FaultReason, FaultyPackageRecord, Job, JobStatus, JobTransition};
    use tempfile::TempDir;

    async fn setup() -> (JobStore, FaultStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let (jobs, faults) = open(&temp_dir.path().join("jobs.sqlite")).await.unwrap();
        (jobs, faults, temp_dir)
    }

    fn sample_job(id: &str) -> Job {
        Job::native(
            id,
            "org.example.app",
            vec!["https://cdn.example/base".into(), "https://cdn.example/split".into()],
        )
    }

    #[tokio::test]
    async fn migrations_create_tables() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("jobs.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in ["jobs", "faulty_packages"] {
            let exists: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            )
            .bind(table)
            .fetch_optional(&pool)
            .await
            .unwrap();
            assert!(exists.is_some(), "expected table `{table}` to exist");
        }
    }

    #[tokio::test]
    async fn add_get_and_list_preserve_fields() {
        let (jobs, _, _dir) = setup().await;

        let mut job = sample_job("a");
        job.version_code = 42;
        job.app_size = 700_000_000;
        job.is_free = false;
        job.download_ids.insert(7, false);
        jobs.add(&job).await.unwrap();
        jobs.add(&sample_job("b")).await.unwrap();

        let loaded = jobs.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(loaded, job);

        let all = jobs.get_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(jobs.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_job_type_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("jobs.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let jobs = JobStore::new(pool.clone());
        jobs.add(&sample_job("a")).await.unwrap();

        sqlx::query("UPDATE jobs SET job_type = 'instant' WHERE id = 'a'")
            .execute(&pool)
            .await
            .unwrap();

        let err = jobs.get_by_id("a").await.unwrap_err();
        assert!(matches!(
            err,
            berth_errors::Error::Install(berth_errors::InstallError::UnsupportedJobType { ref job_type, .. })
                if job_type == "instant"
        ));
    }

    #[tokio::test]
    async fn update_missing_job_fails() {
        let (jobs, _, _dir) = setup().await;
        let err = jobs.update(&sample_job("ghost")).await.unwrap_err();
        assert!(matches!(
            err,
            berth_errors::Error::State(berth_errors::StateError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn observe_sees_updates_then_deletion() {
        let (jobs, _, _dir) = setup().await;
        let mut job = sample_job("a");
        jobs.add(&job).await.unwrap();

        let mut rx = jobs.observe("a").await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().status, JobStatus::Queued);

        jobs.transition(&mut job, JobTransition::Await).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().unwrap().status,
            JobStatus::Awaiting
        );

        jobs.delete("a").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn watch_channels_are_released() {
        let (jobs, _, _dir) = setup().await;
        let mut job = sample_job("a");
        jobs.add(&job).await.unwrap();
        jobs.add(&sample_job("b")).await.unwrap();

        let mut rx = jobs.observe("a").await.unwrap();
        drop(jobs.observe("b").await.unwrap());
        assert_eq!(jobs.observer_count(), 2);

        // Nobody listens to "b" anymore
        jobs.update(&sample_job("b")).await.unwrap();
        assert_eq!(jobs.observer_count(), 1);

        jobs.transition(&mut job, JobTransition::Await).await.unwrap();
        assert_eq!(jobs.observer_count(), 1);

        jobs.delete("a").await.unwrap();
        assert_eq!(jobs.observer_count(), 0);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn observe_unknown_job_starts_empty() {
        let (jobs, _, _dir) = setup().await;
        let rx = jobs.observe("nope").await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn invalid_transition_leaves_job_untouched() {
        let (jobs, _, _dir) = setup().await;
        let mut job = sample_job("a");
        jobs.add(&job).await.unwrap();

        assert!(jobs
            .transition(&mut job, JobTransition::CompleteInstall)
            .await
            .is_err());
        assert_eq!(job.status, JobStatus::Queued);
        let stored = jobs.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn leaving_downloading_clears_transport_ids() {
        let (jobs, _, _dir) = setup().await;
        let mut job = sample_job("a");
        jobs.add(&job).await.unwrap();

        jobs.transition(&mut job, JobTransition::Await).await.unwrap();
        jobs.transition(&mut job, JobTransition::StartDownload)
            .await
            .unwrap();
        job.download_ids.insert(1, true);
        job.download_ids.insert(2, true);
        jobs.update(&job).await.unwrap();

        jobs.transition(&mut job, JobTransition::CompleteDownload)
            .await
            .unwrap();
        let stored = jobs.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Downloaded);
        assert!(stored.download_ids.is_empty());
    }

    #[tokio::test]
    async fn status_changes_are_emitted() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, mut rx) = berth_events::channel();
        let (jobs, _) = open(&temp_dir.path().join("jobs.sqlite")).await.unwrap();
        let jobs = jobs.with_event_sender(tx);

        let mut job = sample_job("a");
        jobs.add(&job).await.unwrap();
        jobs.transition(&mut job, JobTransition::Fail).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            berth_events::AppEvent::Queue(berth_events::QueueEvent::StatusChanged {
                from: JobStatus::Queued,
                to: JobStatus::InstallationIssue,
                ..
            })
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            berth_events::AppEvent::Queue(berth_events::QueueEvent::Finished { .. })
        ));
    }

    #[tokio::test]
    async fn faults_record_and_clear() {
        let (_, faults, _dir) = setup().await;

        faults
            .record(&FaultyPackageRecord {
                package_name: "p".into(),
                reason: FaultReason::SignatureMismatch,
                recorded_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let record = faults.get("p").await.unwrap().unwrap();
        assert_eq!(record.reason, FaultReason::SignatureMismatch);
        assert_eq!(faults.list().await.unwrap().len(), 1);

        assert!(faults.clear("p").await.unwrap());
        assert!(!faults.clear("p").await.unwrap());
        assert!(faults.get("p").await.unwrap().is_none());
    }
}
