//! Integration tests for the local platform implementations

#[cfg(test)]
mod tests {
    use berth_platform::implementations::local::{
        DirectoryInstaller, HttpTransport, PassthroughCatalog,
    };
    use berth_platform::*;
    use berth_types::{Job, Origin};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn params(package: &str, version_code: i64, signature: &str) -> SessionParams {
        SessionParams {
            package_name: package.to_string(),
            version_code,
            signature: signature.to_string(),
            attribution: Origin::SourceA,
        }
    }

    async fn install(
        installer: &DirectoryInstaller,
        artifact: &Path,
        version_code: i64,
        signature: &str,
    ) {
        let mut session = installer
            .open_session(params("org.example.app", version_code, signature))
            .await
            .unwrap();
        session.write("base.apk", artifact).await.unwrap();
        session.commit().await.unwrap();
    }

    async fn next_event(rx: &mut LifecycleReceiver) -> PackageLifecycleEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn installer_commit_reports_added_and_records_version() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("a.apk");
        tokio::fs::write(&artifact, b"apk").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let installer = DirectoryInstaller::new(temp.path().join("root"), tx);
        install(&installer, &artifact, 3, "sig-a").await;

        assert_eq!(
            next_event(&mut rx).await,
            PackageLifecycleEvent::Added {
                package: "org.example.app".into()
            }
        );
        assert_eq!(
            installer.installed_version("org.example.app").await.unwrap(),
            Some(3)
        );
        let receipt = installer.receipt("org.example.app").await.unwrap().unwrap();
        assert_eq!(receipt.installer_of_record, Origin::SourceA.as_str());
        assert_eq!(receipt.files, vec!["base.apk".to_string()]);
    }

    #[tokio::test]
    async fn installer_rejects_signature_change_and_downgrade() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("a.apk");
        tokio::fs::write(&artifact, b"apk").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let installer = DirectoryInstaller::new(temp.path().join("root"), tx);
        install(&installer, &artifact, 5, "sig-a").await;
        next_event(&mut rx).await;

        install(&installer, &artifact, 6, "sig-b").await;
        match next_event(&mut rx).await {
            PackageLifecycleEvent::InstallFailed {
                status, message, ..
            } => {
                assert_eq!(status, InstallStatus::Incompatible);
                assert!(status.is_signature_conflict(&message));
            }
            other => panic!("unexpected event {other:?}"),
        }

        install(&installer, &artifact, 4, "sig-a").await;
        match next_event(&mut rx).await {
            PackageLifecycleEvent::InstallFailed { message, .. } => {
                assert!(message.contains(berth_platform::installer::VERSION_DOWNGRADE));
            }
            other => panic!("unexpected event {other:?}"),
        }

        // The original install is untouched
        assert_eq!(
            installer.installed_version("org.example.app").await.unwrap(),
            Some(5)
        );
    }

    #[tokio::test]
    async fn installer_remove_broadcasts() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("a.apk");
        tokio::fs::write(&artifact, b"apk").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let installer = DirectoryInstaller::new(temp.path().join("root"), tx);
        install(&installer, &artifact, 1, "").await;
        next_event(&mut rx).await;

        assert!(installer.remove("org.example.app").await.unwrap());
        assert_eq!(
            next_event(&mut rx).await,
            PackageLifecycleEvent::Removed {
                package: "org.example.app".into()
            }
        );
        assert!(!installer.remove("org.example.app").await.unwrap());
    }

    #[tokio::test]
    async fn installer_rejects_path_like_package_names() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let installer = DirectoryInstaller::new(temp.path().to_path_buf(), tx);
        assert!(installer
            .open_session(params("../escape", 1, ""))
            .await
            .is_err());
    }

    #[test]
    fn status_codes_round_trip_and_classify() {
        for status in [
            InstallStatus::Success,
            InstallStatus::Blocked,
            InstallStatus::Incompatible,
        ] {
            assert_eq!(InstallStatus::from_code(status.code()), status);
        }
        assert!(InstallStatus::Failure
            .is_signature_conflict("Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE: x]"));
        assert!(!InstallStatus::Failure.is_signature_conflict("disk full"));
    }

    #[tokio::test]
    async fn transport_copies_file_urls_and_reports_completion() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        tokio::fs::write(&source, vec![7u8; 128]).await.unwrap();
        let destination = temp.path().join("cache").join("out.apk");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = HttpTransport::new(tx, Duration::from_secs(5)).unwrap();
        let url = format!("file://{}", source.display());
        let id = transport
            .enqueue(TransportRequest {
                url,
                destination: destination.clone(),
                title: "out".into(),
            })
            .await
            .unwrap();

        let mut completed = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            assert_eq!(event.id(), id);
            if let TransportEvent::Progress { total_bytes, .. } = &event {
                assert_eq!(*total_bytes, Some(128));
            }
            if matches!(event, TransportEvent::Completed { .. }) {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert!(!transport.is_pending(id).await);
        assert_eq!(tokio::fs::read(&destination).await.unwrap().len(), 128);
    }

    #[tokio::test]
    async fn transport_rejects_malformed_urls() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = HttpTransport::new(tx, Duration::from_secs(5)).unwrap();
        let result = transport
            .enqueue(TransportRequest {
                url: "not a url".into(),
                destination: "/tmp/x".into(),
                title: String::new(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn passthrough_catalog_classifies_missing_urls() {
        let catalog = PassthroughCatalog;

        let mut paid = Job::native("j", "p", Vec::new());
        paid.is_free = false;
        assert!(matches!(
            catalog.resolve(&paid).await,
            Err(berth_errors::Error::Catalog(
                berth_errors::CatalogError::PurchaseRequired { .. }
            ))
        ));

        let free = Job::native("j", "p", Vec::new());
        assert!(matches!(
            catalog.resolve(&free).await,
            Err(berth_errors::Error::Catalog(
                berth_errors::CatalogError::ResolutionFailed { .. }
            ))
        ));

        let ready = Job::native("j", "p", vec!["https://a/b".into()]);
        assert_eq!(
            catalog.resolve(&ready).await.unwrap().download_urls,
            ready.download_urls
        );
    }

    #[test]
    fn builder_reports_missing_capability() {
        let err = Platform::builder().build().unwrap_err();
        assert!(err.to_string().contains("transport"));
    }
}
