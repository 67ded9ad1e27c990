//! Integration tests for events

#[cfg(test)]
mod tests {
    use berth_events::*;
    use berth_types::JobStatus;

    #[tokio::test]
    async fn test_event_sender_emit() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            AppEvent::General(GeneralEvent::Error { .. })
        ));
        assert_eq!(first.meta.level, EventLevel::Error);

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[tokio::test]
    async fn test_job_events_carry_correlation_id() {
        let (tx, mut rx) = channel();
        tx.emit_status_changed("job-7", JobStatus::Queued, JobStatus::Awaiting);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.meta.correlation_id.as_deref(), Some("job-7"));
        assert_eq!(message.meta.source, EventSource::QUEUE);
    }

    #[tokio::test]
    async fn test_notices_have_no_correlation_id() {
        let (tx, mut rx) = channel();
        tx.emit_notice(NoticeEvent::LowStorage {
            package: "com.example".to_string(),
            missing: 10,
        });

        let message = rx.recv().await.unwrap();
        assert!(message.meta.correlation_id.is_none());
        assert_eq!(message.meta.level, EventLevel::Warn);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = AppEvent::Download(DownloadEvent::Progress {
            job_id: "j".to_string(),
            percent: 50,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "download");
        assert_eq!(json["event"]["type"], "progress");
        assert_eq!(json["event"]["percent"], 50);
    }
}
