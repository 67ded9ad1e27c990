//! Integration tests for error types

#[cfg(test)]
mod tests {
    use berth_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::NetworkUnavailable;
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(err.user_code(), Some("network.unavailable"));
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::InsufficientSpace {
            missing: 200_000_000,
        };
        assert_eq!(
            err.to_string(),
            "insufficient storage: 200000000 more bytes required"
        );
    }

    #[test]
    fn test_signature_conflict_detection() {
        let err: Error = InstallError::SignatureConflict {
            package: "org.example".into(),
            message: "INSTALL_FAILED_UPDATE_INCOMPATIBLE".into(),
        }
        .into();
        assert!(err.is_signature_conflict());
        assert!(!err.is_retryable());

        let generic: Error = InstallError::SessionFailed {
            package: "org.example".into(),
            message: "io".into(),
        }
        .into();
        assert!(!generic.is_signature_conflict());
        assert!(generic.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let storage_err = StorageError::from_io_with_path(&io_err, std::path::Path::new("/data"));
        assert!(matches!(storage_err, StorageError::PermissionDenied { .. }));
    }
}
