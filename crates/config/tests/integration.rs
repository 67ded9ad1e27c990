//! Integration tests for config

#[cfg(test)]
mod tests {
    use berth_config::*;
    use berth_types::{ColorChoice, OutputFormat};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[paths]
data_dir = "/var/lib/berth"
asset_dir = "/sdcard/obb"

[pipeline]
storage_headroom_bytes = 1000
webapp_install_settle_ms = 5

[account]
anonymous = false
name = "ops@example.com"
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.pipeline.storage_headroom_bytes, 1000);
        assert_eq!(config.pipeline.webapp_install_settle_ms, 5);
        assert_eq!(
            config.pipeline.webapp_download_settle_ms,
            constants::DEFAULT_WEBAPP_DOWNLOAD_SETTLE_MS
        );
        assert!(!config.account.anonymous);
        assert_eq!(config.asset_dir(), PathBuf::from("/sdcard/obb"));
        assert_eq!(
            config.cache_dir(),
            PathBuf::from("/var/lib/berth").join(constants::CACHE_DIR_NAME)
        );
        assert_eq!(
            config.db_path(),
            PathBuf::from("/var/lib/berth").join(constants::DB_FILE_NAME)
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pipeline.storage_headroom_bytes, 500_000_000);
        assert_eq!(config.pipeline.webapp_download_settle_ms, 100);
        assert_eq!(config.pipeline.webapp_install_settle_ms, 500);
        assert!(config.account.anonymous);
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::remove_var("BERTH_OUTPUT");
        std::env::remove_var("BERTH_STORAGE_HEADROOM");

        std::env::set_var("BERTH_OUTPUT", "json");
        std::env::set_var("BERTH_STORAGE_HEADROOM", "42");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.pipeline.storage_headroom_bytes, 42);

        std::env::remove_var("BERTH_OUTPUT");
        std::env::remove_var("BERTH_STORAGE_HEADROOM");
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::remove_var("BERTH_ANONYMOUS");
        std::env::set_var("BERTH_ANONYMOUS", "maybe");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        std::env::remove_var("BERTH_ANONYMOUS");
    }
}
