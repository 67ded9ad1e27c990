//! Fixed defaults for berth
//!
//! Paths are relative to the data directory unless overridden in
//! `[paths]`.

pub const APP_DIR_NAME: &str = "berth";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "jobs.sqlite";

pub const CACHE_DIR_NAME: &str = "cache";
pub const ASSET_DIR_NAME: &str = "assets";
pub const INSTALL_DIR_NAME: &str = "installed";
pub const SHORTCUT_DIR_NAME: &str = "shortcuts";
pub const LOGS_DIR_NAME: &str = "logs";

/// Headroom kept free on top of a package's own size, best effort
pub const DEFAULT_STORAGE_HEADROOM_BYTES: u64 = 500_000_000;
/// Pause between marking a web-app job downloading and fetching its icon
pub const DEFAULT_WEBAPP_DOWNLOAD_SETTLE_MS: u64 = 100;
/// Pause between publishing a shortcut and reporting it installed
pub const DEFAULT_WEBAPP_INSTALL_SETTLE_MS: u64 = 500;

pub const DEFAULT_WORK_QUEUE_NAME: &str = "berth-install";
pub const DEFAULT_PROBE_ADDRESS: &str = "1.1.1.1:443";
