//! Local implementations backed by HTTP and the filesystem

mod catalog;
mod installer;
mod probes;
mod transport;
mod webapp;

pub use catalog::{ConfigAccount, PassthroughCatalog};
pub use installer::{DirectoryInstaller, InstallReceipt};
pub use probes::{SysinfoStorageProbe, TcpReachability};
pub use transport::HttpTransport;
pub use webapp::FsShortcutPublisher;

use berth_errors::{Error, NetworkError};
use reqwest::Url;
use std::path::{Path, PathBuf};

/// Sibling path used while a file is still being written
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, Error> {
    Url::parse(raw).map_err(|e| NetworkError::InvalidUrl(format!("{raw}: {e}")).into())
}

/// Local path for a `file://` URL, `None` for any other scheme
pub(crate) fn local_source(url: &Url) -> Result<Option<PathBuf>, Error> {
    if url.scheme() != "file" {
        return Ok(None);
    }
    url.to_file_path()
        .map(Some)
        .map_err(|()| NetworkError::InvalidUrl(url.to_string()).into())
}

pub(crate) fn map_reqwest_error(url: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
        .into()
    } else {
        NetworkError::DownloadFailed(err.to_string()).into()
    }
}
