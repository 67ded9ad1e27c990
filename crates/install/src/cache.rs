//! On-disk layout of downloaded artifacts
//!
//! Package artifacts go to `<cache>/<package>/<package>_<n>.apk`. Auxiliary
//! assets go to `<assets>/<package>/<name>` and are not part of the install
//! session.

use std::path::{Path, PathBuf};

use berth_errors::{Error, InstallError};
use berth_types::Job;
use tracing::debug;

const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    asset_root: PathBuf,
}

impl CacheLayout {
    #[must_use]
    pub fn new(root: PathBuf, asset_root: PathBuf) -> Self {
        Self { root, asset_root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, package: &str) -> Result<PathBuf, Error> {
        Ok(self.root.join(checked(package)?))
    }

    /// Path of the `index`-th package artifact, counting from 1
    pub fn artifact_path(&self, package: &str, index: usize) -> Result<PathBuf, Error> {
        Ok(self
            .package_dir(package)?
            .join(format!("{package}_{index}.apk")))
    }

    pub fn asset_path(&self, package: &str, name: &str) -> Result<PathBuf, Error> {
        let name = checked(name)?;
        Ok(self.asset_root.join(checked(package)?).join(name))
    }

    /// Remove whatever is cached for `package` and recreate an empty directory
    pub async fn reset(&self, package: &str) -> Result<PathBuf, Error> {
        self.clear(package).await?;
        let dir = self.package_dir(package)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        Ok(dir)
    }

    /// Flush the package's cached artifacts
    pub async fn clear(&self, package: &str) -> Result<(), Error> {
        let dir = self.package_dir(package)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(package, "artifact cache flushed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_with_path(&e, &dir)),
        }
    }

    /// Completed artifacts for `package` in download order
    ///
    /// Numbered artifacts sort by their index; anything else follows by name.
    pub async fn list_cached(&self, package: &str) -> Result<Vec<PathBuf>, Error> {
        let dir = self.package_dir(package)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(&e, &dir)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let partial = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
            if entry.file_type().await?.is_file() && !partial {
                files.push(path);
            }
        }
        files.sort_by_cached_key(|path| {
            (artifact_index(path).unwrap_or(usize::MAX), path.clone())
        });
        Ok(files)
    }

    /// Whether every package artifact of `job` is already on disk
    pub async fn is_fully_cached(&self, job: &Job) -> Result<bool, Error> {
        let expected = job.expected_package_files();
        if expected == 0 {
            return Ok(false);
        }
        Ok(self.list_cached(&job.package_name).await?.len() >= expected)
    }
}

/// `n` of a `<package>_<n>.apk` file name
fn artifact_index(path: &Path) -> Option<usize> {
    let stem = path.file_name()?.to_str()?.strip_suffix(".apk")?;
    stem.rsplit_once('_')?.1.parse().ok()
}

fn checked(segment: &str) -> Result<&str, Error> {
    if segment.is_empty()
        || segment.starts_with('.')
        || segment.contains(['/', '\\'])
    {
        return Err(InstallError::InvalidJob {
            job_id: segment.to_string(),
            message: "name is not a valid path segment".to_string(),
        }
        .into());
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reset_and_list_are_deterministic() {
        let temp = TempDir::new().unwrap();
        let cache = CacheLayout::new(temp.path().join("cache"), temp.path().join("assets"));

        let dir = cache.reset("pkg").await.unwrap();
        for name in ["pkg_2.apk", "pkg_1.apk", "pkg_3.apk.part"] {
            tokio::fs::write(dir.join(name), b"x").await.unwrap();
        }

        let listed = cache.list_cached("pkg").await.unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["pkg_1.apk", "pkg_2.apk"]);

        cache.reset("pkg").await.unwrap();
        assert!(cache.list_cached("pkg").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn artifacts_list_in_index_order() {
        let temp = TempDir::new().unwrap();
        let cache = CacheLayout::new(temp.path().join("cache"), temp.path().join("assets"));

        let dir = cache.reset("pkg").await.unwrap();
        for name in ["pkg_10.apk", "pkg_2.apk", "extra.bin", "pkg_1.apk"] {
            tokio::fs::write(dir.join(name), b"x").await.unwrap();
        }

        let names: Vec<_> = cache
            .list_cached("pkg")
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["pkg_1.apk", "pkg_2.apk", "pkg_10.apk", "extra.bin"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let temp = TempDir::new().unwrap();
        let cache = CacheLayout::new(temp.path().to_path_buf(), temp.path().join("assets"));
        assert!(cache.list_cached("nothing").await.unwrap().is_empty());
        cache.clear("nothing").await.unwrap();
    }

    #[test]
    fn artifact_naming() {
        let cache = CacheLayout::new("/c".into(), "/a".into());
        assert_eq!(
            cache.artifact_path("org.x", 2).unwrap(),
            PathBuf::from("/c/org.x/org.x_2.apk")
        );
        assert_eq!(
            cache.asset_path("org.x", "main.obb").unwrap(),
            PathBuf::from("/a/org.x/main.obb")
        );
        assert!(cache.package_dir("../etc").is_err());
    }
}
