//! Install job record

use crate::status::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier handed back by the download transport for one artifact fetch
pub type TransportJobId = u64;

/// Catalog backend that supplied a job
///
/// Opaque to the pipeline apart from installer attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    SourceA,
    SourceB,
    SourceC,
}

impl Origin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceA => "source_a",
            Self::SourceB => "source_b",
            Self::SourceC => "source_c",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "source_a" => Some(Self::SourceA),
            "source_b" => Some(Self::SourceB),
            "source_c" => Some(Self::SourceC),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a job represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Native,
    #[serde(rename = "webapp")]
    WebApp,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::WebApp => "webapp",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "native" => Some(Self::Native),
            "webapp" => Some(Self::WebApp),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install role of one downloadable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Base,
    Split,
    AuxiliaryAsset,
}

/// Maps an artifact URL to its install role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub url: String,
    pub kind: FileKind,
    pub name: String,
}

/// A persisted unit of install work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub origin: Origin,
    /// Empty for some web-app jobs
    pub package_name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub download_urls: Vec<String>,
    pub files: Vec<FileDescriptor>,
    /// Outstanding transport jobs and whether each has completed.
    /// Only the download coordinator mutates this map.
    pub download_ids: BTreeMap<TransportJobId, bool>,
    pub version_code: i64,
    pub is_free: bool,
    pub app_size: u64,
    pub signature: String,
    pub content_rating_id: String,
    pub content_rating_title: String,
    pub icon_url: Option<String>,
    pub web_url: Option<String>,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            id: String::new(),
            origin: Origin::default(),
            package_name: String::new(),
            display_name: String::new(),
            job_type: JobType::default(),
            status: JobStatus::Queued,
            download_urls: Vec::new(),
            files: Vec::new(),
            download_ids: BTreeMap::new(),
            version_code: 0,
            is_free: true,
            app_size: 0,
            signature: String::new(),
            content_rating_id: String::new(),
            content_rating_title: String::new(),
            icon_url: None,
            web_url: None,
        }
    }
}

impl Job {
    /// Create a native package job
    pub fn native(
        id: impl Into<String>,
        package_name: impl Into<String>,
        download_urls: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            package_name: package_name.into(),
            download_urls,
            ..Self::default()
        }
    }

    /// Create a web-app shortcut job
    pub fn webapp(
        id: impl Into<String>,
        display_name: impl Into<String>,
        web_url: impl Into<String>,
        icon_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            job_type: JobType::WebApp,
            web_url: Some(web_url.into()),
            icon_url: Some(icon_url.into()),
            ..Self::default()
        }
    }

    /// Human-readable title used for transport requests and notices
    #[must_use]
    pub fn title(&self) -> &str {
        if self.display_name.is_empty() {
            &self.package_name
        } else {
            &self.display_name
        }
    }

    /// Number of files expected in the package cache directory once all
    /// artifacts are downloaded. Auxiliary assets live elsewhere.
    #[must_use]
    pub fn expected_package_files(&self) -> usize {
        if self.files.is_empty() {
            self.download_urls.len()
        } else {
            self.files
                .iter()
                .filter(|file| file.kind != FileKind::AuxiliaryAsset)
                .count()
        }
    }

    /// Look up the descriptor for a download URL, if the job carries any
    #[must_use]
    pub fn descriptor_for(&self, url: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|file| file.url == url)
    }

    /// True when every tracked transport job has completed
    #[must_use]
    pub fn downloads_complete(&self) -> bool {
        !self.download_ids.is_empty() && self.download_ids.values().all(|done| *done)
    }

    /// Transport ids that have not reported completion yet
    #[must_use]
    pub fn pending_download_ids(&self) -> Vec<TransportJobId> {
        self.download_ids
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(id, _)| *id)
            .collect()
    }

    #[must_use]
    pub fn tracks_download(&self, id: TransportJobId) -> bool {
        self.download_ids.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_files_skip_auxiliary_assets() {
        let mut job = Job::native(
            "j1",
            "org.example.app",
            vec!["https://a/base".into(), "https://a/obb".into()],
        );
        assert_eq!(job.expected_package_files(), 2);

        job.files = vec![
            FileDescriptor {
                url: "https://a/base".into(),
                kind: FileKind::Base,
                name: "base.apk".into(),
            },
            FileDescriptor {
                url: "https://a/obb".into(),
                kind: FileKind::AuxiliaryAsset,
                name: "main.1.obb".into(),
            },
        ];
        assert_eq!(job.expected_package_files(), 1);
    }

    #[test]
    fn downloads_complete_requires_entries() {
        let mut job = Job::native("j1", "org.example.app", vec![]);
        assert!(!job.downloads_complete());

        job.download_ids.insert(1, true);
        job.download_ids.insert(2, false);
        assert!(!job.downloads_complete());
        assert_eq!(job.pending_download_ids(), vec![2]);

        job.download_ids.insert(2, true);
        assert!(job.downloads_complete());
    }

    #[test]
    fn job_parses_from_toml() {
        let job: Job = toml::from_str(
            r#"
id = "42"
package_name = "org.example.app"
type = "native"
origin = "source_b"
download_urls = ["https://cdn.example/base.apk"]
version_code = 7
app_size = 1024
"#,
        )
        .unwrap();

        assert_eq!(job.origin, Origin::SourceB);
        assert_eq!(job.job_type, JobType::Native);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.is_free);
        assert_eq!(job.title(), "org.example.app");
    }

    #[test]
    fn download_map_survives_json() {
        let mut job = Job::native("j1", "p", vec![]);
        job.download_ids.insert(17, false);
        let json = serde_json::to_string(&job.download_ids).unwrap();
        let back: BTreeMap<TransportJobId, bool> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job.download_ids);
    }
}
