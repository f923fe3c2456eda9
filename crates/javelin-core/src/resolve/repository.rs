//! Maven-layout repositories.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::coordinate::{ArtifactFile, ArtifactKey};
use super::pom::parse_metadata;
use super::version::Version;
use crate::config::RemoteRepository;
use crate::error::{Error, ResolutionError};

/// A source of POMs, metadata and archives in the Maven directory layout.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Whether the repository is skipped in offline mode.
    fn is_remote(&self) -> bool {
        true
    }

    /// Fetch a file by repository-relative path.
    ///
    /// `Ok(None)` means the repository does not have it.
    async fn fetch(&self, path: &str) -> Result<Option<Vec<u8>>, ResolutionError>;

    /// Published versions of an artifact.
    async fn versions(&self, key: &ArtifactKey) -> Result<Vec<Version>, ResolutionError> {
        let path = key.metadata_path();
        match self.fetch(&path).await? {
            Some(bytes) => parse_metadata(&bytes).map_err(|message| ResolutionError::Fetch {
                url: format!("{}:{path}", self.id()),
                message,
                retryable: false,
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// A remote repository reached over HTTP(S).
pub struct HttpRepository {
    id: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpRepository {
    pub fn new(remote: &RemoteRepository, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("javelin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            id: remote.id.clone(),
            base_url: remote.url.clone(),
            client,
        })
    }
}

#[async_trait]
impl Repository for HttpRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, path: &str) -> Result<Option<Vec<u8>>, ResolutionError> {
        let url = format!("{}/{path}", self.base_url);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolutionError::Fetch {
                url: url.clone(),
                message: e.to_string(),
                retryable: e.is_timeout() || e.is_connect() || e.is_request(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ResolutionError::Fetch {
                url,
                message: format!("HTTP {status}"),
                retryable: status.is_server_error()
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            });
        }

        let bytes = response.bytes().await.map_err(|e| ResolutionError::Fetch {
            url: url.clone(),
            message: e.to_string(),
            retryable: true,
        })?;
        Ok(Some(bytes.to_vec()))
    }
}

/// A local repository such as `~/.m2/repository`.
pub struct LocalRepository {
    id: String,
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            id: "local".to_string(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn fetch(&self, path: &str) -> Result<Option<Vec<u8>>, ResolutionError> {
        let full = self.root.join(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ResolutionError::Fetch {
                url: full.display().to_string(),
                message: e.to_string(),
                retryable: false,
            }),
        }
    }

    /// Version directories that actually contain a POM. Local repositories
    /// rarely carry complete metadata files.
    async fn versions(&self, key: &ArtifactKey) -> Result<Vec<Version>, ResolutionError> {
        let dir = self.root.join(key.repository_dir());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ResolutionError::Fetch {
                    url: dir.display().to_string(),
                    message: e.to_string(),
                    retryable: false,
                });
            }
        };

        let mut versions = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let version = Version::new(name.as_str());
            let pom = ArtifactFile::pom(key, &version);
            if entry.path().join(pom.file_name()).is_file() {
                versions.push(version);
            }
        }
        Ok(versions)
    }
}

/// An in-memory repository for tests and embedding.
///
/// Every `fetch` and `versions` call is counted, and transient failures can
/// be scripted per path.
#[derive(Default)]
pub struct MemoryRepository {
    id: String,
    files: DashMap<String, Vec<u8>>,
    failures: DashMap<String, u32>,
    requests: AtomicUsize,
}

impl MemoryRepository {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Store a file at a repository-relative path.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    /// Publish a POM for `group:artifact:version`.
    pub fn publish_pom(&self, group: &str, artifact: &str, version: &str, xml: &str) {
        let file = ArtifactFile::pom(&ArtifactKey::new(group, artifact), &Version::new(version));
        self.insert(file.repository_path(), xml.as_bytes().to_vec());
    }

    /// Publish a jar for `group:artifact:version`.
    pub fn publish_jar(&self, group: &str, artifact: &str, version: &str, bytes: &[u8]) {
        let file = ArtifactFile {
            key: ArtifactKey::new(group, artifact),
            version: Version::new(version),
            classifier: None,
            extension: "jar".to_string(),
        };
        self.insert(file.repository_path(), bytes.to_vec());
    }

    /// Fail the next `times` fetches of `path` with a retryable error.
    pub fn fail_next(&self, path: impl Into<String>, times: u32) {
        self.failures.insert(path.into(), times);
    }

    /// Number of requests served so far, failed ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn fetch(&self, path: &str) -> Result<Option<Vec<u8>>, ResolutionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(mut remaining) = self.failures.get_mut(path)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ResolutionError::Fetch {
                url: format!("memory://{}/{path}", self.id),
                message: "scripted transient failure".to_string(),
                retryable: true,
            });
        }

        Ok(self.files.get(path).map(|bytes| bytes.value().clone()))
    }

    async fn versions(&self, key: &ArtifactKey) -> Result<Vec<Version>, ResolutionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let prefix = format!("{}/", key.repository_dir());
        let names: BTreeSet<String> = self
            .files
            .iter()
            .filter_map(|entry| {
                let rest = entry.key().strip_prefix(&prefix)?;
                let (version, file) = rest.split_once('/')?;
                file.ends_with(".pom").then(|| version.to_string())
            })
            .collect();
        Ok(names.into_iter().map(Version::new).collect())
    }
}
