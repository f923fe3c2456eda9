//! Kernel configuration.
//!
//! Defaults are usable as-is; `from_env()` layers environment overrides on top
//! and the CLI applies its flags last.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Maven Central, consulted after the local repository.
pub const MAVEN_CENTRAL: &str = "https://repo.maven.apache.org/maven2";

/// A remote Maven repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    /// Repository id (used in logs only).
    pub id: String,
    /// Base URL of the Maven layout.
    pub url: String,
}

impl RemoteRepository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Maven Central.
    pub fn central() -> Self {
        Self::new("central", MAVEN_CENTRAL)
    }
}

/// Retry schedule for retryable fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl RetryPolicy {
    /// No retries and no delay.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

/// Configuration shared by the resolver and every session.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Root of the content-addressed artifact cache and the worker runtime.
    pub cache_dir: PathBuf,

    /// Local Maven repository consulted before any remote one.
    pub local_repository: Option<PathBuf>,

    /// Remote repositories, in lookup order.
    pub repositories: Vec<RemoteRepository>,

    /// Skip remote repositories entirely.
    pub offline: bool,

    /// Retry schedule for remote fetches.
    pub retry: RetryPolicy,

    /// Timeout for a single HTTP request.
    pub http_timeout: Duration,

    /// Explicit JDK location (otherwise JAVA_HOME, then PATH).
    pub java_home: Option<PathBuf>,

    /// Import the usual `java.util.*`-style prelude into every cell.
    pub default_imports: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("javelin");
        let local_repository = dirs::home_dir()
            .map(|home| home.join(".m2").join("repository"))
            .filter(|path| path.is_dir());

        Self {
            cache_dir,
            local_repository,
            repositories: vec![RemoteRepository::central()],
            offline: false,
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(30),
            java_home: None,
            default_imports: true,
        }
    }
}

impl KernelConfig {
    /// Defaults plus environment overrides.
    ///
    /// Recognized variables: `JAVELIN_CACHE_DIR`, `JAVELIN_JAVA_HOME`,
    /// `JAVELIN_REPOSITORIES` (comma-separated URLs, replacing the defaults)
    /// and `JAVELIN_OFFLINE` (`1`/`true`).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("JAVELIN_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(home) = std::env::var("JAVELIN_JAVA_HOME") {
            config.java_home = Some(PathBuf::from(home));
        }
        if let Ok(list) = std::env::var("JAVELIN_REPOSITORIES") {
            config.repositories = parse_repository_list(&list)?;
        }
        if let Ok(flag) = std::env::var("JAVELIN_OFFLINE") {
            config.offline = matches!(flag.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Config for tests and embedding: private cache, no local repository,
    /// no remotes, no retry delay.
    pub fn isolated(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            local_repository: None,
            repositories: Vec::new(),
            offline: true,
            retry: RetryPolicy::none(),
            ..Self::default()
        }
    }

    /// Directory holding content-addressed artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        self.cache_dir.join("artifacts")
    }

    /// Directory holding compiled worker runtimes.
    pub fn runtime_dir(&self) -> PathBuf {
        self.cache_dir.join("runtime")
    }
}

fn parse_repository_list(list: &str) -> Result<Vec<RemoteRepository>> {
    let mut repositories = Vec::new();
    for (index, url) in list.split(',').map(str::trim).enumerate() {
        if url.is_empty() {
            continue;
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "repository URL must be http(s): {url}"
            )));
        }
        repositories.push(RemoteRepository::new(format!("repo{index}"), url));
    }
    Ok(repositories)
}
