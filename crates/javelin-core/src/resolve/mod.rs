//! Dependency resolution against Maven repositories.
//!
//! The resolver turns coordinates into a deduplicated list of local archive
//! locations: it picks concrete versions, walks the transitive closure of
//! POM dependencies, settles version disagreements and downloads archives
//! into the content-addressed [`ArtifactCache`].
//!
//! Metadata, POMs, archive locations and whole results are cached for the
//! lifetime of the resolver, which is meant to be shared between sessions
//! through an `Arc`.

pub mod cache;
pub mod coordinate;
pub mod pom;
pub mod repository;
pub mod version;

pub use cache::ArtifactCache;
pub use coordinate::{ArtifactFile, ArtifactKey, Coordinate, ResolvedArtifact};
pub use repository::{HttpRepository, LocalRepository, MemoryRepository, Repository};
pub use version::{Version, VersionSpec};

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::{KernelConfig, RemoteRepository, RetryPolicy};
use crate::error::{Error, ResolutionError};
use pom::{EffectivePom, Exclusion, Pom};

/// Upper bound on selection passes. Each restart raises one artifact's floor
/// version, so real graphs converge in a handful.
const MAX_PASSES: usize = 32;

/// Upper bound on parent/BOM nesting.
const MAX_POM_DEPTH: usize = 24;

/// Resolves coordinates to local archives.
pub struct Resolver {
    repositories: RwLock<Vec<Arc<dyn Repository>>>,
    cache: ArtifactCache,
    offline: bool,
    retry: RetryPolicy,
    http_timeout: Duration,
    versions: DashMap<ArtifactKey, Arc<Vec<Version>>>,
    poms: DashMap<(ArtifactKey, Version), Arc<EffectivePom>>,
    artifacts: DashMap<ArtifactFile, PathBuf>,
    results: DashMap<String, Arc<Vec<ResolvedArtifact>>>,
}

/// A node chosen during one selection pass.
#[derive(Debug, Clone)]
struct Selection {
    version: Version,
    packaging: String,
    classifier: Option<String>,
    expanded: bool,
}

enum Pass {
    Done(IndexMap<ArtifactKey, Selection>),
    Restart(ArtifactKey, Version),
}

impl Resolver {
    /// Build a resolver for the configured local and remote repositories.
    pub fn new(config: &KernelConfig) -> Result<Self, Error> {
        let mut repositories: Vec<Arc<dyn Repository>> = Vec::new();
        if let Some(local) = &config.local_repository {
            repositories.push(Arc::new(LocalRepository::new(local)));
        }
        for remote in &config.repositories {
            repositories.push(Arc::new(HttpRepository::new(remote, config.http_timeout)?));
        }
        Ok(Self::with_repositories(config, repositories))
    }

    /// Build a resolver over an explicit repository list.
    pub fn with_repositories(config: &KernelConfig, repositories: Vec<Arc<dyn Repository>>) -> Self {
        Self {
            repositories: RwLock::new(repositories),
            cache: ArtifactCache::new(config.artifact_dir()),
            offline: config.offline,
            retry: config.retry,
            http_timeout: config.http_timeout,
            versions: DashMap::new(),
            poms: DashMap::new(),
            artifacts: DashMap::new(),
            results: DashMap::new(),
        }
    }

    /// Append a repository to the lookup order.
    ///
    /// Cached version listings and results may be incomplete without the new
    /// repository, so they are dropped. POMs and archives stay cached.
    pub fn add_repository(&self, repository: Arc<dyn Repository>) {
        info!("Adding repository '{}'", repository.id());
        if let Ok(mut repositories) = self.repositories.write() {
            repositories.push(repository);
        }
        self.versions.clear();
        self.results.clear();
    }

    /// Remove a repository added earlier, matched by identity.
    pub fn remove_repository(&self, repository: &Arc<dyn Repository>) {
        info!("Removing repository '{}'", repository.id());
        if let Ok(mut repositories) = self.repositories.write() {
            repositories.retain(|r| !Arc::ptr_eq(r, repository));
        }
        self.versions.clear();
        self.results.clear();
    }

    /// Build an HTTP repository with this resolver's settings, without
    /// adding it.
    pub fn remote(&self, remote: &RemoteRepository) -> Result<Arc<dyn Repository>, Error> {
        let repository = HttpRepository::new(remote, self.http_timeout)?;
        Ok(Arc::new(repository))
    }

    /// Ids of every repository in lookup order.
    pub fn repository_ids(&self) -> Vec<String> {
        match self.repositories.read() {
            Ok(guard) => guard.iter().map(|r| r.id().to_string()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|r| r.id().to_string()).collect(),
        }
    }

    /// The artifact cache backing this resolver.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve coordinates to local archives, transitive dependencies included.
    ///
    /// Directly requested coordinates are pinned; when the same
    /// `group:artifact` appears more than once, the last one wins. Identical
    /// requests are answered from the result cache without touching any
    /// repository.
    pub async fn resolve(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<Vec<ResolvedArtifact>, ResolutionError> {
        let memo_key = coordinates
            .iter()
            .map(Coordinate::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(hit) = self.results.get(&memo_key) {
            debug!("Resolution cache hit for [{}]", memo_key);
            return Ok(hit.value().as_ref().clone());
        }

        info!("Resolving {} coordinate(s)", coordinates.len());
        let selection = self.select(coordinates).await?;
        let artifacts = self.materialize(selection).await?;
        info!("Resolved {} artifact(s)", artifacts.len());

        self.results.insert(memo_key, Arc::new(artifacts.clone()));
        Ok(artifacts)
    }

    async fn select(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<IndexMap<ArtifactKey, Selection>, ResolutionError> {
        let mut direct: IndexMap<ArtifactKey, &Coordinate> = IndexMap::new();
        for coordinate in coordinates {
            direct.shift_remove(&coordinate.key);
            direct.insert(coordinate.key.clone(), coordinate);
        }

        let mut pinned: IndexMap<ArtifactKey, Selection> = IndexMap::new();
        for (key, coordinate) in &direct {
            let version = self
                .concrete_version(key, &coordinate.version)
                .await
                .map_err(|e| match e {
                    ResolutionError::NotFound { reason, .. } => {
                        ResolutionError::not_found(coordinate.to_string(), reason)
                    }
                    other => other,
                })?;
            debug!("Pinned {} to {}", coordinate, version);
            pinned.insert(
                key.clone(),
                Selection {
                    version,
                    packaging: coordinate.packaging.clone(),
                    classifier: coordinate.classifier.clone(),
                    expanded: false,
                },
            );
        }

        let mut floors: FxHashMap<ArtifactKey, Version> = FxHashMap::default();
        for pass in 1..=MAX_PASSES {
            match self.expand(&pinned, &floors).await? {
                Pass::Done(selection) => return Ok(selection),
                Pass::Restart(key, version) => {
                    debug!("Pass {}: raising {} to {}, restarting", pass, key, version);
                    floors.insert(key, version);
                }
            }
        }

        Err(ResolutionError::Conflict {
            artifact: direct
                .keys()
                .map(ArtifactKey::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            message: format!("version selection did not settle after {MAX_PASSES} passes"),
        })
    }

    /// One breadth-first pass over the dependency graph.
    ///
    /// When a newly seen requirement asks for a higher version of an artifact
    /// whose dependencies were already expanded, the pass is abandoned and
    /// restarted with that version as the artifact's floor.
    async fn expand(
        &self,
        pinned: &IndexMap<ArtifactKey, Selection>,
        floors: &FxHashMap<ArtifactKey, Version>,
    ) -> Result<Pass, ResolutionError> {
        let mut selected = pinned.clone();
        let mut queue: VecDeque<(ArtifactKey, Vec<Exclusion>)> =
            pinned.keys().map(|k| (k.clone(), Vec::new())).collect();
        let mut hard: Vec<(ArtifactKey, VersionSpec, String)> = Vec::new();

        let mut graph: DiGraph<ArtifactKey, ()> = DiGraph::new();
        let mut nodes: FxHashMap<ArtifactKey, NodeIndex> = FxHashMap::default();
        let mut node = |graph: &mut DiGraph<ArtifactKey, ()>, key: &ArtifactKey| {
            *nodes
                .entry(key.clone())
                .or_insert_with(|| graph.add_node(key.clone()))
        };

        while let Some((key, exclusions)) = queue.pop_front() {
            let Some(current) = selected.get_mut(&key) else {
                continue;
            };
            if current.expanded {
                continue;
            }
            current.expanded = true;
            let version = current.version.clone();

            let pom = self.effective_pom(&key, &version, 0).await?;
            if pom.packaging == "pom" && current.packaging == "jar" {
                current.packaging = "pom".to_string();
            }

            let from = node(&mut graph, &key);
            for dep in pom.resolved_dependencies() {
                if !dep.is_transitive() {
                    continue;
                }
                let dep_key = dep.key();
                if exclusions.iter().any(|e| e.matches(&dep_key)) {
                    debug!("{} excluded below {}", dep_key, key);
                    continue;
                }
                let Some(version_text) = &dep.version else {
                    warn!("{} (required by {}:{}) has no version, skipping", dep_key, key, version);
                    continue;
                };
                let spec = match VersionSpec::parse(version_text) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!("{} (required by {}:{}): {}, skipping", dep_key, key, version, e);
                        continue;
                    }
                };

                let to = node(&mut graph, &dep_key);
                graph.add_edge(from, to, ());

                if spec.is_hard() {
                    hard.push((dep_key.clone(), spec.clone(), format!("{key}:{version}")));
                }
                if pinned.contains_key(&dep_key) {
                    continue;
                }

                let mut candidate = self.concrete_version(&dep_key, &spec).await?;
                if let Some(floor) = floors.get(&dep_key)
                    && floor > &candidate
                {
                    candidate = floor.clone();
                }

                match selected.get_mut(&dep_key) {
                    None => {
                        let mut inherited = exclusions.clone();
                        inherited.extend(dep.exclusions.iter().cloned());
                        selected.insert(
                            dep_key.clone(),
                            Selection {
                                version: candidate,
                                packaging: dep.kind.clone(),
                                classifier: dep.classifier.clone(),
                                expanded: false,
                            },
                        );
                        queue.push_back((dep_key, inherited));
                    }
                    Some(existing) if candidate > existing.version => {
                        if existing.expanded {
                            return Ok(Pass::Restart(dep_key, candidate));
                        }
                        debug!("{}: {} replaces {}", dep_key, candidate, existing.version);
                        existing.version = candidate;
                    }
                    Some(_) => {}
                }
            }
        }

        for (key, spec, requester) in &hard {
            if let Some(chosen) = selected.get(key)
                && !spec.contains(&chosen.version)
            {
                return Err(ResolutionError::Conflict {
                    artifact: key.to_string(),
                    message: format!(
                        "{requester} requires {spec}, but {} was selected",
                        chosen.version
                    ),
                });
            }
        }

        for component in petgraph::algo::kosaraju_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| graph.contains_edge(idx, idx));
            if is_cycle {
                let names: Vec<String> = component.iter().map(|&idx| graph[idx].to_string()).collect();
                debug!("Dependency cycle broken: {} → {}", names.join(" → "), names[0]);
            }
        }

        Ok(Pass::Done(selected))
    }

    /// Pick the concrete version a requirement resolves to.
    async fn concrete_version(
        &self,
        key: &ArtifactKey,
        spec: &VersionSpec,
    ) -> Result<Version, ResolutionError> {
        if !spec.needs_listing()
            && let Some(version) = spec.select(&[])
        {
            return Ok(version);
        }
        let available = self.available_versions(key).await?;
        spec.select(&available).ok_or_else(|| {
            ResolutionError::not_found(
                format!("{key}:{spec}"),
                if available.is_empty() {
                    "no published versions found".to_string()
                } else {
                    format!("none of {} published versions satisfies {spec}", available.len())
                },
            )
        })
    }

    /// Published versions across all repositories, cached per artifact.
    async fn available_versions(&self, key: &ArtifactKey) -> Result<Arc<Vec<Version>>, ResolutionError> {
        if let Some(hit) = self.versions.get(key) {
            return Ok(hit.value().clone());
        }

        let mut all = Vec::new();
        let mut last_error = None;
        let mut answered = false;
        for repository in self.active_repositories() {
            match self.retrying(key.to_string(), || repository.versions(key)).await {
                Ok(versions) => {
                    answered = true;
                    all.extend(versions);
                }
                Err(e) => {
                    warn!("Listing versions of {} in '{}' failed: {}", key, repository.id(), e);
                    last_error = Some(e);
                }
            }
        }
        if !answered && let Some(e) = last_error {
            return Err(e);
        }

        all.sort();
        all.dedup();
        let all = Arc::new(all);
        self.versions.insert(key.clone(), all.clone());
        Ok(all)
    }

    /// Parent chain and BOM imports applied, cached per version.
    fn effective_pom<'a>(
        &'a self,
        key: &'a ArtifactKey,
        version: &'a Version,
        depth: usize,
    ) -> BoxFuture<'a, Result<Arc<EffectivePom>, ResolutionError>> {
        async move {
            let cache_key = (key.clone(), version.clone());
            if let Some(hit) = self.poms.get(&cache_key) {
                return Ok(hit.value().clone());
            }
            if depth > MAX_POM_DEPTH {
                return Err(ResolutionError::not_found(
                    format!("{key}:{version}"),
                    "parent chain is too deep",
                ));
            }

            let file = ArtifactFile::pom(key, version);
            let pom = match self.load(&file).await? {
                Some(bytes) => Pom::parse(&bytes).map_err(|e| {
                    ResolutionError::not_found(format!("{key}:{version}"), format!("invalid POM: {e}"))
                })?,
                None => {
                    warn!("No POM for {}:{}, assuming no dependencies", key, version);
                    Pom {
                        group: Some(key.group.clone()),
                        artifact: key.artifact.clone(),
                        version: Some(version.to_string()),
                        packaging: "jar".to_string(),
                        parent: None,
                        properties: Vec::new(),
                        dependencies: Vec::new(),
                        managed: Vec::new(),
                    }
                }
            };

            let parent = match &pom.parent {
                Some(parent) => {
                    let parent_version = Version::new(parent.version.as_str());
                    Some(self.effective_pom(&parent.key, &parent_version, depth + 1).await?)
                }
                None => None,
            };

            let (mut effective, imports) =
                EffectivePom::inherit(&pom, key, version, parent.as_deref());
            for import in imports {
                if import.version.contains("${") {
                    warn!("Unresolved BOM version {} in {}:{}", import.version, key, version);
                    continue;
                }
                let bom_version = Version::new(import.version.as_str());
                let bom = self.effective_pom(&import.key, &bom_version, depth + 1).await?;
                effective.import_bom(&bom);
            }

            let effective = Arc::new(effective);
            self.poms.insert(cache_key, effective.clone());
            Ok(effective)
        }
        .boxed()
    }

    /// Download (or find cached) archives for every selected artifact.
    async fn materialize(
        &self,
        selection: IndexMap<ArtifactKey, Selection>,
    ) -> Result<Vec<ResolvedArtifact>, ResolutionError> {
        let downloads = selection.into_iter().map(|(key, chosen)| async move {
            let path = if chosen.packaging == "pom" {
                None
            } else {
                let coordinate = Coordinate::from_parts(
                    key.clone(),
                    &chosen.packaging,
                    chosen.classifier.clone(),
                    VersionSpec::Soft(chosen.version.clone()),
                );
                Some(self.archive(&coordinate.file(&chosen.version)).await?)
            };
            Ok::<_, ResolutionError>(ResolvedArtifact {
                key,
                version: chosen.version,
                classifier: chosen.classifier,
                packaging: chosen.packaging,
                path,
            })
        });
        try_join_all(downloads).await
    }

    async fn archive(&self, file: &ArtifactFile) -> Result<PathBuf, ResolutionError> {
        if let Some(hit) = self.artifacts.get(file) {
            return Ok(hit.value().clone());
        }
        if let Some(path) = self.cache.get(file) {
            self.artifacts.insert(file.clone(), path.clone());
            return Ok(path);
        }

        let bytes = self
            .fetch_first(&file.repository_path())
            .await?
            .ok_or_else(|| {
                ResolutionError::not_found(file.to_string(), "archive not found in any repository")
            })?;
        let path = self.store(file, &bytes)?;
        info!("Downloaded {} ({} bytes)", file, bytes.len());

        self.artifacts.insert(file.clone(), path.clone());
        Ok(path)
    }

    /// Read a small file (POM) through the local cache.
    async fn load(&self, file: &ArtifactFile) -> Result<Option<Vec<u8>>, ResolutionError> {
        if let Some(path) = self.cache.get(file)
            && let Ok(bytes) = tokio::fs::read(&path).await
        {
            return Ok(Some(bytes));
        }
        let Some(bytes) = self.fetch_first(&file.repository_path()).await? else {
            return Ok(None);
        };
        self.store(file, &bytes)?;
        Ok(Some(bytes))
    }

    fn store(&self, file: &ArtifactFile, bytes: &[u8]) -> Result<PathBuf, ResolutionError> {
        self.cache.put(file, bytes).map_err(|e| ResolutionError::Fetch {
            url: self.cache.root().display().to_string(),
            message: format!("failed to write cache entry for {file}: {e}"),
            retryable: false,
        })
    }

    /// First repository that has the file wins.
    async fn fetch_first(&self, path: &str) -> Result<Option<Vec<u8>>, ResolutionError> {
        let mut last_error = None;
        for repository in self.active_repositories() {
            match self.retrying(path.to_string(), || repository.fetch(path)).await {
                Ok(Some(bytes)) => {
                    debug!("Fetched {} from '{}'", path, repository.id());
                    return Ok(Some(bytes));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Fetching {} from '{}' failed: {}", path, repository.id(), e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn retrying<T, F, Fut>(&self, what: String, mut operation: F) -> Result<T, ResolutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResolutionError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Attempt {} for {} failed: {}; retrying in {:?}",
                        attempt, what, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn active_repositories(&self) -> Vec<Arc<dyn Repository>> {
        let repositories = match self.repositories.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        repositories
            .into_iter()
            .filter(|r| !self.offline || !r.is_remote())
            .collect()
    }
}
