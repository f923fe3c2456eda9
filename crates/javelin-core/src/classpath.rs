//! Append-only session classpath.
//!
//! The registry of locations only grows. What compilation sees is the
//! effective view: when an artifact is declared again at another version,
//! the newer jar replaces the older one there.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, ResolutionError, Result};

/// Where a classpath entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOrigin {
    /// A resolved library, with its concrete coordinate.
    Artifact(String),
    /// A jar named by `%jars` or `%classpath`.
    LocalArchive,
    /// A class directory named by `%classpath`.
    LocalDirectory,
}

/// One location on the classpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    pub location: PathBuf,
    pub origin: EntryOrigin,
}

impl ClasspathEntry {
    pub fn artifact(location: impl Into<PathBuf>, coordinate: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            origin: EntryOrigin::Artifact(coordinate.into()),
        }
    }

    /// The coordinate without its version, for resolved artifacts.
    pub fn artifact_id(&self) -> Option<&str> {
        match &self.origin {
            EntryOrigin::Artifact(coordinate) => {
                Some(coordinate.rsplit_once(':').map_or(coordinate.as_str(), |(id, _)| id))
            }
            _ => None,
        }
    }

    /// A local archive or directory, classified by what is on disk.
    pub fn local(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let origin = if location.is_dir() {
            EntryOrigin::LocalDirectory
        } else {
            EntryOrigin::LocalArchive
        };
        Self { location, origin }
    }
}

impl fmt::Display for ClasspathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            EntryOrigin::Artifact(coordinate) => {
                write!(f, "{} ({coordinate})", self.location.display())
            }
            _ => write!(f, "{}", self.location.display()),
        }
    }
}

/// An immutable view of the classpath at one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathSnapshot {
    entries: Arc<[ClasspathEntry]>,
    effective: Arc<[ClasspathEntry]>,
    generation: u64,
}

impl ClasspathSnapshot {
    /// Every location ever added, in order.
    pub fn entries(&self) -> &[ClasspathEntry] {
        &self.entries
    }

    /// The locations compilation and fresh workers use: superseded
    /// versions of an artifact are left out.
    pub fn effective(&self) -> &[ClasspathEntry] {
        &self.effective
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `other` is a prefix of this snapshot.
    pub fn extends(&self, other: &ClasspathSnapshot) -> bool {
        self.entries.len() >= other.entries.len()
            && self.entries[..other.entries.len()] == other.entries[..]
    }

    /// Platform classpath string of the effective entries with `extra`
    /// locations prepended.
    pub fn to_arg(&self, extra: &[&Path]) -> Result<OsString> {
        let paths = extra
            .iter()
            .map(|p| p.to_path_buf())
            .chain(self.effective.iter().map(|e| e.location.clone()));
        std::env::join_paths(paths)
            .map_err(|e| Error::Config(format!("classpath entry cannot be joined: {e}")))
    }
}

/// What one [`Classpath::append`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClasspathChange {
    /// Locations new to the classpath.
    pub added: Vec<ClasspathEntry>,
    /// Artifact entries that now win over another version of the same
    /// artifact. They may be new or seen before.
    pub overriding: Vec<ClasspathEntry>,
}

impl ClasspathChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.overriding.is_empty()
    }

    /// New entries that do not override anything.
    pub fn appended(&self) -> Vec<ClasspathEntry> {
        self.added
            .iter()
            .filter(|e| !self.overriding.contains(e))
            .cloned()
            .collect()
    }
}

/// The session's classpath.
///
/// Entries are only ever appended; a location already present (after
/// canonicalization) is ignored. Every change bumps the generation.
#[derive(Debug, Clone, Default)]
pub struct Classpath {
    entries: Vec<ClasspathEntry>,
    /// Canonical location to entry index.
    seen: HashMap<PathBuf, usize>,
    /// Artifact id to the index of its winning entry.
    latest: HashMap<String, usize>,
    generation: u64,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries, returning those that were actually new.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ClasspathEntry>) -> Vec<ClasspathEntry> {
        self.append(entries).added
    }

    /// Append entries, reporting new locations and version overrides.
    pub fn append(&mut self, entries: impl IntoIterator<Item = ClasspathEntry>) -> ClasspathChange {
        let mut change = ClasspathChange::default();
        for entry in entries {
            let canonical = fs::canonicalize(&entry.location).unwrap_or_else(|_| entry.location.clone());
            let index = match self.seen.get(&canonical) {
                Some(&index) => index,
                None => {
                    let index = self.entries.len();
                    self.seen.insert(canonical, index);
                    self.entries.push(entry.clone());
                    change.added.push(entry.clone());
                    index
                }
            };
            if let Some(id) = entry.artifact_id()
                && let Some(previous) = self.latest.insert(id.to_string(), index)
                && previous != index
            {
                change.overriding.push(self.entries[index].clone());
            }
        }
        if !change.is_empty() {
            self.generation += 1;
        }
        change
    }

    pub fn snapshot(&self) -> ClasspathSnapshot {
        let effective: Vec<ClasspathEntry> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(index, entry)| {
                entry
                    .artifact_id()
                    .is_none_or(|id| self.latest.get(id) == Some(index))
            })
            .map(|(_, entry)| entry.clone())
            .collect();
        ClasspathSnapshot {
            entries: self.entries.clone().into(),
            effective: effective.into(),
            generation: self.generation,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every `*.jar` file in a directory, sorted by name.
///
/// A path to a single jar yields that jar.
pub fn expand_jars(path: &Path) -> std::result::Result<Vec<ClasspathEntry>, ResolutionError> {
    if path.is_file() {
        return Ok(vec![ClasspathEntry::local(path)]);
    }
    let read = fs::read_dir(path).map_err(|e| {
        ResolutionError::not_found(path.display().to_string(), format!("cannot list jars: {e}"))
    })?;

    let mut jars: Vec<PathBuf> = read
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jar"))
        .collect();
    jars.sort();
    Ok(jars.into_iter().map(ClasspathEntry::local).collect())
}

/// One local archive or directory, which must exist.
pub fn local_entry(path: &Path) -> std::result::Result<ClasspathEntry, ResolutionError> {
    if path.exists() {
        Ok(ClasspathEntry::local(path))
    } else {
        Err(ResolutionError::not_found(
            path.display().to_string(),
            "no such file or directory",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extend_ignores_duplicates() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let jar = temp.path().join("a.jar");
        fs::write(&jar, b"jar").unwrap();

        let mut classpath = Classpath::new();
        let added = classpath.extend([ClasspathEntry::local(&jar)]);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].origin, EntryOrigin::LocalArchive);

        // Same file through a different spelling.
        let again = classpath.extend([ClasspathEntry::local(temp.path().join(".").join("a.jar"))]);
        assert!(again.is_empty());
        assert_eq!(classpath.len(), 1);
        assert_eq!(classpath.snapshot().generation(), 1);
    }

    #[test]
    fn test_snapshots_are_prefix_preserving() {
        let mut classpath = Classpath::new();
        classpath.extend([ClasspathEntry::artifact("/cache/a.jar", "g:a:1")]);
        let first = classpath.snapshot();

        classpath.extend([ClasspathEntry::artifact("/cache/b.jar", "g:b:1")]);
        let second = classpath.snapshot();

        assert!(second.extends(&first));
        assert!(!first.extends(&second));
        assert_eq!(first.entries().len(), 1);
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_expand_jars_sorted() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        for name in ["zeta.jar", "alpha.jar", "notes.txt"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        let entries = expand_jars(temp.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.location.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.jar", "zeta.jar"]);
    }

    #[test]
    fn test_missing_paths_are_not_found() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let missing = temp.path().join("nope");
        assert!(matches!(expand_jars(&missing), Err(ResolutionError::NotFound { .. })));
        assert!(local_entry(&missing).is_err());
        assert_eq!(
            local_entry(temp.path()).unwrap().origin,
            EntryOrigin::LocalDirectory
        );
    }

    #[test]
    fn test_newer_version_supersedes_older() {
        let mut classpath = Classpath::new();
        classpath.extend([
            ClasspathEntry::artifact("/cache/lib-1.0.jar", "g:lib:1.0"),
            ClasspathEntry::artifact("/cache/dep-1.jar", "g:dep:1"),
        ]);

        let change = classpath.append([
            ClasspathEntry::artifact("/cache/lib-2.0.jar", "g:lib:2.0"),
            ClasspathEntry::artifact("/cache/dep-1.jar", "g:dep:1"),
        ]);
        assert_eq!(change.added.len(), 1);
        assert_eq!(change.overriding, change.added);
        assert!(change.appended().is_empty());

        let snapshot = classpath.snapshot();
        assert_eq!(snapshot.entries().len(), 3);
        let arg = snapshot.to_arg(&[]).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&arg).collect();
        assert_eq!(
            parts,
            vec![PathBuf::from("/cache/dep-1.jar"), PathBuf::from("/cache/lib-2.0.jar")]
        );

        // Going back to the first version makes it win again.
        let change = classpath.append([ClasspathEntry::artifact("/cache/lib-1.0.jar", "g:lib:1.0")]);
        assert!(change.added.is_empty());
        assert_eq!(change.overriding.len(), 1);
        let effective = classpath.snapshot();
        assert!(effective.effective().iter().any(|e| e.location.ends_with("lib-1.0.jar")));
        assert!(!effective.effective().iter().any(|e| e.location.ends_with("lib-2.0.jar")));
        assert!(effective.generation() > snapshot.generation());
    }

    #[test]
    fn test_classifier_is_a_separate_artifact() {
        let plain = ClasspathEntry::artifact("/cache/a.jar", "g:a:1");
        let sources = ClasspathEntry::artifact("/cache/a-tests.jar", "g:a:jar:tests:1");
        assert_eq!(plain.artifact_id(), Some("g:a"));
        assert_eq!(sources.artifact_id(), Some("g:a:jar:tests"));
        assert_eq!(ClasspathEntry::local("/lib/x.jar").artifact_id(), None);

        let mut classpath = Classpath::new();
        let change = classpath.append([plain, sources]);
        assert!(change.overriding.is_empty());
        assert_eq!(classpath.snapshot().effective().len(), 2);
    }

    #[test]
    fn test_to_arg_prepends_extra() {
        let mut classpath = Classpath::new();
        classpath.extend([ClasspathEntry::artifact("/cache/a.jar", "g:a:1")]);
        let arg = classpath.snapshot().to_arg(&[Path::new("/session/classes")]).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&arg).collect();
        assert_eq!(parts, vec![PathBuf::from("/session/classes"), PathBuf::from("/cache/a.jar")]);
    }
}
