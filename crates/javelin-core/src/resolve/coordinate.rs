//! Library coordinates and repository file addressing.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use super::version::{Version, VersionSpec};
use crate::error::Error;

/// `group:artifact`, the identity used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub group: String,
    pub artifact: String,
}

impl ArtifactKey {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }

    /// Repository directory holding every version of this artifact.
    pub fn repository_dir(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.artifact)
    }

    /// Path of the artifact-level `maven-metadata.xml`.
    pub fn metadata_path(&self) -> String {
        format!("{}/maven-metadata.xml", self.repository_dir())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

/// A parsed `group:artifact[:packaging[:classifier]]:version` coordinate.
///
/// Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Coordinate {
    pub key: ArtifactKey,
    pub packaging: String,
    pub classifier: Option<String>,
    pub version: VersionSpec,
    text: String,
}

impl Coordinate {
    /// Parse a coordinate string.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        let parts: Vec<&str> = text.split(':').map(str::trim).collect();

        let (group, artifact, packaging, classifier, version) = match parts.as_slice() {
            [g, a, v] => (*g, *a, "jar", None, *v),
            [g, a, p, v] => (*g, *a, *p, None, *v),
            [g, a, p, c, v] => (*g, *a, *p, Some(*c), *v),
            _ => {
                return Err(Error::Parse(format!(
                    "invalid coordinate '{text}': expected group:artifact[:packaging[:classifier]]:version"
                )));
            }
        };

        if group.is_empty() || artifact.is_empty() || packaging.is_empty() {
            return Err(Error::Parse(format!("invalid coordinate '{text}': empty component")));
        }

        let version = VersionSpec::parse(version)
            .map_err(|e| Error::Parse(format!("invalid coordinate '{text}': {e}")))?;

        Ok(Self {
            key: ArtifactKey::new(group, artifact),
            packaging: packaging.to_string(),
            classifier: classifier.filter(|c| !c.is_empty()).map(str::to_string),
            version,
            text: text.to_string(),
        })
    }

    /// Build a coordinate from POM dependency fields.
    pub(crate) fn from_parts(
        key: ArtifactKey,
        packaging: &str,
        classifier: Option<String>,
        version: VersionSpec,
    ) -> Self {
        let mut text = format!("{key}");
        if packaging != "jar" || classifier.is_some() {
            text.push(':');
            text.push_str(packaging);
        }
        if let Some(c) = &classifier {
            text.push(':');
            text.push_str(c);
        }
        text.push(':');
        text.push_str(&version.to_string());

        Self {
            key,
            packaging: packaging.to_string(),
            classifier,
            version,
            text,
        }
    }

    /// The coordinate as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The file that a concrete version of this coordinate lives in.
    pub fn file(&self, version: &Version) -> ArtifactFile {
        ArtifactFile {
            key: self.key.clone(),
            version: version.clone(),
            classifier: self.classifier.clone(),
            extension: extension_for(&self.packaging).to_string(),
        }
    }

    /// Whether the coordinate contributes an archive to the classpath.
    pub fn has_archive(&self) -> bool {
        self.packaging != "pom"
    }
}

fn extension_for(packaging: &str) -> &str {
    match packaging {
        "bundle" | "maven-plugin" | "eclipse-plugin" | "test-jar" => "jar",
        other => other,
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.packaging == other.packaging
            && self.classifier == other.classifier
            && self.version.to_string() == other.version.to_string()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.packaging.hash(state);
        self.classifier.hash(state);
        self.version.to_string().hash(state);
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One file in a Maven repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactFile {
    pub key: ArtifactKey,
    pub version: Version,
    pub classifier: Option<String>,
    pub extension: String,
}

impl ArtifactFile {
    /// The POM describing a concrete version.
    pub fn pom(key: &ArtifactKey, version: &Version) -> Self {
        Self {
            key: key.clone(),
            version: version.clone(),
            classifier: None,
            extension: "pom".to_string(),
        }
    }

    /// File name, e.g. `mockito-core-4.11.0.jar`.
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.key.artifact, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.key.artifact, self.version, self.extension),
        }
    }

    /// Path relative to a repository root.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.key.repository_dir(),
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for ArtifactFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        write!(f, " ({})", self.extension)
    }
}

/// A resolved library: coordinate, concrete version and local file.
///
/// Created by the resolver, cached for the process lifetime, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedArtifact {
    pub key: ArtifactKey,
    pub version: Version,
    pub classifier: Option<String>,
    pub packaging: String,
    /// Location in the local cache. `None` for `pom`-packaged artifacts.
    pub path: Option<PathBuf>,
}

impl ResolvedArtifact {
    /// Concrete `group:artifact:version` form.
    pub fn coordinate(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}:{}:{}:{}", self.key, self.packaging, c, self.version),
            None => format!("{}:{}", self.key, self.version),
        }
    }
}
