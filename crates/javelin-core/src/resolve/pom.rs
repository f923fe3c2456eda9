//! POM and repository metadata parsing.
//!
//! Only the subset of XML that Maven descriptors use is understood: nested
//! elements, text, comments, CDATA and the predefined entities. Attributes
//! are skipped since nothing in the POM model needs them.

use rustc_hash::FxHashMap;

use super::coordinate::ArtifactKey;
use super::version::Version;

/// A parsed XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a direct child, if present and non-empty.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Parse an XML document into its root element.
pub fn parse_xml(input: &str) -> Result<Element, String> {
    let mut parser = XmlParser { src: input, pos: 0 };
    parser.skip_misc()?;
    let root = parser.parse_element()?;
    Ok(root)
}

struct XmlParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> XmlParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn skip_past(&mut self, marker: &str) -> Result<(), String> {
        match self.rest().find(marker) {
            Some(at) => {
                self.pos += at + marker.len();
                Ok(())
            }
            None => Err(format!("unterminated markup, expected '{marker}'")),
        }
    }

    fn skip_misc(&mut self) -> Result<(), String> {
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with('\u{feff}') {
                self.pos += '\u{feff}'.len_utf8();
            } else if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_name(&mut self) -> String {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        self.pos += end;
        rest[..end].to_string()
    }

    fn parse_element(&mut self) -> Result<Element, String> {
        if !self.rest().starts_with('<') {
            return Err(format!("expected element at offset {}", self.pos));
        }
        self.pos += 1;
        let name = self.read_name();
        if name.is_empty() {
            return Err(format!("empty element name at offset {}", self.pos));
        }

        // Skip attributes up to the end of the start tag.
        let mut self_closing = false;
        loop {
            let mut chars = self.rest().chars();
            match chars.next() {
                None => return Err(format!("unterminated start tag <{name}>")),
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    match self.rest().find(quote) {
                        Some(at) => self.pos += at + 1,
                        None => return Err(format!("unterminated attribute in <{name}>")),
                    }
                }
                Some('/') if chars.next() == Some('>') => {
                    self.pos += 2;
                    self_closing = true;
                    break;
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }

        let mut element = Element {
            name,
            ..Element::default()
        };
        if self_closing {
            return Ok(element);
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(format!("unclosed element <{}>", element.name));
            }
            if let Some(after) = rest.strip_prefix("</") {
                let end = after
                    .find('>')
                    .ok_or_else(|| format!("unterminated end tag for <{}>", element.name))?;
                let closing = after[..end].trim();
                if closing != element.name {
                    return Err(format!(
                        "mismatched end tag </{closing}> for <{}>",
                        element.name
                    ));
                }
                self.pos += 2 + end + 1;
                return Ok(element);
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if let Some(after) = rest.strip_prefix("<![CDATA[") {
                let end = after
                    .find("]]>")
                    .ok_or_else(|| "unterminated CDATA section".to_string())?;
                element.text.push_str(&after[..end]);
                self.pos += "<![CDATA[".len() + end + 3;
            } else if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with('<') {
                let child = self.parse_element()?;
                element.children.push(child);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                element.text.push_str(&decode_entities(&rest[..end]));
                self.pos += end;
            }
        }
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

/// An excluded `group:artifact`; either part may be `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub group: String,
    pub artifact: String,
}

impl Exclusion {
    pub fn matches(&self, key: &ArtifactKey) -> bool {
        (self.group == "*" || self.group == key.group)
            && (self.artifact == "*" || self.artifact == key.artifact)
    }
}

/// A `<dependency>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub group: String,
    pub artifact: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub kind: String,
    pub classifier: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}

impl Dependency {
    fn from_element(el: &Element) -> Option<Self> {
        let exclusions = el
            .child("exclusions")
            .map(|ex| {
                ex.children_named("exclusion")
                    .filter_map(|e| {
                        Some(Exclusion {
                            group: e.child_text("groupId")?,
                            artifact: e.child_text("artifactId").unwrap_or_else(|| "*".into()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            group: el.child_text("groupId")?,
            artifact: el.child_text("artifactId")?,
            version: el.child_text("version"),
            scope: el.child_text("scope"),
            kind: el.child_text("type").unwrap_or_else(|| "jar".into()),
            classifier: el.child_text("classifier"),
            optional: el.child_text("optional").is_some_and(|o| o == "true"),
            exclusions,
        })
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(&self.group, &self.artifact)
    }

    /// Scope after defaulting.
    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or("compile")
    }

    /// Whether this entry is a `scope=import` BOM reference.
    pub fn is_bom_import(&self) -> bool {
        self.scope() == "import" && self.kind == "pom"
    }

    /// Whether the dependency is followed transitively.
    pub fn is_transitive(&self) -> bool {
        !self.optional && matches!(self.scope(), "compile" | "runtime")
    }

    fn same_target(&self, other: &Dependency) -> bool {
        self.group == other.group
            && self.artifact == other.artifact
            && self.classifier == other.classifier
    }

    fn interpolated(&self, properties: &FxHashMap<String, String>) -> Self {
        let expand = |s: &String| interpolate(s, properties);
        Self {
            group: expand(&self.group),
            artifact: expand(&self.artifact),
            version: self.version.as_ref().map(expand),
            scope: self.scope.as_ref().map(expand),
            kind: expand(&self.kind),
            classifier: self.classifier.as_ref().map(expand),
            optional: self.optional,
            exclusions: self.exclusions.clone(),
        }
    }
}

/// Reference to a parent POM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub key: ArtifactKey,
    pub version: String,
}

/// A single POM file as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pom {
    pub group: Option<String>,
    pub artifact: String,
    pub version: Option<String>,
    pub packaging: String,
    pub parent: Option<ParentRef>,
    pub properties: Vec<(String, String)>,
    pub dependencies: Vec<Dependency>,
    pub managed: Vec<Dependency>,
}

impl Pom {
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let text = String::from_utf8_lossy(bytes);
        let root = parse_xml(&text)?;
        if root.name != "project" {
            return Err(format!("expected <project>, found <{}>", root.name));
        }

        let parent = root.child("parent").and_then(|p| {
            Some(ParentRef {
                key: ArtifactKey::new(p.child_text("groupId")?, p.child_text("artifactId")?),
                version: p.child_text("version")?,
            })
        });

        let properties = root
            .child("properties")
            .map(|props| {
                props
                    .children
                    .iter()
                    .map(|p| (p.name.clone(), p.text.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let dependencies = root
            .child("dependencies")
            .map(|d| d.children_named("dependency").filter_map(Dependency::from_element).collect())
            .unwrap_or_default();

        let managed = root
            .child("dependencyManagement")
            .and_then(|dm| dm.child("dependencies"))
            .map(|d| d.children_named("dependency").filter_map(Dependency::from_element).collect())
            .unwrap_or_default();

        Ok(Self {
            group: root.child_text("groupId"),
            artifact: root
                .child_text("artifactId")
                .ok_or_else(|| "POM has no artifactId".to_string())?,
            version: root.child_text("version"),
            packaging: root.child_text("packaging").unwrap_or_else(|| "jar".into()),
            parent,
            properties,
            dependencies,
            managed,
        })
    }
}

/// A BOM referenced by `scope=import` in dependency management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomImport {
    pub key: ArtifactKey,
    pub version: String,
}

/// A POM after parent inheritance and property interpolation.
#[derive(Debug, Clone)]
pub struct EffectivePom {
    pub key: ArtifactKey,
    pub version: Version,
    pub packaging: String,
    /// Interpolated managed dependencies, own entries first.
    pub managed: Vec<Dependency>,
    /// Interpolated dependencies, before management is applied.
    pub dependencies: Vec<Dependency>,
    // Uninterpolated model handed down to children, so that inherited
    // `${project.version}` references see the child's version.
    raw_properties: Vec<(String, String)>,
    raw_dependencies: Vec<Dependency>,
    raw_managed: Vec<Dependency>,
}

impl EffectivePom {
    /// Merge a raw POM with its (already effective) parent and interpolate.
    ///
    /// Returns the BOMs that still need importing via [`import_bom`].
    ///
    /// [`import_bom`]: Self::import_bom
    pub fn inherit(
        pom: &Pom,
        key: &ArtifactKey,
        version: &Version,
        parent: Option<&EffectivePom>,
    ) -> (Self, Vec<BomImport>) {
        let mut raw_properties = parent.map(|p| p.raw_properties.clone()).unwrap_or_default();
        raw_properties.extend(pom.properties.iter().cloned());

        let mut raw_dependencies: Vec<Dependency> =
            parent.map(|p| p.raw_dependencies.clone()).unwrap_or_default();
        for dep in &pom.dependencies {
            raw_dependencies.retain(|d| !d.same_target(dep));
            raw_dependencies.push(dep.clone());
        }

        let mut raw_managed = pom.managed.clone();
        if let Some(p) = parent {
            raw_managed.extend(p.raw_managed.iter().cloned());
        }

        let mut properties: FxHashMap<String, String> = raw_properties.iter().cloned().collect();
        let group = pom
            .group
            .clone()
            .or_else(|| pom.parent.as_ref().map(|p| p.key.group.clone()))
            .unwrap_or_else(|| key.group.clone());
        for prefix in ["project", "pom"] {
            properties.insert(format!("{prefix}.groupId"), group.clone());
            properties.insert(format!("{prefix}.artifactId"), pom.artifact.clone());
            properties.insert(format!("{prefix}.version"), version.to_string());
            properties.insert(format!("{prefix}.packaging"), pom.packaging.clone());
        }
        properties.insert("version".into(), version.to_string());
        if let Some(parent_ref) = &pom.parent {
            properties.insert("project.parent.groupId".into(), parent_ref.key.group.clone());
            properties.insert("project.parent.artifactId".into(), parent_ref.key.artifact.clone());
            properties.insert("project.parent.version".into(), parent_ref.version.clone());
        }

        let mut imports = Vec::new();
        let mut managed = Vec::new();
        for dep in &raw_managed {
            let dep = dep.interpolated(&properties);
            if dep.is_bom_import() {
                if let Some(version) = &dep.version {
                    imports.push(BomImport {
                        key: dep.key(),
                        version: version.clone(),
                    });
                }
            } else {
                managed.push(dep);
            }
        }

        let dependencies = raw_dependencies
            .iter()
            .map(|d| d.interpolated(&properties))
            .collect();

        let effective = Self {
            key: key.clone(),
            version: version.clone(),
            packaging: pom.packaging.clone(),
            managed,
            dependencies,
            raw_properties,
            raw_dependencies,
            raw_managed,
        };
        (effective, imports)
    }

    /// Append a BOM's managed versions. Entries already managed here win.
    pub fn import_bom(&mut self, bom: &EffectivePom) {
        for dep in &bom.managed {
            if !self.managed.iter().any(|m| m.same_target(dep)) {
                self.managed.push(dep.clone());
            }
        }
    }

    /// Dependencies with missing versions and scopes filled from management.
    pub fn resolved_dependencies(&self) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .map(|dep| {
                let mut dep = dep.clone();
                if let Some(managed) = self.managed.iter().find(|m| m.same_target(&dep)) {
                    if dep.version.is_none() {
                        dep.version = managed.version.clone();
                    }
                    if dep.scope.is_none() {
                        dep.scope = managed.scope.clone();
                    }
                    for exclusion in &managed.exclusions {
                        if !dep.exclusions.contains(exclusion) {
                            dep.exclusions.push(exclusion.clone());
                        }
                    }
                }
                dep
            })
            .collect()
    }
}

/// Expand `${name}` references. Unknown names are left in place.
pub fn interpolate(text: &str, properties: &FxHashMap<String, String>) -> String {
    let mut current = text.to_string();
    // Bounded so self-referencing properties terminate.
    for _ in 0..8 {
        if !current.contains("${") {
            break;
        }
        let mut out = String::with_capacity(current.len());
        let mut rest = current.as_str();
        let mut changed = false;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match properties.get(name) {
                        Some(value) => {
                            out.push_str(value);
                            changed = true;
                        }
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        current = out;
        if !changed {
            break;
        }
    }
    current
}

/// Versions listed in a `maven-metadata.xml`.
pub fn parse_metadata(bytes: &[u8]) -> Result<Vec<Version>, String> {
    let text = String::from_utf8_lossy(bytes);
    let root = parse_xml(&text)?;
    let versions = root
        .child("versioning")
        .and_then(|v| v.child("versions"))
        .map(|vs| {
            vs.children_named("version")
                .map(|v| v.text.trim())
                .filter(|v| !v.is_empty())
                .map(Version::new)
                .collect()
        })
        .unwrap_or_default();
    Ok(versions)
}
