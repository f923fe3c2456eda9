//! Maven-style versions and version requirements.
//!
//! Ordering follows Maven's comparable-version rules closely enough for
//! resolution: numeric components compare numerically, well-known qualifiers
//! rank `alpha < beta < milestone < rc < snapshot < release < sp`, and
//! trailing zero components are insignificant (`1.0.0 == 1`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One parsed version component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Item {
    Number(u64),
    Qualifier(String),
}

/// A concrete version.
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    items: Vec<Item>,
}

impl Version {
    /// Parse a version string. Every non-empty string is a version.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let items = Self::tokenize(&text);
        Self { text, items }
    }

    /// The version exactly as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is a snapshot build.
    pub fn is_snapshot(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, Item::Qualifier(q) if q == "snapshot"))
    }

    /// Whether the version's leading components are exactly `prefix`.
    ///
    /// `4.11.0` and `4.11-rc1` start with `4.11`; `4.110` does not.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        match self.text.strip_prefix(prefix) {
            Some("") => true,
            Some(rest) => rest.starts_with('.') || rest.starts_with('-'),
            None => false,
        }
    }

    fn tokenize(text: &str) -> Vec<Item> {
        let lower = text.to_ascii_lowercase();
        let mut items = Vec::new();
        let mut current = String::new();
        let mut digits = false;

        let flush = |current: &mut String, digits: bool, items: &mut Vec<Item>| {
            if current.is_empty() {
                return;
            }
            if digits {
                items.push(Item::Number(current.parse().unwrap_or(u64::MAX)));
            } else {
                items.push(Item::Qualifier(normalize_qualifier(current)));
            }
            current.clear();
        };

        for c in lower.chars() {
            if matches!(c, '.' | '-' | '_') {
                flush(&mut current, digits, &mut items);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != digits {
                flush(&mut current, digits, &mut items);
            }
            digits = is_digit;
            current.push(c);
        }
        flush(&mut current, digits, &mut items);

        while matches!(items.last(), Some(Item::Number(0))) || matches!(items.last(), Some(Item::Qualifier(q)) if q.is_empty())
        {
            items.pop();
        }
        items
    }
}

fn normalize_qualifier(q: &str) -> String {
    match q {
        "a" => "alpha".to_string(),
        "b" => "beta".to_string(),
        "m" => "milestone".to_string(),
        "cr" => "rc".to_string(),
        "ga" | "final" | "release" => String::new(),
        other => other.to_string(),
    }
}

fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        "" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    let (ra, rb) = (qualifier_rank(a), qualifier_rank(b));
    if ra == 7 && rb == 7 {
        a.cmp(b)
    } else {
        ra.cmp(&rb)
    }
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (Some(Item::Number(x)), Some(Item::Number(y))) => x.cmp(y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => compare_qualifiers(x, y),
        (Some(Item::Number(x)), None) => x.cmp(&0),
        (None, Some(Item::Number(y))) => 0.cmp(y),
        (Some(Item::Qualifier(x)), None) => compare_qualifiers(x, ""),
        (None, Some(Item::Qualifier(y))) => compare_qualifiers("", y),
        (None, None) => Ordering::Equal,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for i in 0..len {
            let ord = compare_items(self.items.get(i), other.items.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.items.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One interval of a Maven range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

/// An interval endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl VersionRange {
    pub fn contains(&self, version: &Version) -> bool {
        let above = match &self.lower {
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
            None => true,
        };
        let below = match &self.upper {
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
            None => true,
        };
        above && below
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(l), Some(u)) = (&self.lower, &self.upper)
            && l.inclusive
            && u.inclusive
            && l.version == u.version
        {
            return write!(f, "[{}]", l.version);
        }
        match &self.lower {
            Some(b) => write!(f, "{}{}", if b.inclusive { '[' } else { '(' }, b.version)?,
            None => f.write_str("(")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Some(b) => write!(f, "{}{}", b.version, if b.inclusive { ']' } else { ')' }),
            None => f.write_str(")"),
        }
    }
}

/// A version requirement as written in a coordinate or POM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// A plain version: exact for direct declarations, a preference for
    /// transitive ones.
    Soft(Version),
    /// `4.11.+`: any version whose leading components are the prefix.
    Prefix(String),
    /// Maven range(s): `[1.0,2.0)`, `[1.0]`, `[1,2),[3,4)`.
    Range(Vec<VersionRange>),
    /// Highest available version.
    Latest,
    /// Highest available non-snapshot version.
    Release,
}

impl VersionSpec {
    /// Parse a requirement.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty version".to_string());
        }
        if text.contains("${") {
            return Err(format!("unresolved property in version '{text}'"));
        }

        match text {
            "LATEST" | "latest.integration" | "+" => return Ok(Self::Latest),
            "RELEASE" | "latest.release" => return Ok(Self::Release),
            _ => {}
        }

        if text.starts_with('[') || text.starts_with('(') {
            return parse_ranges(text).map(Self::Range);
        }

        if let Some(prefix) = text.strip_suffix('+') {
            let prefix = prefix.trim_end_matches(['.', '-']);
            return Ok(if prefix.is_empty() {
                Self::Latest
            } else {
                Self::Prefix(prefix.to_string())
            });
        }

        Ok(Self::Soft(Version::new(text)))
    }

    /// Whether a version satisfies this requirement.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Self::Soft(v) => v == version,
            Self::Prefix(prefix) => version.has_prefix(prefix),
            Self::Range(ranges) => ranges.iter().any(|r| r.contains(version)),
            Self::Latest => true,
            Self::Release => !version.is_snapshot(),
        }
    }

    /// Whether resolving this requirement needs the list of published versions.
    pub fn needs_listing(&self) -> bool {
        !matches!(self, Self::Soft(_))
    }

    /// Whether a different selected version violates this requirement.
    ///
    /// Soft versions are preferences and may be overridden by conflict
    /// resolution; ranges and prefixes are hard.
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Prefix(_) | Self::Range(_))
    }

    /// Pick the concrete version: the highest available one that satisfies
    /// the requirement. A soft version selects itself.
    pub fn select(&self, available: &[Version]) -> Option<Version> {
        match self {
            Self::Soft(v) => Some(v.clone()),
            _ => available.iter().filter(|v| self.contains(v)).max().cloned(),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft(v) => write!(f, "{v}"),
            Self::Prefix(p) => write!(f, "{p}.+"),
            Self::Range(ranges) => {
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{r}")?;
                }
                Ok(())
            }
            Self::Latest => f.write_str("LATEST"),
            Self::Release => f.write_str("RELEASE"),
        }
    }
}

fn parse_ranges(text: &str) -> Result<Vec<VersionRange>, String> {
    let mut ranges = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let open = rest.chars().next().unwrap_or(' ');
        if open != '[' && open != '(' {
            return Err(format!("malformed version range '{text}'"));
        }
        let close_at = rest
            .find([']', ')'])
            .ok_or_else(|| format!("unterminated version range '{text}'"))?;
        let close = rest[close_at..].chars().next().unwrap_or(' ');
        let body = &rest[1..close_at];

        let range = match body.split_once(',') {
            None => {
                if open != '[' || close != ']' || body.trim().is_empty() {
                    return Err(format!("malformed exact range '{text}'"));
                }
                let version = Version::new(body.trim());
                VersionRange {
                    lower: Some(Bound {
                        version: version.clone(),
                        inclusive: true,
                    }),
                    upper: Some(Bound {
                        version,
                        inclusive: true,
                    }),
                }
            }
            Some((lower, upper)) => {
                let lower = lower.trim();
                let upper = upper.trim();
                let range = VersionRange {
                    lower: (!lower.is_empty()).then(|| Bound {
                        version: Version::new(lower),
                        inclusive: open == '[',
                    }),
                    upper: (!upper.is_empty()).then(|| Bound {
                        version: Version::new(upper),
                        inclusive: close == ']',
                    }),
                };
                if let (Some(l), Some(u)) = (&range.lower, &range.upper)
                    && l.version > u.version
                {
                    return Err(format!("empty version range '{text}'"));
                }
                range
            }
        };
        ranges.push(range);

        rest = rest[close_at + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    if ranges.is_empty() {
        return Err(format!("empty version range '{text}'"));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::new(text)
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("4.11.0") < v("4.11.1"));
        assert!(v("4.9") < v("4.11"));
        assert!(v("1.10") > v("1.9.9"));
        assert_eq!(v("1.0.0"), v("1"));
    }

    #[test]
    fn test_qualifier_ordering() {
        assert!(v("5.0-alpha1") < v("5.0-beta1"));
        assert!(v("5.0-M2") < v("5.0-RC1"));
        assert!(v("5.0-RC1") < v("5.0-SNAPSHOT"));
        assert!(v("5.0-SNAPSHOT") < v("5.0"));
        assert_eq!(v("5.0.Final"), v("5.0"));
        assert!(v("5.0") < v("5.0-sp1"));
        assert!(v("5.0-sp1") < v("5.0.1"));
    }

    #[test]
    fn test_prefix_requirement() {
        let spec = VersionSpec::parse("4.11.+").unwrap();
        assert_eq!(spec, VersionSpec::Prefix("4.11".to_string()));
        assert!(spec.contains(&v("4.11.0")));
        assert!(spec.contains(&v("4.11.7")));
        assert!(!spec.contains(&v("4.12.0")));
        assert!(!spec.contains(&v("4.110.0")));

        let available = vec![v("4.10.0"), v("4.11.0"), v("4.11.3"), v("5.0.0")];
        assert_eq!(spec.select(&available), Some(v("4.11.3")));
    }

    #[test]
    fn test_range_requirement() {
        let spec = VersionSpec::parse("[1.0,2.0)").unwrap();
        assert!(spec.contains(&v("1.0")));
        assert!(spec.contains(&v("1.9.9")));
        assert!(!spec.contains(&v("2.0")));
        assert!(spec.is_hard());

        let open = VersionSpec::parse("(,1.0]").unwrap();
        assert!(open.contains(&v("0.1")));
        assert!(!open.contains(&v("1.0.1")));

        let exact = VersionSpec::parse("[1.5]").unwrap();
        assert!(exact.contains(&v("1.5")));
        assert!(!exact.contains(&v("1.5.1")));
        assert_eq!(exact.to_string(), "[1.5]");
    }

    #[test]
    fn test_range_union() {
        let spec = VersionSpec::parse("[1,2),[3,4)").unwrap();
        assert!(spec.contains(&v("1.5")));
        assert!(!spec.contains(&v("2.5")));
        assert!(spec.contains(&v("3.0")));

        let available = vec![v("1.1"), v("2.2"), v("3.3"), v("4.0")];
        assert_eq!(spec.select(&available), Some(v("3.3")));
    }

    #[test]
    fn test_release_skips_snapshots() {
        let available = vec![v("1.0"), v("1.1-SNAPSHOT")];
        assert_eq!(VersionSpec::Release.select(&available), Some(v("1.0")));
        assert_eq!(VersionSpec::Latest.select(&available), Some(v("1.1-SNAPSHOT")));
    }

    #[test]
    fn test_malformed_specs() {
        assert!(VersionSpec::parse("").is_err());
        assert!(VersionSpec::parse("[2.0,1.0]").is_err());
        assert!(VersionSpec::parse("[1.0").is_err());
        assert!(VersionSpec::parse("${junit.version}").is_err());
    }

    #[test]
    fn test_soft_selects_itself() {
        let spec = VersionSpec::parse("5.8.2").unwrap();
        assert!(!spec.needs_listing());
        assert!(!spec.is_hard());
        assert_eq!(spec.select(&[]), Some(v("5.8.2")));
    }
}
