//! Cell directives.
//!
//! Lines whose first non-blank character is `%` at the top of a code cell
//! configure the session instead of running as Java:
//!
//! ```text
//! %maven org.mockito:mockito-core:4.11.+ org.junit.jupiter:junit-jupiter-api:5.9.2
//! %jars lib/
//! %classpath build/classes
//! %mavenRepo sonatype https://oss.sonatype.org/content/repositories/releases
//! ```
//!
//! `%dependency`, `%localArchive` and `%localClasspath` are accepted as
//! aliases of the first three.

use crate::compile::CompileError;
use crate::config::RemoteRepository;
use crate::resolve::Coordinate;

/// One parsed directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Libraries to resolve.
    Maven(Vec<Coordinate>),
    /// A directory of jars (or a single jar).
    Jars(String),
    /// One archive or class directory.
    Classpath(String),
    /// An extra remote repository.
    MavenRepo(RemoteRepository),
}

/// A cell split into directives and remaining code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCell {
    /// Directives with their 1-based cell line.
    pub directives: Vec<(usize, Directive)>,
    /// Java code with directive lines blanked, so line numbers still match
    /// the cell.
    pub code: String,
}

impl ParsedCell {
    pub fn has_code(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

/// Split leading directive lines from a code cell.
pub fn parse_cell(source: &str) -> Result<ParsedCell, CompileError> {
    let mut parsed = ParsedCell::default();
    let mut in_header = true;
    let mut code_lines: Vec<&str> = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if in_header && trimmed.starts_with('%') {
            parsed.directives.push((index + 1, parse_directive(trimmed, index + 1)?));
            code_lines.push("");
            continue;
        }
        if !trimmed.is_empty() {
            in_header = false;
        }
        code_lines.push(line);
    }

    parsed.code = code_lines.join("\n");
    Ok(parsed)
}

/// Parse a cell that contains only directives.
pub fn parse_directive_cell(source: &str) -> Result<Vec<(usize, Directive)>, CompileError> {
    let mut directives = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if !trimmed.starts_with('%') {
            return Err(CompileError::syntax(
                format!("expected a directive, found '{trimmed}'"),
                index + 1,
            ));
        }
        directives.push((index + 1, parse_directive(trimmed, index + 1)?));
    }
    Ok(directives)
}

fn parse_directive(text: &str, line: usize) -> Result<Directive, CompileError> {
    let text = text.trim_start_matches('%');
    let (name, args) = match text.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (text.trim(), ""),
    };

    let require = |what: &str| {
        if args.is_empty() {
            Err(CompileError::syntax(format!("%{name} needs {what}"), line))
        } else {
            Ok(args.to_string())
        }
    };

    match name {
        "maven" | "dependency" => {
            require("at least one coordinate")?;
            let coordinates = args
                .split_whitespace()
                .map(|c| Coordinate::parse(c).map_err(|e| CompileError::syntax(e.to_string(), line)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Directive::Maven(coordinates))
        }
        "jars" | "localArchive" => Ok(Directive::Jars(jar_directory(&require("a path")?))),
        "classpath" | "localClasspath" => Ok(Directive::Classpath(require("a path")?)),
        "mavenRepo" => {
            let parts: Vec<&str> = args.split_whitespace().collect();
            match parts.as_slice() {
                [id, url] if url.starts_with("http://") || url.starts_with("https://") => {
                    Ok(Directive::MavenRepo(RemoteRepository::new(*id, *url)))
                }
                _ => Err(CompileError::syntax(
                    "%mavenRepo needs an id and an http(s) URL",
                    line,
                )),
            }
        }
        "" => Err(CompileError::syntax("empty directive", line)),
        other => Err(CompileError::syntax(format!("unknown directive %{other}"), line)),
    }
}

/// `lib/*.jar` and `lib/*` name the directory `lib`.
fn jar_directory(path: &str) -> String {
    let path = path.trim_end_matches('/');
    match path.rsplit_once('/') {
        Some((dir, last)) if last.contains('*') => dir.to_string(),
        None if path.contains('*') => ".".to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompileErrorKind;

    #[test]
    fn test_leading_directives_are_split() {
        let parsed = parse_cell(
            "%maven org.mockito:mockito-core:4.11.+\n\n%jars lib/*.jar\nList l = null;\n%maven a:b:1",
        )
        .unwrap();

        assert_eq!(parsed.directives.len(), 2);
        assert_eq!(parsed.directives[0].0, 1);
        match &parsed.directives[0].1 {
            Directive::Maven(coordinates) => {
                assert_eq!(coordinates[0].as_str(), "org.mockito:mockito-core:4.11.+")
            }
            other => panic!("expected maven directive, got {other:?}"),
        }
        assert_eq!(parsed.directives[1].1, Directive::Jars("lib".into()));

        // Code keeps its line numbers; later % lines are Java's problem.
        let lines: Vec<&str> = parsed.code.lines().collect();
        assert_eq!(lines[3], "List l = null;");
        assert_eq!(lines[4], "%maven a:b:1");
        assert!(parsed.has_code());
    }

    #[test]
    fn test_directive_only_cell() {
        let parsed = parse_cell("%classpath build/classes\n").unwrap();
        assert!(!parsed.has_code());
        assert_eq!(
            parsed.directives[0].1,
            Directive::Classpath("build/classes".into())
        );
    }

    #[test]
    fn test_multiple_coordinates_and_aliases() {
        let directives =
            parse_directive_cell("%dependency a:b:1.0 c:d:[1,2)\n// comment\n%localArchive x.jar").unwrap();
        match &directives[0].1 {
            Directive::Maven(coordinates) => assert_eq!(coordinates.len(), 2),
            other => panic!("expected maven directive, got {other:?}"),
        }
        assert_eq!(directives[1], (3, Directive::Jars("x.jar".into())));
    }

    #[test]
    fn test_maven_repo() {
        let parsed = parse_cell("%mavenRepo jitpack https://jitpack.io/").unwrap();
        assert_eq!(
            parsed.directives[0].1,
            Directive::MavenRepo(RemoteRepository::new("jitpack", "https://jitpack.io"))
        );
        assert!(parse_cell("%mavenRepo jitpack").is_err());
    }

    #[test]
    fn test_errors_are_syntax_errors() {
        let err = parse_cell("%gradle foo").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Syntax);
        assert!(err.message().contains("unknown directive %gradle"));

        let err = parse_cell("\n%maven not-a-coordinate").unwrap_err();
        assert_eq!(err.line(), Some(2));

        assert!(parse_cell("%jars").is_err());
        assert!(parse_directive_cell("int x = 1;").is_err());
    }

    #[test]
    fn test_jar_directory() {
        assert_eq!(jar_directory("lib/*.jar"), "lib");
        assert_eq!(jar_directory("lib/"), "lib");
        assert_eq!(jar_directory("*.jar"), ".");
        assert_eq!(jar_directory("/opt/x.jar"), "/opt/x.jar");
    }
}
