//! Compile error classification and mapping back to cell lines.

use std::fmt;

/// Category of a failed compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Malformed source.
    Syntax,
    /// A name that does not resolve to any visible declaration or class.
    UnresolvedSymbol,
    /// Anything else javac rejects (types, access, flow).
    TypeError,
}

impl CompileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnresolvedSymbol => "unresolvedSymbol",
            Self::TypeError => "typeError",
        }
    }

    /// Classify a javac error message.
    pub fn classify(message: &str) -> Self {
        const UNRESOLVED: &[&str] = &["cannot find symbol", "does not exist", "cannot access"];
        const SYNTAX: &[&str] = &[
            "expected",
            "illegal start",
            "reached end of file",
            "not a statement",
            "unclosed",
            "illegal character",
            "without 'if'",
            "orphaned",
            "malformed",
        ];

        let lower = message.to_ascii_lowercase();
        if UNRESOLVED.iter().any(|p| lower.contains(p)) {
            Self::UnresolvedSymbol
        } else if SYNTAX.iter().any(|p| lower.contains(p)) && !lower.contains("incompatible types") {
            Self::Syntax
        } else {
            Self::TypeError
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Note,
}

/// One compiler message, located in the cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub level: ErrorLevel,
    /// Cell line (1-indexed), if the message points into user code.
    pub line: Option<usize>,
    /// Column (1-indexed) within that line.
    pub column: Option<usize>,
    /// Extra lines such as `symbol:` and `location:`.
    pub detail: Vec<String>,
}

/// A cell that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    fn single(kind: CompileErrorKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            diagnostics: vec![Diagnostic {
                message: message.into(),
                level: ErrorLevel::Error,
                line,
                column: None,
                detail: Vec::new(),
            }],
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::single(CompileErrorKind::Syntax, message, Some(line))
    }

    pub fn type_error(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::single(CompileErrorKind::TypeError, message, line)
    }

    /// Build from javac diagnostics, classified by the first error.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let kind = diagnostics
            .iter()
            .find(|d| d.level == ErrorLevel::Error)
            .map_or(CompileErrorKind::TypeError, |d| CompileErrorKind::classify(&d.message));
        Self { kind, diagnostics }
    }

    fn primary(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.level == ErrorLevel::Error)
            .or_else(|| self.diagnostics.first())
    }

    /// Message of the first error, including its symbol detail.
    pub fn message(&self) -> String {
        match self.primary() {
            Some(d) if d.detail.is_empty() => d.message.clone(),
            Some(d) => format!("{} ({})", d.message, d.detail.join(", ")),
            None => "compilation failed".to_string(),
        }
    }

    /// Cell line of the first error.
    pub fn line(&self) -> Option<usize> {
        self.primary().and_then(|d| d.line)
    }

    /// Format for terminal display.
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();
        for diagnostic in &self.diagnostics {
            let level = match diagnostic.level {
                ErrorLevel::Error => "\x1b[1;31merror\x1b[0m",
                ErrorLevel::Warning => "\x1b[1;33mwarning\x1b[0m",
                ErrorLevel::Note => "\x1b[1;36mnote\x1b[0m",
            };
            output.push_str(&format!("{level}: {}\n", diagnostic.message));
            for detail in &diagnostic.detail {
                output.push_str(&format!("  {detail}\n"));
            }
            if let Some(line) = diagnostic.line {
                match diagnostic.column {
                    Some(column) => {
                        output.push_str(&format!("  \x1b[1;34m-->\x1b[0m line {line}:{column}\n"))
                    }
                    None => output.push_str(&format!("  \x1b[1;34m-->\x1b[0m line {line}\n")),
                }
            }
        }
        output
    }

    /// Plain rendering, one diagnostic per line.
    pub fn format_plain(&self) -> String {
        self.diagnostics
            .iter()
            .map(|d| {
                let location = d.line.map(|l| format!("line {l}: ")).unwrap_or_default();
                if d.detail.is_empty() {
                    format!("{location}{}", d.message)
                } else {
                    format!("{location}{} ({})", d.message, d.detail.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line() {
            Some(line) => write!(f, "{} error at line {line}: {}", self.kind, self.message()),
            None => write!(f, "{} error: {}", self.kind, self.message()),
        }
    }
}

impl std::error::Error for CompileError {}

/// Maps javac messages on the generated wrapper back to cell lines.
#[derive(Debug, Clone, Default)]
pub struct ErrorMapper {
    line_map: Vec<LineMapping>,
}

#[derive(Debug, Clone, Copy)]
struct LineMapping {
    generated_line: usize,
    original_line: usize,
}

impl ErrorMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line mapping from generated code to the cell.
    pub fn add_mapping(&mut self, generated_line: usize, original_line: usize) {
        self.line_map.push(LineMapping {
            generated_line,
            original_line,
        });
    }

    /// Cell line for a generated line. Wrapper boilerplate has none.
    pub fn map_line(&self, generated_line: usize) -> Option<usize> {
        self.line_map
            .iter()
            .find(|m| m.generated_line == generated_line)
            .map(|m| m.original_line)
    }

    /// Parse javac's stderr.
    ///
    /// ```text
    /// /tmp/.../Snippet3.java:12: error: cannot find symbol
    ///         foo(x);
    ///         ^
    ///   symbol:   method foo(int)
    ///   location: class Snippet3
    /// 1 error
    /// ```
    pub fn parse_javac_output(&self, stderr: &str) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut source_line: Option<&str> = None;

        for line in stderr.lines() {
            if let Some((generated, level, message)) = parse_header(line) {
                diagnostics.push(Diagnostic {
                    message: message.to_string(),
                    level,
                    line: self.map_line(generated),
                    column: None,
                    detail: Vec::new(),
                });
                source_line = None;
                continue;
            }

            let Some(current) = diagnostics.last_mut() else {
                continue;
            };
            let trimmed = line.trim();
            if trimmed.starts_with("symbol:") || trimmed.starts_with("location:") {
                let (label, value) = trimmed.split_once(':').unwrap_or((trimmed, ""));
                current.detail.push(format!("{label}: {}", value.trim()));
            } else if trimmed == "^" && source_line.is_some() {
                current.column = line.find('^').map(|c| c + 1);
            } else if source_line.is_none() && current.column.is_none() && current.detail.is_empty() {
                source_line = Some(line);
            }
        }

        diagnostics
    }
}

/// `<file>.java:<line>: <level>: <message>`
fn parse_header(line: &str) -> Option<(usize, ErrorLevel, &str)> {
    let at = line.find(".java:")?;
    let rest = &line[at + ".java:".len()..];
    let (number, rest) = rest.split_once(':')?;
    let generated: usize = number.trim().parse().ok()?;
    let rest = rest.trim_start();
    let (level, message) = if let Some(m) = rest.strip_prefix("error:") {
        (ErrorLevel::Error, m)
    } else if let Some(m) = rest.strip_prefix("warning:") {
        (ErrorLevel::Warning, m)
    } else if let Some(m) = rest.strip_prefix("note:") {
        (ErrorLevel::Note, m)
    } else {
        return None;
    };
    Some((generated, level, message.trim()))
}
