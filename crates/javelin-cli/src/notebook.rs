//! Percent-format notebook reader.
//!
//! ```java
//! // %% [markdown]
//! // # Mocking a list
//!
//! // %%
//! // %maven org.mockito:mockito-core:4.11.+
//! import static org.mockito.Mockito.*;
//! ```
//!
//! Cells start at `// %%` lines; a `[markdown]` tag marks prose. Directives
//! may be written as `// %maven ...` so the file stays valid Java for editors.

use javelin_core::{Cell, CellKind};

const CELL_MARKER: &str = "// %%";

/// Split a notebook into cells, skipping empty ones.
pub fn parse_notebook(text: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut kind = CellKind::Code;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(tag) = line.trim_start().strip_prefix(CELL_MARKER) {
            flush(&mut cells, kind, &lines);
            lines.clear();
            kind = if tag.trim_start().starts_with("[markdown]") {
                CellKind::Markdown
            } else {
                CellKind::Code
            };
            continue;
        }
        lines.push(line);
    }
    flush(&mut cells, kind, &lines);
    cells
}

fn flush(cells: &mut Vec<Cell>, kind: CellKind, lines: &[&str]) {
    if lines.iter().all(|l| l.trim().is_empty()) {
        return;
    }
    let source = match kind {
        CellKind::Markdown => lines
            .iter()
            .map(|l| l.trim_start().trim_start_matches("//").trim_start())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => uncomment_directives(lines),
    };
    let kind = if kind == CellKind::Code && is_directive_only(&source) {
        CellKind::Directive
    } else {
        kind
    };
    cells.push(Cell {
        index: cells.len(),
        kind,
        source: source.trim_end().to_string(),
    });
}

/// `// %maven x` becomes `%maven x` in the leading block of a code cell.
fn uncomment_directives(lines: &[&str]) -> String {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_header = true;
    for line in lines {
        let trimmed = line.trim_start();
        let directive = trimmed
            .strip_prefix("//")
            .map(str::trim_start)
            .filter(|rest| rest.starts_with('%'));
        match directive {
            Some(rest) if in_header => out.push(rest.to_string()),
            _ => {
                if !trimmed.is_empty() && !trimmed.starts_with('%') {
                    in_header = false;
                }
                out.push(line.to_string());
            }
        }
    }
    out.join("\n")
}

fn is_directive_only(source: &str) -> bool {
    source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .all(|l| l.starts_with('%'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTEBOOK: &str = "\
// %% [markdown]
// # Mocking
// Some prose.

// %%
// %maven org.mockito:mockito-core:4.11.+

// %%
%jars lib/
import static org.mockito.Mockito.*;
List mockedList = mock(List.class);
// %maven not:a:directive

// %%

// %%
mockedList.add(\"Hello!\");
";

    #[test]
    fn test_cells_and_kinds() {
        let cells = parse_notebook(NOTEBOOK);
        let kinds: Vec<_> = cells.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CellKind::Markdown,
                CellKind::Directive,
                CellKind::Code,
                CellKind::Code
            ]
        );
        assert_eq!(cells[0].source, "# Mocking\nSome prose.");
        assert_eq!(cells[1].source, "%maven org.mockito:mockito-core:4.11.+");
        assert_eq!(cells[3].index, 3);
    }

    #[test]
    fn test_only_leading_directives_are_uncommented() {
        let cells = parse_notebook(NOTEBOOK);
        let lines: Vec<&str> = cells[2].source.lines().collect();
        assert_eq!(lines[0], "%jars lib/");
        assert_eq!(lines[3], "// %maven not:a:directive");
    }

    #[test]
    fn test_code_before_first_marker() {
        let cells = parse_notebook("int x = 1;\n// %%\nx");
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].source, "int x = 1;");
        assert_eq!(cells[1].source, "x");
    }

    #[test]
    fn test_markdown_tag_with_attributes() {
        let text = "// %% [markdown] lang=\"de\" tags=[\"slide\"]\n// # Einleitung\n// %%\nint x = 1;";
        let cells = parse_notebook(text);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].kind, CellKind::Markdown);
        assert_eq!(cells[0].source, "# Einleitung");
        assert_eq!(cells[1].kind, CellKind::Code);
    }

    #[test]
    fn test_empty_notebook() {
        assert!(parse_notebook("").is_empty());
        assert!(parse_notebook("// %%\n\n// %% [markdown]\n").is_empty());
    }
}
