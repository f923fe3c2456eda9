//! Wrapper class generation.
//!
//! Each cell compiles to one class in [`SNIPPET_PACKAGE`]:
//!
//! ```java
//! package javelin.snippets;
//! import java.util.*;                             // prelude
//! import static org.mockito.Mockito.*;            // earlier cells' imports
//! import static javelin.snippets.Snippet2.mockedList; // earlier declarations
//! public class Snippet3 {
//!     public static Object __value;
//!     public static boolean __hasValue;
//!     public static List other;                   // variables
//!     public static int square(int x) { ... }     // methods
//!     public static class Foo { ... }             // types
//!     public static void run() throws Throwable { // statements, in order
//!         other = mock(List.class);
//!         __value = (square(4)); __hasValue = true;
//!     }
//! }
//! ```
//!
//! Earlier declarations are reached through single imports of the latest
//! declaring wrapper. A redeclaration therefore shadows for later cells while
//! the classes compiled before it keep their own bindings.

use std::collections::HashMap;

use super::errors::{CompileError, ErrorMapper};
use crate::context::{Capture, ExecutionContext, Namespace, NewDeclaration};
use crate::snippet::{Snippet, SnippetKind};

/// Package of all generated wrapper classes.
pub const SNIPPET_PACKAGE: &str = "javelin.snippets";

/// Imports available in every cell when the prelude is enabled.
pub const DEFAULT_IMPORTS: &[&str] = &[
    "java.util.*",
    "java.util.function.*",
    "java.util.stream.*",
    "java.io.*",
    "java.math.*",
    "java.net.*",
    "java.nio.file.*",
    "java.util.concurrent.*",
    "java.util.regex.*",
];

/// Field holding the trailing expression's value.
pub const VALUE_FIELD: &str = "__value";

/// Flag set when the trailing expression was evaluated.
pub const HAS_VALUE_FIELD: &str = "__hasValue";

/// Modifiers dropped from methods and types before `public static` is added.
const REPLACED_MODIFIERS: &[&str] = &["public", "protected", "private", "static"];

/// Generated source for one cell.
#[derive(Debug, Clone)]
pub struct WrapperSource {
    /// Simple class name, e.g. `Snippet3`.
    pub simple_name: String,
    /// Binary class name, e.g. `javelin.snippets.Snippet3`.
    pub class_name: String,
    /// Java source of the wrapper.
    pub source: String,
    /// Generated-to-cell line mapping.
    pub mapper: ErrorMapper,
    /// Declarations to commit when the cell links.
    pub declarations: Vec<NewDeclaration>,
    /// Bindings of referenced names at generation time.
    pub captures: Vec<Capture>,
    /// Whether the cell ends with a displayed expression.
    pub has_value: bool,
}

impl WrapperSource {
    /// Relative path of the source file under a source root.
    pub fn relative_path(&self) -> String {
        format!("{}/{}.java", SNIPPET_PACKAGE.replace('.', "/"), self.simple_name)
    }
}

struct SourceBuilder {
    out: String,
    next_line: usize,
    mapper: ErrorMapper,
}

impl SourceBuilder {
    fn new() -> Self {
        Self {
            out: String::new(),
            next_line: 1,
            mapper: ErrorMapper::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
        self.next_line += 1 + text.matches('\n').count();
    }

    /// Emit user text, mapping each of its lines back to the cell.
    fn mapped(&mut self, text: &str, cell_line: usize) {
        for (offset, line) in text.split('\n').enumerate() {
            self.mapper.add_mapping(self.next_line, cell_line + offset);
            self.out.push_str(line);
            self.out.push('\n');
            self.next_line += 1;
        }
    }
}

/// An import or declaration competing for a simple name.
struct Candidate {
    order: u64,
    text: String,
}

/// Keep the most recent candidate for a simple name.
fn offer(map: &mut HashMap<String, Candidate>, name: &str, order: u64, text: String) {
    if map.get(name).is_none_or(|c| c.order <= order) {
        map.insert(name.to_string(), Candidate { order, text });
    }
}

/// Options for [`generate`].
#[derive(Debug, Clone, Copy)]
pub struct WrapperOptions {
    /// Import [`DEFAULT_IMPORTS`].
    pub default_imports: bool,
    /// Store a trailing expression's value. When off, the expression runs as
    /// a plain statement (used for `void` calls).
    pub capture_value: bool,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            default_imports: true,
            capture_value: true,
        }
    }
}

/// Generate the wrapper class for a cell.
///
/// `index` numbers the class; it must be unique within a session (attempts
/// that failed to compile still consume one).
pub fn generate(
    index: u64,
    snippets: &[Snippet],
    context: &ExecutionContext,
    options: WrapperOptions,
) -> Result<WrapperSource, CompileError> {
    let simple_name = format!("Snippet{index}");
    let class_name = format!("{SNIPPET_PACKAGE}.{simple_name}");

    let declared: Vec<&str> = snippets.iter().flat_map(Snippet::declared_names).collect();
    let mut declarations = Vec::new();

    let mut b = SourceBuilder::new();
    b.line(&format!("package {SNIPPET_PACKAGE};"));
    if options.default_imports {
        for import in DEFAULT_IMPORTS {
            b.line(&format!("import {import};"));
        }
    }

    // Single imports compete by simple name within their category; the most
    // recent one wins. On-demand imports never conflict.
    let mut types: HashMap<String, Candidate> = HashMap::new();
    let mut members: HashMap<String, Candidate> = HashMap::new();
    let mut on_demand: Vec<String> = Vec::new();

    for decl in context.visible(Namespace::Import) {
        let (is_static, path) = match decl.name.strip_prefix("static ") {
            Some(path) => (true, path),
            None => (false, decl.name.as_str()),
        };
        let simple = path.rsplit('.').next().unwrap_or(path);
        if simple == "*" {
            on_demand.push(decl.source.clone());
        } else if is_static {
            offer(&mut members, simple, decl.snippet, decl.source.clone());
        } else {
            offer(&mut types, simple, decl.snippet, decl.source.clone());
        }
    }
    for namespace in [Namespace::Variable, Namespace::Method] {
        for decl in context.visible(namespace) {
            let text = format!("import static {}.{};", decl.owner, decl.name);
            offer(&mut members, &decl.name, decl.snippet, text);
        }
    }
    for decl in context.visible(Namespace::Type) {
        let text = format!("import {}.{};", decl.owner, decl.name);
        offer(&mut types, &decl.name, decl.snippet, text);
    }

    // The cell's own imports and declarations are newest of all.
    for snippet in snippets {
        if let SnippetKind::Import { is_static, path } = &snippet.kind {
            let simple = path.rsplit('.').next().unwrap_or(path);
            if simple != "*" {
                let map = if *is_static { &mut members } else { &mut types };
                map.remove(simple);
            }
        }
    }
    for name in &declared {
        members.remove(*name);
        types.remove(*name);
    }

    for text in on_demand {
        b.line(&text);
    }
    let mut singles: Vec<Candidate> = types.into_values().chain(members.into_values()).collect();
    singles.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.text.cmp(&b.text)));
    for candidate in singles {
        b.line(&candidate.text);
    }

    for snippet in snippets {
        if let SnippetKind::Import { is_static, path } = &snippet.kind {
            b.mapped(&snippet.source, snippet.line);
            let name = if *is_static {
                format!("static {path}")
            } else {
                path.clone()
            };
            let source = format!("import {name};");
            declarations.push(NewDeclaration {
                namespace: Namespace::Import,
                name,
                source,
            });
        }
    }

    b.line(&format!("public class {simple_name} {{"));
    b.line(&format!("public static Object {VALUE_FIELD};"));
    b.line(&format!("public static boolean {HAS_VALUE_FIELD};"));

    // Statements of run(), with the cell line each starts on.
    let mut body: Vec<(String, usize)> = Vec::new();
    let mut has_value = false;

    for snippet in snippets {
        match &snippet.kind {
            SnippetKind::Import { .. } => {}
            SnippetKind::Variable {
                type_text,
                declarators,
            } => {
                if type_text == "var" {
                    return Err(CompileError::type_error(
                        "'var' is not allowed for top-level variables; declare the type explicitly",
                        Some(snippet.body_line),
                    ));
                }
                for d in declarators {
                    let dims = "[]".repeat(d.dims);
                    b.mapped(
                        &format!("public static {type_text} {}{dims};", d.name),
                        snippet.body_line,
                    );
                    declarations.push(NewDeclaration {
                        namespace: Namespace::Variable,
                        name: d.name.clone(),
                        source: snippet.source.clone(),
                    });
                    if let Some(init) = &d.init {
                        let value = if init.starts_with('{') {
                            format!("new {type_text}{dims}{init}")
                        } else {
                            init.clone()
                        };
                        body.push((format!("{} = {value};", d.name), d.line));
                    }
                }
            }
            SnippetKind::Method { name } | SnippetKind::Type { name, .. } => {
                b.mapped(&member_source(snippet), snippet.line);
                let namespace = if matches!(snippet.kind, SnippetKind::Method { .. }) {
                    Namespace::Method
                } else {
                    Namespace::Type
                };
                declarations.push(NewDeclaration {
                    namespace,
                    name: name.clone(),
                    source: snippet.source.clone(),
                });
            }
            SnippetKind::Statement => body.push((snippet.source.clone(), snippet.line)),
            SnippetKind::Expression if options.capture_value => {
                has_value = true;
                body.push((
                    format!("{VALUE_FIELD} = ({}); {HAS_VALUE_FIELD} = true;", snippet.source),
                    snippet.line,
                ));
            }
            SnippetKind::Expression => body.push((format!("{};", snippet.source), snippet.line)),
        }
    }

    b.line("public static void run() throws Throwable {");
    for (text, line) in &body {
        b.mapped(text, *line);
    }
    b.line("}");
    b.line("}");

    let references = snippets
        .iter()
        .flat_map(|s| s.references.iter().map(String::as_str))
        .filter(|name| !declared.contains(name));
    let captures = context.capture(references);

    Ok(WrapperSource {
        simple_name,
        class_name,
        source: b.out,
        mapper: b.mapper,
        declarations,
        captures,
        has_value,
    })
}

/// Method or type source with its access modifiers replaced by `public static`.
fn member_source(snippet: &Snippet) -> String {
    let mut parts: Vec<&str> = snippet.annotations.iter().map(String::as_str).collect();
    parts.push("public static");
    parts.extend(
        snippet
            .modifiers
            .iter()
            .map(String::as_str)
            .filter(|m| !REPLACED_MODIFIERS.contains(m)),
    );
    parts.push(&snippet.body);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::errors::CompileErrorKind;
    use crate::context::CompiledUnit;
    use crate::snippet::analyze;

    fn wrap(index: u64, src: &str, context: &ExecutionContext) -> WrapperSource {
        generate(index, &analyze(src).unwrap(), context, WrapperOptions::default()).unwrap()
    }

    fn commit(context: &mut ExecutionContext, wrapper: WrapperSource) {
        context.apply(CompiledUnit {
            class_name: wrapper.class_name,
            source: String::new(),
            declarations: wrapper.declarations,
            captures: wrapper.captures,
        });
    }

    #[test]
    fn test_variable_becomes_field_and_assignment() {
        let context = ExecutionContext::new();
        let wrapper = wrap(1, "List mockedList = mock(List.class);", &context);

        assert_eq!(wrapper.class_name, "javelin.snippets.Snippet1");
        assert!(wrapper.source.contains("public static List mockedList;"));
        assert!(wrapper.source.contains("mockedList = mock(List.class);"));
        assert!(wrapper.source.contains("import java.util.*;"));
        assert_eq!(wrapper.declarations.len(), 1);
        assert_eq!(wrapper.declarations[0].namespace, Namespace::Variable);
        assert!(!wrapper.has_value);
    }

    #[test]
    fn test_later_cell_imports_latest_declaration() {
        let mut context = ExecutionContext::new();
        let first = wrap(1, "int x = 1;", &context);
        commit(&mut context, first);
        let second = wrap(2, "int x = 2;", &context);
        commit(&mut context, second);

        let third = wrap(3, "x + 1", &context);
        assert!(third.source.contains("import static javelin.snippets.Snippet2.x;"));
        assert!(!third.source.contains("Snippet1.x"));
        assert!(third.has_value);
        assert!(third.source.contains("__value = (x + 1); __hasValue = true;"));
        assert_eq!(third.captures[0].snippet, 2);
    }

    #[test]
    fn test_redeclared_name_not_imported() {
        let mut context = ExecutionContext::new();
        let first = wrap(1, "int x = 1;", &context);
        commit(&mut context, first);

        let second = wrap(2, "String x = \"s\";", &context);
        assert!(!second.source.contains("Snippet1.x"));
        assert!(second.captures.is_empty());
    }

    #[test]
    fn test_methods_and_types_become_static_members() {
        let context = ExecutionContext::new();
        let wrapper = wrap(
            1,
            "private int square(int x) { return x * x; }\n@Deprecated final class Box { int v; }",
            &context,
        );
        assert!(wrapper.source.contains("public static int square(int x) { return x * x; }"));
        assert!(wrapper.source.contains("@Deprecated public static final class Box { int v; }"));
    }

    #[test]
    fn test_type_import_uses_nested_name() {
        let mut context = ExecutionContext::new();
        let first = wrap(1, "class TestMockedList { }", &context);
        commit(&mut context, first);

        let second = wrap(2, "new TestMockedList();", &context);
        assert!(second.source.contains("import javelin.snippets.Snippet1.TestMockedList;"));
    }

    #[test]
    fn test_user_import_replaces_older_type() {
        let mut context = ExecutionContext::new();
        let first = wrap(1, "class List { }", &context);
        commit(&mut context, first);
        let second = wrap(2, "import java.util.List;", &context);
        commit(&mut context, second);

        let third = wrap(3, "List l = null;", &context);
        assert!(third.source.contains("import java.util.List;"));
        assert!(!third.source.contains("Snippet1.List"));
    }

    #[test]
    fn test_array_initializer_rewritten() {
        let wrapper = wrap(1, "int a[] = {1, 2};", &ExecutionContext::new());
        assert!(wrapper.source.contains("public static int a[];"));
        assert!(wrapper.source.contains("a = new int[]{1, 2};"));
    }

    #[test]
    fn test_var_rejected() {
        let snippets = analyze("\nvar x = 5;").unwrap();
        let err = generate(1, &snippets, &ExecutionContext::new(), WrapperOptions::default()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeError);
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_line_mapping() {
        let wrapper = wrap(1, "int a = 1;\n\nSystem.out.println(a);", &ExecutionContext::new());
        let generated = wrapper
            .source
            .lines()
            .position(|l| l.starts_with("System.out.println"))
            .unwrap()
            + 1;
        assert_eq!(wrapper.mapper.map_line(generated), Some(3));
    }

    #[test]
    fn test_prelude_can_be_disabled() {
        let snippets = analyze("1").unwrap();
        let options = WrapperOptions {
            default_imports: false,
            ..Default::default()
        };
        let wrapper = generate(1, &snippets, &ExecutionContext::new(), options).unwrap();
        assert!(!wrapper.source.contains("import java.util.*;"));
    }

    #[test]
    fn test_expression_without_value_capture() {
        let snippets = analyze("System.out.println(1)").unwrap();
        let options = WrapperOptions {
            capture_value: false,
            ..Default::default()
        };
        let wrapper = generate(1, &snippets, &ExecutionContext::new(), options).unwrap();
        assert!(!wrapper.has_value);
        assert!(wrapper.source.contains("\nSystem.out.println(1);\n"));
    }
}
