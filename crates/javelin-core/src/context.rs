//! Persistent execution context.
//!
//! The context is the set of top-level declarations visible to the next
//! cell. It only changes when a cell compiles and links successfully, so a
//! failed cell leaves it exactly as it was.
//!
//! Redeclaring a name shadows the old declaration instead of mutating it:
//! the registry keeps every declaration ever committed, and cells compiled
//! earlier keep referring to the declaration they were compiled against
//! (recorded as captures).

use std::fmt;

use indexmap::IndexMap;

/// Declaration namespaces. Names only collide within a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Variable,
    Method,
    Type,
    Import,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Namespace::Variable => "variable",
            Namespace::Method => "method",
            Namespace::Type => "type",
            Namespace::Import => "import",
        };
        f.write_str(name)
    }
}

/// Lookup key of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclKey {
    pub namespace: Namespace,
    pub name: String,
}

/// A name bound to a specific declaration when a cell was compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub namespace: Namespace,
    pub name: String,
    pub snippet: u64,
}

/// A committed declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Id of the snippet (cell) that declared it.
    pub snippet: u64,
    pub namespace: Namespace,
    /// Simple name, or the imported path for imports.
    pub name: String,
    /// Binary name of the wrapper class that holds it.
    pub owner: String,
    /// Declaration source as written in the cell.
    pub source: String,
    /// Bindings of the names the declaring cell referenced.
    pub captures: Vec<Capture>,
}

impl Declaration {
    /// Binary name of a declared type (`javelin.snippets.Snippet3$Foo`).
    pub fn binary_name(&self) -> String {
        format!("{}${}", self.owner, self.name)
    }
}

/// A declaration produced by compiling a cell, before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeclaration {
    pub namespace: Namespace,
    pub name: String,
    pub source: String,
}

/// Everything a successfully linked cell contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    /// Binary name of the wrapper class.
    pub class_name: String,
    /// The cell's code.
    pub source: String,
    pub declarations: Vec<NewDeclaration>,
    pub captures: Vec<Capture>,
}

/// A unit in commit order, kept for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedUnit {
    pub snippet: u64,
    pub class_name: String,
    pub source: String,
}

/// The result of committing a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUpdate {
    pub snippet: u64,
    pub added: Vec<Declaration>,
    pub shadowed: Vec<Declaration>,
}

/// Declarations visible to the next cell, plus their full history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    last_snippet: u64,
    visible: IndexMap<DeclKey, usize>,
    registry: Vec<Declaration>,
    units: Vec<CommittedUnit>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a compiled unit. Later declarations win lookups.
    pub fn apply(&mut self, unit: CompiledUnit) -> ContextUpdate {
        self.last_snippet += 1;
        let snippet = self.last_snippet;

        let mut added = Vec::new();
        let mut shadowed = Vec::new();
        for decl in unit.declarations {
            let declaration = Declaration {
                snippet,
                namespace: decl.namespace,
                name: decl.name,
                owner: unit.class_name.clone(),
                source: decl.source,
                captures: unit.captures.clone(),
            };
            let key = DeclKey {
                namespace: declaration.namespace,
                name: declaration.name.clone(),
            };

            self.registry.push(declaration.clone());
            let index = self.registry.len() - 1;
            if let Some(old) = self.visible.shift_remove(&key) {
                shadowed.push(self.registry[old].clone());
            }
            self.visible.insert(key, index);
            added.push(declaration);
        }

        self.units.push(CommittedUnit {
            snippet,
            class_name: unit.class_name,
            source: unit.source,
        });

        ContextUpdate {
            snippet,
            added,
            shadowed,
        }
    }

    /// The visible declaration of a name.
    pub fn lookup(&self, namespace: Namespace, name: &str) -> Option<&Declaration> {
        let key = DeclKey {
            namespace,
            name: name.to_string(),
        };
        self.visible.get(&key).map(|&i| &self.registry[i])
    }

    /// Visible declarations in one namespace, oldest first.
    pub fn visible(&self, namespace: Namespace) -> impl Iterator<Item = &Declaration> {
        self.visible
            .iter()
            .filter(move |(key, _)| key.namespace == namespace)
            .map(|(_, &i)| &self.registry[i])
    }

    /// Names of visible variables, methods and types (imports excluded).
    pub fn declarations(&self) -> Vec<&Declaration> {
        self.visible
            .iter()
            .filter(|(key, _)| key.namespace != Namespace::Import)
            .map(|(_, &i)| &self.registry[i])
            .collect()
    }

    /// Bind referenced names to their current declarations.
    pub fn capture<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<Capture> {
        let mut captures = Vec::new();
        for name in names {
            for namespace in [Namespace::Variable, Namespace::Method, Namespace::Type] {
                if let Some(decl) = self.lookup(namespace, name) {
                    captures.push(Capture {
                        namespace,
                        name: name.to_string(),
                        snippet: decl.snippet,
                    });
                }
            }
        }
        captures
    }

    /// Binary class name of a visible type.
    pub fn resolve_type(&self, simple_name: &str) -> Option<String> {
        self.lookup(Namespace::Type, simple_name)
            .map(Declaration::binary_name)
    }

    /// Every declaration ever committed, in commit order.
    pub fn registry(&self) -> &[Declaration] {
        &self.registry
    }

    /// Committed units in commit order.
    pub fn units(&self) -> &[CommittedUnit] {
        &self.units
    }

    /// Id of the most recent committed snippet (0 when empty).
    pub fn last_snippet(&self) -> u64 {
        self.last_snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(class: &str, decls: &[(Namespace, &str)], captures: Vec<Capture>) -> CompiledUnit {
        CompiledUnit {
            class_name: format!("javelin.snippets.{class}"),
            source: String::new(),
            declarations: decls
                .iter()
                .map(|(namespace, name)| NewDeclaration {
                    namespace: *namespace,
                    name: name.to_string(),
                    source: format!("{name} decl"),
                })
                .collect(),
            captures,
        }
    }

    #[test]
    fn test_apply_assigns_increasing_ids() {
        let mut context = ExecutionContext::new();
        let first = context.apply(unit("Snippet1", &[(Namespace::Variable, "x")], vec![]));
        let second = context.apply(unit("Snippet2", &[(Namespace::Method, "f")], vec![]));

        assert_eq!(first.snippet, 1);
        assert_eq!(second.snippet, 2);
        assert_eq!(context.units().len(), 2);
        assert_eq!(context.declarations().len(), 2);
    }

    #[test]
    fn test_redeclaration_shadows() {
        let mut context = ExecutionContext::new();
        context.apply(unit("Snippet1", &[(Namespace::Variable, "x")], vec![]));

        let captures = context.capture(["x"]);
        assert_eq!(captures[0].snippet, 1);
        context.apply(unit("Snippet2", &[(Namespace::Variable, "y")], captures));

        let update = context.apply(unit("Snippet3", &[(Namespace::Variable, "x")], vec![]));
        assert_eq!(update.shadowed.len(), 1);
        assert_eq!(update.shadowed[0].owner, "javelin.snippets.Snippet1");

        // Lookups see the new declaration; y still captures the old one.
        assert_eq!(
            context.lookup(Namespace::Variable, "x").unwrap().owner,
            "javelin.snippets.Snippet3"
        );
        let y = context.lookup(Namespace::Variable, "y").unwrap();
        assert_eq!(y.captures[0].snippet, 1);
        assert_eq!(context.registry().len(), 3);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let mut context = ExecutionContext::new();
        context.apply(unit(
            "Snippet1",
            &[(Namespace::Variable, "list"), (Namespace::Method, "list")],
            vec![],
        ));
        assert!(context.lookup(Namespace::Variable, "list").is_some());
        assert!(context.lookup(Namespace::Method, "list").is_some());
        assert!(context.lookup(Namespace::Type, "list").is_none());
    }

    #[test]
    fn test_imports_excluded_from_declarations() {
        let mut context = ExecutionContext::new();
        context.apply(unit("Snippet1", &[(Namespace::Import, "java.util.List")], vec![]));
        assert!(context.declarations().is_empty());
        assert_eq!(context.visible(Namespace::Import).count(), 1);
    }

    #[test]
    fn test_resolve_type_binary_name() {
        let mut context = ExecutionContext::new();
        context.apply(unit("Snippet4", &[(Namespace::Type, "TestMockedList")], vec![]));
        assert_eq!(
            context.resolve_type("TestMockedList").as_deref(),
            Some("javelin.snippets.Snippet4$TestMockedList")
        );
    }

    #[test]
    fn test_clone_compares_equal() {
        let mut context = ExecutionContext::new();
        context.apply(unit("Snippet1", &[(Namespace::Variable, "x")], vec![]));
        let before = context.clone();
        assert_eq!(before, context);
        context.apply(unit("Snippet2", &[], vec![]));
        assert_ne!(before, context);
    }
}
