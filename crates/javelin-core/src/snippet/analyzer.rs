//! Splits a code cell into top-level snippets and classifies them.

use std::ops::Range;

use super::lexer::{Token, TokenKind, tokenize};

/// Modifiers accepted in front of top-level declarations.
const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "abstract",
    "native",
    "synchronized",
    "transient",
    "volatile",
    "strictfp",
    "sealed",
];

/// Keywords that start a statement.
const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "for", "while", "do", "switch", "try", "return", "throw", "break", "continue", "assert",
    "yield", "new", "this", "super",
];

/// Keywords that start a statement whose body ends with a closing brace.
const BLOCK_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "try", "synchronized"];

/// A declared variable within a variable snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarator {
    pub name: String,
    /// Array dimensions written after the name (`int a[]`).
    pub dims: usize,
    /// Initializer text, if any.
    pub init: Option<String>,
    /// Cell line the initializer starts on.
    pub line: usize,
}

/// What a snippet declares or does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetKind {
    Import { is_static: bool, path: String },
    Type { name: String, keyword: String },
    Method { name: String },
    Variable { type_text: String, declarators: Vec<Declarator> },
    Statement,
    /// A trailing expression without `;`, whose value is displayed.
    Expression,
}

/// One top-level unit of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub kind: SnippetKind,
    /// Full source text, terminator included.
    pub source: String,
    /// Annotation texts in front of a declaration.
    pub annotations: Vec<String>,
    /// Modifier keywords in front of a declaration.
    pub modifiers: Vec<String>,
    /// Source after annotations and modifiers.
    pub body: String,
    /// Cell line of the first token.
    pub line: usize,
    /// Cell line of the first body token.
    pub body_line: usize,
    /// Simple names referenced (identifiers not preceded by `.`).
    pub references: Vec<String>,
}

impl Snippet {
    /// Name this snippet declares in the top-level scope.
    pub fn declared_names(&self) -> Vec<&str> {
        match &self.kind {
            SnippetKind::Type { name, .. } | SnippetKind::Method { name } => vec![name.as_str()],
            SnippetKind::Variable { declarators, .. } => {
                declarators.iter().map(|d| d.name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// A syntax error found before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

/// Split and classify a cell's code.
pub fn analyze(src: &str) -> Result<Vec<Snippet>, SyntaxError> {
    let tokens = tokenize(src).map_err(|e| SyntaxError {
        message: e.message,
        line: e.line,
    })?;

    let mut snippets = Vec::new();
    for range in split(src, &tokens)? {
        snippets.push(classify(src, &tokens[range]));
    }
    Ok(snippets)
}

fn split(src: &str, tokens: &[Token]) -> Result<Vec<Range<usize>>, SyntaxError> {
    let mut ranges = Vec::new();
    let mut stack: Vec<Token> = Vec::new();
    let mut start = 0;

    for (i, tok) in tokens.iter().enumerate() {
        let TokenKind::Punct(c) = tok.kind else {
            continue;
        };
        match c {
            '(' | '[' | '{' => stack.push(*tok),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some(open) if open.is_punct(expected) => {}
                    Some(open) => {
                        return Err(SyntaxError {
                            message: format!(
                                "'{c}' does not match '{}' opened on line {}",
                                open.text(src),
                                open.line
                            ),
                            line: tok.line,
                        });
                    }
                    None => {
                        return Err(SyntaxError {
                            message: format!("unbalanced '{c}'"),
                            line: tok.line,
                        });
                    }
                }
                if c == '}' && stack.is_empty() && ends_at_brace(src, &tokens[start..=i], tokens.get(i + 1)) {
                    ranges.push(start..i + 1);
                    start = i + 1;
                }
            }
            ';' if stack.is_empty() => {
                let continues = tokens.get(i + 1).is_some_and(|next| next.is_word(src, "else"));
                if !continues {
                    ranges.push(start..i + 1);
                    start = i + 1;
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.first() {
        return Err(SyntaxError {
            message: format!("'{}' is never closed", open.text(src)),
            line: open.line,
        });
    }
    if start < tokens.len() {
        ranges.push(start..tokens.len());
    }
    // Stray semicolons are empty statements.
    ranges.retain(|r| !(r.len() == 1 && tokens[r.start].is_punct(';')));
    Ok(ranges)
}

/// Whether a depth-0 `}` terminates the snippet that started at `tokens[0]`.
fn ends_at_brace(src: &str, tokens: &[Token], next: Option<&Token>) -> bool {
    if let Some(next) = next
        && ["else", "catch", "finally"].iter().any(|w| next.is_word(src, w))
    {
        return false;
    }
    let Some(first) = tokens.first() else {
        return false;
    };
    if first.is_word(src, "do") {
        return false;
    }
    if first.is_punct('{') || BLOCK_KEYWORDS.iter().any(|w| first.is_word(src, w)) {
        return true;
    }
    // `label: for (...) { }`
    if tokens.len() > 2 && first.kind == TokenKind::Ident && tokens[1].is_punct(':') {
        return true;
    }
    matches!(
        classify(src, tokens).kind,
        SnippetKind::Type { .. } | SnippetKind::Method { .. }
    )
}

fn classify(src: &str, tokens: &[Token]) -> Snippet {
    let terminated = tokens.last().is_some_and(|t| t.is_punct(';'));
    let content = if terminated {
        &tokens[..tokens.len() - 1]
    } else {
        tokens
    };

    let text_of = |toks: &[Token]| -> String {
        match (toks.first(), toks.last()) {
            (Some(a), Some(b)) => src[a.start..b.end].to_string(),
            _ => String::new(),
        }
    };

    let references = references(src, tokens);
    let line = tokens.first().map_or(1, |t| t.line);
    let source = text_of(tokens);

    let mut i = 0;
    let mut annotations = Vec::new();
    while i < content.len()
        && content[i].is_punct('@')
        && !content.get(i + 1).is_some_and(|t| t.is_word(src, "interface"))
    {
        let end = annotation_end(content, i);
        annotations.push(text_of(&content[i..end]));
        i = end;
    }

    let mut modifiers = Vec::new();
    while i < content.len() {
        let tok = &content[i];
        let is_sync_block = tok.is_word(src, "synchronized")
            && content.get(i + 1).is_some_and(|t| t.is_punct('('));
        if tok.kind == TokenKind::Ident && MODIFIERS.contains(&tok.text(src)) && !is_sync_block {
            modifiers.push(tok.text(src).to_string());
            i += 1;
        } else if tok.is_word(src, "non")
            && content.get(i + 1).is_some_and(|t| t.is_punct('-'))
            && content.get(i + 2).is_some_and(|t| t.is_word(src, "sealed"))
        {
            modifiers.push("non-sealed".to_string());
            i += 3;
        } else {
            break;
        }
    }

    let rest = &content[i..];
    let body = match (rest.first(), tokens.last()) {
        (Some(a), Some(b)) => src[a.start..b.end].to_string(),
        _ => String::new(),
    };
    let body_line = rest.first().map_or(line, |t| t.line);
    let closed = terminated || tokens.last().is_some_and(|t| t.is_punct('}'));
    let kind = classify_body(src, rest, closed, annotations.is_empty() && modifiers.is_empty());

    Snippet {
        kind,
        source,
        annotations,
        modifiers,
        body,
        line,
        body_line,
        references,
    }
}

fn classify_body(src: &str, rest: &[Token], closed: bool, bare: bool) -> SnippetKind {
    let statement = || {
        if closed {
            SnippetKind::Statement
        } else {
            SnippetKind::Expression
        }
    };

    let Some(first) = rest.first() else {
        return SnippetKind::Statement;
    };

    if bare && first.is_word(src, "import") {
        let is_static = rest.get(1).is_some_and(|t| t.is_word(src, "static"));
        let skip = if is_static { 2 } else { 1 };
        let path: String = rest[skip..].iter().map(|t| t.text(src)).collect();
        return SnippetKind::Import { is_static, path };
    }

    // Type declarations.
    let (keyword, name_at) = if first.is_punct('@') && rest.get(1).is_some_and(|t| t.is_word(src, "interface")) {
        ("@interface".to_string(), 2)
    } else {
        (first.text(src).to_string(), 1)
    };
    let is_record = keyword == "record"
        && rest.get(1).is_some_and(|t| t.kind == TokenKind::Ident)
        && rest.get(2).is_some_and(|t| t.is_punct('(') || t.is_punct('<'));
    if matches!(keyword.as_str(), "class" | "interface" | "enum" | "@interface") || is_record {
        if let Some(name) = rest.get(name_at).filter(|t| t.kind == TokenKind::Ident) {
            return SnippetKind::Type {
                name: name.text(src).to_string(),
                keyword,
            };
        }
        return statement();
    }

    if first.is_punct('{')
        || (first.kind == TokenKind::Ident && STATEMENT_KEYWORDS.contains(&first.text(src)))
        || first.is_word(src, "synchronized")
    {
        return statement();
    }

    // Declarations start with a type (optionally preceded by method type
    // parameters) followed by a name.
    let mut i = 0;
    let generic_method = first.is_punct('<');
    if generic_method {
        match skip_angles(rest, 0) {
            Some(end) => i = end,
            None => return statement(),
        }
    }
    let type_start = i;
    let Some(type_end) = parse_type(src, rest, i) else {
        return statement();
    };
    let Some(name) = rest.get(type_end).filter(|t| t.kind == TokenKind::Ident) else {
        return statement();
    };
    let name_text = name.text(src);
    if matches!(name_text, "instanceof") {
        return statement();
    }

    if rest.get(type_end + 1).is_some_and(|t| t.is_punct('(')) {
        if rest.last().is_some_and(|t| t.is_punct('}')) {
            return SnippetKind::Method {
                name: name_text.to_string(),
            };
        }
        return statement();
    }
    if generic_method {
        return statement();
    }

    let type_text = src[rest[type_start].start..rest[type_end - 1].end].to_string();
    match declarators(src, &rest[type_end..]) {
        Some(declarators) => SnippetKind::Variable {
            type_text,
            declarators,
        },
        None => statement(),
    }
}

/// Index just past an annotation starting at `tokens[i] == '@'`.
fn annotation_end(tokens: &[Token], i: usize) -> usize {
    let mut j = i + 1;
    while j < tokens.len() && tokens[j].kind == TokenKind::Ident {
        j += 1;
        if tokens.get(j).is_some_and(|t| t.is_punct('.')) && tokens.get(j + 1).is_some_and(|t| t.kind == TokenKind::Ident) {
            j += 1;
        } else {
            break;
        }
    }
    if tokens.get(j).is_some_and(|t| t.is_punct('(')) {
        let mut depth = 0usize;
        while j < tokens.len() {
            if tokens[j].is_punct('(') {
                depth += 1;
            } else if tokens[j].is_punct(')') {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            j += 1;
        }
    }
    j
}

/// Index just past a balanced `<...>` starting at `tokens[i]`.
fn skip_angles(tokens: &[Token], i: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, tok) in tokens.iter().enumerate().skip(i) {
        match tok.kind {
            TokenKind::Punct('<') => depth += 1,
            TokenKind::Punct('>') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            TokenKind::Ident | TokenKind::Punct('.' | ',' | '?' | '[' | ']' | '&' | '@') => {}
            _ => return None,
        }
    }
    None
}

/// Parse `Name(.Name)*<args>?([])*` and return the index after it.
fn parse_type(src: &str, tokens: &[Token], mut i: usize) -> Option<usize> {
    let first = tokens.get(i)?;
    if first.kind != TokenKind::Ident || STATEMENT_KEYWORDS.contains(&first.text(src)) {
        return None;
    }
    i += 1;
    loop {
        if tokens.get(i).is_some_and(|t| t.is_punct('<')) {
            i = skip_angles(tokens, i)?;
        }
        if tokens.get(i).is_some_and(|t| t.is_punct('.'))
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Ident)
        {
            i += 2;
            continue;
        }
        break;
    }
    while tokens.get(i).is_some_and(|t| t.is_punct('['))
        && tokens.get(i + 1).is_some_and(|t| t.is_punct(']'))
    {
        i += 2;
    }
    Some(i)
}

/// Parse `name([])* (= init)? (, ...)*`.
fn declarators(src: &str, tokens: &[Token]) -> Option<Vec<Declarator>> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let name = tokens.get(i).filter(|t| t.kind == TokenKind::Ident)?;
        i += 1;
        let mut dims = 0;
        while tokens.get(i).is_some_and(|t| t.is_punct('['))
            && tokens.get(i + 1).is_some_and(|t| t.is_punct(']'))
        {
            dims += 1;
            i += 2;
        }

        let mut init = None;
        let mut line = name.line;
        match tokens.get(i) {
            None => {}
            Some(t) if t.is_punct(',') => i += 1,
            Some(t) if t.is_punct('=') => {
                i += 1;
                let start = i;
                let mut depth = 0usize;
                while i < tokens.len() {
                    match tokens[i].kind {
                        TokenKind::Punct('(' | '[' | '{') => depth += 1,
                        TokenKind::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                        TokenKind::Punct(',') if depth == 0 => break,
                        _ => {}
                    }
                    i += 1;
                }
                let init_tokens = &tokens[start..i];
                let (first, last) = (init_tokens.first()?, init_tokens.last()?);
                init = Some(src[first.start..last.end].to_string());
                line = first.line;
                if i < tokens.len() {
                    i += 1;
                }
            }
            Some(_) => return None,
        }

        result.push(Declarator {
            name: name.text(src).to_string(),
            dims,
            init,
            line,
        });
    }
    (!result.is_empty()).then_some(result)
}

fn references(src: &str, tokens: &[Token]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Ident {
            continue;
        }
        if i > 0 && tokens[i - 1].is_punct('.') {
            continue;
        }
        let text = tok.text(src);
        if !names.iter().any(|n| n == text) {
            names.push(text.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<SnippetKind> {
        analyze(src).unwrap().into_iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_imports() {
        let snippets = analyze("import java.util.List;\nimport static org.mockito.Mockito.*;").unwrap();
        assert_eq!(
            snippets[0].kind,
            SnippetKind::Import {
                is_static: false,
                path: "java.util.List".into()
            }
        );
        assert_eq!(
            snippets[1].kind,
            SnippetKind::Import {
                is_static: true,
                path: "org.mockito.Mockito.*".into()
            }
        );
        assert_eq!(snippets[1].line, 2);
    }

    #[test]
    fn test_variable_declaration() {
        let snippets = analyze("List mockedList = mock(List.class);").unwrap();
        match &snippets[0].kind {
            SnippetKind::Variable { type_text, declarators } => {
                assert_eq!(type_text, "List");
                assert_eq!(declarators.len(), 1);
                assert_eq!(declarators[0].name, "mockedList");
                assert_eq!(declarators[0].init.as_deref(), Some("mock(List.class)"));
            }
            other => panic!("expected variable, got {other:?}"),
        }
        assert!(snippets[0].references.contains(&"mock".to_string()));
        assert!(!snippets[0].references.contains(&"class".to_string()));
    }

    #[test]
    fn test_generic_and_multi_declarators() {
        let snippets =
            analyze("final Map<String, List<Integer>> m = new HashMap<>(), n;\nint a[] = {1, 2}, b = 3;").unwrap();
        match &snippets[0].kind {
            SnippetKind::Variable { type_text, declarators } => {
                assert_eq!(type_text, "Map<String, List<Integer>>");
                assert_eq!(declarators.len(), 2);
                assert_eq!(declarators[1].init, None);
            }
            other => panic!("expected variable, got {other:?}"),
        }
        assert_eq!(snippets[0].modifiers, vec!["final"]);
        match &snippets[1].kind {
            SnippetKind::Variable { declarators, .. } => {
                assert_eq!(declarators[0].dims, 1);
                assert_eq!(declarators[0].init.as_deref(), Some("{1, 2}"));
                assert_eq!(declarators[1].init.as_deref(), Some("3"));
            }
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn test_statements_and_expression() {
        assert_eq!(
            kinds("mockedList.add(\"Hello!\");\nx = 4;\nSystem.out.println(x);\n1 + 2"),
            vec![
                SnippetKind::Statement,
                SnippetKind::Statement,
                SnippetKind::Statement,
                SnippetKind::Expression
            ]
        );
    }

    #[test]
    fn test_class_with_annotated_method() {
        let src = "class TestMockedList {\n    @Test\n    void testHelloInList() {\n        List l = mock(List.class);\n    }\n}\nrunTests(TestMockedList.class);";
        let snippets = analyze(src).unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(
            snippets[0].kind,
            SnippetKind::Type {
                name: "TestMockedList".into(),
                keyword: "class".into()
            }
        );
        assert_eq!(snippets[1].kind, SnippetKind::Statement);
        assert_eq!(snippets[1].line, 7);
    }

    #[test]
    fn test_methods() {
        let src = "public static int square(int x) { return x * x; }\n<T> List<T> twice(T t) { return List.of(t, t); }\nvoid hello() throws IOException {}";
        let names: Vec<_> = analyze(src)
            .unwrap()
            .into_iter()
            .map(|s| match s.kind {
                SnippetKind::Method { name } => name,
                other => panic!("expected method, got {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["square", "twice", "hello"]);
    }

    #[test]
    fn test_control_flow_blocks() {
        let src = "if (a) { b(); } else { c(); }\ntry { d(); } catch (Exception e) { }\nfor (int i = 0; i < 3; i++) { }\ndo { x++; } while (x < 3);";
        assert_eq!(kinds(src), vec![SnippetKind::Statement; 4]);
    }

    #[test]
    fn test_lambda_variable_ends_at_semicolon() {
        let src = "Runnable r = () -> { System.out.println(1); };\nr.run();";
        let snippets = analyze(src).unwrap();
        assert_eq!(snippets.len(), 2);
        assert!(matches!(snippets[0].kind, SnippetKind::Variable { .. }));
    }

    #[test]
    fn test_records_enums_and_annotation_types() {
        let src = "record Point(int x, int y) {}\nenum Color { RED, GREEN }\n@FunctionalInterface interface F { void f(); }\n@interface Marker {}";
        let snippets = analyze(src).unwrap();
        let names: Vec<_> = snippets.iter().flat_map(|s| s.declared_names()).collect();
        assert_eq!(names, vec!["Point", "Color", "F", "Marker"]);
        assert_eq!(snippets[2].annotations, vec!["@FunctionalInterface"]);
    }

    #[test]
    fn test_syntax_errors() {
        let err = analyze("int x = (1 + 2;\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("never closed"));

        let err = analyze("foo(]);").unwrap_err();
        assert!(err.message.contains("does not match"));

        let err = analyze("a();\n}").unwrap_err();
        assert_eq!(err.line, 2);

        assert!(analyze("String s = \"oops;").is_err());
    }

    #[test]
    fn test_var_is_parsed_as_variable() {
        match &analyze("var x = 5;").unwrap()[0].kind {
            SnippetKind::Variable { type_text, .. } => assert_eq!(type_text, "var"),
            other => panic!("expected variable, got {other:?}"),
        }
    }
}
