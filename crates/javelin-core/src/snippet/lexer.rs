//! Java tokenizer.
//!
//! Good enough to find snippet boundaries and declarations: comments are
//! skipped, literals are opaque, and every other symbol is a single
//! character token (`>>` is two `>` tokens, which keeps generic argument
//! matching simple).

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    TextBlock,
    Punct(char),
}

/// A token with its byte range and 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_word(&self, src: &str, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(src) == word
    }
}

/// A lexical error (unterminated literal or comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl Lexer<'_> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.src[self.pos..].chars().next() {
            if c == '\n' {
                self.line += 1;
            }
            self.pos += c.len_utf8();
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.src[self.pos..].chars().next() {
            if c.is_whitespace() {
                self.advance_char();
                continue;
            }

            let start = self.pos;
            let line = self.line;

            let kind = if c == '/' && self.peek(1) == Some(b'/') {
                while let Some(b) = self.peek(0) {
                    if b == b'\n' {
                        break;
                    }
                    self.advance_char();
                }
                continue;
            } else if c == '/' && self.peek(1) == Some(b'*') {
                self.pos += 2;
                loop {
                    match self.peek(0) {
                        None => {
                            return Err(LexError {
                                message: "unterminated comment".into(),
                                line,
                            });
                        }
                        Some(b'*') if self.peek(1) == Some(b'/') => {
                            self.pos += 2;
                            break;
                        }
                        Some(_) => self.advance_char(),
                    }
                }
                continue;
            } else if self.src[self.pos..].starts_with("\"\"\"") {
                self.pos += 3;
                loop {
                    match self.peek(0) {
                        None => {
                            return Err(LexError {
                                message: "unterminated text block".into(),
                                line,
                            });
                        }
                        Some(b'\\') => {
                            self.pos += 1;
                            self.advance_char();
                        }
                        Some(b'"') if self.src[self.pos..].starts_with("\"\"\"") => {
                            self.pos += 3;
                            break;
                        }
                        Some(_) => self.advance_char(),
                    }
                }
                TokenKind::TextBlock
            } else if c == '"' || c == '\'' {
                let quote = c as u8;
                self.pos += 1;
                loop {
                    match self.peek(0) {
                        None | Some(b'\n') => {
                            let what = if quote == b'"' { "string" } else { "character" };
                            return Err(LexError {
                                message: format!("unterminated {what} literal"),
                                line,
                            });
                        }
                        Some(b'\\') => {
                            self.pos += 1;
                            if self.peek(0).is_some_and(|b| b != b'\n') {
                                self.advance_char();
                            }
                        }
                        Some(b) if b == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => self.advance_char(),
                    }
                }
                if quote == b'"' {
                    TokenKind::Str
                } else {
                    TokenKind::Char
                }
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                while let Some(n) = self.src[self.pos..].chars().next() {
                    if n.is_alphanumeric() || n == '_' || n == '$' {
                        self.pos += n.len_utf8();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident
            } else if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|b| b.is_ascii_digit())) {
                self.lex_number();
                TokenKind::Number
            } else {
                self.advance_char();
                TokenKind::Punct(c)
            };

            tokens.push(Token {
                kind,
                start,
                end: self.pos,
                line,
            });
        }

        Ok(tokens)
    }

    fn lex_number(&mut self) {
        let hex = self.src[self.pos..].starts_with("0x") || self.src[self.pos..].starts_with("0X");
        while let Some(b) = self.peek(0) {
            let exponent_sign = matches!(b, b'+' | b'-')
                && self.pos > 0
                && !hex
                && matches!(self.bytes[self.pos - 1], b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        tokenize(src)
            .unwrap()
            .iter()
            .map(|t| t.text(src).to_string())
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            texts("List<String> xs = new ArrayList<>();"),
            vec!["List", "<", "String", ">", "xs", "=", "new", "ArrayList", "<", ">", "(", ")", ";"]
        );
    }

    #[test]
    fn test_comments_skipped_and_lines_counted() {
        let src = "// header\nint a = 1; /* multi\nline */ int b;";
        let tokens = tokenize(src).unwrap();
        assert_eq!(tokens[0].text(src), "int");
        assert_eq!(tokens[0].line, 2);
        let b = tokens.iter().find(|t| t.text(src) == "b").unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_literals_are_opaque() {
        let src = r#"s = "a; b } \" c"; ch = ';'; t = """
            text "block"
            """;"#;
        let tokens = tokenize(src).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Str));
        assert!(kinds.contains(&TokenKind::Char));
        assert!(kinds.contains(&TokenKind::TextBlock));
        assert_eq!(tokens.iter().filter(|t| t.is_punct(';')).count(), 3);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("x = 1.5e-3 + 0x1F + 10L;"), vec!["x", "=", "1.5e-3", "+", "0x1F", "+", "10L", ";"]);
    }

    #[test]
    fn test_unterminated_literals() {
        let err = tokenize("String s = \"open;\nint x;").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("string"));

        assert!(tokenize("/* never closed").is_err());
        assert!(tokenize("char c = 'a;").is_err());
        assert!(tokenize("String t = \"\"\"\nabc").is_err());
    }
}
