//! Java snippet analysis.
//!
//! A code cell is a sequence of top-level snippets: imports, type and method
//! declarations, variable declarations, statements and an optional trailing
//! expression. This module finds their boundaries and what each declares,
//! without building a full syntax tree; javac remains the authority on
//! everything else.

mod analyzer;
mod lexer;

pub use analyzer::{Declarator, Snippet, SnippetKind, SyntaxError, analyze};
pub use lexer::{LexError, Token, TokenKind, tokenize};
