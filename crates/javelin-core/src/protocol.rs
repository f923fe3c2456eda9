//! Front-end request/response types.
//!
//! `javelin serve` exchanges these as JSON lines.

use serde::{Deserialize, Serialize};

use crate::testing::TestRun;

/// What a cell contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellKind {
    /// Only directives.
    Directive,
    /// Java code, optionally preceded by directives.
    Code,
    /// Prose; produces an empty `ok` output.
    Markdown,
}

/// One notebook cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub index: usize,
    pub kind: CellKind,
    pub source: String,
}

impl Cell {
    pub fn code(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            kind: CellKind::Code,
            source: source.into(),
        }
    }

    pub fn directive(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            kind: CellKind::Directive,
            source: source.into(),
        }
    }

    pub fn markdown(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            kind: CellKind::Markdown,
            source: source.into(),
        }
    }
}

/// Final state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellStatus {
    Ok,
    /// Rejected before linking; nothing was committed.
    CompileError,
    /// Threw while running, or could not be linked.
    RuntimeError,
    /// Interrupted; nothing was committed.
    Cancelled,
    /// A directive's dependency or path could not be resolved.
    ResolutionError,
}

impl CellStatus {
    pub fn is_ok(&self) -> bool {
        *self == Self::Ok
    }
}

/// Structured error detail for a failed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// `syntax`, `unresolvedSymbol`, `typeError`, `uncaught`, `cancelled`,
    /// `notFound`, `fetch`, `conflict` or `worker`.
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line,
        }
    }
}

/// The result of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellOutput {
    pub cell: usize,
    pub status: CellStatus,
    #[serde(rename = "text_output")]
    pub text_output: String,
    /// Names newly declared by the cell.
    pub declarations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Classpath entries the cell added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classpath: Vec<String>,
}

impl CellOutput {
    pub fn ok(cell: usize) -> Self {
        Self {
            cell,
            status: CellStatus::Ok,
            text_output: String::new(),
            declarations: Vec::new(),
            test_results: None,
            error: None,
            classpath: Vec::new(),
        }
    }

    pub fn failed(cell: usize, status: CellStatus, error: ErrorInfo) -> Self {
        Self {
            status,
            error: Some(error),
            ..Self::ok(cell)
        }
    }
}

/// Request from the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Execute { cell: Cell },
    Interrupt,
    Shutdown,
}

/// Message to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum KernelMessage {
    Ready { version: String },
    Output(CellOutput),
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_json() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"execute","cell":{"index":2,"kind":"code","source":"1 + 1"}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::Execute {
                cell: Cell::code(2, "1 + 1")
            }
        );

        let message: ClientMessage = serde_json::from_str(r#"{"type":"interrupt"}"#).unwrap();
        assert_eq!(message, ClientMessage::Interrupt);
    }

    #[test]
    fn test_output_json_shape() {
        let mut output = CellOutput::ok(3);
        output.declarations.push("mockedList".into());
        let json = serde_json::to_value(KernelMessage::Output(output)).unwrap();

        assert_eq!(json["type"], "output");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["text_output"], "");
        assert_eq!(json["declarations"][0], "mockedList");
        assert!(json.get("testResults").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_output() {
        let output = CellOutput::failed(
            1,
            CellStatus::CompileError,
            ErrorInfo::new("syntax", "';' expected", Some(2)),
        );
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["status"], "compileError");
        assert_eq!(json["error"]["line"], 2);
    }
}
