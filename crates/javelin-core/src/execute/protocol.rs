//! Worker JVM line protocol.
//!
//! Commands are single lines of tab-separated fields; every command gets
//! exactly one JSON reply line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Command sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Liveness check.
    Ping,
    /// Append a location to the session class loader.
    AddClasspath(PathBuf),
    /// Put locations in a child-first loader layer. Classes loaded from now
    /// on see them ahead of anything already on the classpath.
    Override(Vec<PathBuf>),
    /// Load and initialize a class.
    Load(String),
    /// Invoke a wrapper's `run()`, capturing output.
    Run(String),
    /// Reflect over a class's methods and their annotations.
    Describe(String),
    /// Invoke a no-arg method on a fresh instance, running `setup` methods
    /// before it and `teardown` methods after it on the same instance.
    Invoke {
        class_name: String,
        method: String,
        setup: Vec<String>,
        teardown: Vec<String>,
    },
    /// Exit the worker.
    Exit,
}

impl WorkerCommand {
    /// Encode as one protocol line (without the trailing newline).
    pub fn encode(&self) -> Result<String> {
        let fields: Vec<String> = match self {
            Self::Ping => vec!["PING".into()],
            Self::AddClasspath(path) => vec!["ADDCP".into(), path_field(path)?],
            Self::Override(paths) => {
                let mut fields = vec!["OVERRIDE".to_string()];
                for path in paths {
                    fields.push(path_field(path)?);
                }
                fields
            }
            Self::Load(class) => vec!["LOAD".into(), class.clone()],
            Self::Run(class) => vec!["RUN".into(), class.clone()],
            Self::Describe(class) => vec!["DESCRIBE".into(), class.clone()],
            Self::Invoke {
                class_name,
                method,
                setup,
                teardown,
            } => vec![
                "INVOKE".into(),
                class_name.clone(),
                method.clone(),
                setup.join(","),
                teardown.join(","),
            ],
            Self::Exit => vec!["EXIT".into()],
        };

        if let Some(bad) = fields.iter().find(|f| f.contains(['\t', '\n', '\r'])) {
            return Err(Error::Worker(format!(
                "command field contains a tab or newline: {bad:?}"
            )));
        }
        Ok(fields.join("\t"))
    }
}

fn path_field(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Worker(format!("path is not valid UTF-8: {}", path.display())))
}

/// A throwable reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thrown {
    /// Binary class name, e.g. `java.lang.IllegalStateException`.
    pub class_name: String,
    pub message: Option<String>,
    /// Whether it is an `AssertionError` (or subclass).
    pub assertion: bool,
    /// Top stack frames, innermost first, excluding the worker's own.
    #[serde(default)]
    pub trace: Vec<String>,
}

impl Thrown {
    /// `ClassName: message`, like `Throwable.toString()`.
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {message}", self.class_name),
            None => self.class_name.clone(),
        }
    }

    /// Summary plus `at ...` lines.
    pub fn stack_summary(&self) -> String {
        let mut text = self.summary();
        for frame in &self.trace {
            text.push_str("\n\tat ");
            text.push_str(frame);
        }
        text
    }
}

/// A method found by reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescription {
    pub name: String,
    /// Simple names of runtime-visible annotations.
    pub annotations: Vec<String>,
    pub is_static: bool,
    pub parameter_count: usize,
    pub declaring_class: String,
}

/// A class found by reflection (superclass methods included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDescription {
    pub name: String,
    pub is_abstract: bool,
    pub methods: Vec<MethodDescription>,
}

/// Reply from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerReply {
    Pong,
    Ok,
    Ran {
        output: String,
        value: Option<String>,
        thrown: Option<Thrown>,
    },
    Class(ClassDescription),
    Test {
        output: String,
        thrown: Option<Thrown>,
    },
    Failure {
        message: String,
        thrown: Option<Thrown>,
    },
}

impl WorkerReply {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim_end())
            .map_err(|e| Error::Worker(format!("malformed worker reply ({e}): {line}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(WorkerCommand::Ping.encode().unwrap(), "PING");
        assert_eq!(
            WorkerCommand::Invoke {
                class_name: "javelin.snippets.Snippet4$TestMockedList".into(),
                method: "testHelloInList".into(),
                setup: vec!["setUp".into(), "init".into()],
                teardown: Vec::new(),
            }
            .encode()
            .unwrap(),
            "INVOKE\tjavelin.snippets.Snippet4$TestMockedList\ttestHelloInList\tsetUp,init\t"
        );
        assert_eq!(
            WorkerCommand::Override(vec![PathBuf::from("/cache/a-2.jar"), PathBuf::from("/cache/b.jar")])
                .encode()
                .unwrap(),
            "OVERRIDE\t/cache/a-2.jar\t/cache/b.jar"
        );
        assert!(WorkerCommand::AddClasspath(PathBuf::from("/tmp/a\tb.jar")).encode().is_err());
    }

    #[test]
    fn test_parse_ran_reply() {
        let reply = WorkerReply::parse(
            r#"{"type":"ran","output":"hi\n","value":"3","thrown":null}"#,
        )
        .unwrap();
        assert_eq!(
            reply,
            WorkerReply::Ran {
                output: "hi\n".into(),
                value: Some("3".into()),
                thrown: None
            }
        );
    }

    #[test]
    fn test_parse_class_reply() {
        let line = r#"{"type":"class","name":"A","isAbstract":false,"methods":[{"name":"t","annotations":["Test"],"isStatic":false,"parameterCount":0,"declaringClass":"A"}]}"#;
        match WorkerReply::parse(line).unwrap() {
            WorkerReply::Class(class) => {
                assert_eq!(class.methods.len(), 1);
                assert_eq!(class.methods[0].annotations, vec!["Test"]);
            }
            other => panic!("expected class reply, got {other:?}"),
        }
    }

    #[test]
    fn test_thrown_summary() {
        let thrown = Thrown {
            class_name: "java.lang.AssertionError".into(),
            message: Some("expected 1".into()),
            assertion: true,
            trace: vec!["A.t(Snippet4.java:9)".into()],
        };
        assert_eq!(thrown.summary(), "java.lang.AssertionError: expected 1");
        assert!(thrown.stack_summary().contains("\n\tat A.t"));
        assert!(WorkerReply::parse("not json").is_err());
    }
}
