//! Test bridge.
//!
//! Runs test-annotated methods of classes defined in earlier cells. Which
//! classes and methods count as tests is decided by a [`TestMarker`] over
//! what the backend finds by reflection; every test method runs on a fresh
//! instance and a failing test never stops the run. Setup and teardown
//! methods the class provides run around each test on that same instance.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::execute::{Backend, ClassDescription, MethodDescription};
use crate::snippet::{TokenKind, tokenize};

/// Decides what is a test.
pub trait TestMarker: Send + Sync {
    /// Whether the class should be searched for tests.
    fn is_test_class(&self, class: &ClassDescription) -> bool;

    /// Whether the method is a test.
    fn is_test_method(&self, method: &MethodDescription) -> bool;

    /// Whether the method runs before each test.
    fn is_setup_method(&self, method: &MethodDescription) -> bool;

    /// Whether the method runs after each test, even a failed one.
    fn is_teardown_method(&self, method: &MethodDescription) -> bool;
}

/// Recognizes methods carrying an annotation with a given simple name
/// (`Test` by default, matching JUnit 4 and 5).
///
/// Fixtures are `BeforeEach`/`Before` and `AfterEach`/`After` methods.
#[derive(Debug, Clone)]
pub struct AnnotationMarker {
    annotations: Vec<String>,
    setup: Vec<String>,
    teardown: Vec<String>,
}

impl AnnotationMarker {
    pub fn new(annotations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            annotations: annotations.into_iter().map(Into::into).collect(),
            setup: vec!["BeforeEach".to_string(), "Before".to_string()],
            teardown: vec!["AfterEach".to_string(), "After".to_string()],
        }
    }

    /// Replace the fixture annotations.
    pub fn with_fixtures(
        mut self,
        setup: impl IntoIterator<Item = impl Into<String>>,
        teardown: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.setup = setup.into_iter().map(Into::into).collect();
        self.teardown = teardown.into_iter().map(Into::into).collect();
        self
    }
}

fn instance_method_with(method: &MethodDescription, annotations: &[String]) -> bool {
    !method.is_static
        && method.parameter_count == 0
        && method.annotations.iter().any(|a| annotations.contains(a))
}

impl Default for AnnotationMarker {
    fn default() -> Self {
        Self::new(["Test"])
    }
}

impl TestMarker for AnnotationMarker {
    fn is_test_class(&self, class: &ClassDescription) -> bool {
        !class.is_abstract && class.methods.iter().any(|m| self.is_test_method(m))
    }

    fn is_test_method(&self, method: &MethodDescription) -> bool {
        instance_method_with(method, &self.annotations)
    }

    fn is_setup_method(&self, method: &MethodDescription) -> bool {
        instance_method_with(method, &self.setup)
    }

    fn is_teardown_method(&self, method: &MethodDescription) -> bool {
        instance_method_with(method, &self.teardown)
    }
}

/// Outcome of one test method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestOutcome {
    Passed,
    /// An assertion failed.
    Failed,
    /// Any other throwable.
    Errored,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        })
    }
}

/// Result of one test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Binary name of the test class.
    pub class_name: String,
    /// Method name.
    pub name: String,
    pub outcome: TestOutcome,
    /// Assertion message or stack summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Output the test printed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// Aggregate of one `runTests` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn push(&mut self, result: TestResult) {
        self.total += 1;
        match result.outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Errored => self.errored += 1,
        }
        self.results.push(result);
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mut text = String::new();
        for result in &self.results {
            let simple = result
                .class_name
                .rsplit(['.', '$'])
                .next()
                .unwrap_or(&result.class_name);
            text.push_str(&format!("{} {}.{}()\n", result.outcome, simple, result.name));
            if let Some(detail) = &result.detail
                && result.outcome != TestOutcome::Passed
            {
                for line in detail.lines() {
                    text.push_str(&format!("    {line}\n"));
                }
            }
        }
        text.push_str(&format!(
            "Tests run: {}, passed: {}, failed: {}, errored: {}\n",
            self.total, self.passed, self.failed, self.errored
        ));
        text
    }
}

/// Runs tests through a [`Backend`].
pub struct TestBridge {
    marker: Box<dyn TestMarker>,
}

impl Default for TestBridge {
    fn default() -> Self {
        Self::new(AnnotationMarker::default())
    }
}

impl TestBridge {
    pub fn new(marker: impl TestMarker + 'static) -> Self {
        Self {
            marker: Box::new(marker),
        }
    }

    /// Run every test method of the given classes, in order.
    ///
    /// Only backend failures are errors; problems with the classes
    /// themselves become `errored` results.
    pub async fn run(&self, backend: &mut dyn Backend, class_names: &[String]) -> Result<TestRun> {
        let mut run = TestRun::default();

        for class_name in class_names {
            let description = match backend.describe_class(class_name).await {
                Ok(description) => description,
                Err(Error::Execution(message)) => {
                    warn!("Cannot inspect test class {}: {}", class_name, message);
                    run.push(TestResult {
                        class_name: class_name.clone(),
                        name: class_name.clone(),
                        outcome: TestOutcome::Errored,
                        detail: Some(message),
                        output: String::new(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !self.marker.is_test_class(&description) {
                warn!("{} has no test methods", class_name);
                continue;
            }

            // Methods are listed subclass first; superclass setup runs first.
            let setup: Vec<String> = description
                .methods
                .iter()
                .rev()
                .filter(|m| self.marker.is_setup_method(m))
                .map(|m| m.name.clone())
                .collect();
            let teardown: Vec<String> = description
                .methods
                .iter()
                .filter(|m| self.marker.is_teardown_method(m))
                .map(|m| m.name.clone())
                .collect();

            for method in description.methods.iter().filter(|m| self.marker.is_test_method(m)) {
                debug!("Running {}.{}", class_name, method.name);
                let invocation = backend
                    .invoke_test(class_name, &method.name, &setup, &teardown)
                    .await?;
                let (outcome, detail) = match &invocation.thrown {
                    None => (TestOutcome::Passed, None),
                    Some(thrown) if thrown.assertion => (
                        TestOutcome::Failed,
                        Some(thrown.message.clone().unwrap_or_else(|| thrown.summary())),
                    ),
                    Some(thrown) => (TestOutcome::Errored, Some(thrown.stack_summary())),
                };
                run.push(TestResult {
                    class_name: class_name.clone(),
                    name: method.name.clone(),
                    outcome,
                    detail,
                    output: invocation.output,
                });
            }
        }

        Ok(run)
    }
}

/// Class expressions of a cell that is exactly `runTests(A.class, ...);`.
///
/// Returns the dotted names without `.class`.
pub fn parse_run_tests(source: &str) -> Option<Vec<String>> {
    let tokens = tokenize(source).ok()?;
    let mut iter = tokens.iter().peekable();

    if !iter.next()?.is_word(source, "runTests") || !iter.next()?.is_punct('(') {
        return None;
    }

    let mut classes = Vec::new();
    loop {
        if iter.peek()?.is_punct(')') && classes.is_empty() {
            iter.next();
            break;
        }
        let mut parts: Vec<&str> = Vec::new();
        loop {
            let tok = iter.next()?;
            if tok.kind != TokenKind::Ident {
                return None;
            }
            parts.push(tok.text(source));
            if !iter.next()?.is_punct('.') {
                return None;
            }
            if iter.peek()?.is_word(source, "class") {
                iter.next();
                break;
            }
        }
        classes.push(parts.join("."));

        let sep = iter.next()?;
        if sep.is_punct(')') {
            break;
        }
        if !sep.is_punct(',') {
            return None;
        }
    }

    match iter.next() {
        None => Some(classes),
        Some(tok) if tok.is_punct(';') && iter.next().is_none() => Some(classes),
        _ => None,
    }
}

/// Binary class name for a class expression written in a cell.
///
/// A leading simple name declared in the notebook resolves to its wrapper's
/// nested class; anything else is taken as a fully qualified name.
pub fn resolve_test_class(context: &ExecutionContext, name: &str) -> String {
    let (head, rest) = match name.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (name, None),
    };
    match (context.resolve_type(head), rest) {
        (Some(binary), Some(rest)) => format!("{binary}${}", rest.replace('.', "$")),
        (Some(binary), None) => binary,
        (None, _) => name.to_string(),
    }
}
