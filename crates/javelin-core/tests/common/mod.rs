//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use javelin_core::classpath::{ClasspathEntry, ClasspathSnapshot};
use javelin_core::compile::{CompileError, CompiledClasses, Diagnostic, ErrorLevel, WrapperSource};
use javelin_core::context::CommittedUnit;
use javelin_core::execute::{
    Backend, ClassDescription, Execution, MethodDescription, TestInvocation, Thrown,
};
use javelin_core::resolve::{MemoryRepository, Repository, Resolver};
use javelin_core::{Error, KernelConfig, Result};

/// POM text for `group:artifact:version` with compile-scope dependencies.
pub fn pom(group: &str, artifact: &str, version: &str, deps: &[(&str, &str, &str)]) -> String {
    let mut xml = format!(
        "<project><groupId>{group}</groupId><artifactId>{artifact}</artifactId><version>{version}</version><dependencies>"
    );
    for (g, a, v) in deps {
        xml.push_str(&format!(
            "<dependency><groupId>{g}</groupId><artifactId>{a}</artifactId><version>{v}</version></dependency>"
        ));
    }
    xml.push_str("</dependencies></project>");
    xml
}

/// Publish a POM and a jar whose bytes name the artifact.
pub fn publish(repo: &MemoryRepository, group: &str, artifact: &str, version: &str, deps: &[(&str, &str, &str)]) {
    repo.publish_pom(group, artifact, version, &pom(group, artifact, version, deps));
    repo.publish_jar(
        group,
        artifact,
        version,
        format!("jar {group}:{artifact}:{version}").as_bytes(),
    );
}

/// A repository holding a small slice of Maven Central.
pub fn mockito_repository() -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new("central");
    for version in ["4.10.0", "4.11.0", "5.0.0"] {
        publish(
            &repo,
            "org.mockito",
            "mockito-core",
            version,
            &[
                ("net.bytebuddy", "byte-buddy", "1.12.19"),
                ("org.objenesis", "objenesis", "3.3"),
            ],
        );
    }
    publish(&repo, "net.bytebuddy", "byte-buddy", "1.12.19", &[]);
    publish(&repo, "org.objenesis", "objenesis", "3.3", &[]);
    Arc::new(repo)
}

/// Resolver over one in-memory repository with a private cache.
pub fn resolver(cache_dir: &Path, repo: Arc<MemoryRepository>) -> Arc<Resolver> {
    let config = KernelConfig::isolated(cache_dir);
    let repositories: Vec<Arc<dyn Repository>> = vec![repo as Arc<dyn Repository>];
    Arc::new(Resolver::with_repositories(&config, repositories))
}

/// Recorded calls and scripted answers of a [`FakeBackend`].
#[derive(Default)]
pub struct FakeState {
    /// Wrapper sources in compile order.
    pub compiled: Vec<String>,
    /// Effective classpath size seen by each compile.
    pub compile_classpaths: Vec<usize>,
    /// Effective classpath locations seen by the latest compile.
    pub compile_locations: Vec<PathBuf>,
    /// Class names in link order.
    pub linked: Vec<String>,
    /// Class names in execute order.
    pub executed: Vec<String>,
    pub classpath: Vec<ClasspathEntry>,
    /// Override layers in the order they were pushed.
    pub overrides: Vec<Vec<ClasspathEntry>>,
    /// Committed units passed to each restart.
    pub restarts: Vec<usize>,
    pub shutdown: bool,

    /// Fail compilation when the wrapper contains the text.
    pub compile_failures: Vec<(String, CompileError)>,
    /// Results of successive executes; empty means a silent success.
    pub executions: VecDeque<Execution>,
    /// Block the next execute until the future is dropped.
    pub hang_next_execute: bool,
    /// Fail the next execute as if the JVM died.
    pub crash_next_execute: bool,
    /// Block the next classpath extension until the future is dropped.
    pub hang_next_extend: bool,
    /// Classes by binary-name suffix.
    pub classes: Vec<(String, ClassDescription)>,
    /// Thrown by test method name.
    pub test_failures: HashMap<String, Thrown>,
    /// `class#method` in invocation order.
    pub invoked: Vec<String>,
    /// Setup and teardown methods passed with each invocation.
    pub fixtures: Vec<(Vec<String>, Vec<String>)>,
}

/// A backend that never starts a JVM.
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn compile(
        &mut self,
        wrapper: &WrapperSource,
        classpath: &ClasspathSnapshot,
    ) -> Result<std::result::Result<CompiledClasses, CompileError>> {
        let mut state = self.state();
        state.compiled.push(wrapper.source.clone());
        state.compile_classpaths.push(classpath.effective().len());
        state.compile_locations = classpath.effective().iter().map(|e| e.location.clone()).collect();

        if let Some((_, error)) = state
            .compile_failures
            .iter()
            .find(|(needle, _)| wrapper.source.contains(needle.as_str()))
        {
            return Ok(Err(error.clone()));
        }

        Ok(Ok(CompiledClasses {
            class_name: wrapper.class_name.clone(),
            output_dir: PathBuf::from("/nonexistent").join(&wrapper.simple_name),
            files: vec![PathBuf::from(wrapper.relative_path().replace(".java", ".class"))],
            warnings: Vec::new(),
        }))
    }

    async fn link(&mut self, compiled: &CompiledClasses) -> Result<Option<Thrown>> {
        self.state().linked.push(compiled.class_name.clone());
        Ok(None)
    }

    async fn execute(&mut self, class_name: &str) -> Result<Execution> {
        let hang = {
            let mut state = self.state();
            state.executed.push(class_name.to_string());
            if state.crash_next_execute {
                state.crash_next_execute = false;
                return Err(Error::Worker("worker JVM exited".into()));
            }
            std::mem::take(&mut state.hang_next_execute)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(self.state().executions.pop_front().unwrap_or_default())
    }

    async fn extend_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()> {
        let hang = std::mem::take(&mut self.state().hang_next_extend);
        if hang {
            std::future::pending::<()>().await;
        }
        self.state().classpath.extend(entries.iter().cloned());
        Ok(())
    }

    async fn override_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()> {
        self.state().overrides.push(entries.to_vec());
        Ok(())
    }

    async fn describe_class(&mut self, class_name: &str) -> Result<ClassDescription> {
        let state = self.state();
        state
            .classes
            .iter()
            .find(|(suffix, _)| class_name.ends_with(suffix.as_str()))
            .map(|(_, description)| ClassDescription {
                name: class_name.to_string(),
                ..description.clone()
            })
            .ok_or_else(|| Error::Execution(format!("class not found: {class_name}")))
    }

    async fn invoke_test(
        &mut self,
        class_name: &str,
        method: &str,
        setup: &[String],
        teardown: &[String],
    ) -> Result<TestInvocation> {
        let mut state = self.state();
        state.invoked.push(format!("{class_name}#{method}"));
        state.fixtures.push((setup.to_vec(), teardown.to_vec()));
        Ok(TestInvocation {
            output: String::new(),
            thrown: state.test_failures.get(method).cloned(),
        })
    }

    async fn restart(&mut self, classpath: &ClasspathSnapshot, units: &[CommittedUnit]) -> Result<()> {
        let mut state = self.state();
        state.classpath = classpath.effective().to_vec();
        state.overrides.clear();
        state.restarts.push(units.len());
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state().shutdown = true;
        Ok(())
    }
}

/// A test method as the worker would describe it.
pub fn test_method(name: &str) -> MethodDescription {
    MethodDescription {
        name: name.to_string(),
        annotations: vec!["Test".to_string()],
        is_static: false,
        parameter_count: 0,
        declaring_class: String::new(),
    }
}

/// A setup or teardown method carrying `annotation`.
pub fn fixture_method(name: &str, annotation: &str) -> MethodDescription {
    MethodDescription {
        annotations: vec![annotation.to_string()],
        ..test_method(name)
    }
}

pub fn test_class(methods: &[&str]) -> ClassDescription {
    ClassDescription {
        name: String::new(),
        is_abstract: false,
        methods: methods.iter().map(|m| test_method(m)).collect(),
    }
}

pub fn thrown(class_name: &str, message: &str, assertion: bool) -> Thrown {
    Thrown {
        class_name: class_name.to_string(),
        message: Some(message.to_string()),
        assertion,
        trace: vec!["javelin.snippets.Snippet1.run(Snippet1.java:4)".to_string()],
    }
}

/// A javac-style error at a cell line.
pub fn javac_error(message: &str, line: usize) -> CompileError {
    CompileError::from_diagnostics(vec![Diagnostic {
        message: message.to_string(),
        level: ErrorLevel::Error,
        line: Some(line),
        column: None,
        detail: Vec::new(),
    }])
}
