//! Cell sequencing.
//!
//! A [`Session`] owns one notebook's state and turns each cell into exactly
//! one [`CellOutput`]:
//!
//! ```text
//! cell ──► markdown?  ──► ok
//!      └─► directives ──► resolve (with every earlier coordinate) ──► classpath
//!      └─► runTests(..) ──► TestBridge
//!      └─► code ──► IncrementalEvaluator ──► ExecutionContext
//! ```
//!
//! Failures end the cell, never the session. After an interrupt or a backend
//! failure the backend is restarted and the committed cells are replayed.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::classpath::{Classpath, ClasspathEntry, ClasspathSnapshot, expand_jars, local_entry};
use crate::compile::{CompileError, WrapperOptions};
use crate::config::KernelConfig;
use crate::context::{ExecutionContext, Namespace};
use crate::directive::{Directive, ParsedCell, parse_cell, parse_directive_cell};
use crate::error::{Error, ResolutionError, Result};
use crate::evaluator::{EvalError, EvalOutcome, IncrementalEvaluator};
use crate::execute::{Backend, InterruptHandle, JvmBackend, Thrown};
use crate::paths::SessionDirs;
use crate::protocol::{Cell, CellKind, CellOutput, CellStatus, ErrorInfo};
use crate::resolve::{ArtifactKey, Coordinate, Repository, Resolver};
use crate::testing::{TestBridge, TestRun, parse_run_tests, resolve_test_class};

/// One notebook's kernel state.
pub struct Session {
    context: ExecutionContext,
    classpath: Classpath,
    evaluator: IncrementalEvaluator,
    resolver: Arc<Resolver>,
    dirs: SessionDirs,
    /// Every coordinate declared so far; a later declaration of the same
    /// artifact replaces the earlier one.
    coordinates: IndexMap<ArtifactKey, Coordinate>,
    tests: TestBridge,
    interrupt: InterruptHandle,
}

impl Session {
    /// Start a session on the JVM backend.
    ///
    /// Classes left in `dirs` by an earlier run are removed first.
    pub async fn start(config: &KernelConfig, resolver: Arc<Resolver>, dirs: SessionDirs) -> Result<Self> {
        dirs.clean()?;
        let backend = JvmBackend::start(config, dirs.clone()).await?;
        info!(
            "Session started with JDK {} ({})",
            backend.toolchain().major(),
            dirs.root.display()
        );
        let options = WrapperOptions {
            default_imports: config.default_imports,
            ..WrapperOptions::default()
        };
        Ok(Self::with_backend(Box::new(backend), resolver, dirs, options))
    }

    /// Build a session over any backend.
    pub fn with_backend(
        backend: Box<dyn Backend>,
        resolver: Arc<Resolver>,
        dirs: SessionDirs,
        options: WrapperOptions,
    ) -> Self {
        Self {
            context: ExecutionContext::new(),
            classpath: Classpath::new(),
            evaluator: IncrementalEvaluator::new(backend, options),
            resolver,
            dirs,
            coordinates: IndexMap::new(),
            tests: TestBridge::default(),
            interrupt: InterruptHandle::new(),
        }
    }

    /// Replace the test bridge (for a custom [`TestMarker`](crate::testing::TestMarker)).
    pub fn with_test_bridge(mut self, tests: TestBridge) -> Self {
        self.tests = tests;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn classpath(&self) -> ClasspathSnapshot {
        self.classpath.snapshot()
    }

    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Handle for interrupting the cell currently executing.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Run one cell to completion.
    ///
    /// Never fails: every problem becomes the cell's status.
    pub async fn execute(&mut self, cell: &Cell) -> CellOutput {
        self.interrupt.reset();
        let interrupt = self.interrupt.clone();

        let result = tokio::select! {
            biased;
            _ = interrupt.interrupted() => None,
            result = self.run_cell(cell) => Some(result),
        };

        match result {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                warn!("Backend failed during cell {}: {}", cell.index, e);
                self.recover().await;
                CellOutput::failed(
                    cell.index,
                    CellStatus::RuntimeError,
                    ErrorInfo::new("worker", e.to_string(), None),
                )
            }
            None => {
                info!("Cell {} interrupted", cell.index);
                self.recover().await;
                CellOutput::failed(
                    cell.index,
                    CellStatus::Cancelled,
                    ErrorInfo::new("cancelled", "cell execution was interrupted", None),
                )
            }
        }
    }

    /// Run the tests of the named classes.
    ///
    /// Simple names resolve through the execution context.
    pub async fn run_tests(&mut self, class_names: &[String]) -> Result<TestRun> {
        let resolved: Vec<String> = class_names
            .iter()
            .map(|name| resolve_test_class(&self.context, name))
            .collect();
        self.tests.run(self.evaluator.backend_mut(), &resolved).await
    }

    /// Stop the backend.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.evaluator.backend_mut().shutdown().await
    }

    /// `Err` only for backend failures.
    async fn run_cell(&mut self, cell: &Cell) -> Result<CellOutput> {
        let parsed = match cell.kind {
            CellKind::Markdown => return Ok(CellOutput::ok(cell.index)),
            CellKind::Directive => parse_directive_cell(&cell.source).map(|directives| ParsedCell {
                directives,
                code: String::new(),
            }),
            CellKind::Code => parse_cell(&cell.source),
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return Ok(compile_failed(cell.index, &e)),
        };

        let mut output = CellOutput::ok(cell.index);

        if !parsed.directives.is_empty() {
            let directives = parsed.directives.into_iter().map(|(_, d)| d).collect();
            match self.apply_directives(directives).await {
                Ok(added) => output.classpath = added.iter().map(ToString::to_string).collect(),
                Err(Error::Resolution(e)) => return Ok(resolution_failed(cell.index, &e)),
                Err(Error::Config(message)) => {
                    return Ok(CellOutput::failed(
                        cell.index,
                        CellStatus::ResolutionError,
                        ErrorInfo::new("config", message, None),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        if !parsed.code.trim().is_empty() {
            let code = Cell {
                index: cell.index,
                kind: CellKind::Code,
                source: parsed.code,
            };
            self.run_code(&code, &mut output).await?;
        }
        Ok(output)
    }

    async fn run_code(&mut self, cell: &Cell, output: &mut CellOutput) -> Result<()> {
        if let Some(classes) = parse_run_tests(&cell.source)
            && self.context.lookup(Namespace::Method, "runTests").is_none()
        {
            debug!("Cell {} runs tests of {:?}", cell.index, classes);
            let run = self.run_tests(&classes).await?;
            append(&mut output.text_output, &run.summary());
            output.test_results = Some(run);
            return Ok(());
        }

        let snapshot = self.classpath.snapshot();
        match self
            .evaluator
            .evaluate(cell, &mut self.context, &snapshot)
            .await
        {
            Ok(outcome) => report(outcome, output),
            Err(EvalError::Compile(e)) => {
                let classpath = std::mem::take(&mut output.classpath);
                *output = compile_failed(cell.index, &e);
                output.classpath = classpath;
            }
            Err(EvalError::Link(thrown)) => uncaught(&thrown, output),
            Err(EvalError::Backend(e)) => return Err(e),
        }
        Ok(())
    }

    /// Resolve and append everything a cell's directives name.
    ///
    /// Nothing is appended, and no repository stays added, unless every
    /// directive succeeds and the backend has taken the new entries.
    async fn apply_directives(&mut self, directives: Vec<Directive>) -> Result<Vec<ClasspathEntry>> {
        let mut coordinates = self.coordinates.clone();
        let mut has_maven = false;
        let mut remotes = Vec::new();
        let mut locals = Vec::new();

        for directive in directives {
            match directive {
                Directive::MavenRepo(remote) => remotes.push(self.resolver.remote(&remote)?),
                Directive::Maven(declared) => {
                    has_maven = true;
                    for coordinate in declared {
                        coordinates.shift_remove(&coordinate.key);
                        coordinates.insert(coordinate.key.clone(), coordinate);
                    }
                }
                Directive::Jars(path) => {
                    let jars = expand_jars(&self.dirs.resolve(&path))?;
                    if jars.is_empty() {
                        warn!("No jars found in {}", path);
                    }
                    locals.extend(jars);
                }
                Directive::Classpath(path) => locals.push(local_entry(&self.dirs.resolve(&path))?),
            }
        }

        let repositories = PendingRepositories::add(self.resolver.clone(), remotes);
        let mut entries = Vec::new();
        if has_maven {
            let requested: Vec<Coordinate> = coordinates.values().cloned().collect();
            let artifacts = self.resolver.resolve(&requested).await?;
            entries.extend(artifacts.iter().filter_map(|artifact| {
                let path = artifact.path.as_ref()?;
                Some(ClasspathEntry::artifact(path, artifact.coordinate()))
            }));
        }
        entries.extend(locals);

        let mut classpath = self.classpath.clone();
        let change = classpath.append(entries);
        if !change.is_empty() {
            info!(
                "Added {} classpath entries, {} overriding an earlier version",
                change.added.len(),
                change.overriding.len()
            );
            let backend = self.evaluator.backend_mut();
            let appended = change.appended();
            if !appended.is_empty() {
                backend.extend_classpath(&appended).await?;
            }
            if !change.overriding.is_empty() {
                backend.override_classpath(&change.overriding).await?;
            }
        }

        repositories.commit();
        self.classpath = classpath;
        self.coordinates = coordinates;
        Ok(change.added)
    }

    /// Bring the backend back in line with the context.
    async fn recover(&mut self) {
        let snapshot = self.classpath.snapshot();
        if let Err(e) = self
            .evaluator
            .backend_mut()
            .restart(&snapshot, self.context.units())
            .await
        {
            warn!("Backend restart failed: {}", e);
        }
    }
}

/// Repositories a cell added to the shared resolver. They are removed
/// again when dropped before [`commit`](Self::commit), including when the
/// cell is cancelled.
struct PendingRepositories {
    resolver: Arc<Resolver>,
    added: Vec<Arc<dyn Repository>>,
}

impl PendingRepositories {
    fn add(resolver: Arc<Resolver>, repositories: Vec<Arc<dyn Repository>>) -> Self {
        for repository in &repositories {
            resolver.add_repository(repository.clone());
        }
        Self {
            resolver,
            added: repositories,
        }
    }

    fn commit(mut self) {
        self.added.clear();
    }
}

impl Drop for PendingRepositories {
    fn drop(&mut self) {
        for repository in &self.added {
            self.resolver.remove_repository(repository);
        }
    }
}

fn report(outcome: EvalOutcome, output: &mut CellOutput) {
    append(&mut output.text_output, &outcome.output);
    if let Some(value) = &outcome.value {
        append(&mut output.text_output, value);
    }
    if let Some(update) = &outcome.update {
        output.declarations = update
            .added
            .iter()
            .filter(|d| d.namespace != Namespace::Import)
            .map(|d| d.name.clone())
            .collect();
    }
    if let Some(thrown) = &outcome.thrown {
        uncaught(thrown, output);
    }
}

fn uncaught(thrown: &Thrown, output: &mut CellOutput) {
    append(&mut output.text_output, &thrown.stack_summary());
    output.status = CellStatus::RuntimeError;
    output.error = Some(ErrorInfo::new("uncaught", thrown.summary(), None));
}

fn compile_failed(cell: usize, error: &CompileError) -> CellOutput {
    let mut output = CellOutput::failed(
        cell,
        CellStatus::CompileError,
        ErrorInfo::new(error.kind.as_str(), error.message(), error.line()),
    );
    output.text_output = error.format_plain();
    output
}

fn resolution_failed(cell: usize, error: &ResolutionError) -> CellOutput {
    let kind = match error {
        ResolutionError::NotFound { .. } => "notFound",
        ResolutionError::Fetch { .. } => "fetch",
        ResolutionError::Conflict { .. } => "conflict",
    };
    let mut output = CellOutput::failed(
        cell,
        CellStatus::ResolutionError,
        ErrorInfo::new(kind, error.to_string(), None),
    );
    output.text_output = Error::Resolution(error.clone()).with_hint();
    output
}

/// Append text on its own line.
fn append(text: &mut String, more: &str) {
    if more.is_empty() {
        return;
    }
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(more);
}
