//! Incremental compile/link/run of one cell.
//!
//! A cell moves through
//!
//! ```text
//! Received → Parsed → Compiled → Linked → Executed → Committed
//!     └─────────┴─────────┴─────────┴── Failed
//! ```
//!
//! and only reaches the execution context in the last step. Anything that
//! fails before linking, and any future dropped before committing, leaves the
//! context exactly as it was.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::classpath::ClasspathSnapshot;
use crate::compile::{CompileError, WrapperOptions, WrapperSource, generate};
use crate::context::{CompiledUnit, ContextUpdate, ExecutionContext};
use crate::error::Error;
use crate::execute::{Backend, Thrown};
use crate::protocol::Cell;
use crate::snippet::{Snippet, analyze};

/// javac's complaint when a `void` call is used as a value.
const VOID_VALUE: &str = "'void' type not allowed here";

/// Where a cell is in its evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Parsed,
    Compiled,
    Linked,
    Executed,
    Committed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Compiled => "compiled",
            Self::Linked => "linked",
            Self::Executed => "executed",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a cell did not commit.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Rejected by the analyzer, wrapper generation or javac.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Compiled, but loading or initializing the class threw.
    #[error("failed to link cell: {}", .0.summary())]
    Link(Thrown),

    /// The backend itself failed.
    #[error(transparent)]
    Backend(#[from] Error),
}

/// A committed cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOutcome {
    /// What the commit changed. `None` for a cell without code.
    pub update: Option<ContextUpdate>,
    /// Captured standard output and error.
    pub output: String,
    /// Rendered value of the trailing expression.
    pub value: Option<String>,
    /// Uncaught throwable from `run()`. The cell is committed regardless.
    pub thrown: Option<Thrown>,
    /// Wrapper class the cell compiled to.
    pub class_name: Option<String>,
}

/// Drives cells through a [`Backend`].
pub struct IncrementalEvaluator {
    backend: Box<dyn Backend>,
    next_class: u64,
    options: WrapperOptions,
}

impl IncrementalEvaluator {
    pub fn new(backend: Box<dyn Backend>, options: WrapperOptions) -> Self {
        Self {
            backend,
            next_class: 1,
            options,
        }
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// Compile, link and run a code cell, then commit its declarations.
    ///
    /// `cell.source` must be plain Java; directives are handled by the
    /// session before this is called.
    pub async fn evaluate(
        &mut self,
        cell: &Cell,
        context: &mut ExecutionContext,
        classpath: &ClasspathSnapshot,
    ) -> Result<EvalOutcome, EvalError> {
        trace(cell, Phase::Received);
        let result = self.run_phases(cell, context, classpath).await;
        if let Err(e) = &result {
            trace(cell, Phase::Failed);
            debug!("Cell {} failed: {}", cell.index, e);
        }
        result
    }

    async fn run_phases(
        &mut self,
        cell: &Cell,
        context: &mut ExecutionContext,
        classpath: &ClasspathSnapshot,
    ) -> Result<EvalOutcome, EvalError> {
        let snippets =
            analyze(&cell.source).map_err(|e| CompileError::syntax(e.message, e.line))?;
        trace(cell, Phase::Parsed);
        if snippets.is_empty() {
            return Ok(EvalOutcome::default());
        }

        let mut wrapper = self.generate(&snippets, context, self.options)?;
        let compiled = match self.backend.compile(&wrapper, classpath).await? {
            Ok(compiled) => compiled,
            Err(e) if wrapper.has_value && is_void_value(&e) => {
                debug!("Cell {} ends with a void call, compiling it as a statement", cell.index);
                let options = WrapperOptions {
                    capture_value: false,
                    ..self.options
                };
                wrapper = self.generate(&snippets, context, options)?;
                self.backend.compile(&wrapper, classpath).await??
            }
            Err(e) => return Err(e.into()),
        };
        trace(cell, Phase::Compiled);

        if let Some(thrown) = self.backend.link(&compiled).await? {
            return Err(EvalError::Link(thrown));
        }
        trace(cell, Phase::Linked);

        let execution = self.backend.execute(&wrapper.class_name).await?;
        trace(cell, Phase::Executed);

        let update = context.apply(CompiledUnit {
            class_name: wrapper.class_name.clone(),
            source: cell.source.clone(),
            declarations: wrapper.declarations,
            captures: wrapper.captures,
        });
        trace(cell, Phase::Committed);

        Ok(EvalOutcome {
            update: Some(update),
            output: execution.output,
            value: execution.value,
            thrown: execution.thrown,
            class_name: Some(wrapper.class_name),
        })
    }

    /// Generate a wrapper under a fresh class number.
    fn generate(
        &mut self,
        snippets: &[Snippet],
        context: &ExecutionContext,
        options: WrapperOptions,
    ) -> Result<WrapperSource, CompileError> {
        let index = self.next_class;
        self.next_class += 1;
        generate(index, snippets, context, options)
    }
}

fn is_void_value(error: &CompileError) -> bool {
    error.diagnostics.iter().any(|d| d.message.contains(VOID_VALUE))
}

fn trace(cell: &Cell, phase: Phase) {
    debug!("Cell {}: {}", cell.index, phase);
}
