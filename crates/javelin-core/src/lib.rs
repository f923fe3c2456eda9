//! Core engine for the Javelin incremental JVM notebook kernel.
//!
//! This crate provides:
//! - Dependency resolution against Maven repositories
//! - An append-only session classpath
//! - A persistent execution context with shadowing redeclaration
//! - Incremental compilation of cells into wrapper classes (javac)
//! - Execution in a long-lived worker JVM, with interrupt and replay
//! - A test bridge for annotation-marked test methods
//! - The cell sequencer tying it all together

pub mod classpath;
pub mod compile;
pub mod config;
pub mod context;
pub mod directive;
pub mod error;
pub mod evaluator;
pub mod execute;
pub mod paths;
pub mod protocol;
pub mod resolve;
pub mod session;
pub mod snippet;
pub mod testing;

pub use classpath::{Classpath, ClasspathChange, ClasspathEntry, ClasspathSnapshot, EntryOrigin};
pub use compile::{CompileError, CompileErrorKind, JdkToolchain, WrapperOptions};
pub use config::{KernelConfig, RemoteRepository, RetryPolicy};
pub use context::{Declaration, ExecutionContext, Namespace};
pub use error::{Error, ResolutionError, Result};
pub use evaluator::{EvalError, EvalOutcome, IncrementalEvaluator, Phase};
pub use execute::{Backend, Execution, InterruptHandle, JvmBackend, TestInvocation, Thrown};
pub use paths::SessionDirs;
pub use protocol::{Cell, CellKind, CellOutput, CellStatus, ClientMessage, ErrorInfo, KernelMessage};
pub use resolve::{Coordinate, ResolvedArtifact, Resolver};
pub use session::Session;
pub use testing::{AnnotationMarker, TestBridge, TestMarker, TestOutcome, TestResult, TestRun};
