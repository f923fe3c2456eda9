//! Execution backends.
//!
//! The evaluator drives a cell through compile, link and run; a [`Backend`]
//! does the JVM-specific work. [`JvmBackend`] is the production backend:
//!
//! ```text
//! JvmBackend
//!     │
//!     ├── Javac: wrapper source → staging/SnippetN/classes
//!     │
//!     └── WorkerHandle (java javelin.runtime.KernelWorker)
//!             │
//!             ├── ADDCP   extend the session class loader
//!             ├── OVERRIDE   child-first layer for newer artifact versions
//!             ├── LOAD    publish + load + initialize a wrapper
//!             ├── RUN     run(), capturing System.out/err
//!             ├── DESCRIBE / INVOKE   test discovery and execution
//!             └── killed and respawned on interrupt, then replayed
//! ```

mod interrupt;
mod jvm;
pub mod protocol;
mod runtime;
mod worker;

pub use interrupt::InterruptHandle;
pub use jvm::JvmBackend;
pub use protocol::{ClassDescription, MethodDescription, Thrown, WorkerCommand, WorkerReply};
pub use runtime::{WORKER_SOURCE, ensure_runtime, runtime_path};
pub use worker::{WORKER_MAIN_CLASS, WorkerHandle};

use async_trait::async_trait;

use crate::classpath::{ClasspathEntry, ClasspathSnapshot};
use crate::compile::{CompileError, CompiledClasses, WrapperSource};
use crate::context::CommittedUnit;
use crate::error::Result;

/// Result of running a wrapper's `run()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    /// Captured standard output and error.
    pub output: String,
    /// Rendered value of the trailing expression.
    pub value: Option<String>,
    /// Uncaught throwable, if `run()` did not complete.
    pub thrown: Option<Thrown>,
}

/// Result of invoking one test method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestInvocation {
    pub output: String,
    pub thrown: Option<Thrown>,
}

/// JVM-specific half of cell evaluation.
///
/// `Err` results mean the backend itself failed (javac missing, worker
/// died); the session then restarts it. Problems with the user's code are
/// reported in the `Ok` values.
#[async_trait]
pub trait Backend: Send {
    /// Compile a wrapper against the classpath without publishing it.
    async fn compile(
        &mut self,
        wrapper: &WrapperSource,
        classpath: &ClasspathSnapshot,
    ) -> Result<std::result::Result<CompiledClasses, CompileError>>;

    /// Publish compiled classes and load the wrapper into the running JVM.
    ///
    /// Returns the throwable if loading or initialization failed.
    async fn link(&mut self, compiled: &CompiledClasses) -> Result<Option<Thrown>>;

    /// Run a linked wrapper.
    async fn execute(&mut self, class_name: &str) -> Result<Execution>;

    /// Make new classpath entries visible to classes loaded from now on.
    async fn extend_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()>;

    /// Make entries win over other versions of the same artifacts for
    /// classes loaded from now on. Classes already loaded are unaffected.
    async fn override_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()>;

    /// Reflect over a loaded class.
    ///
    /// A class that does not exist or cannot be loaded is an
    /// [`Error::Execution`](crate::Error::Execution).
    async fn describe_class(&mut self, class_name: &str) -> Result<ClassDescription>;

    /// Invoke a no-arg method on a fresh instance, with the `setup` methods
    /// run before it and the `teardown` methods after it on that instance.
    async fn invoke_test(
        &mut self,
        class_name: &str,
        method: &str,
        setup: &[String],
        teardown: &[String],
    ) -> Result<TestInvocation>;

    /// Replace the running JVM with a fresh one that has the given classpath,
    /// then reload and rerun the committed units in order.
    async fn restart(&mut self, classpath: &ClasspathSnapshot, units: &[CommittedUnit]) -> Result<()>;

    /// Stop the JVM.
    async fn shutdown(&mut self) -> Result<()>;
}
