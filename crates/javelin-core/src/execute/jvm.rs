//! Production backend: javac plus a worker JVM.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::protocol::{ClassDescription, Thrown, WorkerCommand, WorkerReply};
use super::runtime::ensure_runtime;
use super::worker::WorkerHandle;
use super::{Backend, Execution, TestInvocation};
use crate::classpath::{ClasspathEntry, ClasspathSnapshot};
use crate::compile::{CompileError, CompiledClasses, Javac, JdkToolchain, WrapperSource};
use crate::config::KernelConfig;
use crate::context::CommittedUnit;
use crate::error::{Error, Result};
use crate::paths::SessionDirs;

/// Compiles with `javac` and runs cells in a long-lived worker JVM.
///
/// The worker is started on first use. Linked classes live in the session's
/// class directory, so a restarted worker can reload them.
pub struct JvmBackend {
    javac: Javac,
    dirs: SessionDirs,
    runtime: PathBuf,
    classpath: Vec<ClasspathEntry>,
    /// Override layers, oldest first.
    layers: Vec<Vec<PathBuf>>,
    worker: Option<WorkerHandle>,
}

impl JvmBackend {
    /// Discover the JDK and build the worker runtime if needed.
    pub async fn start(config: &KernelConfig, dirs: SessionDirs) -> Result<Self> {
        let toolchain = JdkToolchain::discover(config.java_home.as_deref())?;
        let javac = Javac::new(toolchain);
        let runtime = ensure_runtime(&javac, &config.runtime_dir()).await?;

        Ok(Self {
            javac,
            dirs,
            runtime,
            classpath: Vec::new(),
            layers: Vec::new(),
            worker: None,
        })
    }

    pub fn toolchain(&self) -> &JdkToolchain {
        self.javac.toolchain()
    }

    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    /// The running worker, started with the current classpath if needed.
    async fn worker(&mut self) -> Result<&mut WorkerHandle> {
        let alive = match self.worker.as_mut() {
            Some(worker) => worker.is_alive(),
            None => false,
        };
        if !alive {
            if self.worker.take().is_some() {
                warn!("Worker JVM exited, starting a new one");
            }
            let mut worker = WorkerHandle::spawn(
                self.javac.toolchain().java(),
                &self.runtime,
                &self.dirs.classes_dir,
            )
            .await?;
            for entry in &self.classpath {
                let reply = worker
                    .request(&WorkerCommand::AddClasspath(entry.location.clone()))
                    .await?;
                expect_ok(reply, "ADDCP")?;
            }
            for layer in &self.layers {
                let reply = worker.request(&WorkerCommand::Override(layer.clone())).await?;
                expect_ok(reply, "OVERRIDE")?;
            }
            self.worker = Some(worker);
        }
        self.worker
            .as_mut()
            .ok_or_else(|| Error::Worker("worker is not running".to_string()))
    }
}

fn expect_ok(reply: WorkerReply, command: &str) -> Result<()> {
    match reply {
        WorkerReply::Ok => Ok(()),
        WorkerReply::Failure { message, .. } => {
            Err(Error::Worker(format!("{command} failed: {message}")))
        }
        other => Err(unexpected(other, command)),
    }
}

fn unexpected(reply: WorkerReply, command: &str) -> Error {
    Error::Worker(format!("unexpected reply to {command}: {reply:?}"))
}

/// A throwable for a failure reply that carried none.
fn failure_thrown(message: String, thrown: Option<Thrown>) -> Thrown {
    thrown.unwrap_or(Thrown {
        class_name: "java.lang.Error".to_string(),
        message: Some(message),
        assertion: false,
        trace: Vec::new(),
    })
}

#[async_trait]
impl Backend for JvmBackend {
    async fn compile(
        &mut self,
        wrapper: &WrapperSource,
        classpath: &ClasspathSnapshot,
    ) -> Result<std::result::Result<CompiledClasses, CompileError>> {
        let classpath_arg = classpath.to_arg(&[self.dirs.classes_dir.as_path()])?;
        self.javac
            .compile_wrapper(wrapper, &self.dirs.staging_dir, &classpath_arg)
            .await
    }

    async fn link(&mut self, compiled: &CompiledClasses) -> Result<Option<Thrown>> {
        compiled.publish(&self.dirs.classes_dir).await?;
        if let Some(attempt) = compiled.output_dir.parent() {
            let _ = tokio::fs::remove_dir_all(attempt).await;
        }

        let worker = self.worker().await?;
        match worker.request(&WorkerCommand::Load(compiled.class_name.clone())).await? {
            WorkerReply::Ok => Ok(None),
            WorkerReply::Failure { message, thrown } => Ok(Some(failure_thrown(message, thrown))),
            other => Err(unexpected(other, "LOAD")),
        }
    }

    async fn execute(&mut self, class_name: &str) -> Result<Execution> {
        let worker = self.worker().await?;
        match worker.request(&WorkerCommand::Run(class_name.to_string())).await? {
            WorkerReply::Ran {
                output,
                value,
                thrown,
            } => Ok(Execution {
                output,
                value,
                thrown,
            }),
            WorkerReply::Failure { message, .. } => Err(Error::Execution(message)),
            other => Err(unexpected(other, "RUN")),
        }
    }

    async fn extend_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()> {
        self.classpath.extend(entries.iter().cloned());
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };
        for entry in entries {
            let reply = worker
                .request(&WorkerCommand::AddClasspath(entry.location.clone()))
                .await?;
            expect_ok(reply, "ADDCP")?;
        }
        Ok(())
    }

    async fn override_classpath(&mut self, entries: &[ClasspathEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let layer: Vec<PathBuf> = entries.iter().map(|e| e.location.clone()).collect();
        debug!("Overriding with {} classpath entries", layer.len());
        self.layers.push(layer.clone());
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };
        let reply = worker.request(&WorkerCommand::Override(layer)).await?;
        expect_ok(reply, "OVERRIDE")
    }

    async fn describe_class(&mut self, class_name: &str) -> Result<ClassDescription> {
        let worker = self.worker().await?;
        match worker.request(&WorkerCommand::Describe(class_name.to_string())).await? {
            WorkerReply::Class(description) => Ok(description),
            WorkerReply::Failure { message, .. } => Err(Error::Execution(message)),
            other => Err(unexpected(other, "DESCRIBE")),
        }
    }

    async fn invoke_test(
        &mut self,
        class_name: &str,
        method: &str,
        setup: &[String],
        teardown: &[String],
    ) -> Result<TestInvocation> {
        let worker = self.worker().await?;
        let command = WorkerCommand::Invoke {
            class_name: class_name.to_string(),
            method: method.to_string(),
            setup: setup.to_vec(),
            teardown: teardown.to_vec(),
        };
        match worker.request(&command).await? {
            WorkerReply::Test { output, thrown } => Ok(TestInvocation { output, thrown }),
            WorkerReply::Failure { message, thrown } => Ok(TestInvocation {
                output: String::new(),
                thrown: Some(failure_thrown(message, thrown)),
            }),
            other => Err(unexpected(other, "INVOKE")),
        }
    }

    async fn restart(&mut self, classpath: &ClasspathSnapshot, units: &[CommittedUnit]) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            worker.kill().await;
        }
        // A fresh JVM needs no layers: superseded versions are simply absent.
        self.classpath = classpath.effective().to_vec();
        self.layers.clear();

        warn!("Restarting worker JVM and replaying {} cell(s)", units.len());
        let worker = self.worker().await?;
        for unit in units {
            debug!("Replaying {}", unit.class_name);
            match worker.request(&WorkerCommand::Load(unit.class_name.clone())).await? {
                WorkerReply::Ok => {}
                other => {
                    warn!("Replay of {} failed to load: {:?}", unit.class_name, other);
                    continue;
                }
            }
            match worker.request(&WorkerCommand::Run(unit.class_name.clone())).await? {
                WorkerReply::Ran { thrown: None, .. } => {}
                WorkerReply::Ran {
                    thrown: Some(thrown),
                    ..
                } => warn!("Replay of {} threw {}", unit.class_name, thrown.summary()),
                other => warn!("Replay of {} failed: {:?}", unit.class_name, other),
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await?;
        }
        Ok(())
    }
}
