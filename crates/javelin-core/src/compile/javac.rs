//! `javac` invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::errors::{CompileError, Diagnostic};
use super::toolchain::JdkToolchain;
use super::wrapper::WrapperSource;
use crate::error::{Error, Result};

/// Class files produced for one wrapper, not yet published.
#[derive(Debug, Clone)]
pub struct CompiledClasses {
    /// Binary name of the wrapper class.
    pub class_name: String,

    /// javac's `-d` directory.
    pub output_dir: PathBuf,

    /// Class files relative to `output_dir` (nested types included).
    pub files: Vec<PathBuf>,

    /// Non-fatal diagnostics.
    pub warnings: Vec<Diagnostic>,
}

impl CompiledClasses {
    /// Copy the class files into a classpath directory.
    pub async fn publish(&self, classes_dir: &Path) -> Result<()> {
        for file in &self.files {
            let target = classes_dir.join(file);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(self.output_dir.join(file), &target).await?;
        }
        Ok(())
    }
}

/// Output of a javac run.
#[derive(Debug)]
pub struct JavacOutput {
    pub success: bool,
    pub stderr: String,
}

/// Compiles Java sources with the discovered JDK.
#[derive(Debug, Clone)]
pub struct Javac {
    toolchain: JdkToolchain,
}

impl Javac {
    pub fn new(toolchain: JdkToolchain) -> Self {
        Self { toolchain }
    }

    pub fn toolchain(&self) -> &JdkToolchain {
        &self.toolchain
    }

    /// Compile source files into `output_dir`.
    pub async fn run(&self, sources: &[PathBuf], classpath: &OsString, output_dir: &Path) -> Result<JavacOutput> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut cmd = Command::new(self.toolchain.javac());
        cmd.arg("-d")
            .arg(output_dir)
            .arg("-encoding")
            .arg("UTF-8")
            .arg("-proc:none")
            .arg("-implicit:none")
            .arg("-g")
            .arg("-Xlint:none")
            .arg("-Xmaxerrs")
            .arg("20");
        if !classpath.is_empty() {
            cmd.arg("-cp").arg(classpath);
        }
        cmd.args(sources)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running javac on {} file(s)", sources.len());
        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Toolchain(format!("failed to run javac: {e}")))?;

        // Some javac builds report diagnostics on stdout.
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        stderr.push_str(&String::from_utf8_lossy(&output.stdout));

        Ok(JavacOutput {
            success: output.status.success(),
            stderr,
        })
    }

    /// Compile one wrapper class in a fresh staging directory.
    ///
    /// Returns `Ok(Err(..))` when the cell's code does not compile, and
    /// `Err(..)` when javac itself could not be run.
    pub async fn compile_wrapper(
        &self,
        wrapper: &WrapperSource,
        staging_dir: &Path,
        classpath: &OsString,
    ) -> Result<std::result::Result<CompiledClasses, CompileError>> {
        let attempt_dir = staging_dir.join(&wrapper.simple_name);
        if attempt_dir.exists() {
            tokio::fs::remove_dir_all(&attempt_dir).await?;
        }
        let source_path = attempt_dir.join("src").join(wrapper.relative_path());
        if let Some(parent) = source_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&source_path, &wrapper.source).await?;

        let output_dir = attempt_dir.join("classes");
        let output = self.run(std::slice::from_ref(&source_path), classpath, &output_dir).await?;
        let diagnostics = wrapper.mapper.parse_javac_output(&output.stderr);

        if !output.success {
            if diagnostics.is_empty() {
                return Ok(Err(CompileError::type_error(output.stderr.trim(), None)));
            }
            return Ok(Err(CompileError::from_diagnostics(diagnostics)));
        }

        let mut files = Vec::new();
        collect_class_files(&output_dir, &output_dir, &mut files)?;
        files.sort();

        Ok(Ok(CompiledClasses {
            class_name: wrapper.class_name.clone(),
            output_dir,
            files,
            warnings: diagnostics,
        }))
    }
}

fn collect_class_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_class_files(root, &path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "class")
            && let Ok(relative) = path.strip_prefix(root)
        {
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}
