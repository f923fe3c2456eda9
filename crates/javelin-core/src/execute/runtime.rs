//! Worker runtime build.
//!
//! The worker's Java source is embedded in the crate and compiled once per
//! source revision into `<runtime_dir>/<digest>/`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::compile::Javac;
use crate::error::{Error, Result};
use crate::resolve::cache::hex_digest;

/// Source of `javelin.runtime.KernelWorker`.
pub const WORKER_SOURCE: &str = include_str!("../../java/javelin/runtime/KernelWorker.java");

const WORKER_SOURCE_PATH: &str = "javelin/runtime/KernelWorker.java";
const WORKER_CLASS_PATH: &str = "javelin/runtime/KernelWorker.class";

/// Directory the runtime for the embedded source compiles into.
pub fn runtime_path(runtime_dir: &Path) -> PathBuf {
    let digest = hex_digest(WORKER_SOURCE.as_bytes());
    runtime_dir.join(&digest[..16])
}

/// Compile the worker runtime unless it is already built.
///
/// Returns the classpath root holding `KernelWorker.class`.
pub async fn ensure_runtime(javac: &Javac, runtime_dir: &Path) -> Result<PathBuf> {
    let target = runtime_path(runtime_dir);
    if target.join(WORKER_CLASS_PATH).is_file() {
        return Ok(target);
    }

    tracing::info!("Building worker runtime in {}", target.display());
    let build = runtime_dir.join(format!(".build-{}", uuid::Uuid::new_v4()));
    let source = build.join("src").join(WORKER_SOURCE_PATH);
    if let Some(parent) = source.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&source, WORKER_SOURCE).await?;

    let classes = build.join("classes");
    let output = javac.run(&[source], &OsString::new(), &classes).await?;
    if !output.success {
        let _ = tokio::fs::remove_dir_all(&build).await;
        return Err(Error::Toolchain(format!(
            "failed to compile the worker runtime:\n{}",
            output.stderr.trim()
        )));
    }

    // Another session may have finished the same build first.
    if let Err(e) = tokio::fs::rename(&classes, &target).await
        && !target.join(WORKER_CLASS_PATH).is_file()
    {
        let _ = tokio::fs::remove_dir_all(&build).await;
        return Err(Error::Io(e));
    }
    let _ = tokio::fs::remove_dir_all(&build).await;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_path_is_stable() {
        let a = runtime_path(Path::new("/cache/runtime"));
        let b = runtime_path(Path::new("/cache/runtime"));
        assert_eq!(a, b);
        assert!(a.starts_with("/cache/runtime"));
    }

    #[test]
    fn test_worker_source_is_embedded() {
        assert!(WORKER_SOURCE.contains("package javelin.runtime;"));
        assert!(WORKER_SOURCE.contains("class KernelWorker"));
    }

    #[tokio::test]
    #[ignore = "Requires a JDK"]
    async fn test_ensure_runtime_builds_once() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let toolchain = crate::compile::JdkToolchain::discover(None).expect("JDK not found");
        let javac = Javac::new(toolchain);

        let first = ensure_runtime(&javac, temp.path()).await.unwrap();
        assert!(first.join(WORKER_CLASS_PATH).is_file());
        let second = ensure_runtime(&javac, temp.path()).await.unwrap();
        assert_eq!(first, second);
    }
}
