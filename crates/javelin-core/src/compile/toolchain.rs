//! JDK discovery.
//!
//! Looks for a JDK in an explicit location, then `JAVA_HOME`, then `PATH`.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Oldest supported JDK feature release.
pub const MIN_JAVA_VERSION: u32 = 11;

/// A usable JDK.
#[derive(Debug, Clone)]
pub struct JdkToolchain {
    /// Path to `javac`.
    javac: PathBuf,

    /// Path to `java`.
    java: PathBuf,

    /// Feature release number (11, 17, 21, ...).
    major: u32,

    /// Version line printed by `javac -version`.
    version: String,
}

impl JdkToolchain {
    /// Find a JDK.
    ///
    /// `java_home` takes precedence over the `JAVA_HOME` environment
    /// variable, which takes precedence over `javac` on `PATH`.
    pub fn discover(java_home: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os("JAVA_HOME").map(PathBuf::from);
        let home = java_home.map(Path::to_path_buf).or(from_env);

        let (javac, java) = match home {
            Some(home) => Self::from_home(&home)?,
            None => Self::from_path()?,
        };

        let version = Self::get_javac_version(&javac)?;
        let major = parse_major(&version).ok_or_else(|| {
            Error::Toolchain(format!("unrecognized javac version: {version}"))
        })?;
        if major < MIN_JAVA_VERSION {
            return Err(Error::Toolchain(format!(
                "JDK {major} is too old, {MIN_JAVA_VERSION} or newer is required"
            )));
        }

        tracing::info!("Using {} ({})", version, javac.display());
        Ok(Self {
            javac,
            java,
            major,
            version,
        })
    }

    /// Path to `javac`.
    pub fn javac(&self) -> &Path {
        &self.javac
    }

    /// Path to `java`.
    pub fn java(&self) -> &Path {
        &self.java
    }

    /// Feature release number.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Version line, e.g. `javac 17.0.2`.
    pub fn version(&self) -> &str {
        &self.version
    }

    fn from_home(home: &Path) -> Result<(PathBuf, PathBuf)> {
        let bin = home.join("bin");
        let javac = bin.join(executable("javac"));
        let java = bin.join(executable("java"));
        if !javac.is_file() {
            return Err(Error::Toolchain(format!(
                "no javac in {} (is it a JRE rather than a JDK?)",
                bin.display()
            )));
        }
        if !java.is_file() {
            return Err(Error::Toolchain(format!("no java in {}", bin.display())));
        }
        Ok((javac, java))
    }

    fn from_path() -> Result<(PathBuf, PathBuf)> {
        let javac = which::which("javac")
            .map_err(|_| Error::Toolchain("javac not found in PATH".to_string()))?;
        // Prefer the java next to javac so both come from the same JDK.
        let sibling = javac.with_file_name(executable("java"));
        let java = if sibling.is_file() {
            sibling
        } else {
            which::which("java")
                .map_err(|_| Error::Toolchain("java not found in PATH".to_string()))?
        };
        Ok((javac, java))
    }

    fn get_javac_version(javac: &Path) -> Result<String> {
        let output = Command::new(javac)
            .arg("-version")
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to run javac: {e}")))?;

        if !output.status.success() {
            return Err(Error::Toolchain("failed to get javac version".to_string()));
        }

        // JDK 8 prints the version on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = stdout
            .lines()
            .chain(stderr.lines())
            .find(|l| l.trim_start().starts_with("javac"))
            .unwrap_or_default();
        Ok(line.trim().to_string())
    }
}

fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Feature release from a `javac -version` line (`javac 1.8.0_292` is 8).
pub fn parse_major(version: &str) -> Option<u32> {
    let number = version.trim().strip_prefix("javac")?.trim();
    let mut parts = number.split(|c: char| !c.is_ascii_digit());
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major() {
        assert_eq!(parse_major("javac 17.0.2"), Some(17));
        assert_eq!(parse_major("javac 21"), Some(21));
        assert_eq!(parse_major("javac 11.0.20.1"), Some(11));
        assert_eq!(parse_major("javac 1.8.0_292"), Some(8));
        assert_eq!(parse_major("javac 22-ea"), Some(22));
        assert_eq!(parse_major("java 17"), None);
        assert_eq!(parse_major("javac"), None);
    }

    #[test]
    fn test_missing_home_is_toolchain_error() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let err = JdkToolchain::discover(Some(temp.path())).unwrap_err();
        assert!(matches!(err, Error::Toolchain(_)));
        assert!(err.with_hint().contains("hint"));
    }

    #[test]
    #[ignore = "Requires a JDK"]
    fn test_discover_jdk() {
        let toolchain = JdkToolchain::discover(None).expect("JDK not found");
        assert!(toolchain.major() >= MIN_JAVA_VERSION);
        assert!(toolchain.version().starts_with("javac"));
    }
}
