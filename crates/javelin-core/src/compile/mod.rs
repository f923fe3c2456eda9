//! Cell compilation: wrapper generation, javac, diagnostics.
//!
//! A cell's snippets become one wrapper class whose static members are the
//! cell's declarations. The class is compiled into a staging directory and
//! only published to the session's class directory when the cell links.

mod errors;
mod javac;
mod toolchain;
mod wrapper;

pub use errors::{CompileError, CompileErrorKind, Diagnostic, ErrorLevel, ErrorMapper};
pub use javac::{CompiledClasses, Javac, JavacOutput};
pub use toolchain::{JdkToolchain, MIN_JAVA_VERSION, parse_major};
pub use wrapper::{
    DEFAULT_IMPORTS, HAS_VALUE_FIELD, SNIPPET_PACKAGE, VALUE_FIELD, WrapperOptions, WrapperSource,
    generate,
};
