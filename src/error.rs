use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Method-scoped limits
///
/// These abort processing of the current method only. The caller is expected to substitute
/// a stub body (see [`crate::Decompiler::stub_body`]) and continue with the next method.
/// [`Error::is_limit`] classifies them.
///
/// - [`Error::TooComplex`] - Instruction count ceiling exceeded before any pass ran
/// - [`Error::StackNotSettling`] - Stack delta fixpoint did not converge
/// - [`Error::TypesNotSettling`] - Type propagation through moves did not converge
///
/// ## Structural Errors
/// - [`Error::Malformed`] - An instruction or operand shape that a pass could not skip
/// - [`Error::GraphError`] - Control flow graph misuse (missing block, sentinel surgery)
/// - [`Error::CodegenError`] - Lowering fault that cannot become a runtime diagnostic
///
/// # Examples
///
/// ```rust,ignore
/// use dotlift::{Decompiler, Error};
///
/// match decompiler.decompile(&mut method, &context) {
///     Ok(body) => println!("{body}"),
///     Err(e) if e.is_limit() => {
///         let body = Decompiler::stub_body(&e.to_string());
///         println!("{body}");
///     }
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method has more instructions than the configured ceiling allows.
    ///
    /// Raised by the driver before any transform touches the method.
    #[error("Too many instructions in {method}! ({instructions})")]
    TooComplex {
        /// Fully qualified method name (`Type.Method`)
        method: String,
        /// Instruction count of the rejected method
        instructions: usize,
        /// The configured ceiling
        limit: usize,
    },

    /// The per-block stack delta kept changing after the configured number of block re-visits.
    ///
    /// This almost always means the input contains inconsistent stack adjustments on
    /// converging paths.
    #[error("Stack state not settling! ({0} blocks already visited)")]
    StackNotSettling(usize),

    /// Type propagation through moves kept changing after the configured number of loops.
    #[error("Type propagation through moves not settling! (looped {0} times)")]
    TypesNotSettling(usize),

    /// An instruction or operand was not in a shape the pass requires.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Error during control flow graph surgery.
    ///
    /// Covers lookups of blocks that no longer exist and attempts to restructure the
    /// entry or exit sentinels.
    #[error("{0}")]
    GraphError(String),

    /// Error while lowering the final graph into CIL.
    #[error("{0}")]
    CodegenError(String),
}

impl Error {
    /// Returns `true` for the method-scoped ceilings that a caller recovers from by
    /// substituting a stub body.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            Error::TooComplex { .. } | Error::StackNotSettling(_) | Error::TypesNotSettling(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_classification() {
        let too_complex = Error::TooComplex {
            method: "Foo.Bar".to_string(),
            instructions: 6000,
            limit: 5000,
        };
        assert!(too_complex.is_limit());
        assert!(Error::StackNotSettling(5000).is_limit());
        assert!(Error::TypesNotSettling(5000).is_limit());
        assert!(!Error::GraphError("missing".to_string()).is_limit());
        assert!(!malformed_error!("bad operand").is_limit());
    }

    #[test]
    fn test_error_messages() {
        let too_complex = Error::TooComplex {
            method: "Foo.Bar".to_string(),
            instructions: 6000,
            limit: 5000,
        };
        assert_eq!(too_complex.to_string(), "Too many instructions in Foo.Bar! (6000)");
        assert_eq!(
            Error::StackNotSettling(12).to_string(),
            "Stack state not settling! (12 blocks already visited)"
        );

        let malformed = malformed_error!("operand {} unexpected", 3);
        match malformed {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "operand 3 unexpected");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }
}
