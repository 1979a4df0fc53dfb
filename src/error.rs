use thiserror::Error;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The optimizer and backend operate on IR that was already validated by a frontend, so
/// nearly every error signals a defect in the compiler itself (a broken structural
/// invariant) rather than a problem with the program being compiled. Conditions that are
/// expected during normal operation, such as a constant division by zero found during
/// constant propagation or a coloring attempt that needs more than `K` registers, are
/// handled locally and never surface as an `Error`.
///
/// # Error Categories
///
/// ## Invariant Violations
/// - [`Error::InvariantViolation`] - A structural precondition of an analysis or pass was broken
/// - [`Error::NotFunctional`] - A function does not have the single-exit shape the optimizer expects
///
/// ## Lookup Errors
/// - [`Error::UnknownFunction`] - A function name could not be resolved in the module
/// - [`Error::UnresolvedBlock`] - A block handle refers to a removed block
/// - [`Error::UnresolvedRegister`] - A register handle is not known to its function
///
/// ## Backend Errors
/// - [`Error::RegisterAllocation`] - The spill loop exceeded its configured iteration bound
///
/// # Examples
///
/// ```rust,ignore
/// use ssaforge::{Compiler, Error};
///
/// match Compiler::default().compile(module) {
///     Ok(assembly) => println!("{assembly}"),
///     Err(Error::InvariantViolation { message, file, line }) => {
///         eprintln!("internal compiler error: {message} ({file}:{line})");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Structural errors
    /// A precondition of an analysis or transformation was violated.
    ///
    /// Examples are computing dominators over a CFG that still contains
    /// unreachable blocks, a phi whose incoming edges disagree with the
    /// predecessor set, or a block without a terminator. The error records
    /// where the violation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the broken invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message describing the violated invariant
        message: String,
        /// The source file in which the violation was detected
        file: &'static str,
        /// The source line in which the violation was detected
        line: u32,
    },

    /// A function does not satisfy the single-exit shape.
    ///
    /// Every block must end in exactly one terminator and the function must
    /// contain exactly one `ret`, located in its exit block.
    #[error("Function '{0}' is not in functional shape")]
    NotFunctional(String),

    // Lookup errors
    /// A function with the given name does not exist in the module.
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// A block handle does not refer to a live block.
    #[error("Block bb{0} does not exist")]
    UnresolvedBlock(usize),

    /// A register handle does not refer to a register of the function.
    #[error("Register %{0} does not exist")]
    UnresolvedRegister(usize),

    // Backend errors
    /// Register allocation did not converge within the configured number of rounds.
    ///
    /// The spill loop always converges in theory; this bound protects against
    /// defects in the spill rewriter.
    #[error("Register allocation failed: {0}")]
    RegisterAllocation(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
