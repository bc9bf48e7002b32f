//! Error handling for the guardlift driver.

use derive_more::{Display, Error, From};
use guardlift_ir::{ParseError, ValidationResult};
use guardlift_passes::LoweringError;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while lowering a graph.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// I/O errors when reading input or writing output.
    #[display("I/O error: {_0}")]
    Io(#[error(source)] std::io::Error),

    /// The input text is not a well-formed graph.
    #[display("{_0}")]
    Parse(ParseError),

    /// A pass rejected its input.
    #[display("lowering failed: {_0}")]
    Lowering(LoweringError),

    /// The graph failed verification after a stage.
    #[from(ignore)]
    #[display("graph is invalid after {stage}: {result}")]
    Validation {
        stage: &'static str,
        result: ValidationResult,
    },
}
