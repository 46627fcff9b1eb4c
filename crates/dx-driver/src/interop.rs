//! Collaborator contracts
//!
//! The reader and writer are external collaborators; the core consumes
//! these traits only. The reader turns class-file bytes into
//! definitions; the writer serializes the final view plus the residual
//! rename map and may reject programs exceeding a target-format limit.

use dx_ir::{ApplicationView, ClassDefinition};
use dx_lens::RenameMapping;

/// Reader failure
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The input is not a well-formed class file
    #[error("malformed class file: {0}")]
    MalformedClassFile(String),
}

/// Class-file reader contract
pub trait ClassFileReader {
    /// Parse one class file
    ///
    /// # Errors
    /// [`ReadError::MalformedClassFile`] on any structural problem.
    fn parse(&self, bytes: &[u8]) -> Result<ClassDefinition, ReadError>;
}

/// Writer failure
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The optimized program exceeds a target-format limit
    #[error("unrepresentable construct: {0}")]
    UnrepresentableConstruct(String),
}

/// Output writer contract
pub trait ProgramWriter {
    /// Serialize the final view and residual rename map
    ///
    /// # Errors
    /// [`WriteError::UnrepresentableConstruct`] when the program cannot
    /// be expressed in the target format.
    fn serialize(
        &self,
        view: &ApplicationView,
        mapping: &RenameMapping,
    ) -> Result<Vec<u8>, WriteError>;
}
