//! DX Whole-program Driver
//!
//! The top of the stack: sequences the optimization passes in their
//! fixed order, distributes per-method work onto the worker pool,
//! rebuilds the application view after each lens-producing pass, and
//! hands the final view plus the residual rename map to the writer.
//!
//! # Pipeline
//!
//! 1. Tree shaking
//! 2. Vertical class merging (lens)
//! 3. Horizontal class merging (lens)
//! 4. Enum unboxing (lens, prototype changes)
//! 5. Proto normalization (lens, prototype changes)
//! 6. Per-method IR optimization including class inlining
//! 7. Minification (lens)
//! 8. Writer handoff

mod diagnostics;
mod driver;
mod error;
mod interop;
mod pass;
mod passes;
mod scheduler;

pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticLocation, DiagnosticSink, Severity,
};
pub use driver::{CompilationResult, Driver};
pub use error::DriverError;
pub use interop::{ClassFileReader, ProgramWriter, ReadError, WriteError};
pub use pass::{OptimizationPass, PassContext, PipelineState};
pub use passes::{
    EnumUnboxingPass, HorizontalClassMergingPass, IrOptimizationPass, MinificationPass,
    ProtoNormalizationPass, TreeShakingPass, VerticalClassMergingPass,
};
pub use scheduler::WorkerPool;
