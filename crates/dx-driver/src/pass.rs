//! Pass capability
//!
//! Every optimization pass implements one uniform interface; the driver
//! treats the battery as an ordered list of that capability. A pass
//! returns the lens it produced, or `None` when it only mutated method
//! bodies in place.

use crate::diagnostics::DiagnosticSink;
use crate::error::DriverError;
use crate::scheduler::WorkerPool;
use dx_ir::{ApplicationView, MethodReference, Type};
use dx_keep::{CompilerOptions, KeepOracle};
use dx_lens::GraphLens;
use std::collections::HashSet;

/// Mutable state threaded between passes
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Classes that received a vertically merged superclass
    pub vertically_merged: HashSet<Type>,
    /// Methods (post-rename references) that already carry a prototype
    /// change on the stack; later passes must not stack another
    pub prototype_changed: HashSet<MethodReference>,
}

/// Everything a pass may consult besides the view
pub struct PassContext<'a> {
    /// Keep/pinning oracle
    pub oracle: &'a KeepOracle,
    /// Whole-run options
    pub options: &'a CompilerOptions,
    /// The driver's worker pool
    pub scheduler: &'a WorkerPool,
    /// Diagnostic sink
    pub diagnostics: &'a dyn DiagnosticSink,
    /// Cross-pass state
    pub state: &'a mut PipelineState,
}

/// One optimization pass
pub trait OptimizationPass {
    /// Pass name, for spans and diagnostics
    fn name(&self) -> &'static str;

    /// Run over the view; return the produced lens, if any
    ///
    /// # Errors
    /// Only engine-internal failures abort; per-candidate problems are
    /// handled by skipping.
    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError>;
}
