//! Whole-program driver
//!
//! Sequences the fixed pass battery, rebuilds the application view
//! after each lens-producing pass, invalidates pre-rename caches, and
//! hands the final view plus the residual rename map to the writer
//! collaborator. Fatal diagnostics abort at the pass boundary where
//! they were raised; non-fatal diagnostics accumulate and are returned
//! alongside the result.

use crate::diagnostics::{CollectingSink, Diagnostic};
use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext, PipelineState};
use crate::passes::{
    EnumUnboxingPass, HorizontalClassMergingPass, IrOptimizationPass, MinificationPass,
    ProtoNormalizationPass, TreeShakingPass, VerticalClassMergingPass,
};
use crate::scheduler::WorkerPool;
use dx_ir::ApplicationView;
use dx_keep::{CompilerOptions, KeepOracle, KeepRule, RuleSet};
use dx_lens::{rewrite_class, GraphLens, LensStack, RenameMapping};
use tracing::{info, info_span};

/// Final output of a driver run
#[derive(Debug)]
pub struct CompilationResult {
    /// The optimized application view
    pub view: ApplicationView,
    /// Every lens still in effect, earliest first
    pub lens_stack: LensStack,
    /// The residual rename map, for the writer and for retracing
    pub mapping: RenameMapping,
    /// Non-fatal diagnostics accumulated across the run
    pub diagnostics: Vec<Diagnostic>,
}

/// The whole-program driver
#[derive(Debug)]
pub struct Driver {
    options: CompilerOptions,
    oracle: KeepOracle,
}

impl Driver {
    /// Validate the rule set and create a driver
    ///
    /// # Errors
    /// Rejects self-contradictory rule sets before any optimization
    /// runs.
    pub fn new(rules: Vec<KeepRule>, options: CompilerOptions) -> Result<Self, DriverError> {
        let rules = RuleSet::new(rules)?;
        let oracle = KeepOracle::new(rules, &options);
        Ok(Self { options, oracle })
    }

    /// Run the full pipeline over a view
    ///
    /// # Errors
    /// Fails on internal invariant violations, invalid lenses, or when
    /// a pass raises fatal diagnostics.
    pub fn compile(&self, mut view: ApplicationView) -> Result<CompilationResult, DriverError> {
        let scheduler = WorkerPool::new(self.options.worker_threads)?;
        let sink = CollectingSink::new();
        let mut state = PipelineState::default();
        let mut stack = LensStack::new();

        let passes: Vec<Box<dyn OptimizationPass>> = vec![
            Box::new(TreeShakingPass),
            Box::new(VerticalClassMergingPass),
            Box::new(HorizontalClassMergingPass),
            Box::new(EnumUnboxingPass),
            Box::new(ProtoNormalizationPass),
            Box::new(IrOptimizationPass),
            Box::new(MinificationPass),
        ];

        for pass in &passes {
            let span = info_span!("pass", name = pass.name());
            let _guard = span.enter();
            let produced = {
                let mut cx = PassContext {
                    oracle: &self.oracle,
                    options: &self.options,
                    scheduler: &scheduler,
                    diagnostics: &sink,
                    state: &mut state,
                };
                pass.run(&mut view, &mut cx)?
            };
            if let Some(lens) = produced {
                rebuild(&mut view, &lens);
                stack.push(lens, view.pool())?;
                // cached answers are keyed on pre-rename references
                self.oracle.invalidate_caches();
            }
            let fatal = sink.error_count();
            if fatal > 0 {
                return Err(DriverError::FatalDiagnostics(fatal));
            }
        }

        let flattened = stack.flatten(view.pool());
        let mapping = RenameMapping::from_lens(&flattened, view.pool());
        info!(
            classes = view.program_class_count(),
            lenses = stack.len(),
            "compilation complete"
        );
        Ok(CompilationResult {
            view,
            lens_stack: stack,
            mapping,
            diagnostics: sink.entries(),
        })
    }

}

/// Atomically rebuild the view through one freshly pushed lens
fn rebuild(view: &mut ApplicationView, lens: &GraphLens) {
    let types: Vec<_> = view.sorted_program_types();
    for ty in types {
        if let Some(class) = view.program_class_mut(ty) {
            rewrite_class(class, lens);
        }
    }
    view.reindex();
}
