//! Horizontal class merging pass
//!
//! Thin adapter over the policy-driven merger; per-group work regions
//! are whole merge groups, so the merger owns its own application
//! strategy.

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::ApplicationView;
use dx_lens::GraphLens;
use dx_merge::HorizontalClassMerger;

/// Pass 3: policy-driven horizontal merging
#[derive(Debug, Default)]
pub struct HorizontalClassMergingPass;

impl OptimizationPass for HorizontalClassMergingPass {
    fn name(&self) -> &'static str {
        "horizontal-class-merging"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        if !cx.options.enable_horizontal_class_merging {
            return Ok(None);
        }
        let merger = HorizontalClassMerger::new();
        let lens = merger.run(view, cx.oracle, cx.options, &cx.state.vertically_merged)?;
        Ok(lens)
    }
}
