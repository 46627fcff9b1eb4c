//! The fixed pass battery
//!
//! Ordering is part of the driver contract: tree shaking, vertical
//! merging, horizontal merging, enum unboxing, proto normalization,
//! per-method IR optimization, minification, then the writer handoff.

mod enum_unboxing;
mod horizontal_merging;
mod ir_optimization;
mod minification;
mod proto_normalization;
pub(crate) mod tree_shaking;
mod vertical_merging;

pub use enum_unboxing::EnumUnboxingPass;
pub use horizontal_merging::HorizontalClassMergingPass;
pub use ir_optimization::IrOptimizationPass;
pub use minification::MinificationPass;
pub use proto_normalization::ProtoNormalizationPass;
pub use tree_shaking::TreeShakingPass;
pub use vertical_merging::VerticalClassMergingPass;
