//! Compiler option bag

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whole-run options consumed by the driver and individual passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Shorten names in the final program
    pub minification: bool,
    /// Worker threads for the driver's pool; 0 selects the number of
    /// available cores
    pub worker_threads: usize,
    /// Combined instruction ceiling for force-inlining during class
    /// inlining
    pub class_inlining_budget: u32,
    /// Enable folding subclasses into superclasses
    pub enable_vertical_class_merging: bool,
    /// Enable policy-driven horizontal class merging
    pub enable_horizontal_class_merging: bool,
    /// Enable rewriting eligible enums to integer constants
    pub enable_enum_unboxing: bool,
    /// Enable canonicalizing method parameter orderings
    pub enable_proto_normalization: bool,
    /// Enable the class inliner
    pub enable_class_inlining: bool,
    /// Upper bound on the size of one horizontal merge group
    pub max_merge_group_size: usize,
    /// Report unresolved references as warnings instead of errors
    pub ignore_missing_classes: bool,
    /// Descriptors of classes required in the primary dex partition
    pub main_dex_classes: Vec<String>,
    /// Minimum runtime API level targeted by the output
    pub target_api_level: u32,
    /// Scratch directory supplied by the embedder
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            minification: true,
            worker_threads: 0,
            class_inlining_budget: 50,
            enable_vertical_class_merging: true,
            enable_horizontal_class_merging: true,
            enable_enum_unboxing: true,
            enable_proto_normalization: true,
            enable_class_inlining: true,
            max_merge_group_size: 30,
            ignore_missing_classes: false,
            main_dex_classes: Vec::new(),
            target_api_level: 21,
            scratch_dir: None,
        }
    }
}

impl CompilerOptions {
    /// Options with every optimization and minification disabled; the
    /// output is structurally identical to the input
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            minification: false,
            enable_vertical_class_merging: false,
            enable_horizontal_class_merging: false,
            enable_enum_unboxing: false,
            enable_proto_normalization: false,
            enable_class_inlining: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_enable_the_pipeline() {
        let options = CompilerOptions::default();
        assert!(options.minification);
        assert!(options.enable_horizontal_class_merging);
        assert!(options.enable_class_inlining);
        assert_eq!(options.class_inlining_budget, 50);
    }

    #[test]
    fn passthrough_disables_everything() {
        let options = CompilerOptions::passthrough();
        assert!(!options.minification);
        assert!(!options.enable_vertical_class_merging);
        assert!(!options.enable_horizontal_class_merging);
        assert!(!options.enable_enum_unboxing);
        assert!(!options.enable_proto_normalization);
        assert!(!options.enable_class_inlining);
    }
}
