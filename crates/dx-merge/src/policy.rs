//! Merge policy capability traits
//!
//! Candidate classes pass through an ordered battery of policies: pure
//! predicates over one class ([`SingleClassPolicy`]) and pure splitters
//! over unordered sets ([`MultiClassPolicy`]). Policy order is part of
//! the pipeline contract; later policies may rely on earlier ones
//! having filtered ineligible cases. Policies hold no mutable state and
//! are shared across workers without locks.

use dx_ir::{ApplicationView, ClassDefinition, InstructionKind, Type};
use dx_keep::{CompilerOptions, KeepOracle};
use std::collections::HashSet;

/// Read-only context shared by every policy evaluation
#[derive(Debug)]
pub struct MergeContext<'a> {
    /// The current application view
    pub view: &'a ApplicationView,
    /// The keep/pinning oracle
    pub oracle: &'a KeepOracle,
    /// Whole-run options
    pub options: &'a CompilerOptions,
    /// Types targeted by a live `instanceof`, `checkcast`, or class
    /// literal anywhere in program code
    pub runtime_type_checks: &'a HashSet<Type>,
    /// Types already fused into a subtype by vertical merging
    pub vertically_merged: &'a HashSet<Type>,
    /// Types required in the primary dex partition
    pub main_dex_types: &'a HashSet<Type>,
}

/// Pure predicate over one candidate class
pub trait SingleClassPolicy: Send + Sync {
    /// Policy name, for rejection diagnostics
    fn name(&self) -> &'static str;

    /// Whether the class may participate in merging at all
    fn admits(&self, class: &ClassDefinition, cx: &MergeContext<'_>) -> bool;
}

/// Pure splitter over an unordered candidate set
pub trait MultiClassPolicy: Send + Sync {
    /// Policy name, for rejection diagnostics
    fn name(&self) -> &'static str;

    /// Partition a bucket into finer buckets; singleton outputs are
    /// dropped by the pipeline
    fn split(&self, group: Vec<Type>, cx: &MergeContext<'_>) -> Vec<Vec<Type>>;
}

/// Collect every type targeted by a runtime type check or class literal
/// in program code
#[must_use]
pub fn collect_runtime_type_checks(view: &ApplicationView) -> HashSet<Type> {
    let mut checked = HashSet::new();
    for class in view.program_classes() {
        for method in &class.methods {
            let Some(code) = &method.code else { continue };
            for block in code.blocks() {
                for instruction in &block.instructions {
                    match &instruction.kind {
                        InstructionKind::InstanceOf { ty, .. }
                        | InstructionKind::CheckCast { ty, .. }
                        | InstructionKind::ConstClass { ty } => {
                            checked.insert(*ty);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    checked
}
