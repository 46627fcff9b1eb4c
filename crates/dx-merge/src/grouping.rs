//! Candidate grouping
//!
//! Classes surviving the single-class policies are bucketed by
//! (superclass, interface set, access-modifier equivalence, instance
//! field layout) into initial equivalence classes; multi-class policies
//! then split buckets further. The target of each group is the member
//! with the lexicographically smallest descriptor.

use crate::policy::{MergeContext, MultiClassPolicy, SingleClassPolicy};
use crate::policies::{
    LimitGroupSize, NoClassInitializerWithObservableSideEffects, NoDirectRuntimeTypeChecks,
    NoInnerClasses, NotInterfaceOrAbstract, NotPinned, NotVerticallyMergedIntoSubtype,
    SameMainDexPartition,
};
use dx_ir::{ClassDefinition, Type};
use indexmap::IndexMap;
use tracing::debug;

/// A non-empty set of classes selected for fusion plus the designated
/// target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    /// The class every member fuses into
    pub target: Type,
    /// Remaining members, sorted by descriptor; class-ids continue from
    /// the target's 0 in this order
    pub sources: Vec<Type>,
}

impl MergeGroup {
    /// All members, target first
    pub fn members(&self) -> impl Iterator<Item = Type> + '_ {
        std::iter::once(self.target).chain(self.sources.iter().copied())
    }

    /// Member count including the target
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.sources.len()
    }

    /// Never true; a group always has a target
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Bucket key for the initial equivalence classes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    superclass: Option<Type>,
    interfaces: Vec<Type>,
    visibility: u8,
    is_final: bool,
    /// Instance-field layout: declared field types in order
    field_layout: Vec<Type>,
}

impl BucketKey {
    fn of(class: &ClassDefinition) -> Self {
        let mut interfaces = class.interfaces.clone();
        interfaces.sort_unstable();
        Self {
            superclass: class.superclass,
            interfaces,
            visibility: class.flags.visibility_rank(),
            is_final: class.flags.is_final(),
            field_layout: class
                .instance_fields()
                .map(|field| field.reference.ty)
                .collect(),
        }
    }
}

/// The ordered policy battery
pub struct PolicyPipeline {
    singles: Vec<Box<dyn SingleClassPolicy>>,
    multis: Vec<Box<dyn MultiClassPolicy>>,
}

impl std::fmt::Debug for PolicyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyPipeline")
            .field(
                "singles",
                &self.singles.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "multis",
                &self.multis.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PolicyPipeline {
    /// The default fixed-order battery
    #[must_use]
    pub fn standard() -> Self {
        Self {
            singles: vec![
                Box::new(NotPinned),
                Box::new(NotInterfaceOrAbstract),
                Box::new(NoInnerClasses),
                Box::new(NotVerticallyMergedIntoSubtype),
                Box::new(NoDirectRuntimeTypeChecks),
                Box::new(NoClassInitializerWithObservableSideEffects),
            ],
            multis: vec![Box::new(SameMainDexPartition), Box::new(LimitGroupSize)],
        }
    }

    /// Custom battery, for tests and embedders
    #[must_use]
    pub fn new(
        singles: Vec<Box<dyn SingleClassPolicy>>,
        multis: Vec<Box<dyn MultiClassPolicy>>,
    ) -> Self {
        Self { singles, multis }
    }

    /// Partition the program's classes into merge groups
    ///
    /// Deterministic: candidates are visited in descriptor order and
    /// every group's members stay descriptor-sorted. Groups of size one
    /// are dropped (no merge, no lens entries).
    #[must_use]
    pub fn group(&self, cx: &MergeContext<'_>) -> Vec<MergeGroup> {
        let pool = cx.view.pool();
        let mut buckets: IndexMap<BucketKey, Vec<Type>> = IndexMap::new();

        'candidates: for ty in cx.view.sorted_program_types() {
            let Some(class) = cx.view.program_class(ty) else {
                continue;
            };
            for policy in &self.singles {
                if !policy.admits(class, cx) {
                    debug!(
                        class = %pool.type_descriptor(ty),
                        policy = policy.name(),
                        "merge candidate rejected"
                    );
                    continue 'candidates;
                }
            }
            buckets.entry(BucketKey::of(class)).or_default().push(ty);
        }

        let mut groups: Vec<Vec<Type>> = buckets.into_values().collect();
        for policy in &self.multis {
            let mut split: Vec<Vec<Type>> = Vec::new();
            for group in groups {
                if group.len() < 2 {
                    continue;
                }
                for part in policy.split(group, cx) {
                    split.push(part);
                }
            }
            groups = split;
        }

        let mut merged: Vec<MergeGroup> = groups
            .into_iter()
            .filter(|group| group.len() >= 2)
            .map(|mut group| {
                group.sort_by(|a, b| pool.compare_types(*a, *b));
                let target = group.remove(0);
                MergeGroup {
                    target,
                    sources: group,
                }
            })
            .collect();
        merged.sort_by(|a, b| pool.compare_types(a.target, b.target));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::collect_runtime_type_checks;
    use dx_ir::{AccessFlags, ApplicationView, FieldDefinition, FieldReference, SymbolPool};
    use dx_keep::{CompilerOptions, KeepKind, KeepOracle, KeepRule, RuleSet};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn value_holder(view: &ApplicationView, descriptor: &str, field: &str) -> ClassDefinition {
        let pool = view.pool();
        let ty = pool.intern_type(descriptor);
        let mut class = ClassDefinition::new(
            ty,
            Some(pool.object_type()),
            AccessFlags::empty().with(AccessFlags::FINAL),
        );
        class.fields.push(FieldDefinition::new(
            FieldReference::new(ty, pool.intern_name(field), pool.int_type()),
            AccessFlags::empty(),
        ));
        class
    }

    fn group_with_rules(rules: Vec<KeepRule>) -> Vec<MergeGroup> {
        let pool = Arc::new(SymbolPool::new());
        let mut view = ApplicationView::new(Arc::clone(&pool));
        let a = value_holder(&view, "LA;", "x");
        let b = value_holder(&view, "LB;", "y");
        view.add_program_class(a).unwrap();
        view.add_program_class(b).unwrap();

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::new(rules).unwrap(), &options);
        let checks = collect_runtime_type_checks(&view);
        let merged = HashSet::new();
        let main_dex = HashSet::new();
        let cx = MergeContext {
            view: &view,
            oracle: &oracle,
            options: &options,
            runtime_type_checks: &checks,
            vertically_merged: &merged,
            main_dex_types: &main_dex,
        };
        PolicyPipeline::standard().group(&cx)
    }

    #[test]
    fn compatible_value_holders_group_together() {
        let groups = group_with_rules(vec![]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        // lexicographically smallest descriptor is the target
        assert_eq!(groups[0].sources.len(), 1);
    }

    #[test]
    fn pinned_member_leaves_no_group() {
        // with A pinned only B survives, and a group of one is dropped
        let groups = group_with_rules(vec![KeepRule::class_rule(KeepKind::Pin, "LA;")]);
        assert!(groups.is_empty());
    }

    #[test]
    fn different_field_layouts_do_not_group() {
        let pool = Arc::new(SymbolPool::new());
        let mut view = ApplicationView::new(Arc::clone(&pool));
        let a = value_holder(&view, "LA;", "x");
        let mut b = value_holder(&view, "LB;", "y");
        let object = pool.object_type();
        let b_ty = b.ty;
        b.fields.push(FieldDefinition::new(
            FieldReference::new(b_ty, pool.intern_name("z"), object),
            AccessFlags::empty(),
        ));
        view.add_program_class(a).unwrap();
        view.add_program_class(b).unwrap();

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::empty(), &options);
        let checks = HashSet::new();
        let merged = HashSet::new();
        let main_dex = HashSet::new();
        let cx = MergeContext {
            view: &view,
            oracle: &oracle,
            options: &options,
            runtime_type_checks: &checks,
            vertically_merged: &merged,
            main_dex_types: &main_dex,
        };

        assert!(PolicyPipeline::standard().group(&cx).is_empty());
    }
}
