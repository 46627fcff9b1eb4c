//! Concrete merge policies
//!
//! The fixed-order battery the default pipeline runs. Order matters:
//! `NoDirectRuntimeTypeChecks` assumes `NotPinned` has already removed
//! classes whose type identity is kept alive by rules.

use crate::policy::{MergeContext, MultiClassPolicy, SingleClassPolicy};
use dx_ir::{ClassDefinition, Type};

/// Rejects pinned classes and classes excluded from merging by rule
#[derive(Debug, Default)]
pub struct NotPinned;

impl SingleClassPolicy for NotPinned {
    fn name(&self) -> &'static str {
        "not-pinned"
    }

    fn admits(&self, class: &ClassDefinition, cx: &MergeContext<'_>) -> bool {
        cx.oracle
            .class_constraints(cx.view.pool(), class.ty)
            .allows_merging()
    }
}

/// Rejects interfaces and abstract classes
#[derive(Debug, Default)]
pub struct NotInterfaceOrAbstract;

impl SingleClassPolicy for NotInterfaceOrAbstract {
    fn name(&self) -> &'static str {
        "not-interface-or-abstract"
    }

    fn admits(&self, class: &ClassDefinition, _cx: &MergeContext<'_>) -> bool {
        !class.flags.is_interface() && !class.flags.is_abstract()
    }
}

/// Rejects classes with inner-class attribute entries
#[derive(Debug, Default)]
pub struct NoInnerClasses;

impl SingleClassPolicy for NoInnerClasses {
    fn name(&self) -> &'static str {
        "no-inner-classes"
    }

    fn admits(&self, class: &ClassDefinition, _cx: &MergeContext<'_>) -> bool {
        class.inner_classes.is_empty()
    }
}

/// Rejects classes already fused into a subtype by vertical merging
#[derive(Debug, Default)]
pub struct NotVerticallyMergedIntoSubtype;

impl SingleClassPolicy for NotVerticallyMergedIntoSubtype {
    fn name(&self) -> &'static str {
        "not-vertically-merged"
    }

    fn admits(&self, class: &ClassDefinition, cx: &MergeContext<'_>) -> bool {
        !cx.vertically_merged.contains(&class.ty)
    }
}

/// Rejects classes targeted by a live runtime type check or class
/// literal; fusing those would change `instanceof`/`checkcast`
/// observations
#[derive(Debug, Default)]
pub struct NoDirectRuntimeTypeChecks;

impl SingleClassPolicy for NoDirectRuntimeTypeChecks {
    fn name(&self) -> &'static str {
        "no-runtime-type-checks"
    }

    fn admits(&self, class: &ClassDefinition, cx: &MergeContext<'_>) -> bool {
        !cx.runtime_type_checks.contains(&class.ty)
    }
}

/// Rejects classes whose class initializer has observable effects
/// beyond their own type; fusing them would reorder initialization
#[derive(Debug, Default)]
pub struct NoClassInitializerWithObservableSideEffects;

impl SingleClassPolicy for NoClassInitializerWithObservableSideEffects {
    fn name(&self) -> &'static str {
        "no-observable-class-initializer"
    }

    fn admits(&self, class: &ClassDefinition, cx: &MergeContext<'_>) -> bool {
        match class.class_initializer(cx.view.pool()) {
            None => true,
            Some(clinit) => clinit.optimization_info().trivial_initializer().is_some(),
        }
    }
}

/// Splits buckets by required dex partition: a class required in the
/// primary partition only merges with classes required there too
#[derive(Debug, Default)]
pub struct SameMainDexPartition;

impl MultiClassPolicy for SameMainDexPartition {
    fn name(&self) -> &'static str {
        "same-main-dex-partition"
    }

    fn split(&self, group: Vec<Type>, cx: &MergeContext<'_>) -> Vec<Vec<Type>> {
        let (main, rest): (Vec<Type>, Vec<Type>) = group
            .into_iter()
            .partition(|ty| cx.main_dex_types.contains(ty));
        [main, rest].into_iter().filter(|g| !g.is_empty()).collect()
    }
}

/// Caps group size from options, splitting deterministically
#[derive(Debug, Default)]
pub struct LimitGroupSize;

impl MultiClassPolicy for LimitGroupSize {
    fn name(&self) -> &'static str {
        "limit-group-size"
    }

    fn split(&self, group: Vec<Type>, cx: &MergeContext<'_>) -> Vec<Vec<Type>> {
        let limit = cx.options.max_merge_group_size.max(2);
        group.chunks(limit).map(<[Type]>::to_vec).collect()
    }
}
