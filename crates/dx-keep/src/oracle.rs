//! Keep/pinning oracle
//!
//! Answers, for any symbol, whether it is pinned (must retain identity,
//! prototype, and presence) and which weaker constraints apply. A pure
//! function of (symbol, option set, rule set); results are cached per
//! symbol under identity equality.

use crate::options::CompilerOptions;
use crate::rule::{KeepKind, RuleSet};
use dashmap::DashMap;
use dx_ir::{FieldReference, MethodReference, SymbolPool, Type};

/// Constraints the oracle reports for one symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepConstraints {
    /// Retain identity, presence, and prototype
    pub pinned: bool,
    /// Retain the current name
    pub no_rename: bool,
    /// Exclude from class merging
    pub no_merge: bool,
    /// Exclude from inlining
    pub no_inline: bool,
}

impl KeepConstraints {
    /// Unconstrained symbol
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether renaming is allowed
    #[inline]
    #[must_use]
    pub fn allows_renaming(self) -> bool {
        !self.pinned && !self.no_rename
    }

    /// Whether merging is allowed
    #[inline]
    #[must_use]
    pub fn allows_merging(self) -> bool {
        !self.pinned && !self.no_merge
    }

    /// Whether inlining is allowed
    #[inline]
    #[must_use]
    pub fn allows_inlining(self) -> bool {
        !self.pinned && !self.no_inline
    }
}

/// Cached, shareable keep oracle
///
/// Shared read-only across worker threads; the caches use per-bucket
/// locking and compute-if-absent population.
#[derive(Debug)]
pub struct KeepOracle {
    rules: RuleSet,
    minification: bool,
    type_cache: DashMap<Type, KeepConstraints>,
    method_cache: DashMap<MethodReference, KeepConstraints>,
    field_cache: DashMap<FieldReference, KeepConstraints>,
}

impl KeepOracle {
    /// Create an oracle over a validated rule set
    #[must_use]
    pub fn new(rules: RuleSet, options: &CompilerOptions) -> Self {
        Self {
            rules,
            minification: options.minification,
            type_cache: DashMap::new(),
            method_cache: DashMap::new(),
            field_cache: DashMap::new(),
        }
    }

    /// Constraints for a class
    pub fn class_constraints(&self, pool: &SymbolPool, ty: Type) -> KeepConstraints {
        if let Some(cached) = self.type_cache.get(&ty) {
            return *cached;
        }
        let descriptor = pool.type_descriptor(ty);
        let pinned = self.rules.any_class_rule(KeepKind::Pin, &descriptor);
        let constraints = KeepConstraints {
            pinned,
            no_rename: pinned
                || !self.minification
                || self.rules.any_class_rule(KeepKind::NoRename, &descriptor),
            no_merge: pinned || self.rules.any_class_rule(KeepKind::NoMerge, &descriptor),
            no_inline: pinned || self.rules.any_class_rule(KeepKind::NoInline, &descriptor),
        };
        if constraints.pinned {
            tracing::debug!(class = %descriptor, "class pinned by keep rules");
        }
        self.type_cache.insert(ty, constraints);
        constraints
    }

    /// Constraints for a method
    ///
    /// A method inherits its holder's pin (a pinned class keeps its
    /// members' prototypes callable) and adds member-level rules.
    pub fn method_constraints(
        &self,
        pool: &SymbolPool,
        reference: &MethodReference,
    ) -> KeepConstraints {
        if let Some(cached) = self.method_cache.get(reference) {
            return *cached;
        }
        let descriptor = pool.type_descriptor(reference.holder);
        let name = pool.name_text(reference.signature.name);
        let holder = self.class_constraints(pool, reference.holder);
        let pinned = holder.pinned
            || self
                .rules
                .any_member_rule(KeepKind::Pin, &descriptor, &name);
        let constraints = KeepConstraints {
            pinned,
            no_rename: pinned
                || !self.minification
                || self
                    .rules
                    .any_member_rule(KeepKind::NoRename, &descriptor, &name),
            no_merge: pinned || holder.no_merge,
            no_inline: pinned
                || holder.no_inline
                || self
                    .rules
                    .any_member_rule(KeepKind::NoInline, &descriptor, &name),
        };
        self.method_cache.insert(reference.clone(), constraints);
        constraints
    }

    /// Constraints for a field
    pub fn field_constraints(
        &self,
        pool: &SymbolPool,
        reference: FieldReference,
    ) -> KeepConstraints {
        if let Some(cached) = self.field_cache.get(&reference) {
            return *cached;
        }
        let descriptor = pool.type_descriptor(reference.holder);
        let name = pool.name_text(reference.name);
        let holder = self.class_constraints(pool, reference.holder);
        let pinned = holder.pinned
            || self
                .rules
                .any_member_rule(KeepKind::Pin, &descriptor, &name);
        let constraints = KeepConstraints {
            pinned,
            no_rename: pinned
                || !self.minification
                || self
                    .rules
                    .any_member_rule(KeepKind::NoRename, &descriptor, &name),
            no_merge: pinned || holder.no_merge,
            no_inline: pinned || holder.no_inline,
        };
        self.field_cache.insert(reference, constraints);
        constraints
    }

    /// Whether a class is pinned
    #[inline]
    pub fn is_pinned_class(&self, pool: &SymbolPool, ty: Type) -> bool {
        self.class_constraints(pool, ty).pinned
    }

    /// Whether unresolved-reference diagnostics are suppressed for a
    /// class
    pub fn dont_warn(&self, pool: &SymbolPool, ty: Type) -> bool {
        self.rules
            .any_class_rule(KeepKind::DontWarn, &pool.type_descriptor(ty))
    }

    /// Invalidate every cached answer
    ///
    /// Called by the driver after a lens-producing pass, since cached
    /// answers are keyed on pre-rename references.
    pub fn invalidate_caches(&self) {
        self.type_cache.clear();
        self.method_cache.clear();
        self.field_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{KeepRule, MemberPattern};
    use dx_ir::MethodSignature;

    fn oracle_with(rules: Vec<KeepRule>, options: &CompilerOptions) -> KeepOracle {
        KeepOracle::new(RuleSet::new(rules).unwrap(), options)
    }

    #[test]
    fn pinned_class_blocks_everything() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LFoo;");
        let oracle = oracle_with(
            vec![KeepRule::class_rule(KeepKind::Pin, "LFoo;")],
            &CompilerOptions::default(),
        );

        let constraints = oracle.class_constraints(&pool, ty);
        assert!(constraints.pinned);
        assert!(!constraints.allows_renaming());
        assert!(!constraints.allows_merging());
        assert!(!constraints.allows_inlining());
    }

    #[test]
    fn unmatched_class_is_unconstrained() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LBar;");
        let oracle = oracle_with(
            vec![KeepRule::class_rule(KeepKind::Pin, "LFoo;")],
            &CompilerOptions::default(),
        );

        let constraints = oracle.class_constraints(&pool, ty);
        assert!(!constraints.pinned);
        assert!(constraints.allows_renaming());
        assert!(constraints.allows_merging());
    }

    #[test]
    fn disabled_minification_forbids_renaming_only() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LFoo;");
        let options = CompilerOptions {
            minification: false,
            ..CompilerOptions::default()
        };
        let oracle = oracle_with(vec![], &options);

        let constraints = oracle.class_constraints(&pool, ty);
        assert!(!constraints.allows_renaming());
        assert!(constraints.allows_merging());
        assert!(constraints.allows_inlining());
    }

    #[test]
    fn member_pin_is_method_scoped() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LFoo;");
        let pinned = MethodReference::new(
            ty,
            MethodSignature::new(pool.intern_name("main"), [], pool.void_type()),
        );
        let free = MethodReference::new(
            ty,
            MethodSignature::new(pool.intern_name("helper"), [], pool.void_type()),
        );
        let oracle = oracle_with(
            vec![KeepRule::member_rule(
                KeepKind::Pin,
                "LFoo;",
                MemberPattern::named("main"),
            )],
            &CompilerOptions::default(),
        );

        assert!(oracle.method_constraints(&pool, &pinned).pinned);
        assert!(!oracle.method_constraints(&pool, &free).pinned);
        assert!(!oracle.class_constraints(&pool, ty).pinned);
    }

    #[test]
    fn dont_warn_matches_class_pattern() {
        let pool = SymbolPool::new();
        let missing = pool.intern_type("LMissing;");
        let other = pool.intern_type("LOther;");
        let oracle = oracle_with(
            vec![KeepRule::class_rule(KeepKind::DontWarn, "LMissing;")],
            &CompilerOptions::default(),
        );

        assert!(oracle.dont_warn(&pool, missing));
        assert!(!oracle.dont_warn(&pool, other));
    }
}
