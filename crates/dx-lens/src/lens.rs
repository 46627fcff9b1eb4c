//! Graph lens records
//!
//! A [`GraphLens`] is an immutable record of the symbol rewritings one
//! optimization pass produced: partial maps over types, fields, and
//! methods, plus per-method prototype changes and invoke-kind
//! translations. The lens is the only mechanism by which a pass
//! communicates renames to the rest of the pipeline.
//!
//! Queries are total and infallible: an unknown reference maps to
//! itself. Building rejects rename maps that are not injective.

use crate::prototype::PrototypeChanges;
use dx_ir::{FieldReference, InvokeKind, MethodReference, SymbolPool, Type};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Lens construction and composition errors
#[derive(Debug, thiserror::Error)]
pub enum LensError {
    /// Two distinct types rename to the same target
    #[error("type rename map is not injective at {0}")]
    NonInjectiveTypeRenames(String),

    /// Two distinct fields rename to the same target
    #[error("field rename map is not injective at {0}")]
    NonInjectiveFieldRenames(String),

    /// Two distinct methods rename to the same target
    #[error("method rename map is not injective at {0}")]
    NonInjectiveMethodRenames(String),

    /// Two lenses on one stack carry prototype changes for one method
    #[error("conflicting prototype changes for {0}")]
    ConflictingPrototypeChanges(String),
}

/// Result of a method lookup through a lens or stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLookup {
    /// The rewritten reference
    pub reference: MethodReference,
    /// Composed prototype change; empty when no lens edits the
    /// signature
    pub prototype_changes: PrototypeChanges,
}

impl MethodLookup {
    /// Identity lookup
    #[inline]
    #[must_use]
    pub fn identity(reference: MethodReference) -> Self {
        Self {
            reference,
            prototype_changes: PrototypeChanges::none(),
        }
    }
}

/// Immutable symbol-rewriting record emitted by one pass
#[derive(Debug, Clone, Default)]
pub struct GraphLens {
    type_map: IndexMap<Type, Type>,
    field_map: IndexMap<FieldReference, FieldReference>,
    method_map: IndexMap<MethodReference, MethodReference>,
    prototype_changes: IndexMap<MethodReference, PrototypeChanges>,
    invoke_kind_overrides: IndexMap<MethodReference, InvokeKind>,
}

impl GraphLens {
    /// Builder for a fresh lens
    #[inline]
    #[must_use]
    pub fn builder() -> GraphLensBuilder {
        GraphLensBuilder::default()
    }

    /// The identity lens
    #[inline]
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Whether the lens rewrites nothing
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.type_map.is_empty()
            && self.field_map.is_empty()
            && self.method_map.is_empty()
            && self.prototype_changes.is_empty()
    }

    /// Map a type; unknown types map to themselves
    #[must_use]
    pub fn map_type(&self, ty: Type) -> Type {
        self.type_map.get(&ty).copied().unwrap_or(ty)
    }

    /// Map a field reference
    ///
    /// An explicit rename entry wins; otherwise the holder and field
    /// type are rewritten through the type map.
    #[must_use]
    pub fn map_field(&self, field: FieldReference) -> FieldReference {
        if let Some(mapped) = self.field_map.get(&field) {
            return *mapped;
        }
        FieldReference {
            holder: self.map_type(field.holder),
            name: field.name,
            ty: self.map_type(field.ty),
        }
    }

    /// Map a method reference, returning the rewritten reference and the
    /// prototype change this lens carries for it
    #[must_use]
    pub fn map_method(&self, method: &MethodReference) -> MethodLookup {
        let prototype_changes = self
            .prototype_changes
            .get(method)
            .cloned()
            .unwrap_or_default();
        if let Some(mapped) = self.method_map.get(method) {
            return MethodLookup {
                reference: mapped.clone(),
                prototype_changes,
            };
        }
        let signature = dx_ir::MethodSignature {
            name: method.signature.name,
            parameters: method
                .signature
                .parameters
                .iter()
                .map(|p| self.map_type(*p))
                .collect(),
            return_type: self.map_type(method.signature.return_type),
        };
        MethodLookup {
            reference: MethodReference {
                holder: self.map_type(method.holder),
                signature,
            },
            prototype_changes,
        }
    }

    /// Translate an invocation's dispatch kind
    ///
    /// Keyed on the pre-lens reference; rewritings that statify a
    /// method override the kind here.
    #[must_use]
    pub fn translate_invoke_kind(&self, method: &MethodReference, kind: InvokeKind) -> InvokeKind {
        self.invoke_kind_overrides
            .get(method)
            .copied()
            .unwrap_or(kind)
    }

    /// Prototype change for a pre-lens method reference, if any
    #[must_use]
    pub fn prototype_changes_for(&self, method: &MethodReference) -> Option<&PrototypeChanges> {
        self.prototype_changes.get(method)
    }

    /// Pre-lens methods whose prototype this lens edits
    pub fn prototype_changed_methods(&self) -> impl Iterator<Item = &MethodReference> {
        self.prototype_changes
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(method, _)| method)
    }

    /// Type rename entries
    pub fn renamed_types(&self) -> impl Iterator<Item = (Type, Type)> + '_ {
        self.type_map.iter().map(|(from, to)| (*from, *to))
    }

    /// Field rename entries
    pub fn renamed_fields(&self) -> impl Iterator<Item = (FieldReference, FieldReference)> + '_ {
        self.field_map.iter().map(|(from, to)| (*from, *to))
    }

    /// Method rename entries
    pub fn renamed_methods(
        &self,
    ) -> impl Iterator<Item = (&MethodReference, &MethodReference)> + '_ {
        self.method_map.iter()
    }
}

/// Accumulates rewritings for one pass, validating at build time
///
/// Two entry flavors exist: *renames*, whose maps must be injective
/// (checked at build time), and *merges*, which may fan several sources
/// into one target. Merging passes distinguish merged references by the
/// prototype change (class-id constants) or by genuine unification of
/// identical bodies; renaming passes never fan in.
#[derive(Debug, Default)]
pub struct GraphLensBuilder {
    type_map: IndexMap<Type, Type>,
    field_map: IndexMap<FieldReference, FieldReference>,
    method_map: IndexMap<MethodReference, MethodReference>,
    prototype_changes: IndexMap<MethodReference, PrototypeChanges>,
    invoke_kind_overrides: IndexMap<MethodReference, InvokeKind>,
    merge_type_targets: HashSet<Type>,
    merge_field_targets: HashSet<FieldReference>,
    merge_method_targets: HashSet<MethodReference>,
}

impl GraphLensBuilder {
    /// Record a type rewrite
    pub fn rename_type(&mut self, from: Type, to: Type) -> &mut Self {
        if from != to {
            self.type_map.insert(from, to);
        }
        self
    }

    /// Record a type fusion; the target is exempt from the injectivity
    /// check
    pub fn merge_type(&mut self, from: Type, to: Type) -> &mut Self {
        if from != to {
            self.type_map.insert(from, to);
            self.merge_type_targets.insert(to);
        }
        self
    }

    /// Record a field rewrite
    pub fn rename_field(&mut self, from: FieldReference, to: FieldReference) -> &mut Self {
        if from != to {
            self.field_map.insert(from, to);
        }
        self
    }

    /// Record a field relocation onto a merge target
    pub fn merge_field(&mut self, from: FieldReference, to: FieldReference) -> &mut Self {
        if from != to {
            self.field_map.insert(from, to);
            self.merge_field_targets.insert(to);
        }
        self
    }

    /// Record a method rewrite
    pub fn rename_method(&mut self, from: MethodReference, to: MethodReference) -> &mut Self {
        if from != to {
            self.method_map.insert(from, to);
        }
        self
    }

    /// Record a method fusion; several sources may share the target
    /// when prototype changes (class-id constants) distinguish them or
    /// the bodies were unified
    pub fn merge_method(&mut self, from: MethodReference, to: MethodReference) -> &mut Self {
        if from != to {
            self.method_map.insert(from, to.clone());
            self.merge_method_targets.insert(to);
        }
        self
    }

    /// Record a prototype change for a pre-lens method
    pub fn set_prototype_changes(
        &mut self,
        method: MethodReference,
        changes: PrototypeChanges,
    ) -> &mut Self {
        if !changes.is_empty() {
            self.prototype_changes.insert(method, changes);
        }
        self
    }

    /// Record an invoke-kind translation for a pre-lens method
    pub fn set_invoke_kind(&mut self, method: MethodReference, kind: InvokeKind) -> &mut Self {
        self.invoke_kind_overrides.insert(method, kind);
        self
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty()
            && self.field_map.is_empty()
            && self.method_map.is_empty()
            && self.prototype_changes.is_empty()
            && self.invoke_kind_overrides.is_empty()
    }

    /// Validate and freeze the lens
    ///
    /// # Errors
    /// Rejects rename maps that are not injective; merge targets are
    /// exempt.
    pub fn build(self, pool: &SymbolPool) -> Result<GraphLens, LensError> {
        let mut seen_types = HashSet::new();
        for target in self.type_map.values() {
            if !seen_types.insert(*target) && !self.merge_type_targets.contains(target) {
                return Err(LensError::NonInjectiveTypeRenames(
                    pool.type_descriptor(*target).to_string(),
                ));
            }
        }
        let mut seen_fields = HashSet::new();
        for target in self.field_map.values() {
            if !seen_fields.insert(*target) && !self.merge_field_targets.contains(target) {
                return Err(LensError::NonInjectiveFieldRenames(target.describe(pool)));
            }
        }
        let mut seen_methods = HashSet::new();
        for target in self.method_map.values() {
            if !seen_methods.insert(target.clone()) && !self.merge_method_targets.contains(target)
            {
                return Err(LensError::NonInjectiveMethodRenames(target.describe(pool)));
            }
        }
        Ok(GraphLens {
            type_map: self.type_map,
            field_map: self.field_map,
            method_map: self.method_map,
            prototype_changes: self.prototype_changes,
            invoke_kind_overrides: self.invoke_kind_overrides,
        })
    }
}

/// Pick a free name by appending `$k` for the smallest `k >= 1`
///
/// Returns `base` itself when it is already free.
#[must_use]
pub fn disambiguate(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut k = 1usize;
    loop {
        let candidate = format!("{base}${k}");
        if !is_taken(&candidate) {
            return candidate;
        }
        k += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_ir::MethodSignature;

    fn method(pool: &SymbolPool, holder: &str, name: &str) -> MethodReference {
        MethodReference::new(
            pool.intern_type(holder),
            MethodSignature::new(pool.intern_name(name), [], pool.void_type()),
        )
    }

    #[test]
    fn unknown_references_map_to_themselves() {
        let pool = SymbolPool::new();
        let lens = GraphLens::identity();
        let ty = pool.intern_type("LFoo;");
        let field = FieldReference::new(ty, pool.intern_name("x"), pool.int_type());
        let m = method(&pool, "LFoo;", "m");

        assert_eq!(lens.map_type(ty), ty);
        assert_eq!(lens.map_field(field), field);
        assert_eq!(lens.map_method(&m), MethodLookup::identity(m));
    }

    #[test]
    fn type_rewrite_cascades_into_references() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let mut builder = GraphLens::builder();
        builder.rename_type(a, b);
        let lens = builder.build(&pool).unwrap();

        let field = FieldReference::new(a, pool.intern_name("x"), a);
        let mapped = lens.map_field(field);
        assert_eq!(mapped.holder, b);
        assert_eq!(mapped.ty, b);

        let m = MethodReference::new(
            a,
            MethodSignature::new(pool.intern_name("m"), [a], a),
        );
        let lookup = lens.map_method(&m);
        assert_eq!(lookup.reference.holder, b);
        assert_eq!(lookup.reference.signature.parameters.as_slice(), &[b]);
        assert_eq!(lookup.reference.signature.return_type, b);
    }

    #[test]
    fn explicit_method_entry_wins_over_type_rewriting() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let from = method(&pool, "LA;", "foo");
        let to = method(&pool, "LB;", "bar");

        let mut builder = GraphLens::builder();
        builder.rename_type(a, b);
        builder.rename_method(from.clone(), to.clone());
        let lens = builder.build(&pool).unwrap();

        assert_eq!(lens.map_method(&from).reference, to);
    }

    #[test]
    fn non_injective_type_map_rejected() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let c = pool.intern_type("LC;");

        let mut builder = GraphLens::builder();
        builder.rename_type(a, c);
        builder.rename_type(b, c);

        assert!(matches!(
            builder.build(&pool),
            Err(LensError::NonInjectiveTypeRenames(_))
        ));
    }

    #[test]
    fn non_injective_method_map_rejected() {
        let pool = SymbolPool::new();
        let target = method(&pool, "LX;", "t");

        let mut builder = GraphLens::builder();
        builder.rename_method(method(&pool, "LA;", "a"), target.clone());
        builder.rename_method(method(&pool, "LB;", "b"), target);

        assert!(matches!(
            builder.build(&pool),
            Err(LensError::NonInjectiveMethodRenames(_))
        ));
    }

    #[test]
    fn merge_entries_may_fan_in() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let target = pool.intern_type("LT;");

        let mut builder = GraphLens::builder();
        builder.merge_type(a, target);
        builder.merge_type(b, target);
        let lens = builder.build(&pool).unwrap();

        assert_eq!(lens.map_type(a), target);
        assert_eq!(lens.map_type(b), target);
    }

    #[test]
    fn invoke_kind_override() {
        let pool = SymbolPool::new();
        let m = method(&pool, "LA;", "statified");
        let mut builder = GraphLens::builder();
        builder.set_invoke_kind(m.clone(), InvokeKind::Static);
        let lens = builder.build(&pool).unwrap();

        assert_eq!(
            lens.translate_invoke_kind(&m, InvokeKind::Virtual),
            InvokeKind::Static
        );
        let other = method(&pool, "LA;", "other");
        assert_eq!(
            lens.translate_invoke_kind(&other, InvokeKind::Virtual),
            InvokeKind::Virtual
        );
    }

    #[test]
    fn disambiguate_appends_smallest_free_suffix() {
        let taken = ["x", "x$1", "x$2"];
        assert_eq!(disambiguate("x", |c| taken.contains(&c)), "x$3");
        assert_eq!(disambiguate("y", |c| taken.contains(&c)), "y");
    }
}
