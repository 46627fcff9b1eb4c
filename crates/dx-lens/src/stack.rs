//! Lens stack
//!
//! The ordered chain of lens records pushed by lens-producing passes.
//! The front of the stack holds the earliest rewriting; queries fold
//! successive rewritings onto the result. Each pushed lens must have
//! been built against the then-current view; the stack never rewrites an
//! already-pushed lens.

use crate::lens::{GraphLens, LensError, MethodLookup};
use dx_ir::{FieldReference, InvokeKind, MethodReference, SymbolPool, Type};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered, composing chain of lenses
#[derive(Debug, Clone, Default)]
pub struct LensStack {
    lenses: Vec<Arc<GraphLens>>,
    /// Methods with a prototype change somewhere below, expressed in
    /// the current (post-stack) reference space
    prototype_changed: HashSet<MethodReference>,
}

impl LensStack {
    /// Empty stack
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lenses
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    /// Whether no lens has been pushed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }

    /// Lenses, earliest first
    #[inline]
    #[must_use]
    pub fn lenses(&self) -> &[Arc<GraphLens>] {
        &self.lenses
    }

    /// Push a lens built against the current view
    ///
    /// # Errors
    /// Rejects the push when the new lens carries a prototype change
    /// for a method that an earlier lens already prototype-changed
    /// (prototype changes are not mergeable; passes must rewrite the
    /// earlier lens's targets instead of stacking).
    pub fn push(&mut self, lens: GraphLens, pool: &SymbolPool) -> Result<(), LensError> {
        for method in lens.prototype_changed_methods() {
            if self.prototype_changed.contains(method) {
                return Err(LensError::ConflictingPrototypeChanges(
                    method.describe(pool),
                ));
            }
        }
        // carry the tracking set into the post-push reference space
        let mut carried: HashSet<MethodReference> = self
            .prototype_changed
            .drain()
            .map(|method| lens.map_method(&method).reference)
            .collect();
        for method in lens.prototype_changed_methods() {
            carried.insert(lens.map_method(method).reference);
        }
        self.prototype_changed = carried;
        self.lenses.push(Arc::new(lens));
        tracing::debug!(depth = self.lenses.len(), "lens pushed");
        Ok(())
    }

    /// Fold a type through the whole stack
    #[must_use]
    pub fn map_type(&self, ty: Type) -> Type {
        self.lenses
            .iter()
            .fold(ty, |current, lens| lens.map_type(current))
    }

    /// Fold a field reference through the whole stack
    #[must_use]
    pub fn map_field(&self, field: FieldReference) -> FieldReference {
        self.lenses
            .iter()
            .fold(field, |current, lens| lens.map_field(current))
    }

    /// Fold a method reference through the whole stack
    ///
    /// Returns the rewritten reference plus the composed prototype
    /// change. The composition invariant guarantees at most one lens
    /// contributes a non-empty change.
    #[must_use]
    pub fn map_method(&self, method: &MethodReference) -> MethodLookup {
        let mut lookup = MethodLookup::identity(method.clone());
        for lens in &self.lenses {
            let step = lens.map_method(&lookup.reference);
            if !step.prototype_changes.is_empty() {
                debug_assert!(
                    lookup.prototype_changes.is_empty(),
                    "two lenses carry prototype changes for one method"
                );
                lookup.prototype_changes = step.prototype_changes;
            }
            lookup.reference = step.reference;
        }
        lookup
    }

    /// Fold an invocation's dispatch kind alongside its reference
    #[must_use]
    pub fn map_invoke_kind(&self, method: &MethodReference, kind: InvokeKind) -> InvokeKind {
        let mut current = method.clone();
        let mut kind = kind;
        for lens in &self.lenses {
            kind = lens.translate_invoke_kind(&current, kind);
            current = lens.map_method(&current).reference;
        }
        kind
    }

    /// Flatten the stack into one composed lens mapping original
    /// symbols to their final forms
    ///
    /// Used for the residual rename map handed to the writer. The
    /// flattened lens is injective because every constituent is.
    #[must_use]
    pub fn flatten(&self, pool: &SymbolPool) -> GraphLens {
        let mut builder = GraphLens::builder();
        let mut type_entries: Vec<(Type, Type)> = Vec::new();
        let mut field_entries: Vec<(FieldReference, FieldReference)> = Vec::new();
        let mut method_entries: Vec<(MethodReference, MethodReference)> = Vec::new();

        for (position, lens) in self.lenses.iter().enumerate() {
            // advance existing originals through this lens
            for (_, current) in &mut type_entries {
                *current = lens.map_type(*current);
            }
            for (_, current) in &mut field_entries {
                *current = lens.map_field(*current);
            }
            for (_, current) in &mut method_entries {
                *current = lens.map_method(current).reference;
            }
            // keys this lens introduces that earlier lenses never
            // produced are original symbols themselves
            for (from, to) in lens.renamed_types() {
                let produced_earlier = type_entries.iter().any(|(_, current)| *current == to);
                let known = type_entries.iter().any(|(original, _)| *original == from);
                if !known && !produced_earlier {
                    let original_unreached = self.lenses[..position]
                        .iter()
                        .all(|earlier| earlier.map_type(from) == from);
                    if original_unreached {
                        type_entries.push((from, to));
                    }
                }
            }
            for (from, to) in lens.renamed_fields() {
                let known = field_entries.iter().any(|(original, _)| *original == from);
                if !known {
                    let original_unreached = self.lenses[..position]
                        .iter()
                        .all(|earlier| earlier.map_field(from) == from);
                    if original_unreached {
                        field_entries.push((from, to));
                    }
                }
            }
            for (from, to) in lens.renamed_methods() {
                let known = method_entries
                    .iter()
                    .any(|(original, _)| original == from);
                if !known {
                    let original_unreached = self.lenses[..position].iter().all(|earlier| {
                        earlier.map_method(from).reference == *from
                    });
                    if original_unreached {
                        method_entries.push((from.clone(), to.clone()));
                    }
                }
            }
        }

        // the residual map legitimately fans in where classes were
        // merged, so every entry is recorded merge-flavored
        for (from, to) in type_entries {
            builder.merge_type(from, to);
        }
        for (from, to) in field_entries {
            builder.merge_field(from, to);
        }
        for (from, to) in method_entries {
            builder.merge_method(from, to);
        }
        builder
            .build(pool)
            .expect("merge-flavored entries are never rejected")
    }
}
