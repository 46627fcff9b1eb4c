//! Prototype-change descriptions
//!
//! A structured edit to a method's signature: removed argument slots,
//! per-slot type rewrites, an optional argument permutation, a
//! return-type rewrite, and extra trailing parameters (unused nulls for
//! signature-collision avoidance, constant ints for merge-group
//! class-ids). At most one lens on a stack may carry a non-empty
//! description for any given method; the stack enforces this at push
//! time.

use dx_ir::Type;

/// Extra trailing parameter appended to a rewritten method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraParameter {
    /// Unused parameter; call sites pass null
    UnusedNull,
    /// Constant int parameter; call sites pass the given value
    ConstantInt(i64),
}

/// Per-slot argument type rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentRewrite {
    /// Original argument slot
    pub index: usize,
    /// Original type
    pub from: Type,
    /// Rewritten type
    pub to: Type,
}

/// Return-type rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnRewrite {
    /// Original return type
    pub from: Type,
    /// Rewritten return type
    pub to: Type,
}

/// Structured signature edit carried by a lens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrototypeChanges {
    /// Removed original argument slots, ascending
    removed_arguments: Vec<usize>,
    /// Argument permutation: entry `i` names the original slot that now
    /// sits at position `i` (applied after removals, over the surviving
    /// slots' original indexes)
    argument_permutation: Option<Vec<usize>>,
    /// Per-slot type rewrites, by original slot
    rewritten_arguments: Vec<ArgumentRewrite>,
    /// Return-type rewrite
    rewritten_return: Option<ReturnRewrite>,
    /// Extra trailing parameters, in append order
    extra_parameters: Vec<ExtraParameter>,
}

impl PrototypeChanges {
    /// The empty edit
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this edit changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_arguments.is_empty()
            && self.argument_permutation.is_none()
            && self.rewritten_arguments.is_empty()
            && self.rewritten_return.is_none()
            && self.extra_parameters.is_empty()
    }

    /// Mark an original argument slot removed
    #[must_use]
    pub fn with_removed_argument(mut self, index: usize) -> Self {
        match self.removed_arguments.binary_search(&index) {
            Ok(_) => {}
            Err(position) => self.removed_arguments.insert(position, index),
        }
        self
    }

    /// Record a per-slot argument type rewrite
    #[must_use]
    pub fn with_argument_rewrite(mut self, rewrite: ArgumentRewrite) -> Self {
        self.rewritten_arguments.push(rewrite);
        self
    }

    /// Record the argument permutation
    #[must_use]
    pub fn with_permutation(mut self, permutation: Vec<usize>) -> Self {
        self.argument_permutation = Some(permutation);
        self
    }

    /// Record a return-type rewrite
    #[must_use]
    pub fn with_return_rewrite(mut self, rewrite: ReturnRewrite) -> Self {
        self.rewritten_return = Some(rewrite);
        self
    }

    /// Append an extra trailing parameter
    #[must_use]
    pub fn with_extra_parameter(mut self, parameter: ExtraParameter) -> Self {
        self.extra_parameters.push(parameter);
        self
    }

    /// Removed original slots, ascending
    #[inline]
    #[must_use]
    pub fn removed_arguments(&self) -> &[usize] {
        &self.removed_arguments
    }

    /// Argument permutation, if any
    #[inline]
    #[must_use]
    pub fn argument_permutation(&self) -> Option<&[usize]> {
        self.argument_permutation.as_deref()
    }

    /// Per-slot type rewrites
    #[inline]
    #[must_use]
    pub fn rewritten_arguments(&self) -> &[ArgumentRewrite] {
        &self.rewritten_arguments
    }

    /// Return rewrite, if any
    #[inline]
    #[must_use]
    pub fn rewritten_return(&self) -> Option<ReturnRewrite> {
        self.rewritten_return
    }

    /// Extra trailing parameters
    #[inline]
    #[must_use]
    pub fn extra_parameters(&self) -> &[ExtraParameter] {
        &self.extra_parameters
    }

    /// Reorder a call site's declared-argument list
    ///
    /// Takes the original declared arguments (receiver excluded) and
    /// returns the surviving arguments in post-edit order; extra
    /// parameters are not included, the caller materializes those.
    #[must_use]
    pub fn reorder_arguments<T: Clone>(&self, original: &[T]) -> Vec<T> {
        let survivors: Vec<(usize, T)> = original
            .iter()
            .cloned()
            .enumerate()
            .filter(|(index, _)| self.removed_arguments.binary_search(index).is_err())
            .collect();
        match &self.argument_permutation {
            None => survivors.into_iter().map(|(_, value)| value).collect(),
            Some(permutation) => permutation
                .iter()
                .filter_map(|original_index| {
                    survivors
                        .iter()
                        .find(|(index, _)| index == original_index)
                        .map(|(_, value)| value.clone())
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_edit_is_empty() {
        assert!(PrototypeChanges::none().is_empty());
    }

    #[test]
    fn removal_reorders_call_sites() {
        let changes = PrototypeChanges::none().with_removed_argument(1);
        assert_eq!(changes.reorder_arguments(&['a', 'b', 'c']), vec!['a', 'c']);
    }

    #[test]
    fn permutation_reorders_survivors() {
        let changes = PrototypeChanges::none().with_permutation(vec![2, 0, 1]);
        assert_eq!(
            changes.reorder_arguments(&['a', 'b', 'c']),
            vec!['c', 'a', 'b']
        );
    }

    #[test]
    fn removal_then_permutation() {
        // remove slot 0, then order the survivors as (2, 1)
        let changes = PrototypeChanges::none()
            .with_removed_argument(0)
            .with_permutation(vec![2, 1]);
        assert_eq!(changes.reorder_arguments(&['a', 'b', 'c']), vec!['c', 'b']);
    }

    #[test]
    fn duplicate_removal_is_idempotent() {
        let changes = PrototypeChanges::none()
            .with_removed_argument(1)
            .with_removed_argument(1);
        assert_eq!(changes.removed_arguments(), &[1]);
    }
}
