//! Per-method optimization info
//!
//! A fixed-shape record of facts that analysis passes accumulate on a
//! method definition. Every field is a lattice with absence as top (least
//! informative): readers never assume a field is populated, and writers
//! may only refine, never weaken, between lens-producing passes.

use crate::pool::{Name, Type};
use crate::reference::{FieldReference, MethodReference};

/// Constant argument recorded by trivial-initializer detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstArgument {
    /// Integer constant
    Int(i64),
    /// Null constant
    Null,
    /// Class literal
    Class(Type),
    /// String constant
    String(Name),
}

/// Shape of a trivial class initializer
///
/// The initializer allocates one instance of its enclosing class, calls a
/// constructor with constant or class-literal arguments, and stores the
/// result into a static final field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrivialInitializerInfo {
    /// The static final field written
    pub field: FieldReference,
    /// The constructor invoked on the allocated instance
    pub constructor: MethodReference,
    /// Constant arguments passed to the constructor
    pub arguments: Vec<ConstArgument>,
}

/// How a method uses one of its declared parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterUsage {
    /// Never read
    Unused,
    /// Used only as the receiver of calls that do not leak their
    /// receiver
    NonEscapingReceiver,
    /// Any other use
    Escapes,
}

/// Monotonically refined per-method facts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationInfo {
    parameter_usage: Option<Vec<ParameterUsage>>,
    returns_receiver: Option<bool>,
    does_not_leak_receiver: Option<bool>,
    trivial_initializer: Option<TrivialInitializerInfo>,
}

impl OptimizationInfo {
    /// Unknown-everything record
    #[inline]
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Usage of declared parameter `index`
    ///
    /// [`ParameterUsage::Escapes`] when the fact is absent: top means
    /// "assume the worst".
    #[must_use]
    pub fn parameter_usage(&self, index: usize) -> ParameterUsage {
        self.parameter_usage
            .as_ref()
            .and_then(|slots| slots.get(index))
            .copied()
            .unwrap_or(ParameterUsage::Escapes)
    }

    /// Whether declared parameter `index` is known to be unused
    #[inline]
    #[must_use]
    pub fn is_argument_unused(&self, index: usize) -> bool {
        self.parameter_usage(index) == ParameterUsage::Unused
    }

    /// Whether the method is known to return its receiver
    #[inline]
    #[must_use]
    pub fn returns_receiver(&self) -> bool {
        self.returns_receiver.unwrap_or(false)
    }

    /// Whether the method is known not to let its receiver escape
    #[inline]
    #[must_use]
    pub fn does_not_leak_receiver(&self) -> bool {
        self.does_not_leak_receiver.unwrap_or(false)
    }

    /// Trivial-initializer shape, if detected
    #[inline]
    #[must_use]
    pub fn trivial_initializer(&self) -> Option<&TrivialInitializerInfo> {
        self.trivial_initializer.as_ref()
    }

    /// Record per-slot parameter-usage facts
    ///
    /// Refinement only: a slot already known unused must stay unused.
    pub fn refine_parameter_usage(&mut self, slots: Vec<ParameterUsage>) {
        if let Some(existing) = &self.parameter_usage {
            debug_assert_eq!(existing.len(), slots.len());
            debug_assert!(existing
                .iter()
                .zip(&slots)
                .all(|(old, new)| *old != ParameterUsage::Unused
                    || *new == ParameterUsage::Unused));
        }
        self.parameter_usage = Some(slots);
    }

    /// Record that the method returns its receiver
    pub fn refine_returns_receiver(&mut self, value: bool) {
        debug_assert!(self.returns_receiver != Some(true) || value);
        self.returns_receiver = Some(value);
    }

    /// Record that the method does not leak its receiver
    pub fn refine_does_not_leak_receiver(&mut self, value: bool) {
        debug_assert!(self.does_not_leak_receiver != Some(true) || value);
        self.does_not_leak_receiver = Some(value);
    }

    /// Record the trivial-initializer shape of a class initializer
    pub fn refine_trivial_initializer(&mut self, info: TrivialInitializerInfo) {
        debug_assert!(self
            .trivial_initializer
            .as_ref()
            .map_or(true, |existing| *existing == info));
        self.trivial_initializer = Some(info);
    }

    /// Join another record into this one (field-wise refinement)
    pub fn join(&mut self, other: &OptimizationInfo) {
        if let Some(slots) = &other.parameter_usage {
            self.refine_parameter_usage(slots.clone());
        }
        if let Some(value) = other.returns_receiver {
            self.refine_returns_receiver(value);
        }
        if let Some(value) = other.does_not_leak_receiver {
            self.refine_does_not_leak_receiver(value);
        }
        if let Some(info) = &other.trivial_initializer {
            self.refine_trivial_initializer(info.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SymbolPool;

    #[test]
    fn absent_facts_read_as_top() {
        let info = OptimizationInfo::unknown();

        assert!(!info.is_argument_unused(0));
        assert!(!info.returns_receiver());
        assert!(!info.does_not_leak_receiver());
        assert!(info.trivial_initializer().is_none());
    }

    #[test]
    fn refine_and_read_back() {
        let mut info = OptimizationInfo::unknown();
        info.refine_parameter_usage(vec![ParameterUsage::Escapes, ParameterUsage::Unused]);
        info.refine_does_not_leak_receiver(true);

        assert!(!info.is_argument_unused(0));
        assert!(info.is_argument_unused(1));
        assert!(!info.is_argument_unused(2));
        assert_eq!(info.parameter_usage(2), ParameterUsage::Escapes);
        assert!(info.does_not_leak_receiver());
    }

    #[test]
    fn join_accumulates_facts() {
        let pool = SymbolPool::new();
        let holder = pool.intern_type("LF;");
        let field = FieldReference::new(holder, pool.intern_name("I"), holder);
        let constructor = MethodReference::new(
            holder,
            crate::reference::MethodSignature::new(pool.init_name(), [], pool.void_type()),
        );

        let mut a = OptimizationInfo::unknown();
        a.refine_returns_receiver(true);

        let mut b = OptimizationInfo::unknown();
        b.refine_trivial_initializer(TrivialInitializerInfo {
            field,
            constructor,
            arguments: vec![ConstArgument::Int(7)],
        });

        a.join(&b);
        assert!(a.returns_receiver());
        assert!(a.trivial_initializer().is_some());
    }
}
