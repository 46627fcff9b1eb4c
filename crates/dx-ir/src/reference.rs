//! Symbol references - structural method and field identifiers
//!
//! A [`MethodSignature`] is (name, parameter types, return type) with
//! structural equality; binding it to a holder [`Type`] gives a
//! [`MethodReference`]. A [`FieldReference`] is (holder, name, type).
//! References are the currency of the lens layer: bytecode never holds
//! pointers to definitions, only references resolved through the
//! application view.

use crate::pool::{Name, SymbolPool, Type};
use smallvec::SmallVec;

/// Method signature: name, parameter sequence, return type
///
/// Equality and hashing are structural, so signatures can key caches
/// and rename maps directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Method name handle
    pub name: Name,
    /// Parameter types in declaration order (receiver excluded)
    pub parameters: SmallVec<[Type; 4]>,
    /// Return type
    pub return_type: Type,
}

impl MethodSignature {
    /// Create a signature
    #[inline]
    #[must_use]
    pub fn new(name: Name, parameters: impl IntoIterator<Item = Type>, return_type: Type) -> Self {
        Self {
            name,
            parameters: parameters.into_iter().collect(),
            return_type,
        }
    }

    /// Number of declared parameters
    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Render as `name(descriptors)returnDescriptor`
    #[must_use]
    pub fn describe(&self, pool: &SymbolPool) -> String {
        let mut out = String::new();
        out.push_str(&pool.name_text(self.name));
        out.push('(');
        for parameter in &self.parameters {
            out.push_str(&pool.type_descriptor(*parameter));
        }
        out.push(')');
        out.push_str(&pool.type_descriptor(self.return_type));
        out
    }
}

/// Method signature bound to a holder type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Declaring type
    pub holder: Type,
    /// Structural signature
    pub signature: MethodSignature,
}

impl MethodReference {
    /// Create a reference
    #[inline]
    #[must_use]
    pub fn new(holder: Type, signature: MethodSignature) -> Self {
        Self { holder, signature }
    }

    /// Whether this references an instance initializer (`<init>`)
    #[inline]
    #[must_use]
    pub fn is_instance_initializer(&self, pool: &SymbolPool) -> bool {
        self.signature.name == pool.init_name()
    }

    /// Whether this references a class initializer (`<clinit>`)
    #[inline]
    #[must_use]
    pub fn is_class_initializer(&self, pool: &SymbolPool) -> bool {
        self.signature.name == pool.clinit_name()
    }

    /// Same reference with a different holder
    #[inline]
    #[must_use]
    pub fn with_holder(&self, holder: Type) -> Self {
        Self {
            holder,
            signature: self.signature.clone(),
        }
    }

    /// Same reference with a different signature
    #[inline]
    #[must_use]
    pub fn with_signature(&self, signature: MethodSignature) -> Self {
        Self {
            holder: self.holder,
            signature,
        }
    }

    /// Render as `Holder.name(params)return`
    #[must_use]
    pub fn describe(&self, pool: &SymbolPool) -> String {
        format!(
            "{}.{}",
            pool.type_descriptor(self.holder),
            self.signature.describe(pool)
        )
    }
}

/// Field reference: holder, name, field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Declaring type
    pub holder: Type,
    /// Field name handle
    pub name: Name,
    /// Declared field type
    pub ty: Type,
}

impl FieldReference {
    /// Create a reference
    #[inline]
    #[must_use]
    pub fn new(holder: Type, name: Name, ty: Type) -> Self {
        Self { holder, name, ty }
    }

    /// Same reference with a different holder
    #[inline]
    #[must_use]
    pub fn with_holder(self, holder: Type) -> Self {
        Self { holder, ..self }
    }

    /// Same reference with a different name
    #[inline]
    #[must_use]
    pub fn with_name(self, name: Name) -> Self {
        Self { name, ..self }
    }

    /// Render as `Holder.name:Type`
    #[must_use]
    pub fn describe(self, pool: &SymbolPool) -> String {
        format!(
            "{}.{}:{}",
            pool.type_descriptor(self.holder),
            pool.name_text(self.name),
            pool.type_descriptor(self.ty)
        )
    }
}
