//! Class, method, and field definitions
//!
//! Definitions are created by the reader, mutated by optimization passes
//! (members added, removed, replaced, renamed), and destroyed only when
//! the application is finalized for writing. Classes reference each other
//! through interned [`Type`] handles; the application view owns the
//! Type→definition table.

use crate::flags::AccessFlags;
use crate::ir::IrCode;
use crate::optimization::OptimizationInfo;
use crate::pool::{Name, SymbolPool, Type};
use crate::reference::{FieldReference, MethodReference, MethodSignature};
use parking_lot::Mutex;

/// One entry of a class's inner-classes attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassAttribute {
    /// The inner class
    pub inner: Type,
    /// The enclosing class, when known
    pub outer: Option<Type>,
    /// Simple name, absent for anonymous classes
    pub simple_name: Option<Name>,
}

/// Kind tag of a Kotlin metadata blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KotlinClassKind {
    /// Ordinary Kotlin class
    Class,
    /// Compiler-synthesized lambda class
    SyntheticLambda,
}

/// Opaque Kotlin metadata carried on a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinMetadata {
    /// Metadata kind
    pub kind: KotlinClassKind,
    /// Packed metadata payload, passed through unchanged
    pub packed: String,
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// The field's reference (holder, name, type)
    pub reference: FieldReference,
    /// Access flags
    pub flags: AccessFlags,
}

impl FieldDefinition {
    /// Create a field definition
    #[inline]
    #[must_use]
    pub fn new(reference: FieldReference, flags: AccessFlags) -> Self {
        Self { reference, flags }
    }

    /// Whether this is an instance (non-static) field
    #[inline]
    #[must_use]
    pub fn is_instance(&self) -> bool {
        !self.flags.is_static()
    }
}

/// Method definition
///
/// Owns its reference, flags, optional IR body, parameter annotations,
/// generic signature, and the optimization-info record guarded by a
/// per-method monitor. At most one pass writes the record at a time;
/// readers within that pass see either the pre-pass value or nothing.
#[derive(Debug)]
pub struct MethodDefinition {
    /// The method's reference
    pub reference: MethodReference,
    /// Access flags
    pub flags: AccessFlags,
    /// IR body; absent for abstract and native methods
    pub code: Option<IrCode>,
    /// Per-parameter annotation type lists
    pub parameter_annotations: Vec<Vec<Type>>,
    /// Generic signature attribute
    pub generic_signature: Option<String>,
    optimization_info: Mutex<OptimizationInfo>,
}

impl MethodDefinition {
    /// Create a bodyless method definition
    #[must_use]
    pub fn new(reference: MethodReference, flags: AccessFlags) -> Self {
        Self {
            reference,
            flags,
            code: None,
            parameter_annotations: Vec::new(),
            generic_signature: None,
            optimization_info: Mutex::new(OptimizationInfo::unknown()),
        }
    }

    /// Create a method definition with a body
    #[must_use]
    pub fn with_code(reference: MethodReference, flags: AccessFlags, code: IrCode) -> Self {
        Self {
            code: Some(code),
            ..Self::new(reference, flags)
        }
    }

    /// Snapshot of the optimization-info record
    #[must_use]
    pub fn optimization_info(&self) -> OptimizationInfo {
        self.optimization_info.lock().clone()
    }

    /// Refine the optimization-info record under the per-method monitor
    pub fn refine_optimization_info(&self, refine: impl FnOnce(&mut OptimizationInfo)) {
        refine(&mut self.optimization_info.lock());
    }

    /// Whether this is an instance initializer
    #[inline]
    #[must_use]
    pub fn is_instance_initializer(&self, pool: &SymbolPool) -> bool {
        self.reference.is_instance_initializer(pool)
    }

    /// Whether this is the class initializer
    #[inline]
    #[must_use]
    pub fn is_class_initializer(&self, pool: &SymbolPool) -> bool {
        self.reference.is_class_initializer(pool)
    }

    /// Whether the method participates in virtual dispatch
    #[must_use]
    pub fn is_virtual(&self, pool: &SymbolPool) -> bool {
        !self.flags.is_static()
            && !self.flags.is_private()
            && !self.is_instance_initializer(pool)
            && !self.is_class_initializer(pool)
    }

    /// Estimated inlined size of the body, in instructions
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        self.code.as_ref().map_or(0, IrCode::instruction_count)
    }
}

impl Clone for MethodDefinition {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            flags: self.flags,
            code: self.code.clone(),
            parameter_annotations: self.parameter_annotations.clone(),
            generic_signature: self.generic_signature.clone(),
            optimization_info: Mutex::new(self.optimization_info.lock().clone()),
        }
    }
}

/// Class definition
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// The class's own type
    pub ty: Type,
    /// Superclass; absent only for the root object type
    pub superclass: Option<Type>,
    /// Implemented interfaces
    pub interfaces: Vec<Type>,
    /// Access flags
    pub flags: AccessFlags,
    /// Field definitions in declaration order
    pub fields: Vec<FieldDefinition>,
    /// Method definitions in declaration order
    pub methods: Vec<MethodDefinition>,
    /// Inner-classes attribute entries
    pub inner_classes: Vec<InnerClassAttribute>,
    /// Kotlin metadata, when present
    pub kotlin_metadata: Option<KotlinMetadata>,
}

impl ClassDefinition {
    /// Create an empty class definition
    #[must_use]
    pub fn new(ty: Type, superclass: Option<Type>, flags: AccessFlags) -> Self {
        Self {
            ty,
            superclass,
            interfaces: Vec::new(),
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            kotlin_metadata: None,
        }
    }

    /// Look up a declared method by signature
    #[must_use]
    pub fn method(&self, signature: &MethodSignature) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| m.reference.signature == *signature)
    }

    /// Mutable lookup of a declared method by signature
    pub fn method_mut(&mut self, signature: &MethodSignature) -> Option<&mut MethodDefinition> {
        self.methods
            .iter_mut()
            .find(|m| m.reference.signature == *signature)
    }

    /// Look up a declared field by name and type
    #[must_use]
    pub fn field(&self, name: Name, ty: Type) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.reference.name == name && f.reference.ty == ty)
    }

    /// Whether any declared field carries the given name
    #[must_use]
    pub fn has_field_named(&self, name: Name) -> bool {
        self.fields.iter().any(|f| f.reference.name == name)
    }

    /// Whether a method with the given signature is declared
    #[must_use]
    pub fn has_method(&self, signature: &MethodSignature) -> bool {
        self.method(signature).is_some()
    }

    /// Instance fields in declaration order
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_instance())
    }

    /// Instance initializers declared on this class
    pub fn constructors<'a>(
        &'a self,
        pool: &'a SymbolPool,
    ) -> impl Iterator<Item = &'a MethodDefinition> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.is_instance_initializer(pool))
    }

    /// The class initializer, if declared
    #[must_use]
    pub fn class_initializer(&self, pool: &SymbolPool) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| m.is_class_initializer(pool))
    }

    /// Virtual methods declared on this class
    pub fn virtual_methods<'a>(
        &'a self,
        pool: &'a SymbolPool,
    ) -> impl Iterator<Item = &'a MethodDefinition> + 'a {
        self.methods.iter().filter(move |m| m.is_virtual(pool))
    }

    /// Remove a declared method by signature, returning it
    pub fn take_method(&mut self, signature: &MethodSignature) -> Option<MethodDefinition> {
        let position = self
            .methods
            .iter()
            .position(|m| m.reference.signature == *signature)?;
        Some(self.methods.remove(position))
    }

    /// Whether the class declares a finalizer override
    #[must_use]
    pub fn declares_finalizer(&self, pool: &SymbolPool) -> bool {
        let finalize = pool.intern_name("finalize");
        self.methods.iter().any(|m| {
            m.reference.signature.name == finalize && m.reference.signature.parameters.is_empty()
        })
    }

    /// Whether this class is a compiler-synthesized Kotlin lambda
    #[must_use]
    pub fn is_synthetic_kotlin_lambda(&self) -> bool {
        self.flags.is_synthetic()
            && self
                .kotlin_metadata
                .as_ref()
                .map_or(false, |metadata| {
                    metadata.kind == KotlinClassKind::SyntheticLambda
                })
    }

    /// Whether the class has no members left
    #[inline]
    #[must_use]
    pub fn is_member_free(&self) -> bool {
        self.fields.is_empty() && self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SymbolPool;

    fn simple_class(pool: &SymbolPool) -> ClassDefinition {
        let ty = pool.intern_type("LFoo;");
        let mut class = ClassDefinition::new(
            ty,
            Some(pool.object_type()),
            AccessFlags::empty().with(AccessFlags::PUBLIC),
        );
        class.fields.push(FieldDefinition::new(
            FieldReference::new(ty, pool.intern_name("x"), pool.int_type()),
            AccessFlags::empty(),
        ));
        class.methods.push(MethodDefinition::new(
            MethodReference::new(
                ty,
                MethodSignature::new(pool.intern_name("m"), [pool.int_type()], pool.void_type()),
            ),
            AccessFlags::empty().with(AccessFlags::PUBLIC),
        ));
        class
    }

    #[test]
    fn member_lookup() {
        let pool = SymbolPool::new();
        let class = simple_class(&pool);
        let signature =
            MethodSignature::new(pool.intern_name("m"), [pool.int_type()], pool.void_type());

        assert!(class.has_method(&signature));
        assert!(class.field(pool.intern_name("x"), pool.int_type()).is_some());
        assert!(class.field(pool.intern_name("y"), pool.int_type()).is_none());
    }

    #[test]
    fn virtual_method_classification() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LFoo;");
        let mut class = ClassDefinition::new(ty, Some(pool.object_type()), AccessFlags::empty());
        class.methods.push(MethodDefinition::new(
            MethodReference::new(
                ty,
                MethodSignature::new(pool.init_name(), [], pool.void_type()),
            ),
            AccessFlags::empty(),
        ));
        class.methods.push(MethodDefinition::new(
            MethodReference::new(
                ty,
                MethodSignature::new(pool.intern_name("s"), [], pool.void_type()),
            ),
            AccessFlags::empty().with(AccessFlags::STATIC),
        ));
        class.methods.push(MethodDefinition::new(
            MethodReference::new(
                ty,
                MethodSignature::new(pool.intern_name("v"), [], pool.void_type()),
            ),
            AccessFlags::empty().with(AccessFlags::PUBLIC),
        ));

        let virtuals: Vec<_> = class.virtual_methods(&pool).collect();
        assert_eq!(virtuals.len(), 1);
        assert_eq!(
            virtuals[0].reference.signature.name,
            pool.intern_name("v")
        );
    }

    #[test]
    fn optimization_info_refinement_is_visible() {
        let pool = SymbolPool::new();
        let class = simple_class(&pool);
        let method = &class.methods[0];

        method.refine_optimization_info(|info| info.refine_does_not_leak_receiver(true));
        assert!(method.optimization_info().does_not_leak_receiver());
    }

    #[test]
    fn kotlin_lambda_detection() {
        let pool = SymbolPool::new();
        let ty = pool.intern_type("LFoo$lambda$0;");
        let mut class = ClassDefinition::new(
            ty,
            Some(pool.object_type()),
            AccessFlags::empty().with(AccessFlags::SYNTHETIC),
        );
        assert!(!class.is_synthetic_kotlin_lambda());

        class.kotlin_metadata = Some(KotlinMetadata {
            kind: KotlinClassKind::SyntheticLambda,
            packed: String::new(),
        });
        assert!(class.is_synthetic_kotlin_lambda());
    }
}
