//! Testing utilities for the DX workspace
//!
//! Shared fixtures: a straight-line IR body builder and constructors
//! for the small program shapes the optimization tests exercise.

#![allow(missing_docs)]

use dx_ir::{
    AccessFlags, ApplicationView, ClassDefinition, FieldDefinition, FieldReference, Instruction,
    InstructionKind, InvokeKind, IrCode, MethodDefinition, MethodReference, MethodSignature,
    SymbolPool, Type, Value,
};
use std::sync::Arc;

/// Straight-line body builder; every instruction lands in the entry
/// block and the terminating `return` consumes the builder
#[derive(Debug)]
pub struct BodyBuilder {
    code: IrCode,
}

impl BodyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { code: IrCode::new() }
    }

    fn push_with_dest(&mut self, kind: InstructionKind) -> Value {
        let value = self.code.new_value();
        let entry = self.code.entry();
        self.code
            .block_mut(entry)
            .instructions
            .push(Instruction::with_dest(value, kind));
        value
    }

    fn push_effect(&mut self, kind: InstructionKind) {
        let entry = self.code.entry();
        self.code
            .block_mut(entry)
            .instructions
            .push(Instruction::effect(kind));
    }

    pub fn argument(&mut self, index: u16, ty: Type) -> Value {
        self.push_with_dest(InstructionKind::Argument { index, ty })
    }

    pub fn const_int(&mut self, value: i64) -> Value {
        self.push_with_dest(InstructionKind::ConstInt { value })
    }

    pub fn const_null(&mut self) -> Value {
        self.push_with_dest(InstructionKind::ConstNull)
    }

    pub fn new_instance(&mut self, ty: Type) -> Value {
        self.push_with_dest(InstructionKind::NewInstance { ty })
    }

    pub fn invoke(&mut self, kind: InvokeKind, method: MethodReference, arguments: &[Value]) {
        self.push_effect(InstructionKind::Invoke {
            kind,
            method,
            arguments: arguments.iter().copied().collect(),
        });
    }

    pub fn invoke_with_result(
        &mut self,
        kind: InvokeKind,
        method: MethodReference,
        arguments: &[Value],
    ) -> Value {
        self.push_with_dest(InstructionKind::Invoke {
            kind,
            method,
            arguments: arguments.iter().copied().collect(),
        })
    }

    pub fn instance_get(&mut self, field: FieldReference, object: Value) -> Value {
        self.push_with_dest(InstructionKind::InstanceGet { field, object })
    }

    pub fn instance_put(&mut self, field: FieldReference, object: Value, value: Value) {
        self.push_effect(InstructionKind::InstancePut {
            field,
            object,
            value,
        });
    }

    pub fn static_get(&mut self, field: FieldReference) -> Value {
        self.push_with_dest(InstructionKind::StaticGet { field })
    }

    pub fn static_put(&mut self, field: FieldReference, value: Value) {
        self.push_effect(InstructionKind::StaticPut { field, value });
    }

    #[must_use]
    pub fn return_value(mut self, value: Value) -> IrCode {
        self.push_effect(InstructionKind::Return { value: Some(value) });
        self.code
    }

    #[must_use]
    pub fn return_void(mut self) -> IrCode {
        self.push_effect(InstructionKind::Return { value: None });
        self.code
    }
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference to `java.lang.Object.<init>()V`
#[must_use]
pub fn object_init(pool: &SymbolPool) -> MethodReference {
    MethodReference::new(
        pool.object_type(),
        MethodSignature::new(pool.init_name(), [], pool.void_type()),
    )
}

/// `java.lang.Object` as a bodyless library class
#[must_use]
pub fn object_class(pool: &SymbolPool) -> ClassDefinition {
    let mut class = ClassDefinition::new(
        pool.object_type(),
        None,
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    );
    class.methods.push(MethodDefinition::new(
        object_init(pool),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
    ));
    class
}

/// Fresh view with `java.lang.Object` pre-registered as a library class
#[must_use]
pub fn test_view() -> ApplicationView {
    let pool = Arc::new(SymbolPool::new());
    let mut view = ApplicationView::new(Arc::clone(&pool));
    view.add_library_class(object_class(&pool)).unwrap();
    view
}

/// A constructor `<init>(param)V` that calls the superclass constructor
/// and stores its parameter into `field`
#[must_use]
pub fn constructor_storing_field(
    pool: &SymbolPool,
    holder: Type,
    field: FieldReference,
    parameter: Type,
) -> MethodDefinition {
    let mut body = BodyBuilder::new();
    let receiver = body.argument(0, holder);
    let argument = body.argument(1, parameter);
    body.invoke(InvokeKind::Direct, object_init(pool), &[receiver]);
    body.instance_put(field, receiver, argument);
    MethodDefinition::with_code(
        MethodReference::new(
            holder,
            MethodSignature::new(pool.init_name(), [parameter], pool.void_type()),
        ),
        AccessFlags::empty().with(AccessFlags::PUBLIC),
        body.return_void(),
    )
}

/// A final value-holder class: one final int instance field plus a
/// constructor storing its single argument into that field
#[must_use]
pub fn value_holder_class(pool: &SymbolPool, descriptor: &str, field_name: &str) -> ClassDefinition {
    let ty = pool.intern_type(descriptor);
    let field = FieldReference::new(ty, pool.intern_name(field_name), pool.int_type());
    let mut class = ClassDefinition::new(
        ty,
        Some(pool.object_type()),
        AccessFlags::empty().with(AccessFlags::FINAL),
    );
    class.fields.push(FieldDefinition::new(
        field,
        AccessFlags::empty().with(AccessFlags::FINAL),
    ));
    class
        .methods
        .push(constructor_storing_field(pool, ty, field, pool.int_type()));
    class
}

/// A static method definition with the given body
#[must_use]
pub fn static_method(
    pool: &SymbolPool,
    holder: Type,
    name: &str,
    parameters: impl IntoIterator<Item = Type>,
    return_type: Type,
    code: IrCode,
) -> MethodDefinition {
    MethodDefinition::with_code(
        MethodReference::new(
            holder,
            MethodSignature::new(pool.intern_name(name), parameters, return_type),
        ),
        AccessFlags::empty()
            .with(AccessFlags::PUBLIC)
            .with(AccessFlags::STATIC),
        code,
    )
}
