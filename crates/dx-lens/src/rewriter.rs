//! Lens-driven code rewriting
//!
//! Applies one lens to definitions and method bodies so the rest of the
//! pipeline sees an already-rewritten view. Reference maps are applied
//! everywhere; at call sites the prototype change is materialized:
//! arguments are removed and permuted, and extra trailing null or
//! constant-int parameters are appended as freshly inserted constants.
//!
//! Passes stay responsible for the definition-side consistency of their
//! own structural edits (moved members, changed `Argument` slots); the
//! rewriter covers everything expressible through the lens.

use crate::lens::GraphLens;
use dx_ir::{
    ClassDefinition, Instruction, InstructionKind, InvokeKind, IrCode, MethodReference,
};

use crate::prototype::ExtraParameter;

/// Rewrite a class definition's own references through a lens
pub fn rewrite_class(class: &mut ClassDefinition, lens: &GraphLens) {
    class.ty = lens.map_type(class.ty);
    class.superclass = class.superclass.map(|s| lens.map_type(s));
    for interface in &mut class.interfaces {
        *interface = lens.map_type(*interface);
    }
    for entry in &mut class.inner_classes {
        entry.inner = lens.map_type(entry.inner);
        entry.outer = entry.outer.map(|o| lens.map_type(o));
    }
    for field in &mut class.fields {
        field.reference = lens.map_field(field.reference);
    }
    for method in &mut class.methods {
        method.reference = lens.map_method(&method.reference).reference;
        for annotations in &mut method.parameter_annotations {
            for ty in annotations {
                *ty = lens.map_type(*ty);
            }
        }
        if let Some(code) = &mut method.code {
            rewrite_code_with_prototypes(code, lens);
        }
    }
}

/// Invocations needing prototype materialization, resolved in a second
/// sweep that may allocate fresh values
#[derive(Debug)]
struct InvokeRewrite {
    block_index: usize,
    instruction_index: usize,
    method: MethodReference,
    kind: InvokeKind,
}

/// Full body rewrite including call-site prototype materialization
pub fn rewrite_code_with_prototypes(code: &mut IrCode, lens: &GraphLens) {
    // first sweep: plain reference rewriting for everything except
    // invokes, which are collected for the value-allocating sweep
    let mut pending: Vec<InvokeRewrite> = Vec::new();
    for (block_index, block) in code.blocks_mut().iter_mut().enumerate() {
        for (instruction_index, instruction) in block.instructions.iter_mut().enumerate() {
            match &mut instruction.kind {
                InstructionKind::ConstClass { ty }
                | InstructionKind::NewInstance { ty }
                | InstructionKind::InstanceOf { ty, .. }
                | InstructionKind::CheckCast { ty, .. }
                | InstructionKind::Argument { ty, .. } => {
                    *ty = lens.map_type(*ty);
                }
                InstructionKind::InstanceGet { field, .. }
                | InstructionKind::InstancePut { field, .. }
                | InstructionKind::StaticGet { field }
                | InstructionKind::StaticPut { field, .. } => {
                    *field = lens.map_field(*field);
                }
                InstructionKind::Invoke { kind, method, .. } => {
                    pending.push(InvokeRewrite {
                        block_index,
                        instruction_index,
                        method: method.clone(),
                        kind: *kind,
                    });
                }
                _ => {}
            }
        }
    }

    // second sweep, in reverse so earlier indexes stay valid when
    // constants are inserted before a call
    for rewrite in pending.into_iter().rev() {
        let lookup = lens.map_method(&rewrite.method);
        let new_kind = lens.translate_invoke_kind(&rewrite.method, rewrite.kind);
        let changes = lookup.prototype_changes;

        let mut inserted: Vec<Instruction> = Vec::new();
        if !changes.is_empty() {
            let has_receiver = !matches!(rewrite.kind, InvokeKind::Static);
            let block_id = code.blocks()[rewrite.block_index].id;
            let snapshot = code.blocks()[rewrite.block_index].instructions
                [rewrite.instruction_index]
                .kind
                .clone();
            let InstructionKind::Invoke { arguments, .. } = snapshot else {
                continue;
            };
            let (receiver, declared) = if has_receiver {
                (arguments.first().copied(), &arguments[1..])
            } else {
                (None, &arguments[..])
            };
            let mut new_arguments: Vec<dx_ir::Value> = Vec::new();
            if let Some(receiver) = receiver {
                new_arguments.push(receiver);
            }
            new_arguments.extend(changes.reorder_arguments(declared));
            for extra in changes.extra_parameters() {
                let value = code.new_value();
                let kind = match extra {
                    ExtraParameter::UnusedNull => InstructionKind::ConstNull,
                    ExtraParameter::ConstantInt(constant) => InstructionKind::ConstInt {
                        value: *constant,
                    },
                };
                inserted.push(Instruction::with_dest(value, kind));
                new_arguments.push(value);
            }
            let block = code.block_mut(block_id);
            if let InstructionKind::Invoke {
                kind,
                method,
                arguments,
            } = &mut block.instructions[rewrite.instruction_index].kind
            {
                *kind = new_kind;
                *method = lookup.reference;
                *arguments = new_arguments.into_iter().collect();
            }
            // splice the materialized constants in front of the call
            let at = rewrite.instruction_index;
            block.instructions.splice(at..at, inserted);
        } else {
            let block_id = code.blocks()[rewrite.block_index].id;
            let block = code.block_mut(block_id);
            if let InstructionKind::Invoke { kind, method, .. } =
                &mut block.instructions[rewrite.instruction_index].kind
            {
                *kind = new_kind;
                *method = lookup.reference;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prototype::PrototypeChanges;
    use dx_ir::{
        FieldReference, MethodSignature, SymbolPool,
    };
    use smallvec::smallvec;

    #[test]
    fn references_rewritten_in_place() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let field = FieldReference::new(a, pool.intern_name("x"), pool.int_type());

        let mut builder = GraphLens::builder();
        builder.rename_type(a, b);
        let lens = builder.build(&pool).unwrap();

        let mut code = IrCode::new();
        let entry = code.entry();
        let object = code.new_value();
        {
            let block = code.block_mut(entry);
            block.instructions.push(Instruction::with_dest(
                object,
                InstructionKind::NewInstance { ty: a },
            ));
            block.instructions.push(Instruction::effect(InstructionKind::InstancePut {
                field,
                object,
                value: object,
            }));
            block
                .instructions
                .push(Instruction::effect(InstructionKind::Return { value: None }));
        }

        rewrite_code_with_prototypes(&mut code, &lens);

        let block = &code.blocks()[0];
        assert_eq!(block.instructions[0].kind, InstructionKind::NewInstance { ty: b });
        match &block.instructions[1].kind {
            InstructionKind::InstancePut { field, .. } => assert_eq!(field.holder, b),
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn extra_constant_int_parameter_materialized() {
        let pool = SymbolPool::new();
        let a = pool.intern_type("LA;");
        let target = pool.intern_type("LT;");
        let init = MethodReference::new(
            a,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        );
        let dispatcher = MethodReference::new(
            target,
            MethodSignature::new(
                pool.init_name(),
                [pool.int_type(), pool.int_type()],
                pool.void_type(),
            ),
        );

        let mut builder = GraphLens::builder();
        builder.rename_type(a, target);
        builder.rename_method(init.clone(), dispatcher.clone());
        builder.set_prototype_changes(
            init.clone(),
            PrototypeChanges::none().with_extra_parameter(ExtraParameter::ConstantInt(1)),
        );
        let lens = builder.build(&pool).unwrap();

        let mut code = IrCode::new();
        let entry = code.entry();
        let object = code.new_value();
        let argument = code.new_value();
        {
            let block = code.block_mut(entry);
            block.instructions.push(Instruction::with_dest(
                object,
                InstructionKind::NewInstance { ty: a },
            ));
            block.instructions.push(Instruction::with_dest(
                argument,
                InstructionKind::ConstInt { value: 42 },
            ));
            block.instructions.push(Instruction::effect(InstructionKind::Invoke {
                kind: InvokeKind::Direct,
                method: init,
                arguments: smallvec![object, argument],
            }));
            block
                .instructions
                .push(Instruction::effect(InstructionKind::Return { value: None }));
        }

        rewrite_code_with_prototypes(&mut code, &lens);
        assert_eq!(code.verify(), Ok(()));

        let block = &code.blocks()[0];
        // const 1 inserted before the call
        assert_eq!(block.instructions.len(), 5);
        assert_eq!(
            block.instructions[2].kind,
            InstructionKind::ConstInt { value: 1 }
        );
        match &block.instructions[3].kind {
            InstructionKind::Invoke {
                method, arguments, ..
            } => {
                assert_eq!(*method, dispatcher);
                assert_eq!(arguments.len(), 3);
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }
}
