//! Enum unboxing
//!
//! Rewrites eligible enum classes to plain ints: constant reads become
//! ordinal constants, and every program-method signature mentioning the
//! enum is rewritten with per-slot prototype changes. Eligibility is
//! deliberately narrow: an unpinned enum with no interfaces, no
//! instance state, no members beyond its constants, constructors, and
//! class initializer, and no live runtime type checks.

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::{
    ApplicationView, FieldReference, InstructionKind, IrCode, MethodReference, MethodSignature,
    Type,
};
use dx_lens::{
    ArgumentRewrite, GraphLens, PrototypeChanges, ReturnRewrite,
};
use dx_merge::collect_runtime_type_checks;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::info;

/// Pass 4: rewrite eligible enums to integer constants
#[derive(Debug, Default)]
pub struct EnumUnboxingPass;

impl OptimizationPass for EnumUnboxingPass {
    fn name(&self) -> &'static str {
        "enum-unboxing"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        if !cx.options.enable_enum_unboxing {
            return Ok(None);
        }
        let pool = view.pool_arc();
        let runtime_checks = collect_runtime_type_checks(view);

        // ordinal table per eligible enum constant
        let mut ordinals: HashMap<FieldReference, i64> = HashMap::new();
        let mut unboxed: Vec<Type> = Vec::new();
        for ty in view.sorted_program_types() {
            let Some(class) = view.program_class(ty) else { continue };
            if !class.flags.is_enum()
                || !cx.oracle.class_constraints(&pool, ty).allows_merging()
                || !class.interfaces.is_empty()
                || runtime_checks.contains(&ty)
                || class.instance_fields().next().is_some()
            {
                continue;
            }
            let members_eligible = class.methods.iter().all(|m| {
                m.is_instance_initializer(&pool) || m.is_class_initializer(&pool)
            });
            let constants_eligible = class
                .fields
                .iter()
                .all(|f| f.flags.is_static() && f.flags.is_enum() && f.reference.ty == ty);
            if !members_eligible || !constants_eligible || class.fields.is_empty() {
                continue;
            }
            for (ordinal, field) in class.fields.iter().enumerate() {
                ordinals.insert(field.reference, i64::try_from(ordinal).unwrap_or(i64::MAX));
            }
            unboxed.push(ty);
        }
        if unboxed.is_empty() {
            return Ok(None);
        }
        let unboxed_set: std::collections::HashSet<Type> = unboxed.iter().copied().collect();

        // phase 1: constant reads become ordinal constants; computed in
        // parallel per class against the frozen view, installed
        // sequentially
        let class_types: Vec<Type> = view.sorted_program_types();
        let frozen: &ApplicationView = view;
        let rewritten: Vec<(Type, Vec<(MethodSignature, IrCode)>)> = cx
            .scheduler
            .map(&class_types, |ty| {
                let mut bodies = Vec::new();
                let Some(class) = frozen.program_class(*ty) else {
                    return (*ty, bodies);
                };
                if unboxed_set.contains(ty) {
                    return (*ty, bodies);
                }
                for method in &class.methods {
                    let Some(code) = &method.code else { continue };
                    let mut new_code = code.clone();
                    let mut changed = false;
                    for block in new_code.blocks_mut() {
                        for instruction in &mut block.instructions {
                            if let InstructionKind::StaticGet { field } = &instruction.kind {
                                if let Some(ordinal) = ordinals.get(field) {
                                    instruction.kind =
                                        InstructionKind::ConstInt { value: *ordinal };
                                    changed = true;
                                }
                            }
                        }
                    }
                    if changed {
                        bodies.push((method.reference.signature.clone(), new_code));
                    }
                }
                (*ty, bodies)
            });
        for (ty, bodies) in rewritten {
            let Some(class) = view.program_class_mut(ty) else { continue };
            for (signature, code) in bodies {
                if let Some(method) = class.method_mut(&signature) {
                    method.code = Some(code);
                }
            }
        }

        // phase 2: prototype changes for every program method whose
        // signature mentions an unboxed enum
        let mut builder = GraphLens::builder();
        for ty in &unboxed {
            builder.merge_type(*ty, pool.int_type());
        }
        let int_ty = pool.int_type();
        let mut reserved: IndexMap<(Type, MethodSignature), ()> = IndexMap::new();
        for holder_ty in view.sorted_program_types() {
            let Some(class) = view.program_class(holder_ty) else { continue };
            if unboxed_set.contains(&holder_ty) {
                continue;
            }
            for method in &class.methods {
                let signature = &method.reference.signature;
                let mentions_enum = signature
                    .parameters
                    .iter()
                    .chain(std::iter::once(&signature.return_type))
                    .any(|t| unboxed_set.contains(t));
                if !mentions_enum {
                    continue;
                }
                let mut changes = PrototypeChanges::none();
                for (index, parameter) in signature.parameters.iter().enumerate() {
                    if unboxed_set.contains(parameter) {
                        changes = changes.with_argument_rewrite(ArgumentRewrite {
                            index,
                            from: *parameter,
                            to: int_ty,
                        });
                    }
                }
                if unboxed_set.contains(&signature.return_type) {
                    changes = changes.with_return_rewrite(ReturnRewrite {
                        from: signature.return_type,
                        to: int_ty,
                    });
                }
                let new_signature = MethodSignature::new(
                    signature.name,
                    signature
                        .parameters
                        .iter()
                        .map(|t| if unboxed_set.contains(t) { int_ty } else { *t }),
                    if unboxed_set.contains(&signature.return_type) {
                        int_ty
                    } else {
                        signature.return_type
                    },
                );
                // signature-collision avoidance within the holder
                let mut final_signature = new_signature.clone();
                let mut k = 0usize;
                while class.has_method(&final_signature)
                    || reserved.contains_key(&(holder_ty, final_signature.clone()))
                {
                    k += 1;
                    let fresh = format!("{}${k}", pool.name_text(signature.name));
                    final_signature = MethodSignature::new(
                        pool.intern_name(&fresh),
                        new_signature.parameters.iter().copied(),
                        new_signature.return_type,
                    );
                }
                reserved.insert((holder_ty, final_signature.clone()), ());
                let new_reference = MethodReference::new(holder_ty, final_signature);
                builder.set_prototype_changes(method.reference.clone(), changes);
                cx.state.prototype_changed.insert(new_reference.clone());
                builder.rename_method(method.reference.clone(), new_reference);
            }
        }

        // the enum definitions themselves disappear
        for ty in &unboxed {
            view.remove_program_class(*ty);
        }
        info!(unboxed = unboxed.len(), "enum unboxing complete");
        Ok(Some(builder.build(&pool)?))
    }
}
