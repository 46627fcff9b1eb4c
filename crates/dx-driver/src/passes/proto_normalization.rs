//! Proto normalization
//!
//! Canonicalizes parameter orderings: the parameters of eligible
//! methods are stably sorted by descriptor, recording the permutation
//! as a prototype change so call sites reorder their arguments during
//! the rebuild. Restricted to methods outside virtual dispatch (static
//! and private), where reordering cannot break an override chain.
//!
//! A single reservation state spans the whole pass; classes are visited
//! sequentially in descriptor order. Splitting the state per
//! strongly-connected component would admit parallelism and is left as
//! a future optimization.

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::{
    ApplicationView, InstructionKind, MethodReference, MethodSignature, Type,
};
use dx_lens::{GraphLens, PrototypeChanges};
use std::collections::HashSet;
use tracing::info;

/// Pass 5: canonicalize method parameter orderings
#[derive(Debug, Default)]
pub struct ProtoNormalizationPass;

impl OptimizationPass for ProtoNormalizationPass {
    fn name(&self) -> &'static str {
        "proto-normalization"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        if !cx.options.enable_proto_normalization {
            return Ok(None);
        }
        let pool = view.pool_arc();
        let mut builder = GraphLens::builder();
        let mut reserved: HashSet<(Type, MethodSignature)> = HashSet::new();
        let mut planned: Vec<(Type, MethodSignature, MethodSignature, Vec<usize>)> = Vec::new();

        for holder in view.sorted_program_types() {
            let Some(class) = view.program_class(holder) else { continue };
            for method in &class.methods {
                reserved.insert((holder, method.reference.signature.clone()));
            }
        }

        for holder in view.sorted_program_types() {
            let Some(class) = view.program_class(holder) else { continue };
            for method in &class.methods {
                let signature = &method.reference.signature;
                if signature.arity() < 2
                    || method.is_instance_initializer(&pool)
                    || method.is_class_initializer(&pool)
                    || method.is_virtual(&pool)
                    || cx.state.prototype_changed.contains(&method.reference)
                    || cx
                        .oracle
                        .method_constraints(&pool, &method.reference)
                        .pinned
                {
                    continue;
                }

                // stable sort of the original slots by descriptor
                let mut permutation: Vec<usize> = (0..signature.arity()).collect();
                permutation.sort_by_key(|index| {
                    pool.type_descriptor(signature.parameters[*index]).to_string()
                });
                if permutation.iter().enumerate().all(|(i, p)| i == *p) {
                    continue;
                }

                let normalized = MethodSignature::new(
                    signature.name,
                    permutation.iter().map(|index| signature.parameters[*index]),
                    signature.return_type,
                );
                // signature-collision avoidance against the shared
                // reservation state
                let mut final_signature = normalized.clone();
                let mut k = 0usize;
                while reserved.contains(&(holder, final_signature.clone())) {
                    k += 1;
                    let fresh = format!("{}${k}", pool.name_text(signature.name));
                    final_signature = MethodSignature::new(
                        pool.intern_name(&fresh),
                        normalized.parameters.iter().copied(),
                        normalized.return_type,
                    );
                }
                reserved.insert((holder, final_signature.clone()));
                planned.push((
                    holder,
                    signature.clone(),
                    final_signature,
                    permutation,
                ));
            }
        }
        if planned.is_empty() {
            return Ok(None);
        }

        let normalized = planned.len();
        for (holder, old_signature, new_signature, permutation) in planned {
            let reference = MethodReference::new(holder, old_signature.clone());
            builder.set_prototype_changes(
                reference.clone(),
                PrototypeChanges::none().with_permutation(permutation.clone()),
            );
            builder.rename_method(
                reference,
                MethodReference::new(holder, new_signature.clone()),
            );

            // the definition side: remap argument-load slots so the body
            // reads the value from its new position
            let receiver_offset = u16::from(
                view.program_class(holder)
                    .and_then(|c| c.method(&old_signature))
                    .map_or(false, |m| !m.flags.is_static()),
            );
            let Some(class) = view.program_class_mut(holder) else { continue };
            let Some(method) = class.method_mut(&old_signature) else { continue };
            if let Some(code) = &mut method.code {
                remap_argument_slots(code, &permutation, receiver_offset);
            }
        }
        info!(normalized, "proto normalization complete");
        Ok(Some(builder.build(&pool)?))
    }
}

/// `permutation[new] = old`; argument loads carry original slots and
/// must be rewritten to the slot their value now arrives in
fn remap_argument_slots(code: &mut dx_ir::IrCode, permutation: &[usize], receiver_offset: u16) {
    for block in code.blocks_mut() {
        for instruction in &mut block.instructions {
            if let InstructionKind::Argument { index, .. } = &mut instruction.kind {
                if *index < receiver_offset {
                    continue;
                }
                let declared = usize::from(*index - receiver_offset);
                if let Some(new_position) = permutation.iter().position(|old| *old == declared) {
                    *index = u16::try_from(new_position).expect("slot fits in u16")
                        + receiver_offset;
                }
            }
        }
    }
}
