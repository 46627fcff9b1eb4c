//! Vertical class merging
//!
//! Conservatively folds a superclass into its sole program subclass:
//! the superclass must be unpinned, non-interface, never instantiated,
//! free of instance state and nontrivial constructors, and never the
//! target of a runtime type check. Methods move down with
//! rename-on-collision, the folded class's implemented interfaces move
//! onto the subclass so its conformance is preserved, and the emitted
//! lens maps the folded type and its members onto the subclass. Merged
//! subclasses are recorded so the horizontal merger's
//! *NotVerticallyMergedIntoSubtype* policy can see them.

use crate::error::DriverError;
use crate::pass::{OptimizationPass, PassContext};
use dx_ir::{
    ApplicationView, ClassHierarchy, InstructionKind, MethodSignature, Type,
};
use dx_lens::{disambiguate, GraphLens};
use dx_merge::collect_runtime_type_checks;
use std::collections::HashSet;
use tracing::{debug, info};

/// Pass 2: fold superclasses into their single subclass
#[derive(Debug, Default)]
pub struct VerticalClassMergingPass;

impl OptimizationPass for VerticalClassMergingPass {
    fn name(&self) -> &'static str {
        "vertical-class-merging"
    }

    fn run(
        &self,
        view: &mut ApplicationView,
        cx: &mut PassContext<'_>,
    ) -> Result<Option<GraphLens>, DriverError> {
        if !cx.options.enable_vertical_class_merging {
            return Ok(None);
        }
        let pool = view.pool_arc();
        let runtime_checks = collect_runtime_type_checks(view);
        let instantiated = collect_instantiated(view);
        let hierarchy = ClassHierarchy::build(view);

        let mut candidates: Vec<(Type, Type)> = Vec::new();
        let mut claimed: HashSet<Type> = HashSet::new();
        for ty in view.sorted_program_types() {
            let Some(class) = view.program_class(ty) else { continue };
            if !cx.oracle.class_constraints(&pool, ty).allows_merging()
                || class.flags.is_interface()
                || runtime_checks.contains(&ty)
                || instantiated.contains(&ty)
                || !class.fields.is_empty()
                || class.class_initializer(&pool).is_some()
                || class
                    .constructors(&pool)
                    .any(|c| !is_trivial_default_constructor(c, view))
            {
                continue;
            }
            let subtypes: Vec<Type> = hierarchy
                .direct_subtypes(ty)
                .iter()
                .copied()
                .filter(|sub| view.is_program(*sub))
                .collect();
            let [subtype] = subtypes.as_slice() else { continue };
            if hierarchy.direct_subtypes(ty).len() != 1 {
                continue;
            }
            // one fold per subclass per pass keeps the groups disjoint
            if !claimed.insert(*subtype) || claimed.contains(&ty) {
                continue;
            }
            claimed.insert(ty);
            candidates.push((ty, *subtype));
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut builder = GraphLens::builder();
        let mut merged = 0usize;
        for (source, target) in candidates {
            let Some(source_class) = view.program_class(source) else { continue };
            let Some(target_class) = view.program_class(target) else { continue };
            // moved methods must not collide with virtual dispatch
            if source_class
                .virtual_methods(&pool)
                .any(|m| target_class.has_method(&m.reference.signature))
            {
                debug!(
                    class = %pool.type_descriptor(source),
                    "vertical merge candidate has overridden methods; skipped"
                );
                continue;
            }

            let new_superclass = source_class.superclass;
            let source_interfaces = source_class.interfaces.clone();
            let moved: Vec<_> = source_class
                .methods
                .iter()
                .filter(|m| !m.is_instance_initializer(&pool))
                .cloned()
                .collect();
            let mut taken: HashSet<MethodSignature> = target_class
                .methods
                .iter()
                .map(|m| m.reference.signature.clone())
                .collect();

            let mut relocations = Vec::new();
            for method in moved {
                let base = pool.name_text(method.reference.signature.name).to_string();
                let fresh = disambiguate(&base, |candidate| {
                    let name = pool.intern_name(candidate);
                    taken.contains(&MethodSignature::new(
                        name,
                        method.reference.signature.parameters.iter().copied(),
                        method.reference.signature.return_type,
                    ))
                });
                let signature = MethodSignature::new(
                    pool.intern_name(&fresh),
                    method.reference.signature.parameters.iter().copied(),
                    method.reference.signature.return_type,
                );
                taken.insert(signature.clone());
                let mut relocated = method.clone();
                relocated.reference = method.reference.with_holder(target);
                relocated.reference.signature = signature;
                builder.merge_method(method.reference.clone(), relocated.reference.clone());
                relocations.push(relocated);
            }

            view.remove_program_class(source);
            let target_class = view
                .program_class_mut(target)
                .ok_or_else(|| {
                    DriverError::InvariantViolation("vertical merge target vanished".to_string())
                })?;
            target_class.superclass = new_superclass;
            // conformance the subclass previously inherited through the
            // folded superclass moves onto it explicitly
            for interface in source_interfaces {
                if !target_class.interfaces.contains(&interface) {
                    target_class.interfaces.push(interface);
                }
            }
            target_class.methods.extend(relocations);
            builder.merge_type(source, target);
            cx.state.vertically_merged.insert(target);
            merged += 1;
        }

        if merged == 0 {
            return Ok(None);
        }
        info!(merged, "vertical class merging complete");
        Ok(Some(builder.build(&pool)?))
    }
}

fn collect_instantiated(view: &ApplicationView) -> HashSet<Type> {
    let mut instantiated = HashSet::new();
    for class in view.program_classes() {
        for method in &class.methods {
            let Some(code) = &method.code else { continue };
            for block in code.blocks() {
                for instruction in &block.instructions {
                    if let InstructionKind::NewInstance { ty } = &instruction.kind {
                        instantiated.insert(*ty);
                    }
                }
            }
        }
    }
    instantiated
}

/// A default constructor whose body only calls the superclass
/// constructor and returns
fn is_trivial_default_constructor(
    method: &dx_ir::MethodDefinition,
    view: &ApplicationView,
) -> bool {
    if !method.reference.signature.parameters.is_empty() {
        return false;
    }
    let Some(code) = &method.code else { return false };
    if code.blocks().len() != 1 {
        return false;
    }
    code.blocks()[0].instructions.iter().all(|instruction| {
        matches!(
            &instruction.kind,
            InstructionKind::Argument { .. } | InstructionKind::Return { value: None }
        ) || matches!(
            &instruction.kind,
            InstructionKind::Invoke { method: callee, .. }
                if callee.is_instance_initializer(view.pool())
        )
    })
}
