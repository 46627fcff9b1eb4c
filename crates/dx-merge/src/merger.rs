//! Merge action
//!
//! Fuses each merge group into its target: relocates fields, merges
//! constructors into class-id dispatchers, unifies or trampolines
//! virtual methods, and emits one lens for the whole pass. Any
//! invariant violation while planning a group discards that group
//! wholesale; discarding never fails the compilation.

use crate::grouping::{MergeGroup, PolicyPipeline};
use crate::policy::{collect_runtime_type_checks, MergeContext};
use dx_ir::{
    AccessFlags, ApplicationView, ClassDefinition, FieldDefinition, FieldReference, Instruction,
    InstructionKind, InvokeKind, IrCode, MethodDefinition, MethodReference, MethodSignature,
    SymbolPool, Type,
};
use dx_keep::{CompilerOptions, KeepOracle};
use dx_lens::{
    disambiguate, rewrite_code_with_prototypes, ExtraParameter, GraphLens, LensError,
    PrototypeChanges,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info};

/// Merger failure (lens construction only; group problems discard the
/// group instead)
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The pass lens failed validation
    #[error(transparent)]
    Lens(#[from] LensError),
}

/// Policy-driven horizontal class merger
#[derive(Debug)]
pub struct HorizontalClassMerger {
    pipeline: PolicyPipeline,
}

impl Default for HorizontalClassMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl HorizontalClassMerger {
    /// Merger with the standard policy battery
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline: PolicyPipeline::standard(),
        }
    }

    /// Merger with a custom battery
    #[must_use]
    pub fn with_pipeline(pipeline: PolicyPipeline) -> Self {
        Self { pipeline }
    }

    /// Run the merger over the view
    ///
    /// Returns the pass lens, or `None` when nothing merged.
    ///
    /// # Errors
    /// Only lens validation can fail; discarded groups are skipped.
    pub fn run(
        &self,
        view: &mut ApplicationView,
        oracle: &KeepOracle,
        options: &CompilerOptions,
        vertically_merged: &HashSet<Type>,
    ) -> Result<Option<GraphLens>, MergeError> {
        let pool = view.pool_arc();
        let groups = {
            let runtime_type_checks = collect_runtime_type_checks(view);
            let main_dex_types: HashSet<Type> = options
                .main_dex_classes
                .iter()
                .map(|descriptor| pool.intern_type(descriptor))
                .collect();
            let cx = MergeContext {
                view,
                oracle,
                options,
                runtime_type_checks: &runtime_type_checks,
                vertically_merged,
                main_dex_types: &main_dex_types,
            };
            self.pipeline.group(&cx)
        };
        if groups.is_empty() {
            return Ok(None);
        }

        let mut plans = Vec::new();
        for group in groups {
            match plan_group(view, &group, &pool) {
                Ok(plan) => plans.push(plan),
                Err(reason) => {
                    debug!(
                        target_class = %pool.type_descriptor(group.target),
                        reason,
                        "merge group discarded"
                    );
                }
            }
        }
        if plans.is_empty() {
            return Ok(None);
        }

        let mut builder = GraphLens::builder();
        let merged_groups = plans.len();
        for plan in plans {
            apply_plan(view, plan, &mut builder);
        }
        let lens = builder.build(&pool)?;
        info!(merged_groups, "horizontal class merging complete");
        Ok(Some(lens))
    }
}

/// Everything needed to fuse one group, computed read-only
struct MergePlan {
    target: Type,
    sources: Vec<Type>,
    class_id_field: FieldDefinition,
    relocated_fields: Vec<FieldDefinition>,
    added_methods: Vec<MethodDefinition>,
    removed_target_methods: Vec<MethodSignature>,
    field_merges: Vec<(FieldReference, FieldReference)>,
    method_merges: Vec<(MethodReference, MethodReference, PrototypeChanges)>,
}

fn plan_group(
    view: &ApplicationView,
    group: &MergeGroup,
    pool: &SymbolPool,
) -> Result<MergePlan, &'static str> {
    let target_class = view
        .program_class(group.target)
        .ok_or("target definition missing")?;
    let mut members: Vec<(i64, &ClassDefinition)> = Vec::with_capacity(group.len());
    for (index, ty) in group.members().enumerate() {
        let class = view.program_class(ty).ok_or("member definition missing")?;
        if class.superclass != target_class.superclass {
            return Err("superclass mismatch");
        }
        members.push((i64::try_from(index).unwrap_or(i64::MAX), class));
    }

    // a source type reachable only as an array element is not covered
    // by the lens type map; such groups are dropped wholesale
    let member_descriptors: HashSet<String> = members
        .iter()
        .map(|(_, class)| pool.type_descriptor(class.ty).to_string())
        .collect();
    if any_array_reference(view, pool, &member_descriptors) {
        return Err("member referenced as array element");
    }

    let with_clinit = members
        .iter()
        .filter(|(_, class)| class.class_initializer(pool).is_some())
        .count();
    if with_clinit > 1 {
        return Err("multiple class initializers");
    }

    // every member must declare the same virtual signature set; a
    // partially declared signature would change resolution on merge
    let virtual_signatures: Vec<HashSet<MethodSignature>> = members
        .iter()
        .map(|(_, class)| {
            class
                .virtual_methods(pool)
                .map(|m| m.reference.signature.clone())
                .collect()
        })
        .collect();
    let all_virtuals: HashSet<MethodSignature> =
        virtual_signatures.iter().flatten().cloned().collect();
    for signature in &all_virtuals {
        if !virtual_signatures.iter().all(|set| set.contains(signature)) {
            return Err("partial virtual method coverage");
        }
    }

    let target = group.target;
    let mut taken_field_names: HashSet<String> = target_class
        .fields
        .iter()
        .map(|f| pool.name_text(f.reference.name).to_string())
        .collect();

    let class_id_name = disambiguate("classId", |c| taken_field_names.contains(c));
    taken_field_names.insert(class_id_name.clone());
    let class_id_field = FieldDefinition::new(
        FieldReference::new(target, pool.intern_name(&class_id_name), pool.int_type()),
        AccessFlags::empty().with(AccessFlags::SYNTHETIC),
    );

    let mut relocated_fields = Vec::new();
    let mut field_merges = Vec::new();
    for (_, class) in members.iter().filter(|(_, c)| c.ty != target) {
        for field in &class.fields {
            let base = pool.name_text(field.reference.name).to_string();
            let fresh = disambiguate(&base, |c| taken_field_names.contains(c));
            taken_field_names.insert(fresh.clone());
            let relocated = FieldReference::new(target, pool.intern_name(&fresh), field.reference.ty);
            relocated_fields.push(FieldDefinition::new(relocated, field.flags));
            field_merges.push((field.reference, relocated));
        }
    }

    let mut final_signatures: HashSet<MethodSignature> = target_class
        .methods
        .iter()
        .map(|m| m.reference.signature.clone())
        .collect();
    let mut added_methods = Vec::new();
    let mut removed_target_methods = Vec::new();
    let mut method_merges: Vec<(MethodReference, MethodReference, PrototypeChanges)> = Vec::new();

    // constructors merge per original signature into one dispatcher
    // taking a trailing class-id int
    let mut constructors: IndexMap<MethodSignature, Vec<(i64, MethodDefinition)>> =
        IndexMap::new();
    for (class_id, class) in &members {
        for constructor in class.constructors(pool) {
            if constructor.code.is_none() {
                return Err("constructor without body");
            }
            constructors
                .entry(constructor.reference.signature.clone())
                .or_default()
                .push((*class_id, constructor.clone()));
        }
    }
    for (signature, bodies) in constructors {
        if final_signatures.remove(&signature) {
            removed_target_methods.push(signature.clone());
        }

        let mut dispatcher_parameters: Vec<Type> = signature.parameters.to_vec();
        dispatcher_parameters.push(pool.int_type());
        let mut extra_nulls = 0usize;
        loop {
            let candidate = MethodSignature::new(
                signature.name,
                dispatcher_parameters.iter().copied(),
                signature.return_type,
            );
            if !final_signatures.contains(&candidate) {
                break;
            }
            dispatcher_parameters.push(pool.object_type());
            extra_nulls += 1;
        }
        let dispatcher_signature = MethodSignature::new(
            signature.name,
            dispatcher_parameters.iter().copied(),
            signature.return_type,
        );
        let dispatcher_reference = MethodReference::new(target, dispatcher_signature.clone());

        let mut branches = Vec::new();
        for (class_id, constructor) in &bodies {
            let body_name = disambiguate(&format!("init${class_id}"), |candidate| {
                let name = pool.intern_name(candidate);
                final_signatures.contains(&MethodSignature::new(
                    name,
                    signature.parameters.iter().copied(),
                    pool.void_type(),
                ))
            });
            let body_signature = MethodSignature::new(
                pool.intern_name(&body_name),
                signature.parameters.iter().copied(),
                pool.void_type(),
            );
            let body_reference = MethodReference::new(target, body_signature.clone());
            final_signatures.insert(body_signature);
            added_methods.push(MethodDefinition::with_code(
                body_reference.clone(),
                AccessFlags::empty()
                    .with(AccessFlags::PRIVATE)
                    .with(AccessFlags::SYNTHETIC),
                constructor.code.clone().unwrap_or_default(),
            ));
            branches.push((*class_id, body_reference));

            let mut changes =
                PrototypeChanges::none().with_extra_parameter(ExtraParameter::ConstantInt(*class_id));
            for _ in 0..extra_nulls {
                changes = changes.with_extra_parameter(ExtraParameter::UnusedNull);
            }
            method_merges.push((
                constructor.reference.clone(),
                dispatcher_reference.clone(),
                changes,
            ));
        }

        let dispatcher_code = build_dispatcher_body(
            pool,
            target,
            class_id_field.reference,
            &signature.parameters,
            &branches,
        );
        final_signatures.insert(dispatcher_signature);
        added_methods.push(MethodDefinition::with_code(
            dispatcher_reference,
            AccessFlags::empty()
                .with(AccessFlags::PUBLIC)
                .with(AccessFlags::SYNTHETIC),
            dispatcher_code,
        ));
    }

    // virtual methods: identical bodies unify onto the target, the rest
    // dispatch through a class-id trampoline
    let normalization = normalization_lens(pool, &members, target, &field_merges);
    let mut sorted_virtuals: Vec<MethodSignature> = all_virtuals.into_iter().collect();
    sorted_virtuals.sort_by_key(|signature| signature.describe(pool));
    for signature in sorted_virtuals {
        let mut implementations: Vec<(i64, Type, MethodDefinition)> = Vec::new();
        for (class_id, class) in &members {
            let Some(method) = class.method(&signature) else {
                return Err("virtual signature disappeared");
            };
            if method.code.is_none() {
                return Err("virtual method without body");
            }
            implementations.push((*class_id, class.ty, method.clone()));
        }

        let target_reference = MethodReference::new(target, signature.clone());
        if unifiable(&implementations, &normalization, pool) {
            for (_, holder, method) in &implementations {
                if *holder != target {
                    method_merges.push((
                        method.reference.clone(),
                        target_reference.clone(),
                        PrototypeChanges::none(),
                    ));
                }
            }
            continue;
        }

        let flags = implementations
            .iter()
            .find(|(_, holder, _)| *holder == target)
            .map_or_else(
                || AccessFlags::empty().with(AccessFlags::PUBLIC),
                |(_, _, method)| method.flags,
            );
        let mut branches = Vec::new();
        let base_name = pool.name_text(signature.name).to_string();
        for (class_id, _, method) in &implementations {
            let body_name = disambiguate(&format!("{base_name}${class_id}"), |candidate| {
                let name = pool.intern_name(candidate);
                final_signatures.contains(&MethodSignature::new(
                    name,
                    signature.parameters.iter().copied(),
                    signature.return_type,
                ))
            });
            let body_signature = MethodSignature::new(
                pool.intern_name(&body_name),
                signature.parameters.iter().copied(),
                signature.return_type,
            );
            let body_reference = MethodReference::new(target, body_signature.clone());
            final_signatures.insert(body_signature);
            added_methods.push(MethodDefinition::with_code(
                body_reference.clone(),
                AccessFlags::empty()
                    .with(AccessFlags::PRIVATE)
                    .with(AccessFlags::SYNTHETIC),
                method.code.clone().unwrap_or_default(),
            ));
            branches.push((*class_id, body_reference));
        }

        removed_target_methods.push(signature.clone());
        let trampoline_code = build_trampoline_body(
            pool,
            target,
            class_id_field.reference,
            &signature,
            &branches,
        );
        added_methods.push(MethodDefinition::with_code(
            target_reference.clone(),
            flags,
            trampoline_code,
        ));
        for (_, holder, method) in &implementations {
            if *holder != target {
                method_merges.push((
                    method.reference.clone(),
                    target_reference.clone(),
                    PrototypeChanges::none(),
                ));
            }
        }
    }

    // remaining members: statics, privates, and at most one class
    // initializer relocate with rename-on-collision
    for (_, class) in members.iter().filter(|(_, c)| c.ty != target) {
        for method in &class.methods {
            if method.is_instance_initializer(pool) || method.is_virtual(pool) {
                continue;
            }
            let base = pool.name_text(method.reference.signature.name).to_string();
            let fresh = disambiguate(&base, |candidate| {
                let name = pool.intern_name(candidate);
                final_signatures.contains(&MethodSignature::new(
                    name,
                    method.reference.signature.parameters.iter().copied(),
                    method.reference.signature.return_type,
                ))
            });
            let relocated_signature = MethodSignature::new(
                pool.intern_name(&fresh),
                method.reference.signature.parameters.iter().copied(),
                method.reference.signature.return_type,
            );
            let relocated_reference = MethodReference::new(target, relocated_signature.clone());
            final_signatures.insert(relocated_signature);
            let mut relocated = method.clone();
            relocated.reference = relocated_reference.clone();
            added_methods.push(relocated);
            method_merges.push((
                method.reference.clone(),
                relocated_reference,
                PrototypeChanges::none(),
            ));
        }
    }

    Ok(MergePlan {
        target,
        sources: group.sources.clone(),
        class_id_field,
        relocated_fields,
        added_methods,
        removed_target_methods,
        field_merges,
        method_merges,
    })
}

fn apply_plan(view: &mut ApplicationView, plan: MergePlan, builder: &mut dx_lens::GraphLensBuilder) {
    for source in &plan.sources {
        view.remove_program_class(*source);
        builder.merge_type(*source, plan.target);
    }
    for (from, to) in &plan.field_merges {
        builder.merge_field(*from, *to);
    }
    for (from, to, changes) in plan.method_merges {
        builder.set_prototype_changes(from.clone(), changes);
        builder.merge_method(from, to);
    }

    let target = view
        .program_class_mut(plan.target)
        .expect("merge target exists");
    for signature in &plan.removed_target_methods {
        target.take_method(signature);
    }
    target.fields.push(plan.class_id_field);
    target.fields.extend(plan.relocated_fields);
    target.methods.extend(plan.added_methods);
}

/// Whether any program reference uses a member type as an array element
fn any_array_reference(
    view: &ApplicationView,
    pool: &SymbolPool,
    member_descriptors: &HashSet<String>,
) -> bool {
    let is_member_array = |ty: Type| {
        let descriptor = pool.type_descriptor(ty);
        let element = descriptor.trim_start_matches('[');
        descriptor.starts_with('[') && member_descriptors.contains(element)
    };
    for class in view.program_classes() {
        for field in &class.fields {
            if is_member_array(field.reference.ty) {
                return true;
            }
        }
        for method in &class.methods {
            let signature = &method.reference.signature;
            if signature.parameters.iter().any(|p| is_member_array(*p))
                || is_member_array(signature.return_type)
            {
                return true;
            }
            let Some(code) = &method.code else { continue };
            for reference in code.references() {
                match reference {
                    dx_ir::IrReference::Type(ty) if is_member_array(ty) => return true,
                    dx_ir::IrReference::Field(field) if is_member_array(field.ty) => return true,
                    _ => {}
                }
            }
        }
    }
    false
}

/// Lens used only to normalize member bodies before equality
/// comparison: maps every member type and relocated field onto its
/// post-merge form
fn normalization_lens(
    pool: &SymbolPool,
    members: &[(i64, &ClassDefinition)],
    target: Type,
    field_merges: &[(FieldReference, FieldReference)],
) -> GraphLens {
    let mut builder = GraphLens::builder();
    for (_, class) in members {
        if class.ty != target {
            builder.merge_type(class.ty, target);
        }
    }
    for (from, to) in field_merges {
        builder.merge_field(*from, *to);
    }
    builder
        .build(pool)
        .expect("merge-flavored entries are never rejected")
}

/// Whether all implementations have identical post-merge bodies and
/// none invokes a member constructor (those dispatch per class-id and
/// must stay separate)
fn unifiable(
    implementations: &[(i64, Type, MethodDefinition)],
    normalization: &GraphLens,
    pool: &SymbolPool,
) -> bool {
    let mut normalized: Vec<IrCode> = Vec::with_capacity(implementations.len());
    for (_, _, method) in implementations {
        let Some(code) = &method.code else {
            return false;
        };
        let mut clone = code.clone();
        rewrite_code_with_prototypes(&mut clone, normalization);
        for reference in clone.references() {
            if let dx_ir::IrReference::Method(method_reference) = reference {
                if method_reference.is_instance_initializer(pool)
                    && normalization.map_type(method_reference.holder) != method_reference.holder
                {
                    return false;
                }
            }
        }
        normalized.push(clone);
    }
    normalized.windows(2).all(|pair| pair[0] == pair[1])
}

fn argument_index(index: usize) -> u16 {
    u16::try_from(index).expect("argument index fits in u16")
}

/// Dispatcher constructor body: stores the class-id and branches to the
/// preserved constructor body selected by it
fn build_dispatcher_body(
    pool: &SymbolPool,
    target: Type,
    class_id_field: FieldReference,
    parameters: &[Type],
    branches: &[(i64, MethodReference)],
) -> IrCode {
    let mut code = IrCode::new();
    let entry = code.entry();

    let receiver = code.new_value();
    let mut arguments = vec![receiver];
    let mut loads = vec![Instruction::with_dest(
        receiver,
        InstructionKind::Argument {
            index: 0,
            ty: target,
        },
    )];
    for (position, parameter) in parameters.iter().enumerate() {
        let value = code.new_value();
        loads.push(Instruction::with_dest(
            value,
            InstructionKind::Argument {
                index: argument_index(position + 1),
                ty: *parameter,
            },
        ));
        arguments.push(value);
    }
    let class_id = code.new_value();
    loads.push(Instruction::with_dest(
        class_id,
        InstructionKind::Argument {
            index: argument_index(parameters.len() + 1),
            ty: pool.int_type(),
        },
    ));
    loads.push(Instruction::effect(InstructionKind::InstancePut {
        field: class_id_field,
        object: receiver,
        value: class_id,
    }));

    let branch_blocks: Vec<_> = branches
        .iter()
        .map(|(_, body)| {
            let block = code.new_block();
            let call = Instruction::effect(InstructionKind::Invoke {
                kind: InvokeKind::Direct,
                method: body.clone(),
                arguments: arguments.iter().copied().collect(),
            });
            code.block_mut(block).instructions.push(call);
            code.block_mut(block)
                .instructions
                .push(Instruction::effect(InstructionKind::Return { value: None }));
            block
        })
        .collect();

    code.block_mut(entry).instructions.extend(loads);
    emit_dispatch_chain(&mut code, entry, class_id, branches, &branch_blocks);
    code
}

/// Trampoline body for virtual methods with differing implementations:
/// reads the class-id field and branches to the preserved body
fn build_trampoline_body(
    pool: &SymbolPool,
    target: Type,
    class_id_field: FieldReference,
    signature: &MethodSignature,
    branches: &[(i64, MethodReference)],
) -> IrCode {
    let mut code = IrCode::new();
    let entry = code.entry();
    let is_void = signature.return_type == pool.void_type();

    let receiver = code.new_value();
    let mut arguments = vec![receiver];
    let mut loads = vec![Instruction::with_dest(
        receiver,
        InstructionKind::Argument {
            index: 0,
            ty: target,
        },
    )];
    for (position, parameter) in signature.parameters.iter().enumerate() {
        let value = code.new_value();
        loads.push(Instruction::with_dest(
            value,
            InstructionKind::Argument {
                index: argument_index(position + 1),
                ty: *parameter,
            },
        ));
        arguments.push(value);
    }
    let class_id = code.new_value();
    loads.push(Instruction::with_dest(
        class_id,
        InstructionKind::InstanceGet {
            field: class_id_field,
            object: receiver,
        },
    ));

    let branch_blocks: Vec<_> = branches
        .iter()
        .map(|(_, body)| {
            let block = code.new_block();
            let invoke = InstructionKind::Invoke {
                kind: InvokeKind::Direct,
                method: body.clone(),
                arguments: arguments.iter().copied().collect(),
            };
            if is_void {
                code.block_mut(block)
                    .instructions
                    .push(Instruction::effect(invoke));
                code.block_mut(block)
                    .instructions
                    .push(Instruction::effect(InstructionKind::Return { value: None }));
            } else {
                let result = code.new_value();
                code.block_mut(block)
                    .instructions
                    .push(Instruction::with_dest(result, invoke));
                code.block_mut(block)
                    .instructions
                    .push(Instruction::effect(InstructionKind::Return {
                        value: Some(result),
                    }));
            }
            block
        })
        .collect();

    code.block_mut(entry).instructions.extend(loads);
    emit_dispatch_chain(&mut code, entry, class_id, branches, &branch_blocks);
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_keep::{KeepKind, KeepRule, RuleSet};
    use dx_test_utils::{test_view, value_holder_class};
    use pretty_assertions::assert_eq;

    fn run_merger(
        rules: Vec<KeepRule>,
    ) -> (ApplicationView, Option<GraphLens>) {
        let mut view = test_view();
        let pool = view.pool_arc();
        view.add_program_class(value_holder_class(&pool, "LA;", "x"))
            .unwrap();
        view.add_program_class(value_holder_class(&pool, "LB;", "y"))
            .unwrap();

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::new(rules).unwrap(), &options);
        let lens = HorizontalClassMerger::new()
            .run(&mut view, &oracle, &options, &HashSet::new())
            .unwrap();
        (view, lens)
    }

    #[test]
    fn two_value_holders_fuse_into_one_target() {
        let (view, lens) = run_merger(vec![]);
        let pool = view.pool_arc();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let lens = lens.expect("merge produced a lens");

        // A is the lexicographically smallest descriptor, so the target
        assert!(view.program_class(a).is_some());
        assert!(view.program_class(b).is_none());
        assert_eq!(lens.map_type(b), a);

        let target = view.program_class(a).unwrap();
        // union of instance fields plus the synthesized class-id slot
        let field_names: Vec<String> = target
            .fields
            .iter()
            .map(|f| pool.name_text(f.reference.name).to_string())
            .collect();
        assert!(field_names.contains(&"x".to_string()));
        assert!(field_names.contains(&"y".to_string()));
        assert!(field_names.contains(&"classId".to_string()));
    }

    #[test]
    fn constructors_dispatch_on_class_id() {
        let (view, lens) = run_merger(vec![]);
        let pool = view.pool_arc();
        let a = pool.intern_type("LA;");
        let b = pool.intern_type("LB;");
        let lens = lens.unwrap();

        let a_init = MethodReference::new(
            a,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        );
        let b_init = MethodReference::new(
            b,
            MethodSignature::new(pool.init_name(), [pool.int_type()], pool.void_type()),
        );

        let a_lookup = lens.map_method(&a_init);
        let b_lookup = lens.map_method(&b_init);
        // both land on the same dispatcher, distinguished by class-id
        assert_eq!(a_lookup.reference, b_lookup.reference);
        assert_eq!(a_lookup.reference.signature.arity(), 2);
        assert_eq!(
            a_lookup.prototype_changes.extra_parameters(),
            &[ExtraParameter::ConstantInt(0)]
        );
        assert_eq!(
            b_lookup.prototype_changes.extra_parameters(),
            &[ExtraParameter::ConstantInt(1)]
        );

        // dispatcher exists on the target with the widened signature
        let target = view.program_class(a).unwrap();
        assert!(target.has_method(&a_lookup.reference.signature));
        for method in &target.methods {
            if let Some(code) = &method.code {
                assert_eq!(code.verify(), Ok(()));
            }
        }
    }

    #[test]
    fn pinned_member_blocks_the_group() {
        let (view, lens) = run_merger(vec![KeepRule::class_rule(KeepKind::Pin, "LA;")]);
        let pool = view.pool_arc();

        assert!(lens.is_none());
        assert!(view.program_class(pool.intern_type("LA;")).is_some());
        assert!(view.program_class(pool.intern_type("LB;")).is_some());
    }

    #[test]
    fn relocated_field_rename_avoids_collisions() {
        let mut view = test_view();
        let pool = view.pool_arc();
        view.add_program_class(value_holder_class(&pool, "LA;", "x"))
            .unwrap();
        view.add_program_class(value_holder_class(&pool, "LB;", "x"))
            .unwrap();

        let options = CompilerOptions::default();
        let oracle = KeepOracle::new(RuleSet::empty(), &options);
        let lens = HorizontalClassMerger::new()
            .run(&mut view, &oracle, &options, &HashSet::new())
            .unwrap()
            .unwrap();

        let b = pool.intern_type("LB;");
        let a = pool.intern_type("LA;");
        let source_field = FieldReference::new(b, pool.intern_name("x"), pool.int_type());
        let mapped = lens.map_field(source_field);
        assert_eq!(mapped.holder, a);
        assert_eq!(pool.name_text(mapped.name).as_ref(), "x$1");
    }
}

/// Append the class-id comparison chain: branch `i` is taken when the
/// class-id equals its id; the last branch is the fall-through
fn emit_dispatch_chain(
    code: &mut IrCode,
    entry: dx_ir::BlockId,
    class_id: dx_ir::Value,
    branches: &[(i64, MethodReference)],
    branch_blocks: &[dx_ir::BlockId],
) {
    debug_assert_eq!(branches.len(), branch_blocks.len());
    if branches.len() == 1 {
        code.block_mut(entry)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto {
                target: branch_blocks[0],
            }));
        return;
    }

    let check_blocks: Vec<_> = (1..branches.len() - 1).map(|_| code.new_block()).collect();
    let mut current = entry;
    for position in 0..branches.len() - 1 {
        let next = if position == branches.len() - 2 {
            branch_blocks[branches.len() - 1]
        } else {
            check_blocks[position]
        };
        let constant = code.new_value();
        code.block_mut(current).instructions.push(Instruction::with_dest(
            constant,
            InstructionKind::ConstInt {
                value: branches[position].0,
            },
        ));
        code.block_mut(current)
            .instructions
            .push(Instruction::effect(InstructionKind::IfEqInt {
                lhs: class_id,
                rhs: constant,
                then_target: branch_blocks[position],
                else_target: next,
            }));
        if position + 1 < branches.len() - 1 {
            current = check_blocks[position];
        }
    }
}
