//! Class inlining transformation
//!
//! Per-method elimination of short-lived local objects. A root is a
//! `new T(...)` allocation or a static-final singleton read backed by a
//! trivial class initializer. Eligibility is a pure function of the
//! current IR state; the transformation alternates force-inlining with
//! re-classification until only field accesses remain, then replaces
//! field reads with tracked values and deletes the allocation.
//!
//! Every eligibility failure silently skips the candidate; the method
//! is left semantically unchanged on skip.

use crate::inliner::force_inline;
use dx_ir::{
    ApplicationView, BlockId, ConstArgument, FieldReference, Instruction, InstructionKind,
    InvokeKind, IrCode, MethodDefinition, Phi, SymbolPool, TrivialInitializerInfo, Type, Value,
};
use dx_keep::{CompilerOptions, KeepOracle};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Upper bound on inline/re-check rounds per candidate; exceeding it
/// means the candidate keeps growing and is skipped
const MAX_ROUNDS: usize = 32;

/// The class inliner
#[derive(Debug)]
pub struct ClassInliner {
    budget: u32,
}

impl ClassInliner {
    /// Inliner honoring the configured size budget
    #[must_use]
    pub fn new(options: &CompilerOptions) -> Self {
        Self {
            budget: options.class_inlining_budget,
        }
    }

    /// Process one method; returns the rewritten body when any root was
    /// eliminated
    #[must_use]
    pub fn process_method(
        &self,
        method: &MethodDefinition,
        view: &ApplicationView,
        oracle: &KeepOracle,
    ) -> Option<IrCode> {
        let code = method.code.as_ref()?;
        let mut current = code.clone();
        let mut changed = false;
        let mut skipped: HashSet<Value> = HashSet::new();

        while let Some(candidate) = find_candidate(&current, view, oracle, &skipped) {
            let root = candidate.root;
            match try_eliminate(&current, &candidate, view, self.budget) {
                Ok(rewritten) => {
                    current = rewritten;
                    changed = true;
                }
                Err(reason) => {
                    debug!(
                        class = %view.pool().type_descriptor(candidate.ty),
                        reason,
                        "class-inlining candidate skipped"
                    );
                    skipped.insert(root);
                }
            }
        }

        if changed {
            current.canonicalize_trivial_phis();
            Some(current)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
enum CandidateKind {
    NewInstance,
    Singleton(TrivialInitializerInfo),
}

#[derive(Debug, Clone)]
struct Candidate {
    root: Value,
    ty: Type,
    kind: CandidateKind,
}

/// Whether `ty` may be class-inlined at all
fn class_eligible(ty: Type, view: &ApplicationView, oracle: &KeepOracle) -> bool {
    let pool = view.pool();
    let Some(class) = view.program_class(ty) else {
        return false;
    };
    if class.flags.is_interface() || class.flags.is_abstract() {
        return false;
    }
    if !oracle.class_constraints(pool, ty).allows_inlining() {
        return false;
    }
    // direct Object subclass only: merging semantics stay trivial
    if class.superclass != Some(pool.object_type()) {
        return false;
    }
    if class.declares_finalizer(pool) {
        return false;
    }
    // loading must not trigger foreign initialization
    class
        .class_initializer(pool)
        .map_or(true, |clinit| {
            clinit.optimization_info().trivial_initializer().is_some()
        })
}

fn find_candidate(
    code: &IrCode,
    view: &ApplicationView,
    oracle: &KeepOracle,
    skipped: &HashSet<Value>,
) -> Option<Candidate> {
    for block in code.blocks() {
        for instruction in &block.instructions {
            let Some(dest) = instruction.dest else { continue };
            if skipped.contains(&dest) {
                continue;
            }
            match &instruction.kind {
                InstructionKind::NewInstance { ty }
                    if class_eligible(*ty, view, oracle) =>
                {
                    return Some(Candidate {
                        root: dest,
                        ty: *ty,
                        kind: CandidateKind::NewInstance,
                    });
                }
                InstructionKind::StaticGet { field }
                    if field.holder == field.ty && class_eligible(field.ty, view, oracle) =>
                {
                    let class = view.program_class(field.ty)?;
                    let declared = class.field(field.name, field.ty)?;
                    if !declared.flags.is_static() || !declared.flags.is_final() {
                        continue;
                    }
                    let trivial = class
                        .class_initializer(view.pool())
                        .and_then(|clinit| {
                            clinit.optimization_info().trivial_initializer().cloned()
                        })
                        .filter(|info| info.field == *field);
                    if let Some(info) = trivial {
                        return Some(Candidate {
                            root: dest,
                            ty: field.ty,
                            kind: CandidateKind::Singleton(info),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// One classified use of the root value
#[derive(Debug, Clone, PartialEq, Eq)]
enum UseSite {
    FieldGet(BlockId, usize),
    FieldPut(BlockId, usize),
    /// Constructor call on the root; inlined
    CtorCall(BlockId, usize),
    /// Superclass constructor call; removed at elimination time
    SuperCtor(BlockId, usize),
    /// Eligibility-annotated call with the root as receiver or a
    /// non-escaping argument; inlined
    InlineCall(BlockId, usize),
    /// Root passed where the parameter is unused; nulled out
    NullArgument(BlockId, usize, usize),
}

fn classify_uses(
    code: &IrCode,
    root: Value,
    ty: Type,
    view: &ApplicationView,
    reject_field_writes: bool,
) -> Result<Vec<UseSite>, &'static str> {
    let pool = view.pool();
    let mut sites = Vec::new();
    for block in code.blocks() {
        for phi in &block.phis {
            if phi.operands.iter().any(|(_, value)| *value == root) {
                return Err("root flows into a phi");
            }
        }
        for (index, instruction) in block.instructions.iter().enumerate() {
            let uses = instruction.kind.used_values();
            if !uses.contains(&root) {
                continue;
            }
            match &instruction.kind {
                InstructionKind::InstanceGet { field, object } => {
                    if *object != root || field.holder != ty {
                        return Err("field read outside the root's class");
                    }
                    sites.push(UseSite::FieldGet(block.id, index));
                }
                InstructionKind::InstancePut {
                    field,
                    object,
                    value,
                } => {
                    if *object != root || field.holder != ty || *value == root {
                        return Err("field write outside the root's class");
                    }
                    if reject_field_writes {
                        return Err("write to singleton state");
                    }
                    sites.push(UseSite::FieldPut(block.id, index));
                }
                InstructionKind::Invoke {
                    kind,
                    method,
                    arguments,
                } => {
                    let receiver_is_root =
                        !matches!(kind, InvokeKind::Static) && arguments.first() == Some(&root);
                    let root_in_tail = arguments.iter().skip(1).any(|a| *a == root);
                    if receiver_is_root && !root_in_tail {
                        if method.is_instance_initializer(pool) {
                            if method.holder == ty {
                                sites.push(UseSite::CtorCall(block.id, index));
                            } else if method.holder == pool.object_type() {
                                sites.push(UseSite::SuperCtor(block.id, index));
                            } else {
                                return Err("constructor of a foreign class");
                            }
                            continue;
                        }
                        let Some(target) = view.resolve_method(method) else {
                            return Err("receiver call does not resolve");
                        };
                        if target.code.is_none() {
                            return Err("receiver call resolves outside the program");
                        }
                        let info = target.optimization_info();
                        if !info.does_not_leak_receiver() {
                            return Err("receiver call may leak");
                        }
                        if info.returns_receiver()
                            && instruction.dest.map_or(false, |dest| value_is_used(code, dest))
                        {
                            return Err("receiver call returns the root into a live value");
                        }
                        sites.push(UseSite::InlineCall(block.id, index));
                        continue;
                    }
                    // root passed as an ordinary argument
                    let Some(target) = view.resolve_method(method) else {
                        return Err("argument pass does not resolve");
                    };
                    let info = target.optimization_info();
                    let receiver_slots = usize::from(!matches!(kind, InvokeKind::Static));
                    let mut eligible = true;
                    for (position, argument) in arguments.iter().enumerate() {
                        if *argument != root || (receiver_slots == 1 && position == 0) {
                            continue;
                        }
                        let declared = position - receiver_slots;
                        match info.parameter_usage(declared) {
                            dx_ir::ParameterUsage::Unused => {
                                sites.push(UseSite::NullArgument(block.id, index, position));
                            }
                            dx_ir::ParameterUsage::NonEscapingReceiver => {
                                if target.code.is_none() {
                                    eligible = false;
                                    break;
                                }
                                sites.push(UseSite::InlineCall(block.id, index));
                                break;
                            }
                            dx_ir::ParameterUsage::Escapes => {
                                eligible = false;
                                break;
                            }
                        }
                    }
                    if !eligible {
                        return Err("argument pass may escape");
                    }
                    if receiver_is_root && root_in_tail {
                        return Err("root is both receiver and argument");
                    }
                }
                _ => return Err("root escapes through an ineligible use"),
            }
        }
    }
    Ok(sites)
}

fn value_is_used(code: &IrCode, value: Value) -> bool {
    for block in code.blocks() {
        for phi in &block.phis {
            if phi.operands.iter().any(|(_, operand)| *operand == value) {
                return true;
            }
        }
        for instruction in &block.instructions {
            if instruction.kind.used_values().contains(&value) {
                return true;
            }
        }
    }
    false
}

fn try_eliminate(
    original: &IrCode,
    candidate: &Candidate,
    view: &ApplicationView,
    budget: u32,
) -> Result<IrCode, &'static str> {
    let pool = view.pool();
    let mut code = original.clone();
    if let CandidateKind::Singleton(info) = &candidate.kind {
        materialize_singleton(&mut code, candidate.root, candidate.ty, info)?;
    }

    let exempt_from_budget = |holder: Type| {
        view.program_class(holder)
            .map_or(false, dx_ir::ClassDefinition::is_synthetic_kotlin_lambda)
    };

    let mut spent = 0usize;
    let mut rounds = 0usize;
    loop {
        rounds += 1;
        if rounds > MAX_ROUNDS {
            return Err("inlining did not converge");
        }
        let first_round = rounds == 1;
        let reject_writes =
            first_round && matches!(candidate.kind, CandidateKind::Singleton(_));
        let sites = classify_uses(&code, candidate.root, candidate.ty, view, reject_writes)?;

        let next = sites.iter().find_map(|site| match site {
            UseSite::CtorCall(block, index) | UseSite::InlineCall(block, index) => {
                Some((*block, *index))
            }
            _ => None,
        });
        let Some((block, index)) = next else { break };

        let InstructionKind::Invoke { method, .. } =
            code.block(block).instructions[index].kind.clone()
        else {
            return Err("call site vanished");
        };
        let target = view
            .resolve_method(&method)
            .ok_or("callee disappeared during inlining")?;
        let callee = target.code.as_ref().ok_or("callee without body")?;
        if !exempt_from_budget(target.reference.holder) {
            spent += callee.instruction_count();
            if spent > budget as usize {
                return Err("combined size budget exceeded");
            }
        }
        force_inline(&mut code, block, index, callee).map_err(|_| "force-inline failed")?;
    }

    // null out arguments whose parameters are unused
    let sites = classify_uses(&code, candidate.root, candidate.ty, view, false)?;
    apply_null_arguments(&mut code, &sites);

    eliminate_root(&mut code, candidate.root, candidate.ty, pool)?;
    code.canonicalize_trivial_phis();
    if code.verify().is_err() {
        debug_assert!(false, "class inlining produced inconsistent SSA");
        return Err("ssa verification failed");
    }
    Ok(code)
}

/// Rewrite a singleton read into an equivalent local allocation plus
/// constructor call with the recorded constant arguments
fn materialize_singleton(
    code: &mut IrCode,
    root: Value,
    ty: Type,
    info: &TrivialInitializerInfo,
) -> Result<(), &'static str> {
    let site = code
        .blocks()
        .iter()
        .find_map(|block| {
            block.instructions.iter().enumerate().find_map(|(index, instruction)| {
                match &instruction.kind {
                    InstructionKind::StaticGet { field }
                        if instruction.dest == Some(root) && *field == info.field =>
                    {
                        Some((block.id, index))
                    }
                    _ => None,
                }
            })
        })
        .ok_or("singleton read vanished")?;
    let (block, index) = site;

    let mut constants = Vec::with_capacity(info.arguments.len());
    let mut inserted = Vec::with_capacity(info.arguments.len() + 1);
    for argument in &info.arguments {
        let value = code.new_value();
        let kind = match argument {
            ConstArgument::Int(constant) => InstructionKind::ConstInt { value: *constant },
            ConstArgument::Null => InstructionKind::ConstNull,
            ConstArgument::Class(class) => InstructionKind::ConstClass { ty: *class },
            ConstArgument::String(text) => InstructionKind::ConstString { value: *text },
        };
        inserted.push(Instruction::with_dest(value, kind));
        constants.push(value);
    }
    let mut arguments = vec![root];
    arguments.extend(constants);
    inserted.push(Instruction::effect(InstructionKind::Invoke {
        kind: InvokeKind::Direct,
        method: info.constructor.clone(),
        arguments: arguments.into_iter().collect(),
    }));

    let block = code.block_mut(block);
    block.instructions[index] =
        Instruction::with_dest(root, InstructionKind::NewInstance { ty });
    block.instructions.splice(index + 1..index + 1, inserted);
    Ok(())
}

fn apply_null_arguments(code: &mut IrCode, sites: &[UseSite]) {
    let mut grouped: IndexMap<(BlockId, usize), Vec<usize>> = IndexMap::new();
    for site in sites {
        if let UseSite::NullArgument(block, index, position) = site {
            grouped.entry((*block, *index)).or_default().push(*position);
        }
    }
    let mut ordered: Vec<((BlockId, usize), Vec<usize>)> = grouped.into_iter().collect();
    ordered.sort_by(|a, b| (a.0 .0, std::cmp::Reverse(a.0 .1)).cmp(&(b.0 .0, std::cmp::Reverse(b.0 .1))));

    for ((block, index), positions) in ordered {
        let null_value = code.new_value();
        let block_ref = code.block_mut(block);
        if let InstructionKind::Invoke { arguments, .. } = &mut block_ref.instructions[index].kind
        {
            for position in positions {
                arguments[position] = null_value;
            }
        }
        block_ref
            .instructions
            .insert(index, Instruction::with_dest(null_value, InstructionKind::ConstNull));
    }
}

/// Replace field reads with tracked values, then remove all writes, the
/// allocation, and the superclass constructor call
fn eliminate_root(
    code: &mut IrCode,
    root: Value,
    ty: Type,
    pool: &SymbolPool,
) -> Result<(), &'static str> {
    let alloc = code
        .blocks()
        .iter()
        .find_map(|block| {
            block.instructions.iter().position(|instruction| {
                instruction.dest == Some(root)
                    && matches!(instruction.kind, InstructionKind::NewInstance { .. })
            })
            .map(|index| (block.id, index))
        })
        .ok_or("allocation vanished")?;
    let (alloc_block, alloc_index) = alloc;

    // fields touched through the root, in first-appearance order
    let mut fields: Vec<FieldReference> = Vec::new();
    for block in code.blocks() {
        for instruction in &block.instructions {
            match &instruction.kind {
                InstructionKind::InstanceGet { field, object } if *object == root => {
                    if !fields.contains(field) {
                        fields.push(*field);
                    }
                }
                InstructionKind::InstancePut { field, object, .. } if *object == root => {
                    if !fields.contains(field) {
                        fields.push(*field);
                    }
                }
                _ => {}
            }
        }
    }

    // default values (zero/null) defined right after the allocation
    let mut defaults: IndexMap<FieldReference, Value> = IndexMap::new();
    let mut default_instructions = Vec::with_capacity(fields.len());
    for field in &fields {
        let value = code.new_value();
        let kind = if pool.is_primitive(field.ty) {
            InstructionKind::ConstInt { value: 0 }
        } else {
            InstructionKind::ConstNull
        };
        default_instructions.push(Instruction::with_dest(value, kind));
        defaults.insert(*field, value);
    }
    code.block_mut(alloc_block).instructions.splice(
        alloc_index + 1..alloc_index + 1,
        default_instructions,
    );

    // forward (block, field) -> value analysis from the allocation
    let predecessors = code.predecessor_map();
    let order: Vec<BlockId> = {
        let rpo = code.reverse_postorder();
        let position: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let mut reachable: Vec<BlockId> = reachable_from(code, alloc_block);
        reachable.sort_by_key(|b| position.get(b).copied().unwrap_or(usize::MAX));
        reachable
    };

    let mut out_states: HashMap<BlockId, IndexMap<FieldReference, Value>> = HashMap::new();
    let mut replacements: Vec<(Value, Value)> = Vec::new();
    let mut removals: Vec<(BlockId, usize)> = Vec::new();
    let mut new_phis: Vec<(BlockId, Phi)> = Vec::new();

    for block_id in order {
        let mut state: IndexMap<FieldReference, Value> = if block_id == alloc_block {
            defaults.clone()
        } else {
            let preds = &predecessors[&block_id];
            let mut merged: IndexMap<FieldReference, Value> = IndexMap::new();
            for field in &fields {
                let mut incoming: Vec<(BlockId, Value)> = Vec::new();
                for pred in preds {
                    let Some(out) = out_states.get(pred) else {
                        return Err("loop-carried field state");
                    };
                    incoming.push((*pred, out.get(field).copied().unwrap_or(defaults[field])));
                }
                let Some((_, first)) = incoming.first().copied() else {
                    merged.insert(*field, defaults[field]);
                    continue;
                };
                if incoming.iter().all(|(_, value)| *value == first) {
                    merged.insert(*field, first);
                } else {
                    let dest = code.new_value();
                    new_phis.push((
                        block_id,
                        Phi {
                            dest,
                            operands: incoming,
                        },
                    ));
                    merged.insert(*field, dest);
                }
            }
            merged
        };

        let start = if block_id == alloc_block {
            // skip past the allocation and the freshly inserted defaults
            alloc_index + 1 + fields.len()
        } else {
            0
        };
        let block = code.block(block_id);
        for (index, instruction) in block.instructions.iter().enumerate() {
            if index < start && block_id == alloc_block && index > alloc_index {
                continue;
            }
            match &instruction.kind {
                InstructionKind::NewInstance { .. } if instruction.dest == Some(root) => {
                    removals.push((block_id, index));
                }
                InstructionKind::InstanceGet { field, object } if *object == root => {
                    let value = state.get(field).copied().unwrap_or(defaults[field]);
                    if let Some(dest) = instruction.dest {
                        replacements.push((dest, value));
                    }
                    removals.push((block_id, index));
                }
                InstructionKind::InstancePut {
                    field,
                    object,
                    value,
                } if *object == root => {
                    state.insert(*field, *value);
                    removals.push((block_id, index));
                }
                InstructionKind::Invoke {
                    kind: InvokeKind::Direct,
                    method,
                    arguments,
                } if method.is_instance_initializer(pool)
                    && method.holder == pool.object_type()
                    && arguments.first() == Some(&root) =>
                {
                    removals.push((block_id, index));
                }
                InstructionKind::Invoke { method, .. }
                    if method.holder == ty
                        && instruction
                            .kind
                            .used_values()
                            .contains(&root) =>
                {
                    return Err("unexpected surviving call on the root");
                }
                _ => {}
            }
        }
        out_states.insert(block_id, state);
    }

    for (block, phi) in new_phis {
        code.block_mut(block).phis.push(phi);
    }
    // field-read values must be rewired before instructions disappear
    for (from, to) in replacements {
        code.replace_uses(from, to);
    }
    let mut by_block: IndexMap<BlockId, Vec<usize>> = IndexMap::new();
    for (block, index) in removals {
        by_block.entry(block).or_default().push(index);
    }
    for (block, mut indexes) in by_block {
        indexes.sort_unstable_by(|a, b| b.cmp(a));
        indexes.dedup();
        for index in indexes {
            code.block_mut(block).instructions.remove(index);
        }
    }
    Ok(())
}

fn reachable_from(code: &IrCode, start: BlockId) -> Vec<BlockId> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    seen.insert(start);
    while let Some(block) = stack.pop() {
        for successor in code.block(block).successors() {
            if seen.insert(successor) {
                stack.push(successor);
            }
        }
    }
    seen.into_iter().collect()
}
