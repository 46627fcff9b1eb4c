//! Force-inliner
//!
//! Splices a callee body into a caller at one call site: callee values
//! are renumbered into the caller's value space, argument loads are
//! substituted with the actual arguments, returns become branches to
//! the continuation block, and a phi joins multiple return values.

use dx_ir::{
    BlockId, Instruction, InstructionKind, IrCode, Phi, Value,
};
use std::collections::HashMap;

/// Inlining failure; callers treat these as candidate skips
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InlineError {
    /// The site does not hold an invocation
    #[error("call site is not an invocation")]
    NotAnInvocation,

    /// The callee has no body to inline
    #[error("callee has no body")]
    MissingBody,

    /// Caller arguments do not cover the callee's argument loads
    #[error("argument slot {0} not supplied at the call site")]
    MissingArgument(u16),

    /// The caller expects a value but the callee returns none
    #[error("callee returns no value but the call defines one")]
    ReturnMismatch,
}

/// Inline `callee` at the given call site in `caller`
///
/// `block` and `instruction_index` locate the `Invoke` instruction. The
/// call's arguments substitute the callee's `Argument` loads (receiver
/// included, as slot 0, for instance callees).
///
/// # Errors
/// Fails without mutating the caller beyond recoverable state when the
/// site or callee is unsuitable; callers clone defensively.
pub fn force_inline(
    caller: &mut IrCode,
    block: BlockId,
    instruction_index: usize,
    callee: &IrCode,
) -> Result<(), InlineError> {
    let call = caller
        .block(block)
        .instructions
        .get(instruction_index)
        .ok_or(InlineError::NotAnInvocation)?
        .clone();
    let InstructionKind::Invoke { arguments, .. } = &call.kind else {
        return Err(InlineError::NotAnInvocation);
    };
    if callee.is_empty() {
        return Err(InlineError::MissingBody);
    }
    let arguments = arguments.clone();

    // map callee values: argument loads take the caller's argument
    // values, everything else gets a fresh value
    let mut value_map: HashMap<Value, Value> = HashMap::new();
    for callee_block in callee.blocks() {
        for instruction in &callee_block.instructions {
            if let InstructionKind::Argument { index, .. } = &instruction.kind {
                let supplied = arguments
                    .get(usize::from(*index))
                    .copied()
                    .ok_or(InlineError::MissingArgument(*index))?;
                if let Some(dest) = instruction.dest {
                    value_map.insert(dest, supplied);
                }
            }
        }
    }
    for callee_block in callee.blocks() {
        for phi in &callee_block.phis {
            value_map.entry(phi.dest).or_insert_with(|| caller.new_value());
        }
        for instruction in &callee_block.instructions {
            if let Some(dest) = instruction.dest {
                if !matches!(instruction.kind, InstructionKind::Argument { .. }) {
                    value_map.entry(dest).or_insert_with(|| caller.new_value());
                }
            }
        }
    }

    let block_map: HashMap<BlockId, BlockId> = callee
        .blocks()
        .iter()
        .map(|callee_block| (callee_block.id, caller.new_block()))
        .collect();
    let continuation = caller.new_block();

    // split the caller block: everything after the call moves to the
    // continuation, the call itself is dropped
    let tail: Vec<Instruction> = caller
        .block_mut(block)
        .instructions
        .split_off(instruction_index + 1);
    caller.block_mut(block).instructions.pop();
    caller
        .block_mut(block)
        .instructions
        .push(Instruction::effect(InstructionKind::Goto {
            target: block_map[&callee.entry()],
        }));
    caller.block_mut(continuation).instructions.extend(tail);

    // splice the callee blocks
    let mut returns: Vec<(BlockId, Option<Value>)> = Vec::new();
    for callee_block in callee.blocks() {
        let target = block_map[&callee_block.id];
        for phi in &callee_block.phis {
            caller.block_mut(target).phis.push(Phi {
                dest: value_map[&phi.dest],
                operands: phi
                    .operands
                    .iter()
                    .map(|(from, value)| (block_map[from], value_map[value]))
                    .collect(),
            });
        }
        for instruction in &callee_block.instructions {
            match &instruction.kind {
                InstructionKind::Argument { .. } => {}
                InstructionKind::Return { value } => {
                    returns.push((target, value.map(|v| value_map[&v])));
                    caller
                        .block_mut(target)
                        .instructions
                        .push(Instruction::effect(InstructionKind::Goto {
                            target: continuation,
                        }));
                }
                kind => {
                    let mut kind = kind.clone();
                    remap_kind(&mut kind, &value_map, &block_map);
                    caller.block_mut(target).instructions.push(Instruction {
                        dest: instruction.dest.map(|dest| value_map[&dest]),
                        kind,
                    });
                }
            }
        }
    }

    // wire the returned value into the caller
    if let Some(dest) = call.dest {
        match returns.len() {
            0 => return Err(InlineError::ReturnMismatch),
            1 => {
                let (_, value) = returns[0];
                let value = value.ok_or(InlineError::ReturnMismatch)?;
                caller.replace_uses(dest, value);
            }
            _ => {
                let mut operands = Vec::with_capacity(returns.len());
                for (from, value) in &returns {
                    operands.push((*from, value.ok_or(InlineError::ReturnMismatch)?));
                }
                caller.block_mut(continuation).phis.push(Phi {
                    dest,
                    operands,
                });
            }
        }
    }
    Ok(())
}

fn remap_kind(
    kind: &mut InstructionKind,
    value_map: &HashMap<Value, Value>,
    block_map: &HashMap<BlockId, BlockId>,
) {
    let map_value = |v: &mut Value| {
        if let Some(mapped) = value_map.get(v) {
            *v = *mapped;
        }
    };
    let map_block = |b: &mut BlockId| {
        if let Some(mapped) = block_map.get(b) {
            *b = *mapped;
        }
    };
    match kind {
        InstructionKind::Invoke { arguments, .. } => arguments.iter_mut().for_each(map_value),
        InstructionKind::InstanceGet { object, .. } => map_value(object),
        InstructionKind::InstancePut { object, value, .. } => {
            map_value(object);
            map_value(value);
        }
        InstructionKind::StaticPut { value, .. } => map_value(value),
        InstructionKind::InstanceOf { value, .. } | InstructionKind::CheckCast { value, .. } => {
            map_value(value);
        }
        InstructionKind::Binary { lhs, rhs, .. } => {
            map_value(lhs);
            map_value(rhs);
        }
        InstructionKind::Goto { target } => map_block(target),
        InstructionKind::IfEqInt {
            lhs,
            rhs,
            then_target,
            else_target,
        } => {
            map_value(lhs);
            map_value(rhs);
            map_block(then_target);
            map_block(else_target);
        }
        InstructionKind::Throw { exception } => map_value(exception),
        _ => {}
    }
}
