//! SSA intermediate representation
//!
//! Per-method IR: a graph of basic blocks, each owning a phi list and an
//! instruction list ending in a terminator. Values are dense per-method
//! handles defined exactly once. Control-flow successors are read off the
//! terminator; predecessor sets are recomputed on demand so structural
//! edits never have to maintain edge lists by hand.

use crate::pool::{Name, Type};
use crate::reference::{FieldReference, MethodReference};
use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// SSA value handle, dense per method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value(u32);

impl Value {
    /// Raw index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Basic-block handle, unique per method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);

impl BlockId {
    /// Raw index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Invocation dispatch kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Virtual dispatch on a class method
    Virtual,
    /// Interface dispatch
    Interface,
    /// Direct call (constructors, private methods)
    Direct,
    /// Static call
    Static,
    /// Superclass call
    Super,
}

/// Integer binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
}

/// Block-level phi joining one value per predecessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    /// Defined value
    pub dest: Value,
    /// (predecessor block, incoming value) pairs
    pub operands: Vec<(BlockId, Value)>,
}

/// One IR instruction: optional defined value plus operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Value defined by this instruction, if any
    pub dest: Option<Value>,
    /// The operation
    pub kind: InstructionKind,
}

impl Instruction {
    /// Instruction with a defined value
    #[inline]
    #[must_use]
    pub fn with_dest(dest: Value, kind: InstructionKind) -> Self {
        Self {
            dest: Some(dest),
            kind,
        }
    }

    /// Instruction defining nothing
    #[inline]
    #[must_use]
    pub fn effect(kind: InstructionKind) -> Self {
        Self { dest: None, kind }
    }
}

/// IR operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Load of argument slot `index` (receiver is slot 0 for instance
    /// methods)
    Argument {
        /// Argument slot
        index: u16,
        /// Declared type of the slot
        ty: Type,
    },
    /// Integer constant
    ConstInt {
        /// The constant
        value: i64,
    },
    /// Null constant
    ConstNull,
    /// String constant
    ConstString {
        /// Interned string
        value: Name,
    },
    /// Class literal
    ConstClass {
        /// Referenced type
        ty: Type,
    },
    /// Uninitialized-instance allocation
    NewInstance {
        /// Allocated type
        ty: Type,
    },
    /// Method invocation
    Invoke {
        /// Dispatch kind
        kind: InvokeKind,
        /// Invoked method
        method: MethodReference,
        /// Arguments; for non-static kinds slot 0 is the receiver
        arguments: SmallVec<[Value; 4]>,
    },
    /// Instance-field read
    InstanceGet {
        /// Referenced field
        field: FieldReference,
        /// Receiver object
        object: Value,
    },
    /// Instance-field write
    InstancePut {
        /// Referenced field
        field: FieldReference,
        /// Receiver object
        object: Value,
        /// Stored value
        value: Value,
    },
    /// Static-field read
    StaticGet {
        /// Referenced field
        field: FieldReference,
    },
    /// Static-field write
    StaticPut {
        /// Referenced field
        field: FieldReference,
        /// Stored value
        value: Value,
    },
    /// `instanceof` test
    InstanceOf {
        /// Tested type
        ty: Type,
        /// Tested value
        value: Value,
    },
    /// Checked cast
    CheckCast {
        /// Target type
        ty: Type,
        /// Cast value
        value: Value,
    },
    /// Integer binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Unconditional branch
    Goto {
        /// Successor
        target: BlockId,
    },
    /// Conditional branch on integer equality
    IfEqInt {
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
        /// Successor when equal
        then_target: BlockId,
        /// Successor when not equal
        else_target: BlockId,
    },
    /// Method return
    Return {
        /// Returned value, absent for `void`
        value: Option<Value>,
    },
    /// Throw
    Throw {
        /// Thrown exception
        exception: Value,
    },
}

impl InstructionKind {
    /// Whether this operation ends a block
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Goto { .. } | Self::IfEqInt { .. } | Self::Return { .. } | Self::Throw { .. }
        )
    }

    /// Control-flow successors of a terminator (empty otherwise)
    #[must_use]
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::Goto { target } => smallvec![*target],
            Self::IfEqInt {
                then_target,
                else_target,
                ..
            } => smallvec![*then_target, *else_target],
            _ => SmallVec::new(),
        }
    }

    /// Values read by this operation
    #[must_use]
    pub fn used_values(&self) -> SmallVec<[Value; 4]> {
        match self {
            Self::Invoke { arguments, .. } => arguments.iter().copied().collect(),
            Self::InstanceGet { object, .. } => smallvec![*object],
            Self::InstancePut { object, value, .. } => smallvec![*object, *value],
            Self::StaticPut { value, .. } => smallvec![*value],
            Self::InstanceOf { value, .. } | Self::CheckCast { value, .. } => smallvec![*value],
            Self::Binary { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            Self::IfEqInt { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            Self::Return { value } => value.iter().copied().collect(),
            Self::Throw { exception } => smallvec![*exception],
            _ => SmallVec::new(),
        }
    }

    /// Replace every use of `from` with `to`
    pub fn replace_uses(&mut self, from: Value, to: Value) {
        let replace = |v: &mut Value| {
            if *v == from {
                *v = to;
            }
        };
        match self {
            Self::Invoke { arguments, .. } => arguments.iter_mut().for_each(replace),
            Self::InstanceGet { object, .. } => replace(object),
            Self::InstancePut { object, value, .. } => {
                replace(object);
                replace(value);
            }
            Self::StaticPut { value, .. } => replace(value),
            Self::InstanceOf { value, .. } | Self::CheckCast { value, .. } => replace(value),
            Self::Binary { lhs, rhs, .. } => {
                replace(lhs);
                replace(rhs);
            }
            Self::IfEqInt { lhs, rhs, .. } => {
                replace(lhs);
                replace(rhs);
            }
            Self::Return { value } => {
                if let Some(v) = value {
                    replace(v);
                }
            }
            Self::Throw { exception } => replace(exception),
            _ => {}
        }
    }

    /// Redirect every branch to `from` onto `to`
    pub fn replace_successor(&mut self, from: BlockId, to: BlockId) {
        match self {
            Self::Goto { target } => {
                if *target == from {
                    *target = to;
                }
            }
            Self::IfEqInt {
                then_target,
                else_target,
                ..
            } => {
                if *then_target == from {
                    *then_target = to;
                }
                if *else_target == from {
                    *else_target = to;
                }
            }
            _ => {}
        }
    }
}

/// A symbol reference occurring in a method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrReference {
    /// Type reference (allocation, cast, instanceof, class literal)
    Type(Type),
    /// Field reference
    Field(FieldReference),
    /// Method reference
    Method(MethodReference),
}

/// Basic block: phis, then instructions, last one a terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Stable block handle
    pub id: BlockId,
    /// Block-entry phis
    pub phis: Vec<Phi>,
    /// Instruction list
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            phis: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// The block's terminator, if the block is well formed
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.kind.is_terminator())
    }

    /// Successors read from the terminator
    #[must_use]
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        self.terminator()
            .map(|t| t.kind.successors())
            .unwrap_or_default()
    }
}

/// SSA verification failure
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IrVerifyError {
    /// A value has more than one definition
    #[error("value {0} defined more than once")]
    Redefinition(Value),

    /// A value is used but never defined
    #[error("value {0} used in {1} but never defined")]
    UndefinedValue(Value, BlockId),

    /// A block does not end in a terminator
    #[error("block {0} has no terminator")]
    MissingTerminator(BlockId),

    /// A terminator occurs before the end of a block
    #[error("block {0} has a terminator before its last instruction")]
    EarlyTerminator(BlockId),

    /// A branch targets a block that does not exist
    #[error("block {0} branches to unknown block {1}")]
    UnknownSuccessor(BlockId, BlockId),

    /// A phi names a predecessor that does not branch to its block
    #[error("phi in {0} names non-predecessor {1}")]
    BogusPhiOperand(BlockId, BlockId),
}

/// Per-method SSA body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrCode {
    blocks: Vec<BasicBlock>,
    next_value: u32,
    next_block: u32,
}

impl IrCode {
    /// Empty body with a single entry block
    #[must_use]
    pub fn new() -> Self {
        let mut code = Self {
            blocks: Vec::new(),
            next_value: 0,
            next_block: 0,
        };
        code.new_block();
        code
    }

    /// Entry block handle
    #[inline]
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.blocks[0].id
    }

    /// Allocate a fresh value
    pub fn new_value(&mut self) -> Value {
        let value = Value(self.next_value);
        self.next_value += 1;
        value
    }

    /// Number of values allocated so far
    #[inline]
    #[must_use]
    pub fn value_count(&self) -> u32 {
        self.next_value
    }

    /// Append a fresh empty block
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// All blocks in layout order
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Mutable block list
    #[inline]
    pub fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    /// Block by handle
    ///
    /// # Panics
    /// Panics if the handle does not name a block of this body.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .expect("block handle from another body")
    }

    /// Mutable block by handle
    ///
    /// # Panics
    /// Panics if the handle does not name a block of this body.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .expect("block handle from another body")
    }

    /// Remove a block outright
    pub fn remove_block(&mut self, id: BlockId) {
        self.blocks.retain(|b| b.id != id);
    }

    /// Remove every block; a zero-block body marks the method for
    /// outright removal by the driver
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Whether the body has no blocks left
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Instruction count across all blocks, the size estimate used by
    /// inlining budgets
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// Predecessor sets, recomputed from terminators
    #[must_use]
    pub fn predecessor_map(&self) -> IndexMap<BlockId, SmallVec<[BlockId; 4]>> {
        let mut map: IndexMap<BlockId, SmallVec<[BlockId; 4]>> =
            self.blocks.iter().map(|b| (b.id, SmallVec::new())).collect();
        for block in &self.blocks {
            for successor in block.successors() {
                if let Some(preds) = map.get_mut(&successor) {
                    if !preds.contains(&block.id) {
                        preds.push(block.id);
                    }
                }
            }
        }
        map
    }

    /// Reverse postorder from the entry block
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        let mut stack = vec![(self.entry(), 0usize)];
        visited.insert(self.entry());
        while let Some((block, child)) = stack.pop() {
            let successors = self.block(block).successors();
            if child < successors.len() {
                stack.push((block, child + 1));
                let next = successors[child];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        postorder
    }

    /// Replace every use of `from` with `to` across phis and instructions
    pub fn replace_uses(&mut self, from: Value, to: Value) {
        for block in &mut self.blocks {
            for phi in &mut block.phis {
                for (_, operand) in &mut phi.operands {
                    if *operand == from {
                        *operand = to;
                    }
                }
            }
            for instruction in &mut block.instructions {
                instruction.kind.replace_uses(from, to);
            }
        }
    }

    /// Every symbol reference in the body, in block order
    #[must_use]
    pub fn references(&self) -> Vec<IrReference> {
        let mut out = Vec::new();
        for block in &self.blocks {
            for instruction in &block.instructions {
                match &instruction.kind {
                    InstructionKind::ConstClass { ty }
                    | InstructionKind::NewInstance { ty }
                    | InstructionKind::InstanceOf { ty, .. }
                    | InstructionKind::CheckCast { ty, .. } => out.push(IrReference::Type(*ty)),
                    InstructionKind::Invoke { method, .. } => {
                        out.push(IrReference::Method(method.clone()));
                    }
                    InstructionKind::InstanceGet { field, .. }
                    | InstructionKind::InstancePut { field, .. }
                    | InstructionKind::StaticGet { field }
                    | InstructionKind::StaticPut { field, .. } => {
                        out.push(IrReference::Field(*field));
                    }
                    _ => {}
                }
            }
        }
        out
    }

    /// Canonicalize trivial phis (all operands identical) by replacing
    /// their uses with the single operand; repeats to a fixed point
    pub fn canonicalize_trivial_phis(&mut self) {
        loop {
            let mut replaced = None;
            'outer: for block in &self.blocks {
                for phi in &block.phis {
                    let mut operands = phi.operands.iter().map(|(_, v)| *v);
                    if let Some(first) = operands.next() {
                        if operands.all(|v| v == first) && first != phi.dest {
                            replaced = Some((block.id, phi.dest, first));
                            break 'outer;
                        }
                    }
                }
            }
            let Some((block, dest, operand)) = replaced else {
                break;
            };
            self.block_mut(block).phis.retain(|p| p.dest != dest);
            self.replace_uses(dest, operand);
        }
    }

    /// SSA consistency check
    ///
    /// Verifies single definitions, definition-before-use in reverse
    /// postorder (phis exempt), well-formed terminators, and that phi
    /// operands name actual predecessors.
    pub fn verify(&self) -> Result<(), IrVerifyError> {
        let mut defined = HashSet::new();
        for block in &self.blocks {
            for phi in &block.phis {
                if !defined.insert(phi.dest) {
                    return Err(IrVerifyError::Redefinition(phi.dest));
                }
            }
            for (position, instruction) in block.instructions.iter().enumerate() {
                if let Some(dest) = instruction.dest {
                    if !defined.insert(dest) {
                        return Err(IrVerifyError::Redefinition(dest));
                    }
                }
                let last = position + 1 == block.instructions.len();
                if instruction.kind.is_terminator() && !last {
                    return Err(IrVerifyError::EarlyTerminator(block.id));
                }
            }
            if block.terminator().is_none() {
                return Err(IrVerifyError::MissingTerminator(block.id));
            }
        }

        let known: HashSet<BlockId> = self.blocks.iter().map(|b| b.id).collect();
        for block in &self.blocks {
            for successor in block.successors() {
                if !known.contains(&successor) {
                    return Err(IrVerifyError::UnknownSuccessor(block.id, successor));
                }
            }
        }

        let predecessors = self.predecessor_map();
        for block in &self.blocks {
            for phi in &block.phis {
                for (incoming, _) in &phi.operands {
                    let preds = &predecessors[&block.id];
                    if !preds.contains(incoming) {
                        return Err(IrVerifyError::BogusPhiOperand(block.id, *incoming));
                    }
                }
            }
        }

        // def-before-use along reverse postorder, ignoring phi operands
        // which may legitimately reference back-edge values
        let mut seen = HashSet::new();
        for id in self.reverse_postorder() {
            let block = self.block(id);
            for phi in &block.phis {
                seen.insert(phi.dest);
            }
            for instruction in &block.instructions {
                for used in instruction.kind.used_values() {
                    if !seen.contains(&used) && !defined.contains(&used) {
                        return Err(IrVerifyError::UndefinedValue(used, id));
                    }
                }
                if let Some(dest) = instruction.dest {
                    seen.insert(dest);
                }
            }
        }
        Ok(())
    }
}

impl Default for IrCode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SymbolPool;
    use crate::reference::MethodSignature;
    use pretty_assertions::assert_eq;

    fn straight_line_body() -> IrCode {
        let mut code = IrCode::new();
        let entry = code.entry();
        let v0 = code.new_value();
        let block = code.block_mut(entry);
        block.instructions.push(Instruction::with_dest(
            v0,
            InstructionKind::ConstInt { value: 42 },
        ));
        block.instructions.push(Instruction::effect(
            InstructionKind::Return { value: Some(v0) },
        ));
        code
    }

    #[test]
    fn straight_line_verifies() {
        assert_eq!(straight_line_body().verify(), Ok(()));
    }

    #[test]
    fn missing_terminator_rejected() {
        let mut code = IrCode::new();
        let entry = code.entry();
        let v0 = code.new_value();
        code.block_mut(entry).instructions.push(Instruction::with_dest(
            v0,
            InstructionKind::ConstInt { value: 1 },
        ));

        assert_eq!(code.verify(), Err(IrVerifyError::MissingTerminator(entry)));
    }

    #[test]
    fn redefinition_rejected() {
        let mut code = IrCode::new();
        let entry = code.entry();
        let v0 = code.new_value();
        let block = code.block_mut(entry);
        block.instructions.push(Instruction::with_dest(
            v0,
            InstructionKind::ConstInt { value: 1 },
        ));
        block.instructions.push(Instruction::with_dest(
            v0,
            InstructionKind::ConstInt { value: 2 },
        ));
        block
            .instructions
            .push(Instruction::effect(InstructionKind::Return { value: None }));

        assert_eq!(code.verify(), Err(IrVerifyError::Redefinition(v0)));
    }

    #[test]
    fn predecessors_follow_terminators() {
        let mut code = IrCode::new();
        let entry = code.entry();
        let exit = code.new_block();
        code.block_mut(entry)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto { target: exit }));
        code.block_mut(exit)
            .instructions
            .push(Instruction::effect(InstructionKind::Return { value: None }));

        let predecessors = code.predecessor_map();
        assert_eq!(predecessors[&exit].as_slice(), &[entry]);
        assert!(predecessors[&entry].is_empty());
    }

    #[test]
    fn reverse_postorder_visits_entry_first() {
        let mut code = IrCode::new();
        let entry = code.entry();
        let middle = code.new_block();
        let exit = code.new_block();
        code.block_mut(entry)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto { target: middle }));
        code.block_mut(middle)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto { target: exit }));
        code.block_mut(exit)
            .instructions
            .push(Instruction::effect(InstructionKind::Return { value: None }));

        assert_eq!(code.reverse_postorder(), vec![entry, middle, exit]);
    }

    #[test]
    fn trivial_phi_canonicalization() {
        let mut code = IrCode::new();
        let entry = code.entry();
        let left = code.new_block();
        let right = code.new_block();
        let join = code.new_block();

        let cond = code.new_value();
        let zero = code.new_value();
        let shared = code.new_value();
        let phi_dest = code.new_value();

        {
            let block = code.block_mut(entry);
            block.instructions.push(Instruction::with_dest(
                cond,
                InstructionKind::ConstInt { value: 0 },
            ));
            block.instructions.push(Instruction::with_dest(
                zero,
                InstructionKind::ConstInt { value: 0 },
            ));
            block.instructions.push(Instruction::with_dest(
                shared,
                InstructionKind::ConstInt { value: 9 },
            ));
            block.instructions.push(Instruction::effect(InstructionKind::IfEqInt {
                lhs: cond,
                rhs: zero,
                then_target: left,
                else_target: right,
            }));
        }
        code.block_mut(left)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto { target: join }));
        code.block_mut(right)
            .instructions
            .push(Instruction::effect(InstructionKind::Goto { target: join }));
        {
            let block = code.block_mut(join);
            block.phis.push(Phi {
                dest: phi_dest,
                operands: vec![(left, shared), (right, shared)],
            });
            block.instructions.push(Instruction::effect(InstructionKind::Return {
                value: Some(phi_dest),
            }));
        }

        assert_eq!(code.verify(), Ok(()));
        code.canonicalize_trivial_phis();

        assert!(code.block(join).phis.is_empty());
        assert_eq!(
            code.block(join).instructions.last().unwrap().kind,
            InstructionKind::Return {
                value: Some(shared)
            }
        );
        assert_eq!(code.verify(), Ok(()));
    }

    #[test]
    fn references_enumerates_symbols() {
        let pool = SymbolPool::new();
        let holder = pool.intern_type("LFoo;");
        let field = FieldReference::new(holder, pool.intern_name("x"), pool.int_type());
        let method = MethodReference::new(
            holder,
            MethodSignature::new(pool.intern_name("m"), [], pool.void_type()),
        );

        let mut code = IrCode::new();
        let entry = code.entry();
        let object = code.new_value();
        {
            let block = code.block_mut(entry);
            block.instructions.push(Instruction::with_dest(
                object,
                InstructionKind::NewInstance { ty: holder },
            ));
            block.instructions.push(Instruction::effect(InstructionKind::Invoke {
                kind: InvokeKind::Virtual,
                method: method.clone(),
                arguments: smallvec![object],
            }));
            block.instructions.push(Instruction::effect(InstructionKind::StaticGet {
                field,
            }));
            block
                .instructions
                .push(Instruction::effect(InstructionKind::Return { value: None }));
        }

        let references = code.references();
        assert_eq!(references.len(), 3);
        assert!(references.contains(&IrReference::Type(holder)));
        assert!(references.contains(&IrReference::Method(method)));
        assert!(references.contains(&IrReference::Field(field)));
    }
}
