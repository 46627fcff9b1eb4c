//! DX Intermediate Representation
//!
//! The bottom of the optimizer's dependency stack: the interned symbol
//! pool, structural method/field references, class definitions, the
//! per-method SSA IR, monotone optimization-info records, and the
//! application view passes operate on.
//!
//! # Core Concepts
//!
//! - [`SymbolPool`]: content-addressed pool of types and names; handle
//!   equality is identity
//! - [`MethodReference`] / [`FieldReference`]: structural symbol
//!   references, the currency of the lens layer
//! - [`ClassDefinition`] / [`MethodDefinition`]: mutable definitions
//!   owned by the view
//! - [`IrCode`]: SSA basic-block graph per method
//! - [`ApplicationView`]: program/library partition snapshot

mod class;
mod flags;
mod ir;
mod optimization;
mod pool;
mod reference;
mod view;

pub use class::{
    ClassDefinition, FieldDefinition, InnerClassAttribute, KotlinClassKind, KotlinMetadata,
    MethodDefinition,
};
pub use flags::AccessFlags;
pub use ir::{
    BasicBlock, BinaryOp, BlockId, Instruction, InstructionKind, InvokeKind, IrCode, IrReference,
    IrVerifyError, Phi, Value,
};
pub use optimization::{ConstArgument, OptimizationInfo, ParameterUsage, TrivialInitializerInfo};
pub use pool::{
    Name, SymbolPool, Type, CLINIT_NAME, INIT_NAME, INT_DESCRIPTOR, OBJECT_DESCRIPTOR,
    VOID_DESCRIPTOR,
};
pub use reference::{FieldReference, MethodReference, MethodSignature};
pub use view::{ApplicationView, ClassHierarchy, ViewError};
