//! DX Graph Lens Stack
//!
//! Records all symbol rewritings produced by optimization passes and
//! answers "given a pre-pass reference, what reference should bytecode
//! now use?". The lens is the only mechanism by which a pass
//! communicates renames to the rest of the pipeline.
//!
//! # Core Concepts
//!
//! - [`GraphLens`]: one pass's immutable rewriting record
//! - [`PrototypeChanges`]: structured signature edits carried alongside
//!   method renames
//! - [`LensStack`]: the ordered composing chain; enforces at most one
//!   prototype change per method across the stack
//! - [`RenameMapping`]: the flattened residual map in proguard mapping
//!   format, plus retracing

mod lens;
mod mapping;
mod prototype;
mod rewriter;
mod stack;

pub use lens::{disambiguate, GraphLens, GraphLensBuilder, LensError, MethodLookup};
pub use mapping::{descriptor_to_java, ClassMapping, MemberMapping, RenameMapping};
pub use prototype::{ArgumentRewrite, ExtraParameter, PrototypeChanges, ReturnRewrite};
pub use rewriter::{rewrite_class, rewrite_code_with_prototypes};
pub use stack::LensStack;
