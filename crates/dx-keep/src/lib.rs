//! DX Keep Layer
//!
//! Declarative retention: structured keep rules, the whole-run option
//! bag, and the keep/pinning oracle that passes consult before renaming,
//! merging, removing, or inlining any symbol.

mod options;
mod oracle;
mod rule;

pub use options::CompilerOptions;
pub use oracle::{KeepConstraints, KeepOracle};
pub use rule::{KeepKind, KeepRule, MemberPattern, NamePattern, RuleError, RuleSet};
