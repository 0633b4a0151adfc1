//! The middle end: the three-address-code intermediate representation and
//! the AST-to-IR lowering pass.

pub mod ir;
pub mod lower;

pub use ir::*;
pub use lower::lower;
