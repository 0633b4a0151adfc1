//! A minimal semantic pass.
//!
//! Real semantic analysis (type checking, scope resolution) is out of
//! scope for this crate: the core expects an external collaborator to
//! hand it a `SemanticsTable`. This module builds just enough of that
//! table — function return types under the `.global` scope — for the IR
//! emitter to resolve call-expression result types, so the crate is
//! usable end-to-end without a separate type checker.

use crate::common::{Id, Map};
use crate::front::ast::{DataType, Program};

#[derive(Debug, Clone, Copy)]
pub struct SymbolRecord {
    pub data_type: DataType,
}

pub type SemanticsTable = Map<Id, Map<Id, SymbolRecord>>;

pub const GLOBAL_SCOPE: &str = ".global";

pub fn collect(program: &Program) -> SemanticsTable {
    let mut table = SemanticsTable::new();
    let mut globals = Map::new();

    for func in &program.funcs {
        globals.insert(func.name, SymbolRecord { data_type: func.ret_type });
    }

    table.insert(Id::new(GLOBAL_SCOPE.to_string()), globals);
    table
}
